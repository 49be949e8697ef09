//! Local persistence of captures requested with `persistLocally`.

use std::io;
use std::path::{Path, PathBuf};

use snapbridge_runtime::{CapturePayload, RequestId};
use tracing::info;

/// Writes captures as `<request-id>.<ext>` into one directory.
#[derive(Debug, Clone)]
pub struct ScreenshotStore {
	dir: PathBuf,
}

impl ScreenshotStore {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}

	/// `~/Downloads/snapbridge/screenshots`, or `None` when no home directory is known.
	pub fn default_dir() -> Option<PathBuf> {
		dirs::download_dir()
			.or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
			.map(|downloads| downloads.join("snapbridge").join("screenshots"))
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// Whether `id` can be used as a file name as-is.
	///
	/// Ids are never rewritten, so two requests cannot end up sharing a file.
	pub fn accepts_id(id: &str) -> bool {
		!id.is_empty()
			&& !id.starts_with('.')
			&& id.len() <= 128
			&& id
				.chars()
				.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
	}

	/// Path a capture with `id` would be written to.
	pub fn path_for(&self, id: &RequestId, payload: &CapturePayload) -> PathBuf {
		self.dir
			.join(format!("{}.{}", id.as_str(), payload.file_extension()))
	}

	/// Writes the image, creating the directory on first use.
	///
	/// Fails with [`io::ErrorKind::InvalidInput`] for ids [`accepts_id`](Self::accepts_id)
	/// rejects.
	pub async fn save(&self, id: &RequestId, payload: &CapturePayload) -> io::Result<PathBuf> {
		if !Self::accepts_id(id.as_str()) {
			return Err(io::Error::new(
				io::ErrorKind::InvalidInput,
				format!("request id '{id}' is not a valid file name"),
			));
		}
		tokio::fs::create_dir_all(&self.dir).await?;
		let path = self.path_for(id, payload);
		tokio::fs::write(&path, payload.bytes()).await?;
		info!(target = "snapbridge.http", request_id = %id, path = %path.display(), size = payload.size(), "capture saved");
		Ok(path)
	}
}

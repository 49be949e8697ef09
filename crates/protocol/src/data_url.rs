//! Decoding of `data:` URLs produced by `chrome.tabs.captureVisibleTab`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{ProtocolError, Result};

/// A decoded base64 `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
	/// Media type without parameters, e.g. `image/png`.
	pub media_type: String,
	pub data: Vec<u8>,
}

impl DataUrl {
	/// Parses `data:<media-type>[;params];base64,<payload>`.
	///
	/// Only base64-encoded URLs are accepted; the extension never sends percent-encoded
	/// image data. An empty media type defaults to `text/plain` as RFC 2397 prescribes.
	pub fn parse(input: &str) -> Result<Self> {
		let rest = input
			.strip_prefix("data:")
			.ok_or(ProtocolError::InvalidDataUrl("missing `data:` scheme"))?;
		let (header, payload) = rest
			.split_once(',')
			.ok_or(ProtocolError::InvalidDataUrl("missing `,` separator"))?;
		let header = header
			.strip_suffix(";base64")
			.ok_or(ProtocolError::InvalidDataUrl("payload is not base64 encoded"))?;

		let media_type = match header.split(';').next().map(str::trim) {
			Some("") | None => "text/plain".to_string(),
			Some(mt) => mt.to_ascii_lowercase(),
		};
		let data = STANDARD.decode(payload.trim())?;

		Ok(Self { media_type, data })
	}

	/// Encodes bytes as a base64 `data:` URL.
	pub fn encode(media_type: &str, data: &[u8]) -> String {
		format!("data:{media_type};base64,{}", STANDARD.encode(data))
	}

	/// File extension conventionally used for the media type.
	pub fn file_extension(&self) -> &'static str {
		match self.media_type.as_str() {
			"image/png" => "png",
			"image/jpeg" | "image/jpg" => "jpg",
			"image/webp" => "webp",
			"image/gif" => "gif",
			_ => "bin",
		}
	}
}

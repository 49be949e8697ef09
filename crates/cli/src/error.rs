use snapbridge_protocol::{ErrorBody, ErrorCode};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	/// The server answered with a structured error.
	#[error("{message}")]
	Server { status: u16, code: ErrorCode, message: String },

	/// The server answered with an error status and a body that is not an [`ErrorBody`].
	#[error("server returned HTTP {status}: {body}")]
	UnexpectedStatus { status: u16, body: String },

	#[error("could not reach snapbridge server at {url}")]
	Unreachable {
		url: String,
		#[source]
		source: reqwest::Error,
	},

	#[error("invalid server URL: {0}")]
	InvalidUrl(String),

	#[error(transparent)]
	Http(#[from] reqwest::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl CliError {
	pub fn from_body(status: u16, body: ErrorBody) -> Self {
		Self::Server {
			status,
			code: body.code,
			message: body.message,
		}
	}

	pub fn code(&self) -> ErrorCode {
		match self {
			Self::Server { code, .. } => *code,
			Self::InvalidUrl(_) => ErrorCode::InvalidInput,
			_ => ErrorCode::InternalError,
		}
	}

	/// Structured form printed to stderr on failure.
	pub fn to_body(&self) -> ErrorBody {
		let message = match self {
			Self::Unreachable { source, .. } => format!("{self}: {source}"),
			Self::Anyhow(err) => format!("{err:#}"),
			_ => self.to_string(),
		};
		ErrorBody {
			code: self.code(),
			message,
		}
	}
}

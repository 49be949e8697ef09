use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while decoding control-channel frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
	#[error("invalid JSON: {0}")]
	Json(#[from] serde_json::Error),

	#[error("message is missing field `{0}`")]
	MissingField(&'static str),

	#[error("unsupported message: {0}")]
	Unsupported(String),

	#[error("invalid data URL: {0}")]
	InvalidDataUrl(&'static str),

	#[error("invalid base64 payload: {0}")]
	Base64(#[from] base64::DecodeError),
}

//! Error types for the capture runtime.

use snapbridge_protocol::{ErrorBody, ErrorCode, ProtocolError};
use thiserror::Error;

use crate::capture::CaptureState;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Every outcome a capture can end with other than a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
	/// No extension is connected to the control channel.
	#[error("no extension session is connected")]
	NoSessionAvailable,

	/// Writing the capture command failed for every targeted session.
	#[error("failed to dispatch capture command: {0}")]
	DispatchFailed(String),

	/// Every session the command was sent to went away before replying.
	#[error("extension session disconnected before replying")]
	SessionDisconnected,

	/// No result arrived before the deadline.
	#[error("timed out after {ms}ms waiting for capture")]
	Timeout { ms: u64 },

	/// A frame from the extension could not be understood.
	#[error("malformed message: {0}")]
	MalformedMessage(String),

	/// A caller-supplied id collides with a pending capture.
	#[error("request id `{0}` is already pending")]
	DuplicateRequestId(String),

	/// The extension answered with an explicit error.
	#[error("extension reported an error: {0}")]
	ExtensionFailed(String),

	/// The id is not pending, or its result was already claimed.
	#[error("no pending capture with id `{0}`")]
	UnknownRequest(String),

	/// The capture was dropped before it produced a result.
	#[error("capture was cancelled")]
	Cancelled,
}

impl CaptureError {
	pub fn code(&self) -> ErrorCode {
		match self {
			CaptureError::NoSessionAvailable => ErrorCode::NoSessionAvailable,
			CaptureError::DispatchFailed(_) => ErrorCode::DispatchFailed,
			CaptureError::SessionDisconnected => ErrorCode::SessionDisconnected,
			CaptureError::Timeout { .. } => ErrorCode::Timeout,
			CaptureError::MalformedMessage(_) => ErrorCode::MalformedMessage,
			CaptureError::DuplicateRequestId(_) => ErrorCode::DuplicateRequestId,
			CaptureError::ExtensionFailed(_) => ErrorCode::ExtensionFailed,
			CaptureError::UnknownRequest(_) => ErrorCode::UnknownRequest,
			CaptureError::Cancelled => ErrorCode::Cancelled,
		}
	}

	/// Structured `{code, message}` body for the caller-facing interface.
	pub fn to_body(&self) -> ErrorBody {
		ErrorBody {
			code: self.code(),
			message: self.to_string(),
		}
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self, CaptureError::Timeout { .. })
	}

	/// Terminal state a capture resolved with this error ends in.
	pub fn terminal_state(&self) -> CaptureState {
		match self {
			CaptureError::Timeout { .. } => CaptureState::TimedOut,
			other => CaptureState::Failed(other.code()),
		}
	}
}

impl From<ProtocolError> for CaptureError {
	fn from(err: ProtocolError) -> Self {
		CaptureError::MalformedMessage(err.to_string())
	}
}

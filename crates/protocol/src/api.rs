//! Bodies of the caller-facing HTTP interface.

use serde::{Deserialize, Serialize};

/// Options a caller attaches to a capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureOptions {
	/// Also write the image to the server's screenshot directory.
	pub persist_locally: bool,
	/// Return the image bytes to the caller. When false the response is a JSON summary.
	pub deliver_to_caller: bool,
	/// Deadline for this capture; the server default applies when absent.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub timeout_ms: Option<u64>,
}

impl Default for CaptureOptions {
	fn default() -> Self {
		Self {
			persist_locally: false,
			deliver_to_caller: true,
			timeout_ms: None,
		}
	}
}

/// JSON body accepted by `POST /capture`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequestBody {
	/// Caller-chosen correlation id. Must not collide with a pending capture.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(flatten)]
	pub options: CaptureOptions,
}

/// Summary returned instead of image bytes when `deliverToCaller` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSummary {
	pub request_id: String,
	pub content_type: String,
	pub size: usize,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub saved_path: Option<String>,
}

/// Machine-readable failure category shared by the runtime and the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	NoSessionAvailable,
	DispatchFailed,
	SessionDisconnected,
	Timeout,
	MalformedMessage,
	DuplicateRequestId,
	ExtensionFailed,
	UnknownRequest,
	Cancelled,
	InvalidInput,
	InternalError,
}

impl ErrorCode {
	/// HTTP status the caller-facing interface answers with.
	pub fn http_status(self) -> u16 {
		match self {
			ErrorCode::NoSessionAvailable => 503,
			ErrorCode::Timeout => 504,
			ErrorCode::DuplicateRequestId => 409,
			ErrorCode::UnknownRequest => 404,
			ErrorCode::InvalidInput => 400,
			ErrorCode::ExtensionFailed | ErrorCode::MalformedMessage | ErrorCode::SessionDisconnected => 502,
			ErrorCode::DispatchFailed | ErrorCode::Cancelled | ErrorCode::InternalError => 500,
		}
	}
}

/// Structured error body: `{"code": "...", "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
	pub code: ErrorCode,
	pub message: String,
}

/// Response of `GET /status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
	pub extension_connected: bool,
	pub sessions: usize,
	pub pending: usize,
}

/// One entry of `GET /sessions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
	pub id: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub remote: Option<String>,
	/// Unix milliseconds.
	pub connected_at: u64,
}

//! Control-channel messages exchanged with the browser extension.
//!
//! The extension keeps a single WebSocket open to the server. The exchange for one
//! capture is:
//!
//! 1. Server sends [`ServerCommand::Capture`] carrying a fresh `requestId`
//! 2. Extension may answer [`ExtensionMessage::CaptureAck`] once the tab capture starts
//! 3. Extension sends [`ExtensionMessage::Screenshot`] with a `data:` URL, or
//!    [`ExtensionMessage::Error`] if the capture failed
//!
//! Extensions that predate request ids omit `requestId` on their replies; the server then
//! correlates by session. [`ExtensionMessage::Ping`] frames are keepalives and are answered
//! with [`ServerCommand::Pong`].
//!
//! Inbound frames are not uniformly tagged (`action`, `type` and bare `error` keys all
//! occur), so [`ExtensionMessage::parse`] classifies them by hand instead of deriving
//! `Deserialize`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, Result};

/// Message sent from the browser extension to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionMessage {
	/// A finished capture.
	Screenshot {
		/// Correlation id echoed from the capture command, if the extension supports it.
		request_id: Option<String>,
		/// Image encoded as a `data:` URL (see [`DataUrl`](crate::DataUrl)).
		data_url: String,
	},
	/// The extension accepted a capture command and started working on it.
	CaptureAck { request_id: Option<String> },
	/// The extension could not complete a capture.
	Error {
		request_id: Option<String>,
		message: String,
	},
	/// Keepalive sent on connect and periodically afterwards.
	Ping,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExtensionMessage {
	#[serde(default)]
	action: Option<String>,
	#[serde(default, rename = "type")]
	kind: Option<String>,
	#[serde(default)]
	data_url: Option<String>,
	#[serde(default)]
	request_id: Option<String>,
	#[serde(default)]
	error: Option<Value>,
}

impl ExtensionMessage {
	/// Parses one text frame received from the extension.
	///
	/// # Errors
	///
	/// Returns [`ProtocolError::Json`] for frames that are not a JSON object,
	/// [`ProtocolError::MissingField`] for a screenshot without `dataUrl`, and
	/// [`ProtocolError::Unsupported`] for anything that matches no known kind.
	pub fn parse(raw: &str) -> Result<Self> {
		let msg: RawExtensionMessage = serde_json::from_str(raw)?;
		let request_id = msg.request_id.filter(|id| !id.is_empty());

		match msg.action.as_deref() {
			Some("screenshot") => {
				let data_url = msg.data_url.ok_or(ProtocolError::MissingField("dataUrl"))?;
				return Ok(Self::Screenshot {
					request_id,
					data_url,
				});
			}
			Some("capture_ack") => return Ok(Self::CaptureAck { request_id }),
			_ => {}
		}

		if let Some(error) = msg.error {
			let message = match error {
				Value::String(s) => s,
				Value::Null => "unknown extension error".to_string(),
				other => other.to_string(),
			};
			return Ok(Self::Error {
				request_id,
				message,
			});
		}

		if msg.kind.as_deref() == Some("ping") {
			return Ok(Self::Ping);
		}

		let described = msg
			.action
			.map(|a| format!("action `{a}`"))
			.or_else(|| msg.kind.map(|t| format!("type `{t}`")))
			.unwrap_or_else(|| "no action or type".to_string());
		Err(ProtocolError::Unsupported(described))
	}

	/// Correlation id carried by the message, if any.
	pub fn request_id(&self) -> Option<&str> {
		match self {
			Self::Screenshot { request_id, .. }
			| Self::CaptureAck { request_id }
			| Self::Error { request_id, .. } => request_id.as_deref(),
			Self::Ping => None,
		}
	}
}

/// Message sent from the server to the browser extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServerCommand {
	/// Capture the visible tab and reply with a screenshot tagged with `request_id`.
	Capture {
		#[serde(rename = "requestId")]
		request_id: String,
	},
	/// Reply to a keepalive ping.
	Pong {
		/// Server wall clock in Unix milliseconds.
		timestamp: u64,
	},
}

impl ServerCommand {
	/// Serializes the command into a text frame.
	pub fn to_text(&self) -> String {
		serde_json::to_string(self).expect("ServerCommand is always serializable")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn screenshot_with_request_id_parses() {
		let msg = ExtensionMessage::parse(
			r#"{"action":"screenshot","dataUrl":"data:image/png;base64,AAAA","requestId":"req-1"}"#,
		)
		.unwrap();
		assert_eq!(
			msg,
			ExtensionMessage::Screenshot {
				request_id: Some("req-1".into()),
				data_url: "data:image/png;base64,AAAA".into(),
			}
		);
		assert_eq!(msg.request_id(), Some("req-1"));
	}

	#[test]
	fn legacy_screenshot_without_request_id_parses() {
		let msg = ExtensionMessage::parse(r#"{"action":"screenshot","dataUrl":"data:,"}"#).unwrap();
		assert_eq!(msg.request_id(), None);
	}

	#[test]
	fn screenshot_without_data_url_is_rejected() {
		let err = ExtensionMessage::parse(r#"{"action":"screenshot"}"#).unwrap_err();
		assert!(matches!(err, ProtocolError::MissingField("dataUrl")));
	}

	#[test]
	fn bare_error_parses() {
		let msg = ExtensionMessage::parse(r#"{"error":"tab not capturable"}"#).unwrap();
		assert_eq!(
			msg,
			ExtensionMessage::Error {
				request_id: None,
				message: "tab not capturable".into(),
			}
		);
	}

	#[test]
	fn structured_error_is_stringified() {
		let msg = ExtensionMessage::parse(r#"{"error":{"reason":"denied"},"requestId":"r"}"#).unwrap();
		match msg {
			ExtensionMessage::Error {
				request_id,
				message,
			} => {
				assert_eq!(request_id.as_deref(), Some("r"));
				assert!(message.contains("denied"));
			}
			other => panic!("expected Error, got {other:?}"),
		}
	}

	#[test]
	fn ping_parses_with_extra_fields() {
		let msg = ExtensionMessage::parse(
			r#"{"type":"ping","message":"Extension connected","timestamp":1700000000000}"#,
		)
		.unwrap();
		assert_eq!(msg, ExtensionMessage::Ping);
	}

	#[test]
	fn capture_ack_parses() {
		let msg = ExtensionMessage::parse(r#"{"action":"capture_ack","requestId":"r9"}"#).unwrap();
		assert_eq!(
			msg,
			ExtensionMessage::CaptureAck {
				request_id: Some("r9".into())
			}
		);
	}

	#[test]
	fn unknown_action_is_unsupported() {
		let err = ExtensionMessage::parse(r#"{"action":"dance"}"#).unwrap_err();
		assert!(matches!(err, ProtocolError::Unsupported(ref s) if s.contains("dance")));
	}

	#[test]
	fn garbage_is_json_error() {
		assert!(matches!(
			ExtensionMessage::parse("not json").unwrap_err(),
			ProtocolError::Json(_)
		));
	}

	#[test]
	fn capture_command_serializes_with_action_tag() {
		let text = ServerCommand::Capture {
			request_id: "abc".into(),
		}
		.to_text();
		let value: Value = serde_json::from_str(&text).unwrap();
		assert_eq!(value["action"], "capture");
		assert_eq!(value["requestId"], "abc");
	}
}

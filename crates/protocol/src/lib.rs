//! Wire types shared by the snapbridge server and its clients.
//!
//! Two boundaries are described here:
//!
//! - [`channel`]: JSON text frames exchanged with the browser extension over the
//!   WebSocket control channel.
//! - [`api`]: request and response bodies of the caller-facing HTTP interface.
//!
//! [`DataUrl`] decodes the `data:` URLs the extension uses to ship image bytes.

pub mod api;
pub mod channel;
pub mod data_url;
pub mod error;

pub use api::{
	CaptureOptions, CaptureRequestBody, CaptureSummary, ErrorBody, ErrorCode, SessionInfo, StatusReport,
};
pub use channel::{ExtensionMessage, ServerCommand};
pub use data_url::DataUrl;
pub use error::{ProtocolError, Result};

/// Default host both listeners bind to.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port of the extension control channel (WebSocket).
pub const DEFAULT_CONTROL_PORT: u16 = 8765;

/// Default port of the caller-facing HTTP interface.
pub const DEFAULT_HTTP_PORT: u16 = 8766;

/// Default deadline for a capture when the caller does not supply one.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Largest control-channel frame accepted from an extension.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Response header carrying the correlation id of a capture.
pub const REQUEST_ID_HEADER: &str = "x-snapbridge-request-id";

/// Response header carrying the path a persisted capture was written to.
pub const SAVED_PATH_HEADER: &str = "x-snapbridge-saved-path";

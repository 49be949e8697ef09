use std::time::Duration;

use snapbridge_protocol::{DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_TIMEOUT_MS};

/// Tunables for a [`Bridge`](crate::Bridge).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
	/// Deadline applied when a caller does not supply one.
	pub default_timeout: Duration,
	/// How long finished captures stay in the correlation table. Late or duplicate
	/// results for them are recognised and dropped during this window.
	pub result_linger: Duration,
	/// Largest text frame accepted from an extension.
	pub max_payload_bytes: usize,
}

impl Default for BridgeConfig {
	fn default() -> Self {
		Self {
			default_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
			result_linger: Duration::from_secs(30),
			max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
		}
	}
}

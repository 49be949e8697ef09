//! Hands finished captures to whoever is still waiting for them.

use std::sync::Arc;

use tracing::{debug, info};

use crate::capture::CapturePayload;
use crate::correlation::{CorrelationTable, Resolution};
use crate::error::CaptureError;

/// Whether a result reached a waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
	Delivered,
	/// Nobody is waiting any more (timed out, cancelled, or a duplicate); the result
	/// was dropped.
	Discarded,
}

/// Final stop for results arriving from the extension.
#[derive(Clone)]
pub struct ResultSink {
	table: Arc<CorrelationTable>,
}

impl ResultSink {
	pub fn new(table: Arc<CorrelationTable>) -> Self {
		Self { table }
	}

	/// Delivers a payload to the waiter of `request_id`, or discards it.
	pub fn deliver(&self, request_id: &str, payload: CapturePayload) -> Delivery {
		let size = payload.size();
		let session = payload.session;
		match self.table.resolve(request_id, Ok(payload)) {
			Resolution::Stored => {
				info!(target = "snapbridge", request_id, %session, size, "capture delivered");
				Delivery::Delivered
			}
			resolution => {
				debug!(target = "snapbridge", request_id, %session, ?resolution, "capture discarded");
				Delivery::Discarded
			}
		}
	}

	/// Fails `request_id` with `error`, unless it already finished.
	pub fn reject(&self, request_id: &str, error: CaptureError) -> Delivery {
		let code = error.code();
		match self.table.resolve(request_id, Err(error)) {
			Resolution::Stored => {
				info!(target = "snapbridge", request_id, ?code, "capture failed");
				Delivery::Delivered
			}
			resolution => {
				debug!(target = "snapbridge", request_id, ?code, ?resolution, "failure discarded");
				Delivery::Discarded
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use snapbridge_protocol::{CaptureOptions, DataUrl};

	use super::*;
	use crate::registry::SessionId;

	fn payload() -> CapturePayload {
		CapturePayload::new(
			DataUrl {
				media_type: "image/png".into(),
				data: vec![1, 2, 3],
			},
			SessionId::new(1),
		)
	}

	#[tokio::test]
	async fn delivers_to_live_waiter() {
		let table = Arc::new(CorrelationTable::new(Duration::from_secs(30)));
		let sink = ResultSink::new(Arc::clone(&table));
		let id = table.create(None, CaptureOptions::default()).unwrap();

		assert_eq!(sink.deliver(id.as_str(), payload()), Delivery::Delivered);
		let got = table.wait(id.as_str(), Duration::from_secs(1)).await.unwrap();
		assert_eq!(got.bytes(), &[1, 2, 3]);
	}

	#[test]
	fn discards_after_cancel() {
		let table = Arc::new(CorrelationTable::new(Duration::from_secs(30)));
		let sink = ResultSink::new(Arc::clone(&table));
		let id = table.create(None, CaptureOptions::default()).unwrap();
		table.cancel(id.as_str());

		assert_eq!(sink.deliver(id.as_str(), payload()), Delivery::Discarded);
	}

	#[test]
	fn reject_after_delivery_is_discarded() {
		let table = Arc::new(CorrelationTable::new(Duration::from_secs(30)));
		let sink = ResultSink::new(Arc::clone(&table));
		let id = table.create(None, CaptureOptions::default()).unwrap();

		sink.deliver(id.as_str(), payload());
		assert_eq!(
			sink.reject(id.as_str(), CaptureError::ExtensionFailed("late".into())),
			Delivery::Discarded
		);
	}
}

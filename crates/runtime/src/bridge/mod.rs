//! Bridge between the caller-facing interface and the extension control channel.
//!
//! Callers [`submit`](Bridge::submit) a capture and then
//! [`await_result`](Bridge::await_result) on its completion slot. Session tasks feed every
//! inbound frame to [`handle_frame`](Bridge::handle_frame), which resolves the matching
//! slot through the [`ResultSink`]. Neither side holds a lock while the other does I/O:
//! outbound writes go through per-session channels and inbound results through oneshot
//! slots.


use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use snapbridge_protocol::{CaptureOptions, DataUrl, ExtensionMessage, ServerCommand, StatusReport};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::capture::{CapturePayload, CaptureState, RequestId};
use crate::config::BridgeConfig;
use crate::correlation::CorrelationTable;
use crate::error::{CaptureError, Result};
use crate::registry::{Registry, Session, SessionId};
use crate::sink::ResultSink;

pub struct Bridge {
	registry: Registry,
	table: Arc<CorrelationTable>,
	sink: ResultSink,
	config: BridgeConfig,
}

impl Bridge {
	pub fn new(config: BridgeConfig) -> Self {
		let table = Arc::new(CorrelationTable::new(config.result_linger));
		Self {
			registry: Registry::new(),
			sink: ResultSink::new(Arc::clone(&table)),
			table,
			config,
		}
	}

	pub fn config(&self) -> &BridgeConfig {
		&self.config
	}

	pub fn registry(&self) -> &Registry {
		&self.registry
	}

	pub fn table(&self) -> &CorrelationTable {
		&self.table
	}

	pub fn status(&self) -> StatusReport {
		StatusReport {
			extension_connected: !self.registry.is_empty(),
			sessions: self.registry.len(),
			pending: self.table.in_flight(),
		}
	}

	/// Registers a new control-channel connection.
	///
	/// The caller owns the returned receiver and must forward every message on it to
	/// the socket until it closes.
	pub fn connect(&self, remote: Option<String>) -> (SessionId, mpsc::UnboundedReceiver<String>) {
		let (session, rx) = Session::open(remote);
		let id = self.registry.add(session);
		info!(target = "snapbridge.session", session = %id, sessions = self.registry.len(), "extension connected");
		(id, rx)
	}

	/// Removes a session and fails the requests that were waiting on it alone.
	///
	/// Safe to call more than once.
	pub fn disconnect(&self, session: SessionId) -> Vec<RequestId> {
		if self.registry.remove(session) {
			info!(target = "snapbridge.session", session = %session, sessions = self.registry.len(), "extension disconnected");
		}
		self.table.session_lost(session)
	}

	/// Disconnects every session.
	pub fn shutdown(&self) {
		for session in self.registry.clear() {
			self.table.session_lost(session);
		}
	}

	/// Creates a capture and sends its command to every connected session.
	///
	/// # Errors
	///
	/// - [`CaptureError::DuplicateRequestId`] if `id` is already in flight
	/// - [`CaptureError::NoSessionAvailable`] if no extension is connected
	/// - [`CaptureError::DispatchFailed`] if the command could not be written anywhere
	pub fn submit(&self, id: Option<RequestId>, options: CaptureOptions) -> Result<RequestId> {
		let id = self.table.create(id, options)?;

		let targets = self.registry.ids();
		if targets.is_empty() {
			return Err(self.fail(&id, CaptureError::NoSessionAvailable));
		}
		// Recorded before the write so an immediate reply finds its command queued.
		self.table.mark_sent(id.as_str(), &targets);

		let command = ServerCommand::Capture {
			request_id: id.to_string(),
		};
		let dispatch = self.registry.broadcast(&command);

		if dispatch.delivered.is_empty() {
			let err = if dispatch.dropped.is_empty() {
				CaptureError::NoSessionAvailable
			} else {
				CaptureError::DispatchFailed(format!(
					"write failed on all {} session(s)",
					dispatch.dropped.len()
				))
			};
			let err = self.fail(&id, err);
			for lost in &dispatch.dropped {
				self.table.session_lost(*lost);
			}
			return Err(err);
		}

		for lost in &dispatch.dropped {
			self.table.session_lost(*lost);
		}
		self.table.mark_awaiting(id.as_str());
		debug!(target = "snapbridge", request_id = %id, sessions = dispatch.delivered_count(), "capture dispatched");

		// A target may have disconnected between the snapshot and the write.
		for target in &targets {
			if !self.registry.contains(*target) {
				self.table.session_lost(*target);
			}
		}

		Ok(id)
	}

	/// Waits for the result of a submitted capture.
	///
	/// `timeout` of `None` uses the request's own `timeoutMs`, falling back to the
	/// configured default.
	pub async fn await_result(&self, id: &RequestId, timeout: Option<Duration>) -> Result<CapturePayload> {
		let timeout = timeout
			.or_else(|| {
				self.table
					.snapshot(id.as_str())
					.and_then(|r| r.options().timeout_ms)
					.map(Duration::from_millis)
			})
			.unwrap_or(self.config.default_timeout);
		self.table.wait(id.as_str(), timeout).await
	}

	/// Abandons a capture; a later result for it is discarded.
	pub fn cancel(&self, id: &str) -> bool {
		self.table.cancel(id)
	}

	pub fn state(&self, id: &str) -> Option<CaptureState> {
		self.table.state(id)
	}

	/// Processes one text frame received from `session`.
	///
	/// Errors are confined to the frame: the caller logs them and keeps reading.
	///
	/// # Errors
	///
	/// [`CaptureError::MalformedMessage`] for oversized, unparseable or unsupported frames.
	pub fn handle_frame(&self, session: SessionId, raw: &str) -> Result<()> {
		if raw.len() > self.config.max_payload_bytes {
			return Err(CaptureError::MalformedMessage(format!(
				"frame of {} bytes exceeds the {} byte limit",
				raw.len(),
				self.config.max_payload_bytes
			)));
		}

		match ExtensionMessage::parse(raw)? {
			ExtensionMessage::Ping => {
				let timestamp = SystemTime::now()
					.duration_since(UNIX_EPOCH)
					.map(|d| d.as_millis() as u64)
					.unwrap_or_default();
				if !self.registry.send_to(session, &ServerCommand::Pong { timestamp }) {
					self.disconnect(session);
				}
			}
			ExtensionMessage::CaptureAck { request_id } => {
				let id = match request_id {
					Some(id) => Some(RequestId::from(id)),
					None => self.table.peek_reply_target(session),
				};
				if let Some(id) = id {
					self.table.acknowledge(id.as_str(), session);
					debug!(target = "snapbridge", request_id = %id, %session, "capture acknowledged");
				}
			}
			ExtensionMessage::Screenshot {
				request_id,
				data_url,
			} => {
				let Some(id) = self.correlate(session, request_id.as_deref()) else {
					warn!(target = "snapbridge", %session, "unmatched screenshot dropped");
					return Ok(());
				};
				match DataUrl::parse(&data_url) {
					Ok(image) => {
						self.sink.deliver(id.as_str(), CapturePayload::new(image, session));
					}
					Err(err) => {
						warn!(target = "snapbridge", request_id = %id, %session, error = %err, "undecodable screenshot");
						self.sink.reject(id.as_str(), err.into());
					}
				}
			}
			ExtensionMessage::Error {
				request_id,
				message,
			} => {
				warn!(target = "snapbridge", %session, request_id = ?request_id, error = %message, "extension reported error");
				if let Some(id) = self.correlate(session, request_id.as_deref()) {
					self.sink.reject(id.as_str(), CaptureError::ExtensionFailed(message));
				}
			}
		}
		Ok(())
	}

	fn correlate(&self, session: SessionId, explicit: Option<&str>) -> Option<RequestId> {
		self.table.take_reply_target(session, explicit)
	}

	fn fail(&self, id: &RequestId, err: CaptureError) -> CaptureError {
		warn!(target = "snapbridge", request_id = %id, error = %err, "capture failed before dispatch");
		self.table.resolve(id.as_str(), Err(err.clone()));
		err
	}
}

//! Capture requests, their lifecycle states, and the payloads they resolve with.
//!
//! A request moves through
//!
//! ```text
//! Issued ──► Sent ──► AwaitingResult ──► Delivered
//!    │         │             ├──────────► Failed(code)
//!    └─────────┴─────────────┴──────────► TimedOut
//! ```
//!
//! Any non-terminal state may jump straight to a terminal one: a fast extension can
//! reply before the dispatching task records `Sent`, and a send that fails everywhere
//! fails the request while it is still `Issued`. Terminal states never change again.

use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use snapbridge_protocol::{CaptureOptions, DataUrl, ErrorCode};
use tokio::time::Instant;

use crate::registry::SessionId;

/// Correlation id linking a capture command to its eventual result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(Arc<str>);

impl RequestId {
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for RequestId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for RequestId {
	fn from(s: &str) -> Self {
		Self(Arc::from(s))
	}
}

impl From<String> for RequestId {
	fn from(s: String) -> Self {
		Self(Arc::from(s))
	}
}

impl Borrow<str> for RequestId {
	fn borrow(&self) -> &str {
		&self.0
	}
}

/// Lifecycle state of a [`CaptureRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
	/// Created, command not yet sent.
	Issued,
	/// Command handed to at least one session.
	Sent,
	/// Dispatch confirmed, waiting for the extension.
	AwaitingResult,
	Delivered,
	Failed(ErrorCode),
	TimedOut,
}

impl CaptureState {
	pub fn is_terminal(self) -> bool {
		matches!(
			self,
			CaptureState::Delivered | CaptureState::Failed(_) | CaptureState::TimedOut
		)
	}

	/// Whether the lifecycle allows moving from `self` to `next`.
	pub fn can_advance_to(self, next: CaptureState) -> bool {
		use CaptureState::*;
		match (self, next) {
			(from, _) if from.is_terminal() => false,
			(_, to) if to.is_terminal() => true,
			(Issued, Sent) | (Sent, AwaitingResult) => true,
			_ => false,
		}
	}
}

impl fmt::Display for CaptureState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CaptureState::Issued => f.write_str("issued"),
			CaptureState::Sent => f.write_str("sent"),
			CaptureState::AwaitingResult => f.write_str("awaiting_result"),
			CaptureState::Delivered => f.write_str("delivered"),
			CaptureState::Failed(code) => write!(f, "failed({code:?})"),
			CaptureState::TimedOut => f.write_str("timed_out"),
		}
	}
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid capture transition {from} -> {to}")]
pub struct InvalidTransition {
	pub from: CaptureState,
	pub to: CaptureState,
}

/// Bookkeeping record for one caller-initiated capture.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
	id: RequestId,
	created_at: Instant,
	options: CaptureOptions,
	state: CaptureState,
	targets: BTreeSet<SessionId>,
	acknowledged_by: BTreeSet<SessionId>,
	finished_at: Option<Instant>,
}

impl CaptureRequest {
	pub fn new(id: RequestId, options: CaptureOptions) -> Self {
		Self {
			id,
			created_at: Instant::now(),
			options,
			state: CaptureState::Issued,
			targets: BTreeSet::new(),
			acknowledged_by: BTreeSet::new(),
			finished_at: None,
		}
	}

	pub fn id(&self) -> &RequestId {
		&self.id
	}

	pub fn created_at(&self) -> Instant {
		self.created_at
	}

	pub fn options(&self) -> &CaptureOptions {
		&self.options
	}

	pub fn state(&self) -> CaptureState {
		self.state
	}

	/// Sessions the capture command was dispatched to and that are still connected.
	pub fn targets(&self) -> &BTreeSet<SessionId> {
		&self.targets
	}

	/// Sessions that sent a `capture_ack` for this request.
	pub fn acknowledged_by(&self) -> &BTreeSet<SessionId> {
		&self.acknowledged_by
	}

	pub fn finished_at(&self) -> Option<Instant> {
		self.finished_at
	}

	pub fn is_terminal(&self) -> bool {
		self.state.is_terminal()
	}

	pub fn targets_session(&self, session: SessionId) -> bool {
		self.targets.contains(&session)
	}

	/// Applies a state change if the lifecycle allows it.
	pub fn advance(&mut self, next: CaptureState) -> Result<(), InvalidTransition> {
		if !self.state.can_advance_to(next) {
			return Err(InvalidTransition {
				from: self.state,
				to: next,
			});
		}
		self.state = next;
		if next.is_terminal() {
			self.finished_at = Some(Instant::now());
		}
		Ok(())
	}

	/// Records the sessions the command went out to and moves to `Sent`.
	pub fn mark_sent(&mut self, targets: impl IntoIterator<Item = SessionId>) -> Result<(), InvalidTransition> {
		self.advance(CaptureState::Sent)?;
		self.targets.extend(targets);
		Ok(())
	}

	pub fn acknowledge(&mut self, session: SessionId) {
		self.acknowledged_by.insert(session);
	}

	/// Forgets a departed session. Returns true when that leaves an in-flight
	/// request with nobody left to answer it.
	pub fn drop_target(&mut self, session: SessionId) -> bool {
		self.targets.remove(&session)
			&& self.targets.is_empty()
			&& matches!(self.state, CaptureState::Sent | CaptureState::AwaitingResult)
	}
}

/// Image produced by an extension for one capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePayload {
	pub image: DataUrl,
	/// Session the image arrived on.
	pub session: SessionId,
	pub received_at: SystemTime,
}

impl CapturePayload {
	pub fn new(image: DataUrl, session: SessionId) -> Self {
		Self {
			image,
			session,
			received_at: SystemTime::now(),
		}
	}

	pub fn bytes(&self) -> &[u8] {
		&self.image.data
	}

	pub fn content_type(&self) -> &str {
		&self.image.media_type
	}

	pub fn size(&self) -> usize {
		self.image.data.len()
	}

	pub fn file_extension(&self) -> &'static str {
		self.image.file_extension()
	}
}

//! Correlation of capture requests with results arriving on the control channel.
//!
//! Every request gets an entry keyed by its [`RequestId`] holding the request record and
//! a single-use completion slot (a oneshot channel). The session side resolves the slot,
//! the caller side awaits it. The table lock is a synchronous mutex held only for map
//! lookups, never across an `.await`, so resolving never stalls a session reader.
//!
//! # Entry lifetime
//!
//! 1. [`create`](CorrelationTable::create) inserts an `Issued` entry
//! 2. The bridge records dispatch with [`mark_sent`](CorrelationTable::mark_sent) and
//!    [`mark_awaiting`](CorrelationTable::mark_awaiting)
//! 3. [`resolve`](CorrelationTable::resolve) fills the slot and makes the entry terminal
//! 4. [`wait`](CorrelationTable::wait) takes the result, or marks the entry `TimedOut`
//! 5. Terminal entries linger for the configured window so late and duplicate results are
//!    recognised, then are purged on the next `create`
//!
//! Dropping a `wait` future before it completes cancels the entry.
//!
//! # Replies without a request id
//!
//! Every session keeps the order in which commands were dispatched to it. A reply that
//! does not name its request consumes the front of its own session's queue; when that
//! request already finished the reply is dropped rather than credited to a newer one.


use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use snapbridge_protocol::CaptureOptions;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::capture::{CapturePayload, CaptureRequest, CaptureState, RequestId};
use crate::error::{CaptureError, Result};
use crate::registry::SessionId;

/// What a completion slot carries.
pub type Outcome = Result<CapturePayload>;

/// Commands a silent session may owe replies for before the oldest are forgotten.
const MAX_UNANSWERED_PER_SESSION: usize = 1024;

/// What became of a [`resolve`](CorrelationTable::resolve) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
	/// The outcome was stored for the waiter.
	Stored,
	/// The entry was live but its waiter is gone; the outcome was dropped.
	Abandoned,
	/// The entry had already reached a terminal state; the outcome was dropped.
	AlreadyResolved,
	/// No entry with that id exists; the outcome was dropped.
	Unknown,
}

struct Entry {
	/// Creation order. Tells apart two generations of a reused id.
	seq: u64,
	request: CaptureRequest,
	slot: Option<oneshot::Sender<Outcome>>,
	waiter: Option<oneshot::Receiver<Outcome>>,
}

/// A command written to a session that has not been answered yet.
#[derive(Debug, Clone)]
struct Dispatched {
	id: RequestId,
	seq: u64,
}

#[derive(Default)]
struct Inner {
	entries: HashMap<RequestId, Entry>,
	dispatched: HashMap<SessionId, VecDeque<Dispatched>>,
}

impl Inner {
	fn is_live(&self, id: &str, seq: u64) -> bool {
		self.entries
			.get(id)
			.is_some_and(|e| e.seq == seq && !e.request.is_terminal())
	}
}

/// Pending captures keyed by correlation id.
pub struct CorrelationTable {
	inner: Mutex<Inner>,
	next_id: AtomicU64,
	next_seq: AtomicU64,
	linger: Duration,
}

impl CorrelationTable {
	pub fn new(linger: Duration) -> Self {
		Self {
			inner: Mutex::new(Inner::default()),
			next_id: AtomicU64::new(1),
			next_seq: AtomicU64::new(0),
			linger,
		}
	}

	/// Inserts a new `Issued` entry.
	///
	/// With `id` of `None` a fresh id is generated. A caller-supplied id may reuse the id
	/// of a finished entry but not of one still in flight.
	///
	/// # Errors
	///
	/// [`CaptureError::DuplicateRequestId`] if `id` belongs to a request still in flight.
	pub fn create(&self, id: Option<RequestId>, options: CaptureOptions) -> Result<RequestId> {
		let mut inner = self.inner.lock();
		purge_expired(&mut inner.entries, self.linger);

		let id = match id {
			Some(id) => {
				if inner.entries.get(&id).is_some_and(|e| !e.request.is_terminal()) {
					return Err(CaptureError::DuplicateRequestId(id.to_string()));
				}
				id
			}
			None => loop {
				let n = self.next_id.fetch_add(1, Ordering::Relaxed);
				let candidate = RequestId::from(format!("capture-{n}"));
				if !inner.entries.contains_key(&candidate) {
					break candidate;
				}
			},
		};

		let (tx, rx) = oneshot::channel();
		inner.entries.insert(
			id.clone(),
			Entry {
				seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
				request: CaptureRequest::new(id.clone(), options),
				slot: Some(tx),
				waiter: Some(rx),
			},
		);
		debug!(target = "snapbridge", request_id = %id, "capture created");
		Ok(id)
	}

	/// Delivers an outcome to the entry's completion slot.
	///
	/// Unknown ids and entries that already finished are not an error: the outcome is
	/// dropped and the returned [`Resolution`] says why.
	pub fn resolve(&self, id: &str, outcome: Outcome) -> Resolution {
		let slot = {
			let mut inner = self.inner.lock();
			let Some(entry) = inner.entries.get_mut(id) else {
				debug!(target = "snapbridge", request_id = id, "result for unknown capture dropped");
				return Resolution::Unknown;
			};
			let next = match &outcome {
				Ok(_) => CaptureState::Delivered,
				Err(err) => err.terminal_state(),
			};
			if let Err(err) = entry.request.advance(next) {
				debug!(target = "snapbridge", request_id = id, error = %err, "late result dropped");
				return Resolution::AlreadyResolved;
			}
			entry.slot.take()
		};

		match slot {
			Some(tx) => match tx.send(outcome) {
				Ok(()) => Resolution::Stored,
				Err(_) => {
					debug!(target = "snapbridge", request_id = id, "waiter gone, result dropped");
					Resolution::Abandoned
				}
			},
			None => {
				debug!(target = "snapbridge", request_id = id, "slot already taken, result dropped");
				Resolution::Abandoned
			}
		}
	}

	/// Waits for the entry's outcome, for at most `timeout`.
	///
	/// Only the calling task suspends. On timeout the entry becomes `TimedOut` and stays
	/// in the table for the linger window; a result racing the deadline is still returned
	/// if it was stored first.
	///
	/// # Errors
	///
	/// - [`CaptureError::UnknownRequest`] if the id is absent or already awaited
	/// - [`CaptureError::Timeout`] if the deadline elapses
	/// - [`CaptureError::Cancelled`] if the entry is cancelled meanwhile
	/// - any error the entry was resolved with
	pub async fn wait(&self, id: &str, timeout: Duration) -> Outcome {
		let (seq, mut rx) = {
			let mut inner = self.inner.lock();
			inner
				.entries
				.get_mut(id)
				.and_then(|e| e.waiter.take().map(|rx| (e.seq, rx)))
				.ok_or_else(|| CaptureError::UnknownRequest(id.to_string()))?
		};

		let mut guard = CancelGuard::new(self, id, seq);
		let result = tokio::time::timeout(timeout, &mut rx).await;
		guard.complete();

		match result {
			Ok(Ok(outcome)) => outcome,
			Ok(Err(_)) => Err(CaptureError::Cancelled),
			Err(_) => {
				let timed_out = {
					let mut inner = self.inner.lock();
					match inner.entries.get_mut(id) {
						Some(entry) if entry.seq == seq && !entry.request.is_terminal() => {
							let _ = entry.request.advance(CaptureState::TimedOut);
							entry.slot = None;
							true
						}
						Some(entry) if entry.seq == seq => false,
						_ => return Err(CaptureError::Cancelled),
					}
				};
				let ms = timeout.as_millis() as u64;
				if timed_out {
					warn!(target = "snapbridge", request_id = id, timeout_ms = ms, "capture timed out");
					return Err(CaptureError::Timeout { ms });
				}
				rx.try_recv().unwrap_or(Err(CaptureError::Timeout { ms }))
			}
		}
	}

	/// Drops an entry outright. A pending waiter observes [`CaptureError::Cancelled`].
	pub fn cancel(&self, id: &str) -> bool {
		let removed = self.inner.lock().entries.remove(id).is_some();
		if removed {
			debug!(target = "snapbridge", request_id = id, "capture cancelled");
		}
		removed
	}

	/// Like [`cancel`](Self::cancel), but only if `id` still names the entry created
	/// with `seq` and not a later request reusing the id.
	fn cancel_generation(&self, id: &str, seq: u64) -> bool {
		let mut inner = self.inner.lock();
		if inner.entries.get(id).is_some_and(|e| e.seq == seq) {
			inner.entries.remove(id);
			return true;
		}
		false
	}

	/// Records the sessions the command is dispatched to and queues it on each of them
	/// for replies that carry no request id.
	pub fn mark_sent(&self, id: &str, targets: &[SessionId]) -> bool {
		let mut inner = self.inner.lock();
		let Some(entry) = inner.entries.get_mut(id) else {
			return false;
		};
		if entry.request.mark_sent(targets.iter().copied()).is_err() {
			return false;
		}
		let dispatched = Dispatched {
			id: entry.request.id().clone(),
			seq: entry.seq,
		};
		for session in targets {
			let queue = inner.dispatched.entry(*session).or_default();
			if queue.len() == MAX_UNANSWERED_PER_SESSION {
				queue.pop_front();
			}
			queue.push_back(dispatched.clone());
		}
		true
	}

	pub fn mark_awaiting(&self, id: &str) -> bool {
		self.with_request(id, |req| req.advance(CaptureState::AwaitingResult).is_ok())
			.unwrap_or(false)
	}

	/// Notes a `capture_ack` from `session`.
	pub fn acknowledge(&self, id: &str, session: SessionId) -> bool {
		self.with_request(id, |req| {
			req.acknowledge(session);
			!req.is_terminal()
		})
		.unwrap_or(false)
	}

	/// Matches a reply from `session` to the command it answers.
	///
	/// With an explicit id that id is returned and its command is taken off the session's
	/// queue. Without one the oldest unanswered command sent to `session` is consumed; if
	/// that request has since finished (or another session answered it) the reply is
	/// owed to nobody and `None` is returned.
	pub fn take_reply_target(&self, session: SessionId, explicit: Option<&str>) -> Option<RequestId> {
		let mut inner = self.inner.lock();
		let queue = inner.dispatched.get_mut(&session);
		if let Some(id) = explicit {
			if let Some(queue) = queue {
				if let Some(pos) = queue.iter().position(|d| d.id.as_str() == id) {
					queue.remove(pos);
				}
			}
			return Some(RequestId::from(id));
		}

		let front = queue?.pop_front()?;
		if inner.is_live(front.id.as_str(), front.seq) {
			Some(front.id)
		} else {
			debug!(target = "snapbridge", request_id = %front.id, %session, "reply for finished capture dropped");
			None
		}
	}

	/// The request an id-less `capture_ack` from `session` refers to, without consuming it.
	pub fn peek_reply_target(&self, session: SessionId) -> Option<RequestId> {
		let inner = self.inner.lock();
		let front = inner.dispatched.get(&session)?.front()?;
		inner
			.is_live(front.id.as_str(), front.seq)
			.then(|| front.id.clone())
	}

	/// Forgets a departed session and fails every in-flight request it was the last
	/// target of with [`CaptureError::SessionDisconnected`].
	pub fn session_lost(&self, session: SessionId) -> Vec<RequestId> {
		let orphaned: Vec<RequestId> = {
			let mut inner = self.inner.lock();
			inner.dispatched.remove(&session);
			inner
				.entries
				.values_mut()
				.filter(|e| !e.request.is_terminal())
				.filter_map(|e| e.request.drop_target(session).then(|| e.request.id().clone()))
				.collect()
		};

		for id in &orphaned {
			debug!(target = "snapbridge", request_id = %id, session = %session, "last target disconnected");
			self.resolve(id.as_str(), Err(CaptureError::SessionDisconnected));
		}
		orphaned
	}

	pub fn state(&self, id: &str) -> Option<CaptureState> {
		self.with_request(id, |req| req.state())
	}

	/// Copy of the request record.
	pub fn snapshot(&self, id: &str) -> Option<CaptureRequest> {
		self.with_request(id, |req| req.clone())
	}

	/// Number of requests not yet in a terminal state.
	pub fn in_flight(&self) -> usize {
		self.inner
			.lock()
			.entries
			.values()
			.filter(|e| !e.request.is_terminal())
			.count()
	}

	/// Number of entries, finished ones included.
	pub fn len(&self) -> usize {
		self.inner.lock().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.lock().entries.is_empty()
	}

	fn with_request<T>(&self, id: &str, f: impl FnOnce(&mut CaptureRequest) -> T) -> Option<T> {
		self.inner.lock().entries.get_mut(id).map(|e| f(&mut e.request))
	}
}

fn purge_expired(entries: &mut HashMap<RequestId, Entry>, linger: Duration) {
	let now = Instant::now();
	entries.retain(|_, e| match e.request.finished_at() {
		Some(done) => now.duration_since(done) < linger,
		None => true,
	});
}

/// Cancels the entry if a `wait` future is dropped before it finishes.
struct CancelGuard<'a> {
	table: &'a CorrelationTable,
	id: &'a str,
	seq: u64,
	completed: bool,
}

impl<'a> CancelGuard<'a> {
	fn new(table: &'a CorrelationTable, id: &'a str, seq: u64) -> Self {
		Self {
			table,
			id,
			seq,
			completed: false,
		}
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelGuard<'_> {
	fn drop(&mut self) {
		if !self.completed && self.table.cancel_generation(self.id, self.seq) {
			debug!(target = "snapbridge", request_id = self.id, "waiter dropped, capture abandoned");
		}
	}
}

//! Registry of live extension sessions.
//!
//! Each session owns the sending half of an unbounded channel; the task that owns the
//! WebSocket drains the other half. Writes therefore never wait on the socket, and a
//! write only fails once that task is gone, at which point the session is removed.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use snapbridge_protocol::{ServerCommand, SessionInfo};
use tokio::sync::mpsc;
use tracing::{debug, warn};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle for one control-channel connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
	pub fn new(raw: u64) -> Self {
		Self(raw)
	}

	pub fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "session-{}", self.0)
	}
}

/// An open control-channel connection.
#[derive(Debug)]
pub struct Session {
	id: SessionId,
	remote: Option<String>,
	connected_at: SystemTime,
	tx: mpsc::UnboundedSender<String>,
}

impl Session {
	/// Creates a session and the receiver its writer task forwards to the socket.
	pub fn open(remote: Option<String>) -> (Self, mpsc::UnboundedReceiver<String>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let session = Self {
			id: SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)),
			remote,
			connected_at: SystemTime::now(),
			tx,
		};
		(session, rx)
	}

	pub fn id(&self) -> SessionId {
		self.id
	}

	/// Peer identity, usually the remote socket address.
	pub fn remote(&self) -> Option<&str> {
		self.remote.as_deref()
	}

	pub fn connected_at(&self) -> SystemTime {
		self.connected_at
	}

	pub fn info(&self) -> SessionInfo {
		SessionInfo {
			id: self.id.get(),
			remote: self.remote.clone(),
			connected_at: self
				.connected_at
				.duration_since(UNIX_EPOCH)
				.map(|d| d.as_millis() as u64)
				.unwrap_or_default(),
		}
	}
}

/// Which sessions a broadcast reached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Broadcast {
	pub delivered: Vec<SessionId>,
	/// Sessions whose write failed; they have been removed from the registry.
	pub dropped: Vec<SessionId>,
}

impl Broadcast {
	pub fn delivered_count(&self) -> usize {
		self.delivered.len()
	}
}

/// Zero or more live sessions, keyed by id.
#[derive(Debug, Default)]
pub struct Registry {
	sessions: DashMap<SessionId, Session>,
}

impl Registry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add(&self, session: Session) -> SessionId {
		let id = session.id;
		debug!(target = "snapbridge.session", session = %id, remote = ?session.remote, "session registered");
		self.sessions.insert(id, session);
		id
	}

	/// Removes a session. Returns false if it was already gone.
	pub fn remove(&self, id: SessionId) -> bool {
		let removed = self.sessions.remove(&id).is_some();
		if removed {
			debug!(target = "snapbridge.session", session = %id, "session removed");
		}
		removed
	}

	pub fn contains(&self, id: SessionId) -> bool {
		self.sessions.contains_key(&id)
	}

	pub fn len(&self) -> usize {
		self.sessions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.is_empty()
	}

	/// Snapshot of all sessions, oldest first.
	pub fn list(&self) -> Vec<SessionInfo> {
		let mut infos: Vec<SessionInfo> = self.sessions.iter().map(|s| s.info()).collect();
		infos.sort_by_key(|s| s.id);
		infos
	}

	/// Ids of all sessions, oldest first.
	pub fn ids(&self) -> Vec<SessionId> {
		let mut ids: Vec<SessionId> = self.sessions.iter().map(|s| s.id).collect();
		ids.sort();
		ids
	}

	/// Sends to a single session, removing it if the write fails.
	pub fn send_to(&self, id: SessionId, command: &ServerCommand) -> bool {
		let Some(tx) = self.sessions.get(&id).map(|s| s.tx.clone()) else {
			return false;
		};
		if tx.send(command.to_text()).is_ok() {
			return true;
		}
		warn!(target = "snapbridge.session", session = %id, "send failed, dropping session");
		self.remove(id);
		false
	}

	/// Sends to every session. A failed write removes that session and does not stop
	/// delivery to the others.
	pub fn broadcast(&self, command: &ServerCommand) -> Broadcast {
		let text = command.to_text();
		let targets: Vec<(SessionId, mpsc::UnboundedSender<String>)> =
			self.sessions.iter().map(|s| (s.id, s.tx.clone())).collect();

		let mut outcome = Broadcast::default();
		for (id, tx) in targets {
			if tx.send(text.clone()).is_ok() {
				outcome.delivered.push(id);
			} else {
				warn!(target = "snapbridge.session", session = %id, "broadcast send failed, dropping session");
				self.remove(id);
				outcome.dropped.push(id);
			}
		}
		outcome
	}

	/// Removes every session, returning their ids.
	pub fn clear(&self) -> Vec<SessionId> {
		let ids: Vec<SessionId> = self.sessions.iter().map(|s| s.id).collect();
		for id in &ids {
			self.remove(*id);
		}
		ids
	}
}

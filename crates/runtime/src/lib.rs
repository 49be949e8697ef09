//! snapbridge runtime: correlating HTTP capture requests with results from a browser
//! extension.
//!
//! - **Registry**: the live extension sessions, with broadcast and unicast send
//! - **Correlation**: pending captures keyed by request id, each with a single-use
//!   completion slot
//! - **Capture**: the per-request lifecycle state machine and payload type
//! - **Sink**: delivers finished captures to their waiter or discards them
//! - **Bridge**: ties the above together for the session tasks and the HTTP handlers
//!
//! # Architecture
//!
//! ```text
//!  HTTP handler                                 extension session task
//!  ────────────                                 ──────────────────────
//!  submit() ──► CorrelationTable::create
//!           └─► Registry::broadcast ─── capture cmd ──► socket
//!                                                        │
//!  await_result() ◄── oneshot ◄── ResultSink ◄── handle_frame() ◄── screenshot
//! ```

pub mod bridge;
pub mod capture;
pub mod config;
pub mod correlation;
pub mod error;
pub mod registry;
pub mod sink;

pub use bridge::Bridge;
pub use capture::{CapturePayload, CaptureRequest, CaptureState, InvalidTransition, RequestId};
pub use config::BridgeConfig;
pub use correlation::{CorrelationTable, Outcome, Resolution};
pub use error::{CaptureError, Result};
pub use registry::{Broadcast, Registry, Session, SessionId};
pub use sink::{Delivery, ResultSink};

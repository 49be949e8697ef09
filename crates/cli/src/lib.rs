//! Front end for the snapbridge capture bridge.
//!
//! The `serve` command runs two listeners: a WebSocket control channel the browser
//! extension connects to, and an HTTP API callers use to request captures. The other
//! commands are thin HTTP clients for a running server.

pub mod cli;
pub mod client;
pub mod commands;
pub mod error;
pub mod logging;
pub mod server;
pub mod store;

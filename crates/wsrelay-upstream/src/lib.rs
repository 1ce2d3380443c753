//! # wsrelay-upstream
//!
//! Owns the one upstream WebSocket session the relay multiplexes callers
//! onto.
//!
//! - [`ConnectionManager::connect`] dials and spawns the session task
//! - [`UpstreamHandle`] is the cloneable, serialized send path
//! - [`InboundMessages`] is the stream of received text frames
//! - Keepalive pings go out on a fixed interval; a failed write ends the
//!   session
//! - Cancelling the session token sends a normal-closure close frame and
//!   waits a bounded grace period for the peer
//!
//! There is no reconnection. A session that ends stays ended; callers get
//! a new one by calling `connect` again.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod manager;
mod session;

pub use config::UpstreamConfig;
pub use error::{ConnectionError, SessionEnd};
pub use manager::{ConnectionManager, InboundMessages, SessionTask, UpstreamHandle, UpstreamSession};

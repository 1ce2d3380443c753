//! # wsrelay-core
//!
//! Correlation primitives shared by the relay crates.
//!
//! - [`ids`]: caller ids (tagged JSON number or string), correlation ids, and
//!   the hash-based [`IdGenerator`](ids::IdGenerator)
//! - [`store`]: the bounded LRU [`CorrelationStore`](store::CorrelationStore)
//!   of pending requests
//! - [`message`]: JSON object parsing and `id` rewriting
//! - [`outbound`]: the send seam implemented by the upstream session
//! - [`logging`]: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod message;
pub mod outbound;
pub mod store;

pub use errors::{MalformedRequest, SendError};
pub use ids::{CorrelationId, IdGenerator, RequestId};
pub use outbound::Outbound;
pub use store::{CorrelationStore, PendingRequest};

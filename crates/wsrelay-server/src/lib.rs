//! # wsrelay-server
//!
//! The caller-facing half of the relay and the runtime that wires it to
//! the upstream session.
//!
//! - [`ingress`]: `POST /` handler, the wait/timeout race
//! - [`dispatcher`]: single consumer of upstream replies
//! - [`server::RelayServer`]: axum router, health and metrics endpoints
//! - [`relay::Relay`]: dial, dispatch, listen, and shut down in order

#![deny(unsafe_code)]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod ingress;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod shutdown;

pub use config::ServerConfig;
pub use dispatcher::{DispatchOutcome, DispatchStats, Dispatcher};
pub use error::{IngressError, RelayError};
pub use relay::{Relay, RunningRelay};
pub use server::{AppState, RelayServer};
pub use shutdown::ShutdownCoordinator;

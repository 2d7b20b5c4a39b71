//! SOS Relay - Signal relay hub
//!
//! Every device and dispatcher holds one socket to the relay. Whatever one
//! connection sends is forwarded unchanged to all the others; the relay only
//! peeks at `id` and `mode` to log the signal.
//!
//! - [`hub`]: connection set and fan-out
//! - [`api`]: socket endpoint, health check and dashboard hosting
//! - [`server`]: listener lifecycle with graceful shutdown

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod error;
pub mod hub;
pub mod server;

pub use config::RelayConfig;
pub use error::{ApiError, RelayError, RelayResult};
pub use hub::{ConnectionId, RelayFrame, RelayHub};
pub use server::Server;

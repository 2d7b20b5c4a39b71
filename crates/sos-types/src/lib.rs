//! SOS Types - Wire types for staged emergency escalation
//!
//! A device in danger escalates through stages and broadcasts its status to
//! every connected dispatcher through a relay. This crate holds the types that
//! cross that wire and nothing else.
//!
//! ## Key Concepts
//!
//! - **Stage**: ALERT, RISK, PROOF or SAFE; the device's escalation level
//! - **SignalEnvelope**: one immutable status/evidence message
//! - **Station**: a static responder location used for dispatch
//! - **RelayHandshake**: the greeting a relay sends to each new socket

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod envelope;
pub mod error;
pub mod geo;
pub mod stage;

pub use envelope::{EnvelopeBuilder, RelayHandshake, SignalEnvelope, SignalSummary};
pub use error::{EnvelopeError, EnvelopeResult};
pub use geo::{Coord, Station};
pub use stage::Stage;

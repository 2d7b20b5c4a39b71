//! Relay request handlers

mod health;
mod socket;

pub use health::*;
pub use socket::*;

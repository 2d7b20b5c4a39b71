//! SOS Device - Device runtime and dispatcher client
//!
//! Runs one escalation controller against simulated positioning and audio,
//! ships its envelopes to the relay, and offers the dispatcher's view of the
//! relay traffic.
//!
//! - [`session`]: wires controller, uplink and console input
//! - [`uplink`]: relay socket with reconnect backoff
//! - [`geocoder`]: Nominatim reverse geocoding
//! - [`profile`]: JSON-file profile store
//! - [`simulated`]: position feed and microphone stand-ins
//! - [`watch`](mod@watch): dispatcher view of relay traffic

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod geocoder;
pub mod output;
pub mod profile;
pub mod session;
pub mod simulated;
pub mod uplink;
pub mod watch;

pub use config::DeviceConfig;
pub use error::{DeviceError, DeviceResult};
pub use geocoder::NominatimGeocoder;
pub use profile::FileProfileStore;
pub use session::DeviceSession;
pub use uplink::{Backoff, Uplink};
pub use watch::{describe, watch, Inbound};

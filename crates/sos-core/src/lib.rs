//! # SOS Core - Staged Escalation for One Device
//!
//! Turns a stream of button pulses, positioning samples and timer expiries
//! into stage transitions and outbound [`SignalEnvelope`]s.
//!
//! ## Key Components
//!
//! - [`gesture`]: resolves pulses into single or triple intents
//! - [`countdown`]: one-second countdowns for recording and the dead-man-switch
//! - [`evidence`]: bounded audio capture with guaranteed release
//! - [`geo`]: nearest station and throttled reverse geocoding
//! - [`escalation`]: the controller that owns the stage
//! - [`outreach`]: call, message and map links for the device shell
//!
//! Collaborators (audio, geocoder, profile, envelope sink) are traits, so the
//! controller runs the same against real devices and scripted ones.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sos_core::{
//!     escalation, Capabilities, ChannelSink, EscalationConfig, EscalationController,
//!     GeoConfig, InMemoryProfileStore, ScriptedAudioSource,
//! };
//! # use sos_core::{LookupError, ReverseGeocoder};
//! # use sos_types::Coord;
//! # struct Offline;
//! # #[async_trait::async_trait]
//! # impl ReverseGeocoder for Offline {
//! #     async fn reverse(&self, _: Coord) -> Result<String, LookupError> {
//! #         Err(LookupError::LookupFailed("offline".into()))
//! #     }
//! # }
//!
//! # async fn example() -> sos_core::CoreResult<()> {
//! let (sink, mut envelopes) = ChannelSink::new();
//! let capabilities = Capabilities {
//!     audio: Arc::new(ScriptedAudioSource::new(vec![b"..".to_vec()], Duration::from_secs(1))),
//!     geocoder: Arc::new(Offline),
//!     sink: Arc::new(sink),
//!     profile: Arc::new(InMemoryProfileStore::new()),
//! };
//! let controller = EscalationController::new(
//!     EscalationConfig::default(),
//!     &GeoConfig::default(),
//!     capabilities,
//! );
//! let handle = escalation::spawn(controller);
//!
//! handle.pulse().await?;
//! let risk = envelopes.recv().await;
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`SignalEnvelope`]: sos_types::SignalEnvelope

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod countdown;
pub mod error;
pub mod escalation;
pub mod evidence;
pub mod geo;
pub mod gesture;
pub mod outreach;
pub mod profile;
pub mod sink;

pub use config::{default_stations, EscalationConfig, GeoConfig};
pub use countdown::{Countdown, CountdownStatus};
pub use error::{CaptureError, CoreError, CoreResult, LookupError};
pub use escalation::{
    Capabilities, ControllerSnapshot, DeviceCommand, DeviceEvent, EscalationController,
    EscalationHandle, Notice,
};
pub use evidence::{
    AudioCapture, AudioSource, EvidencePayload, EvidencePipeline, ScriptedAudioSource,
    ScriptedBehavior,
};
pub use geo::{AddressState, GeoResolver, ReverseGeocoder, ADDRESS_UNAVAILABLE};
pub use gesture::{GestureDisambiguator, Intent};
pub use outreach::NearbyPlace;
pub use profile::{InMemoryProfileStore, ProfileStore};
pub use sink::{ChannelSink, EnvelopeSink};

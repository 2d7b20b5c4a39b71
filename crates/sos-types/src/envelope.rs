//! Signal envelopes exchanged between devices and the relay
//!
//! An envelope is built once per outbound event and never mutated. Validation
//! happens in [`EnvelopeBuilder::build`] and on deserialization, so every
//! `SignalEnvelope` in memory satisfies the wire invariants.

use crate::error::{EnvelopeError, EnvelopeResult};
use crate::{Coord, Stage};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One status or evidence message.
///
/// ```json
/// { "id": "USER_123", "mode": "RISK",
///   "coords": {"lat": 19.2, "lng": 73.0},
///   "station": "Thane Police Station",
///   "timestamp": "2024-05-01T10:00:00.000Z" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEnvelope")]
pub struct SignalEnvelope {
    id: String,
    mode: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    coords: Option<Coord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    station: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio: Option<String>,
    timestamp: String,
}

impl SignalEnvelope {
    /// Start building an envelope for a device and stage
    pub fn builder(id: impl Into<String>, mode: Stage) -> EnvelopeBuilder {
        EnvelopeBuilder::new(id, mode)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> Stage {
        self.mode
    }

    pub fn coords(&self) -> Option<Coord> {
        self.coords
    }

    pub fn station(&self) -> Option<&str> {
        self.station.as_deref()
    }

    /// Evidence as a data URL, only ever present on PROOF envelopes
    pub fn audio(&self) -> Option<&str> {
        self.audio.as_deref()
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Serialize to the JSON wire form
    pub fn to_json(&self) -> String {
        // Infallible: every field is a plain string, number or enum.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Builder validating envelope invariants at construction
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    id: String,
    mode: Stage,
    coords: Option<Coord>,
    station: Option<String>,
    audio: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

impl EnvelopeBuilder {
    pub fn new(id: impl Into<String>, mode: Stage) -> Self {
        Self {
            id: id.into(),
            mode,
            coords: None,
            station: None,
            audio: None,
            timestamp: None,
        }
    }

    pub fn coords(mut self, coords: Option<Coord>) -> Self {
        self.coords = coords;
        self
    }

    pub fn station(mut self, station: Option<String>) -> Self {
        self.station = station;
        self
    }

    pub fn audio(mut self, audio: Option<String>) -> Self {
        self.audio = audio;
        self
    }

    /// Pin the send time; defaults to now
    pub fn timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at);
        self
    }

    pub fn build(self) -> EnvelopeResult<SignalEnvelope> {
        let at = self.timestamp.unwrap_or_else(Utc::now);
        validate(RawEnvelope {
            id: self.id,
            mode: self.mode,
            coords: self.coords,
            station: self.station,
            audio: self.audio,
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    id: String,
    mode: Stage,
    #[serde(default)]
    coords: Option<Coord>,
    #[serde(default)]
    station: Option<String>,
    #[serde(default)]
    audio: Option<String>,
    timestamp: String,
}

impl TryFrom<RawEnvelope> for SignalEnvelope {
    type Error = EnvelopeError;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        validate(raw)
    }
}

fn validate(raw: RawEnvelope) -> EnvelopeResult<SignalEnvelope> {
    if raw.id.trim().is_empty() {
        return Err(EnvelopeError::EmptyId);
    }
    if let Some(c) = raw.coords {
        if !c.is_valid() {
            return Err(EnvelopeError::InvalidCoordinate {
                lat: c.lat,
                lng: c.lng,
            });
        }
    }
    if raw.audio.is_some() && raw.mode != Stage::Proof {
        return Err(EnvelopeError::AudioOutsideProof(raw.mode));
    }

    Ok(SignalEnvelope {
        id: raw.id,
        mode: raw.mode,
        coords: raw.coords,
        station: raw.station,
        audio: raw.audio,
        timestamp: raw.timestamp,
    })
}

/// Greeting the relay sends to a socket before any broadcast traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayHandshake {
    pub status: String,
    pub message: String,
}

impl RelayHandshake {
    pub fn connected(message: impl Into<String>) -> Self {
        Self {
            status: "connected".to_string(),
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Lenient view of an inbound payload, used only for logging.
///
/// Unknown fields are ignored and missing ones become `None`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignalSummary {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

impl SignalSummary {
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

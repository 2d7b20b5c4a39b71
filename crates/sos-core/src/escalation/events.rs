//! Commands into and events out of the escalation controller

use sos_types::{Coord, Stage};
use tokio::sync::oneshot;

use crate::geo::AddressState;
use crate::outreach::NearbyPlace;

/// Inputs to the controller, processed strictly one at a time
#[derive(Debug)]
pub enum DeviceCommand {
    /// Raw press of the activation button
    Pulse,
    /// The user declares they are safe
    MarkSafe,
    /// New positioning sample
    Fix(Coord),
    /// The positioning feed ended; the session ends with it
    FeedStopped,
    /// Start the dead-man-switch from its initial duration
    ArmDeadMan,
    /// Stop and reset the dead-man-switch
    DisarmDeadMan,
    /// Call the guardian contact
    ContactGuardian,
    /// Text the guardian contact for help
    MessageGuardian,
    /// Search the map for places near the last fix
    FindNearby(NearbyPlace),
    /// Produce a shareable map pin for the last fix
    ShareLocation,
    /// Dial the emergency number
    EmergencyCall,
    /// Report current state
    Snapshot(oneshot::Sender<ControllerSnapshot>),
    /// Stop the controller, releasing every held resource
    Shutdown,
}

/// User-facing message. Notices with `requires_ack` must be acknowledged
/// explicitly rather than shown in the background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub requires_ack: bool,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            requires_ack: false,
        }
    }

    pub fn blocking(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            requires_ack: true,
        }
    }
}

/// Observable controller activity
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// Stage changed
    StageChanged { from: Stage, to: Stage },

    /// Message for the user
    Notice(Notice),

    /// Recording countdown ticked
    RecordingTick { remaining_secs: u32 },

    /// Dead-man-switch countdown ticked
    DeadManTick { remaining_secs: u32 },

    /// Dead-man-switch expired
    DeadManTriggered,

    /// Nearest station changed
    StationAssigned { station: String },

    /// Resolved address changed
    AddressUpdated { address: String },

    /// A PROOF envelope carrying evidence was handed to the sink
    EvidenceDelivered { bytes: usize },

    /// Guardian call link
    GuardianContact {
        name: Option<String>,
        phone: String,
        uri: String,
    },

    /// Guardian help message link
    GuardianMessage {
        name: Option<String>,
        phone: String,
        uri: String,
    },

    /// Map search around the last fix
    NearbyMap { place: NearbyPlace, url: String },

    /// Map pin for the last fix
    LocationShared { url: String },

    /// Emergency call link
    EmergencyCall { number: String, uri: String },
}

/// Point-in-time view of the controller
#[derive(Debug, Clone)]
pub struct ControllerSnapshot {
    pub stage: Stage,
    pub last_fix: Option<Coord>,
    pub station: Option<String>,
    pub address: AddressState,
    /// Seconds left in the current recording, if one is running
    pub recording_remaining_secs: Option<u32>,
    /// Whether the audio capture resource is held (or being acquired)
    pub capture_held: bool,
    pub dead_man_active: bool,
    pub dead_man_remaining_secs: u32,
    pub pending_pulses: u8,
}

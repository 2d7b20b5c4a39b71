//! The escalation controller.
//!
//! Single owner of the device's [`Stage`]. Pulses, positioning samples,
//! timer deadlines, capture progress and address lookups all arrive through
//! one `select!` loop, so stage mutation is never concurrent.

use std::sync::Arc;

use sos_types::{Coord, SignalEnvelope, Stage};
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use super::events::{ControllerSnapshot, DeviceCommand, DeviceEvent, Notice};
use crate::config::{EscalationConfig, GeoConfig};
use crate::countdown::{Countdown, CountdownStatus};
use crate::error::{CaptureError, LookupError};
use crate::evidence::{
    AudioSource, ChunkEvent, EvidenceEpisode, EvidencePayload, EvidencePipeline,
};
use crate::geo::{GeoResolver, ReverseGeocoder};
use crate::gesture::{GestureDisambiguator, Intent};
use crate::outreach::{self, NearbyPlace};
use crate::profile::{ProfileStore, KEY_GUARDIAN_NAME, KEY_GUARDIAN_PHONE, KEY_LAST_STAGE};
use crate::sink::EnvelopeSink;

/// Event channel capacity for observers
const EVENT_CHANNEL_CAPACITY: usize = 256;

const MISSING_GUARDIAN: &str = "Please save a Guardian Contact in Profile first.";
const WAITING_FOR_LOCATION: &str = "Waiting for location...";

/// Collaborators injected into the controller
#[derive(Clone)]
pub struct Capabilities {
    pub audio: Arc<dyn AudioSource>,
    pub geocoder: Arc<dyn ReverseGeocoder>,
    pub sink: Arc<dyn EnvelopeSink>,
    pub profile: Arc<dyn ProfileStore>,
}

enum EvidenceState {
    Idle,
    Acquiring(JoinHandle<Result<EvidenceEpisode, CaptureError>>),
    Recording(EvidenceEpisode),
}

enum EvidenceEvent {
    Acquired(Result<EvidenceEpisode, CaptureError>),
    Chunk(ChunkEvent),
}

/// Escalation state machine for one device
pub struct EscalationController {
    config: EscalationConfig,
    stage: Stage,
    gesture: GestureDisambiguator,
    dead_man: Countdown,
    safe_decay_at: Option<Instant>,
    pipeline: EvidencePipeline,
    evidence: EvidenceState,
    resolver: GeoResolver,
    geocoder: Arc<dyn ReverseGeocoder>,
    lookups: JoinSet<Result<String, LookupError>>,
    last_fix: Option<Coord>,
    station: Option<String>,
    sink: Arc<dyn EnvelopeSink>,
    profile: Arc<dyn ProfileStore>,
    events: broadcast::Sender<DeviceEvent>,
}

impl EscalationController {
    /// Create a controller in ALERT
    pub fn new(config: EscalationConfig, geo: &GeoConfig, capabilities: Capabilities) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            gesture: GestureDisambiguator::new(config.gesture_window()),
            dead_man: Countdown::new(config.dead_man_secs),
            pipeline: EvidencePipeline::new(capabilities.audio, config.recording_secs),
            resolver: GeoResolver::new(geo),
            geocoder: capabilities.geocoder,
            sink: capabilities.sink,
            profile: capabilities.profile,
            config,
            stage: Stage::Alert,
            safe_decay_at: None,
            evidence: EvidenceState::Idle,
            lookups: JoinSet::new(),
            last_fix: None,
            station: None,
            events,
        }
    }

    /// Sender side of the observer channel
    pub fn event_sender(&self) -> broadcast::Sender<DeviceEvent> {
        self.events.clone()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Process commands until shutdown, the feed stops, or every sender is gone
    pub async fn run(mut self, mut commands: mpsc::Receiver<DeviceCommand>) {
        info!(device_id = %self.config.device_id, "Escalation controller started");
        self.persist_stage();

        loop {
            let deadline = self.next_deadline();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(DeviceCommand::Shutdown) | None => break,
                    Some(DeviceCommand::FeedStopped) => {
                        warn!("Positioning feed stopped, ending session");
                        break;
                    }
                    Some(command) => self.handle_command(command, Instant::now()).await,
                },
                _ = sleep_until_deadline(deadline) => self.on_deadline(Instant::now()).await,
                event = next_evidence_event(&mut self.evidence) => {
                    self.on_evidence_event(event);
                }
                Some(joined) = self.lookups.join_next(), if !self.lookups.is_empty() => {
                    self.on_lookup(joined);
                }
            }
        }

        self.teardown().await;
    }

    async fn handle_command(&mut self, command: DeviceCommand, now: Instant) {
        match command {
            DeviceCommand::Pulse => self.on_pulse(now),
            DeviceCommand::MarkSafe => self.mark_safe(now).await,
            DeviceCommand::Fix(coord) => self.on_fix(coord, now),
            DeviceCommand::ArmDeadMan => {
                self.dead_man.start(now);
                info!(secs = self.dead_man.initial_secs(), "Dead-man-switch armed");
                self.publish(DeviceEvent::DeadManTick {
                    remaining_secs: self.dead_man.remaining_secs(),
                });
            }
            DeviceCommand::DisarmDeadMan => {
                self.dead_man.reset();
                info!("Dead-man-switch disarmed");
            }
            DeviceCommand::ContactGuardian => self.contact_guardian(),
            DeviceCommand::MessageGuardian => self.message_guardian(),
            DeviceCommand::FindNearby(place) => self.find_nearby(place),
            DeviceCommand::ShareLocation => self.share_location(),
            DeviceCommand::EmergencyCall => {
                let number = self.config.emergency_number.clone();
                info!(number = %number, "Emergency call requested");
                self.publish(DeviceEvent::EmergencyCall {
                    uri: outreach::call_uri(&number),
                    number,
                });
            }
            DeviceCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            // Handled by the run loop
            DeviceCommand::FeedStopped | DeviceCommand::Shutdown => {}
        }
    }

    // ------------------------------------------------------------------
    // Gestures and transitions
    // ------------------------------------------------------------------

    fn on_pulse(&mut self, now: Instant) {
        let intent = self
            .gesture
            .register_pulse(now, self.stage == Stage::Proof);
        debug!(pending = self.gesture.pending_pulses(), "Pulse registered");
        self.apply_intent(intent);
    }

    fn apply_intent(&mut self, intent: Intent) {
        match (intent, self.stage) {
            (Intent::None, _) => {}
            (Intent::Single, Stage::Alert | Stage::Safe) => {
                self.set_stage(Stage::Risk);
                self.emit(Stage::Risk, None);
            }
            (Intent::Single, Stage::Risk) => debug!("Already in RISK, single ignored"),
            (Intent::Single, Stage::Proof) => debug!("Single never downgrades PROOF"),
            (Intent::Triple, Stage::Proof) => debug!("Already recording evidence"),
            (Intent::Triple, _) => self.enter_proof(),
        }
    }

    /// Switch to PROOF and start acquiring the capture in the background.
    ///
    /// The PROOF envelope goes out only when the episode ends.
    fn enter_proof(&mut self) {
        self.set_stage(Stage::Proof);
        let pipeline = self.pipeline.clone();
        self.evidence =
            EvidenceState::Acquiring(tokio::spawn(async move { pipeline.begin_episode().await }));
    }

    async fn mark_safe(&mut self, now: Instant) {
        self.dead_man.reset();

        if !self.stage.accepts_mark_safe() {
            debug!(stage = %self.stage, "Mark safe ignored outside RISK/PROOF");
            return;
        }

        self.cancel_evidence().await;
        self.set_stage(Stage::Safe);
        self.emit(Stage::Safe, None);
        self.safe_decay_at = Some(now + self.config.safe_decay());
    }

    fn set_stage(&mut self, to: Stage) {
        let from = self.stage;
        if from == to {
            return;
        }
        self.stage = to;
        if from == Stage::Safe {
            self.safe_decay_at = None;
        }

        info!(from = %from, to = %to, "Stage changed");
        self.persist_stage();
        self.publish(DeviceEvent::StageChanged { from, to });
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    fn next_deadline(&self) -> Option<Instant> {
        let recording = match &self.evidence {
            EvidenceState::Recording(episode) => episode.countdown().next_deadline(),
            _ => None,
        };

        [
            self.gesture.deadline(),
            self.safe_decay_at,
            recording,
            self.dead_man.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    async fn on_deadline(&mut self, now: Instant) {
        let intent = self.gesture.poll_expired(now, self.stage == Stage::Proof);
        self.apply_intent(intent);

        if let Some(at) = self.safe_decay_at {
            if now >= at {
                self.safe_decay_at = None;
                if self.stage == Stage::Safe {
                    self.set_stage(Stage::Alert);
                }
            }
        }

        let recording = match &mut self.evidence {
            EvidenceState::Recording(episode) => episode.countdown_mut().advance(now),
            _ => CountdownStatus::Idle,
        };
        match recording {
            CountdownStatus::Ticked { remaining_secs } => {
                self.publish(DeviceEvent::RecordingTick { remaining_secs });
            }
            CountdownStatus::Expired => {
                self.publish(DeviceEvent::RecordingTick { remaining_secs: 0 });
                self.finish_episode().await;
            }
            CountdownStatus::Idle | CountdownStatus::Pending => {}
        }

        match self.dead_man.advance(now) {
            CountdownStatus::Ticked { remaining_secs } => {
                self.publish(DeviceEvent::DeadManTick { remaining_secs });
            }
            CountdownStatus::Expired => {
                warn!("Dead-man-switch expired, escalating");
                self.dead_man.reset();
                self.publish(DeviceEvent::DeadManTriggered);
                self.apply_intent(Intent::Single);
            }
            CountdownStatus::Idle | CountdownStatus::Pending => {}
        }
    }

    // ------------------------------------------------------------------
    // Evidence
    // ------------------------------------------------------------------

    fn on_evidence_event(&mut self, event: EvidenceEvent) {
        match event {
            EvidenceEvent::Acquired(Ok(episode)) => {
                if self.stage == Stage::Proof {
                    debug!("Audio capture acquired");
                    self.evidence = EvidenceState::Recording(episode);
                } else {
                    // Left PROOF while acquiring; dropping releases it.
                    self.evidence = EvidenceState::Idle;
                    drop(episode);
                }
            }
            EvidenceEvent::Acquired(Err(e)) => {
                self.evidence = EvidenceState::Idle;
                self.capture_failed(e);
            }
            EvidenceEvent::Chunk(ChunkEvent::Appended { bytes }) => {
                debug!(bytes, "Evidence chunk captured");
            }
            EvidenceEvent::Chunk(ChunkEvent::Exhausted) => {
                debug!("Capture produced its last chunk");
            }
            EvidenceEvent::Chunk(ChunkEvent::Failed(e)) => {
                if let EvidenceState::Recording(episode) =
                    std::mem::replace(&mut self.evidence, EvidenceState::Idle)
                {
                    warn!(
                        chunks = episode.buffer().chunk_count(),
                        "Discarding partial evidence after device failure"
                    );
                }
                self.capture_failed(e);
            }
        }
    }

    fn capture_failed(&mut self, e: CaptureError) {
        error!(error = %e, "Evidence capture failed, falling back to RISK");
        if self.stage == Stage::Proof {
            self.set_stage(Stage::Risk);
            self.emit(Stage::Risk, None);
        }
        self.publish(DeviceEvent::Notice(Notice::blocking(e.to_string())));
    }

    /// Recording countdown reached zero: deliver the episode in one envelope
    async fn finish_episode(&mut self) {
        if let EvidenceState::Recording(episode) =
            std::mem::replace(&mut self.evidence, EvidenceState::Idle)
        {
            let payload = self.pipeline.end_episode(episode).await;
            self.deliver_evidence(payload);
        }
    }

    /// Stop any in-flight capture. Evidence recorded so far, including what
    /// the device hands over on stop, is delivered before the caller changes
    /// stage; an empty recording is dropped.
    async fn cancel_evidence(&mut self) {
        match std::mem::replace(&mut self.evidence, EvidenceState::Idle) {
            EvidenceState::Idle => {}
            EvidenceState::Acquiring(handle) => {
                handle.abort();
                debug!("Capture acquisition cancelled");
            }
            EvidenceState::Recording(episode) => {
                let payload = self.pipeline.end_episode(episode).await;
                if payload.is_empty() {
                    debug!("Recording cancelled before any audio arrived");
                } else {
                    self.deliver_evidence(payload);
                }
            }
        }
    }

    fn deliver_evidence(&mut self, payload: EvidencePayload) {
        let bytes = payload.bytes.len();
        let audio = (!payload.is_empty()).then(|| payload.to_data_url());
        self.emit(Stage::Proof, audio);
        self.publish(DeviceEvent::EvidenceDelivered { bytes });
    }

    // ------------------------------------------------------------------
    // Positioning
    // ------------------------------------------------------------------

    fn on_fix(&mut self, coord: Coord, now: Instant) {
        if !coord.is_valid() {
            warn!(lat = coord.lat, lng = coord.lng, "Ignoring invalid positioning sample");
            return;
        }
        self.last_fix = Some(coord);

        let update = self.resolver.update(coord, now);
        if let Some(station) = update.station {
            if self.station.as_deref() != Some(station.name.as_str()) {
                info!(station = %station.name, "Nearest station assigned");
                self.publish(DeviceEvent::StationAssigned {
                    station: station.name.clone(),
                });
            }
            self.station = Some(station.name);
        }

        if let Some(target) = update.lookup {
            let geocoder = self.geocoder.clone();
            self.lookups
                .spawn(async move { geocoder.reverse(target).await });
        }

        // Heartbeat: every sample is broadcast with the current stage.
        self.emit(self.stage, None);
    }

    fn on_lookup(&mut self, joined: Result<Result<String, LookupError>, JoinError>) {
        let result = joined.unwrap_or_else(|e| Err(LookupError::LookupFailed(e.to_string())));
        if let Some(address) = self.resolver.apply_lookup(result) {
            self.publish(DeviceEvent::AddressUpdated { address });
        }
    }

    // ------------------------------------------------------------------
    // Profile
    // ------------------------------------------------------------------

    fn contact_guardian(&mut self) {
        if let Some((name, phone)) = self.guardian() {
            self.publish(DeviceEvent::GuardianContact {
                uri: outreach::call_uri(&phone),
                name,
                phone,
            });
        }
    }

    fn message_guardian(&mut self) {
        if let Some((name, phone)) = self.guardian() {
            self.publish(DeviceEvent::GuardianMessage {
                uri: outreach::sms_uri(&phone, outreach::GUARDIAN_SMS_BODY),
                name,
                phone,
            });
        }
    }

    /// Guardian name and phone from the profile; publishes a notice when
    /// there is no usable phone
    fn guardian(&mut self) -> Option<(Option<String>, String)> {
        match self.profile.get(KEY_GUARDIAN_PHONE) {
            Ok(Some(phone)) if !phone.trim().is_empty() => {
                let name = match self.profile.get(KEY_GUARDIAN_NAME) {
                    Ok(name) => name.filter(|n| !n.trim().is_empty()),
                    Err(e) => {
                        debug!(error = %e, "Could not read guardian name");
                        None
                    }
                };
                Some((name, phone))
            }
            Ok(_) => {
                self.publish(DeviceEvent::Notice(Notice::info(MISSING_GUARDIAN)));
                None
            }
            Err(e) => {
                warn!(error = %e, "Could not read guardian contact");
                self.publish(DeviceEvent::Notice(Notice::info(
                    "Guardian contact is unavailable right now.",
                )));
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Maps
    // ------------------------------------------------------------------

    fn find_nearby(&mut self, place: NearbyPlace) {
        match self.last_fix {
            Some(at) => self.publish(DeviceEvent::NearbyMap {
                place,
                url: outreach::nearby_search_url(place, at),
            }),
            None => self.publish(DeviceEvent::Notice(Notice::info(WAITING_FOR_LOCATION))),
        }
    }

    fn share_location(&mut self) {
        match self.last_fix {
            Some(at) => self.publish(DeviceEvent::LocationShared {
                url: outreach::location_url(at),
            }),
            None => self.publish(DeviceEvent::Notice(Notice::info(WAITING_FOR_LOCATION))),
        }
    }

    fn persist_stage(&self) {
        if let Err(e) = self.profile.set(KEY_LAST_STAGE, self.stage.as_str()) {
            warn!(error = %e, "Failed to persist stage");
        }
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    fn emit(&self, mode: Stage, audio: Option<String>) {
        let built = SignalEnvelope::builder(self.config.device_id.clone(), mode)
            .coords(self.last_fix)
            .station(self.station.clone())
            .audio(audio)
            .build();

        match built {
            Ok(envelope) => {
                debug!(mode = %mode, "Envelope emitted");
                self.sink.send(envelope);
            }
            Err(e) => error!(error = %e, "Failed to build envelope"),
        }
    }

    fn publish(&self, event: DeviceEvent) {
        // No observers is fine.
        let _ = self.events.send(event);
    }

    fn snapshot(&self) -> ControllerSnapshot {
        let (recording_remaining_secs, capture_held) = match &self.evidence {
            EvidenceState::Idle => (None, false),
            EvidenceState::Acquiring(_) => (None, true),
            EvidenceState::Recording(episode) => (
                Some(episode.countdown().remaining_secs()),
                episode.is_capturing(),
            ),
        };

        ControllerSnapshot {
            stage: self.stage,
            last_fix: self.last_fix,
            station: self.station.clone(),
            address: self.resolver.address().clone(),
            recording_remaining_secs,
            capture_held,
            dead_man_active: self.dead_man.is_active(),
            dead_man_remaining_secs: self.dead_man.remaining_secs(),
            pending_pulses: self.gesture.pending_pulses(),
        }
    }

    async fn teardown(&mut self) {
        self.cancel_evidence().await;
        self.lookups.abort_all();
        self.dead_man.reset();
        self.gesture.reset();
        info!(stage = %self.stage, "Escalation controller stopped");
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn next_evidence_event(state: &mut EvidenceState) -> EvidenceEvent {
    match state {
        EvidenceState::Idle => std::future::pending().await,
        EvidenceState::Acquiring(handle) => {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(CaptureError::DeviceUnavailable(format!(
                    "capture task failed: {}",
                    e
                ))),
            };
            EvidenceEvent::Acquired(result)
        }
        EvidenceState::Recording(episode) => EvidenceEvent::Chunk(episode.next_chunk().await),
    }
}

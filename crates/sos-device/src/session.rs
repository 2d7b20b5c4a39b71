//! One device session: controller, uplink, simulated capabilities and the
//! console input loop wired together.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sos_core::profile::KEY_LAST_STAGE;
use sos_core::{
    escalation, Capabilities, ChannelSink, CoreError, DeviceCommand, DeviceEvent,
    EscalationController, NearbyPlace, Notice, ProfileStore,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::error::DeviceResult;
use crate::geocoder::NominatimGeocoder;
use crate::output::{print_info, print_snapshot, print_warning, render_event};
use crate::profile::FileProfileStore;
use crate::simulated::{simulated_microphone, SimulatedPositionFeed};
use crate::uplink::Uplink;

/// Spacing of the pulses sent for a `triple` input
const TRIPLE_PULSE_SPACING: Duration = Duration::from_millis(100);

/// A console command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    Pulse,
    Triple,
    MarkSafe,
    ArmDeadMan,
    DisarmDeadMan,
    Guardian,
    MessageGuardian,
    Nearby(NearbyPlace),
    ShareLocation,
    EmergencyCall,
    Status,
    Help,
    Quit,
    /// Empty line, used to acknowledge notices
    Acknowledge,
}

impl InputAction {
    /// Parse one console line; `None` for unknown input
    pub fn parse(line: &str) -> Option<Self> {
        let action = match line.trim().to_ascii_lowercase().as_str() {
            "" => InputAction::Acknowledge,
            "t" | "tap" | "sos" => InputAction::Pulse,
            "ttt" | "triple" | "proof" => InputAction::Triple,
            "s" | "safe" => InputAction::MarkSafe,
            "arm" => InputAction::ArmDeadMan,
            "disarm" => InputAction::DisarmDeadMan,
            "g" | "guardian" => InputAction::Guardian,
            "sms" | "text" => InputAction::MessageGuardian,
            "hospital" | "hospitals" => InputAction::Nearby(NearbyPlace::Hospitals),
            "police" => InputAction::Nearby(NearbyPlace::PoliceStations),
            "crowd" | "crowds" => InputAction::Nearby(NearbyPlace::CrowdedPlaces),
            "share" | "where" => InputAction::ShareLocation,
            "112" | "emergency" => InputAction::EmergencyCall,
            "status" | "?" => InputAction::Status,
            "h" | "help" => InputAction::Help,
            "q" | "quit" | "exit" => InputAction::Quit,
            _ => return None,
        };
        Some(action)
    }
}

const HELP: &str = "\
  tap      press the SOS button once (RISK after 400ms)
  triple   press it three times (PROOF, records evidence)
  safe     mark yourself safe
  arm      start the check-in timer
  disarm   stop the check-in timer
  guardian call your guardian contact
  sms      text your guardian for help
  hospital map of nearby hospitals
  police   map of nearby police stations
  crowd    map of nearby crowded public places
  share    link to your current location
  112      call emergency services
  status   show device status
  quit     end the session";

/// Blocking notices the user has not acknowledged yet, oldest first
#[derive(Debug, Clone, Default)]
pub struct PendingNotices {
    queue: Arc<Mutex<VecDeque<Notice>>>,
}

impl PendingNotices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self, notice: Notice) {
        self.lock().push_back(notice);
    }

    /// Oldest unacknowledged notice
    pub fn current(&self) -> Option<Notice> {
        self.lock().front().cloned()
    }

    /// Clear the oldest notice, returning it
    pub fn acknowledge(&self) -> Option<Notice> {
        self.lock().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Notice>> {
        // A panic elsewhere cannot leave the queue half-updated.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Device session built from configuration
#[derive(Debug, Clone)]
pub struct DeviceSession {
    config: DeviceConfig,
    arm_dead_man: bool,
}

impl DeviceSession {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            arm_dead_man: false,
        }
    }

    /// Start the session with the check-in timer already running
    pub fn with_dead_man(mut self, armed: bool) -> Self {
        self.arm_dead_man = armed;
        self
    }

    /// Run until the user quits, input ends, or the position feed stops
    pub async fn run<R>(self, input: R) -> DeviceResult<()>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let Self {
            config,
            arm_dead_man,
        } = self;

        let profile = Arc::new(FileProfileStore::open(&config.profile_path)?);
        if let Some(last) = profile.get(KEY_LAST_STAGE)? {
            print_info(&format!("Previous session ended in {}", last));
        }

        let (sink, envelopes) = ChannelSink::new();
        let uplink = tokio::spawn(Uplink::new(&config).run(envelopes));

        let geocoder = NominatimGeocoder::new(
            config.nominatim_url.clone(),
            &config.user_agent,
            config.lookup_timeout(),
        )?;

        let controller = EscalationController::new(
            config.escalation.clone(),
            &config.geo,
            Capabilities {
                audio: Arc::new(simulated_microphone(&config.simulation)),
                geocoder: Arc::new(geocoder),
                sink: Arc::new(sink),
                profile: profile.clone(),
            },
        );
        let handle = escalation::spawn(controller);
        info!(device_id = %config.escalation.device_id, "Device session started");
        if arm_dead_man {
            handle.arm_dead_man().await?;
        }

        let notices = PendingNotices::new();
        let printer = tokio::spawn(print_events(handle.subscribe(), notices.clone()));

        let feed = match SimulatedPositionFeed::new(&config.simulation)
            .start(handle.command_sender())
        {
            Ok(task) => Some(task),
            Err(e) => {
                warn!(error = %e, "Running without positioning");
                print_warning(&format!("{}; location will not be shared", e));
                None
            }
        };

        print_info("Type 'help' for commands");
        let console = tokio::spawn(read_commands(input, handle.command_sender(), notices));

        handle.join().await?;

        console.abort();
        printer.abort();
        if let Some(feed) = feed {
            feed.abort();
        }

        if let Err(e) = profile.flush().await {
            warn!(error = %e, "Profile changes may be lost");
        }

        // The controller dropped the sink, so the uplink drains and stops.
        match uplink.await {
            Ok(result) => result?,
            Err(e) => debug!(error = %e, "Uplink task ended abnormally"),
        }

        info!("Device session ended");
        Ok(())
    }
}

/// Translate console lines into controller commands.
///
/// While a blocking notice is pending, every line except `quit` re-shows it
/// instead of running; an empty line acknowledges it.
pub async fn read_commands<R>(
    input: R,
    commands: mpsc::Sender<DeviceCommand>,
    notices: PendingNotices,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Console input failed");
                break;
            }
        };

        let Some(action) = InputAction::parse(&line) else {
            print_warning(&format!("Unknown command '{}', type 'help'", line.trim()));
            continue;
        };

        if let Some(notice) = notices.current() {
            match action {
                InputAction::Acknowledge => {
                    notices.acknowledge();
                    if let Some(next) = notices.current() {
                        show_notice(&next);
                    }
                    continue;
                }
                InputAction::Quit => {}
                _ => {
                    show_notice(&notice);
                    continue;
                }
            }
        }

        if dispatch(action, &commands).await.is_err() {
            return;
        }
        if action == InputAction::Quit {
            return;
        }
    }

    // End of input ends the session.
    let _ = commands.send(DeviceCommand::Shutdown).await;
}

async fn dispatch(
    action: InputAction,
    commands: &mpsc::Sender<DeviceCommand>,
) -> DeviceResult<()> {
    match action {
        InputAction::Pulse => send(commands, DeviceCommand::Pulse).await,
        InputAction::Triple => {
            for i in 0..3 {
                if i > 0 {
                    tokio::time::sleep(TRIPLE_PULSE_SPACING).await;
                }
                send(commands, DeviceCommand::Pulse).await?;
            }
            Ok(())
        }
        InputAction::MarkSafe => send(commands, DeviceCommand::MarkSafe).await,
        InputAction::ArmDeadMan => send(commands, DeviceCommand::ArmDeadMan).await,
        InputAction::DisarmDeadMan => send(commands, DeviceCommand::DisarmDeadMan).await,
        InputAction::Guardian => send(commands, DeviceCommand::ContactGuardian).await,
        InputAction::MessageGuardian => send(commands, DeviceCommand::MessageGuardian).await,
        InputAction::Nearby(place) => send(commands, DeviceCommand::FindNearby(place)).await,
        InputAction::ShareLocation => send(commands, DeviceCommand::ShareLocation).await,
        InputAction::EmergencyCall => send(commands, DeviceCommand::EmergencyCall).await,
        InputAction::Status => {
            let (tx, rx) = oneshot::channel();
            send(commands, DeviceCommand::Snapshot(tx)).await?;
            let snapshot = rx.await.map_err(|_| CoreError::ControllerClosed)?;
            print_snapshot(&snapshot);
            Ok(())
        }
        InputAction::Help => {
            println!("{}", HELP);
            Ok(())
        }
        InputAction::Quit => send(commands, DeviceCommand::Shutdown).await,
        InputAction::Acknowledge => Ok(()),
    }
}

async fn send(
    commands: &mpsc::Sender<DeviceCommand>,
    command: DeviceCommand,
) -> DeviceResult<()> {
    commands
        .send(command)
        .await
        .map_err(|_| CoreError::ControllerClosed.into())
}

fn show_notice(notice: &Notice) {
    if let Some(line) = render_event(&DeviceEvent::Notice(notice.clone())) {
        println!("{}", line);
    }
}

async fn print_events(mut events: broadcast::Receiver<DeviceEvent>, notices: PendingNotices) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let DeviceEvent::Notice(notice) = &event {
                    if notice.requires_ack {
                        notices.raise(notice.clone());
                    }
                }
                if let Some(line) = render_event(&event) {
                    println!("{}", line);
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                debug!(skipped = n, "Console fell behind device events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert_eq!(InputAction::parse("tap"), Some(InputAction::Pulse));
        assert_eq!(InputAction::parse("  TRIPLE "), Some(InputAction::Triple));
        assert_eq!(InputAction::parse("safe"), Some(InputAction::MarkSafe));
        assert_eq!(InputAction::parse(""), Some(InputAction::Acknowledge));
        assert_eq!(InputAction::parse("q"), Some(InputAction::Quit));
        assert_eq!(
            InputAction::parse("police"),
            Some(InputAction::Nearby(NearbyPlace::PoliceStations))
        );
        assert_eq!(InputAction::parse("112"), Some(InputAction::EmergencyCall));
        assert_eq!(InputAction::parse("sms"), Some(InputAction::MessageGuardian));
        assert_eq!(InputAction::parse("launch"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_console_translates_lines() {
        let (tx, mut rx) = mpsc::channel(16);
        let input = tokio::io::BufReader::new(&b"tap\nnonsense\nsafe\narm\n"[..]);

        read_commands(input, tx, PendingNotices::new()).await;

        assert!(matches!(rx.recv().await, Some(DeviceCommand::Pulse)));
        assert!(matches!(rx.recv().await, Some(DeviceCommand::MarkSafe)));
        assert!(matches!(rx.recv().await, Some(DeviceCommand::ArmDeadMan)));
        // End of input shuts the session down.
        assert!(matches!(rx.recv().await, Some(DeviceCommand::Shutdown)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_notice_holds_commands_until_acknowledged() {
        let (tx, mut rx) = mpsc::channel(16);
        let notices = PendingNotices::new();
        notices.raise(Notice::blocking("Microphone permission denied"));
        let input = tokio::io::BufReader::new(&b"tap\nshare\n\ntap\n"[..]);

        read_commands(input, tx, notices.clone()).await;

        // Only the tap after the empty line gets through.
        assert!(matches!(rx.recv().await, Some(DeviceCommand::Pulse)));
        assert!(matches!(rx.recv().await, Some(DeviceCommand::Shutdown)));
        assert!(notices.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_notice_needs_its_own_acknowledgement() {
        let (tx, mut rx) = mpsc::channel(16);
        let notices = PendingNotices::new();
        notices.raise(Notice::blocking("first"));
        notices.raise(Notice::blocking("second"));
        let input = tokio::io::BufReader::new(&b"\nsafe\n\nsafe\n"[..]);

        read_commands(input, tx, notices.clone()).await;

        assert!(matches!(rx.recv().await, Some(DeviceCommand::MarkSafe)));
        assert!(matches!(rx.recv().await, Some(DeviceCommand::Shutdown)));
        assert!(notices.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quit_is_never_held() {
        let (tx, mut rx) = mpsc::channel(16);
        let notices = PendingNotices::new();
        notices.raise(Notice::blocking("Microphone permission denied"));
        let input = tokio::io::BufReader::new(&b"quit\ntap\n"[..]);

        read_commands(input, tx, notices.clone()).await;

        assert!(matches!(rx.recv().await, Some(DeviceCommand::Shutdown)));
        assert!(rx.recv().await.is_none());
        assert_eq!(
            notices.current().map(|n| n.message).as_deref(),
            Some("Microphone permission denied")
        );
    }

    #[tokio::test]
    async fn test_printer_queues_blocking_notices() {
        let (events, rx) = broadcast::channel(8);
        let notices = PendingNotices::new();
        let printer = tokio::spawn(print_events(rx, notices.clone()));

        events
            .send(DeviceEvent::Notice(Notice::info("Waiting for location...")))
            .unwrap();
        events
            .send(DeviceEvent::Notice(Notice::blocking("Microphone permission denied")))
            .unwrap();
        drop(events);
        printer.await.unwrap();

        assert_eq!(
            notices.acknowledge().map(|n| n.message).as_deref(),
            Some("Microphone permission denied")
        );
        assert!(notices.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_triple_sends_three_spaced_pulses() {
        let (tx, mut rx) = mpsc::channel(16);
        let started = tokio::time::Instant::now();

        dispatch(InputAction::Triple, &tx).await.unwrap();

        for _ in 0..3 {
            assert!(matches!(rx.recv().await, Some(DeviceCommand::Pulse)));
        }
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(started.elapsed() < Duration::from_millis(400));
    }
}

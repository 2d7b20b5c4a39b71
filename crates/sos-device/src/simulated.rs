//! Simulated device capabilities: a jittering position feed and a
//! microphone producing synthetic chunks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sos_core::{DeviceCommand, ScriptedAudioSource, ScriptedBehavior};
use sos_types::Coord;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::SimulationConfig;
use crate::error::{DeviceError, DeviceResult};

/// Bytes in one synthetic audio chunk
const AUDIO_CHUNK_BYTES: usize = 512;

/// Position feed wandering around a fixed point
#[derive(Debug, Clone)]
pub struct SimulatedPositionFeed {
    origin: Coord,
    jitter_deg: f64,
    config: SimulationConfig,
}

impl SimulatedPositionFeed {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            origin: Coord::new(config.start_lat, config.start_lng),
            jitter_deg: config.jitter_deg.abs(),
            config: config.clone(),
        }
    }

    /// Start feeding samples into the controller.
    ///
    /// Fails with `PermissionDenied` when positioning is not granted. After
    /// `max_fixes` samples the feed reports that it stopped.
    pub fn start(self, commands: mpsc::Sender<DeviceCommand>) -> DeviceResult<JoinHandle<()>> {
        if !self.config.positioning {
            return Err(DeviceError::PermissionDenied(
                "positioning access was refused".to_string(),
            ));
        }
        Ok(tokio::spawn(self.pump(commands)))
    }

    /// A sample within `jitter_deg` of the origin
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Coord {
        if self.jitter_deg == 0.0 {
            return self.origin;
        }
        Coord::new(
            self.origin.lat + rng.gen_range(-self.jitter_deg..=self.jitter_deg),
            self.origin.lng + rng.gen_range(-self.jitter_deg..=self.jitter_deg),
        )
    }

    async fn pump(self, commands: mpsc::Sender<DeviceCommand>) {
        let mut rng = StdRng::from_entropy();
        let mut ticker = interval(self.config.fix_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sent = 0u64;

        info!(
            lat = self.origin.lat,
            lng = self.origin.lng,
            "Simulated positioning started"
        );

        loop {
            if self.config.max_fixes.is_some_and(|max| sent >= max) {
                info!(samples = sent, "Simulated positioning finished");
                let _ = commands.send(DeviceCommand::FeedStopped).await;
                return;
            }

            ticker.tick().await;
            let coord = self.sample(&mut rng);
            if commands.send(DeviceCommand::Fix(coord)).await.is_err() {
                debug!("Controller gone, stopping position feed");
                return;
            }
            sent += 1;
        }
    }
}

/// Microphone producing synthetic chunks, or refusing access
pub fn simulated_microphone(config: &SimulationConfig) -> ScriptedAudioSource {
    if !config.microphone {
        return ScriptedAudioSource::denied();
    }

    let chunks = (0u8..4)
        .map(|i| vec![i.wrapping_mul(61); AUDIO_CHUNK_BYTES])
        .collect();
    ScriptedAudioSource::new(chunks, config.audio_chunk()).with_behavior(ScriptedBehavior::Loop)
}

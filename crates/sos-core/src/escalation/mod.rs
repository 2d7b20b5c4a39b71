//! Escalation: the per-device state machine and a handle for driving it.
//!
//! The controller runs as its own task. Callers talk to it through an
//! [`EscalationHandle`] and observe it through a broadcast of
//! [`DeviceEvent`]s; envelopes leave through the injected sink.

mod controller;
mod events;

pub use controller::{Capabilities, EscalationController};
pub use events::{ControllerSnapshot, DeviceCommand, DeviceEvent, Notice};

use sos_types::Coord;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::outreach::NearbyPlace;

/// Command queue depth in front of the controller
const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Spawn `controller` onto the current runtime
pub fn spawn(controller: EscalationController) -> EscalationHandle {
    let (commands, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let events = controller.event_sender();
    let task = tokio::spawn(controller.run(rx));

    EscalationHandle {
        commands,
        events,
        task,
    }
}

/// Handle to a running escalation controller
pub struct EscalationHandle {
    commands: mpsc::Sender<DeviceCommand>,
    events: broadcast::Sender<DeviceEvent>,
    task: JoinHandle<()>,
}

impl EscalationHandle {
    /// Raw press of the activation button
    pub async fn pulse(&self) -> CoreResult<()> {
        self.send(DeviceCommand::Pulse).await
    }

    pub async fn mark_safe(&self) -> CoreResult<()> {
        self.send(DeviceCommand::MarkSafe).await
    }

    /// Feed one positioning sample
    pub async fn fix(&self, coord: Coord) -> CoreResult<()> {
        self.send(DeviceCommand::Fix(coord)).await
    }

    /// Tell the controller the positioning feed has ended
    pub async fn feed_stopped(&self) -> CoreResult<()> {
        self.send(DeviceCommand::FeedStopped).await
    }

    pub async fn arm_dead_man(&self) -> CoreResult<()> {
        self.send(DeviceCommand::ArmDeadMan).await
    }

    pub async fn disarm_dead_man(&self) -> CoreResult<()> {
        self.send(DeviceCommand::DisarmDeadMan).await
    }

    pub async fn contact_guardian(&self) -> CoreResult<()> {
        self.send(DeviceCommand::ContactGuardian).await
    }

    pub async fn message_guardian(&self) -> CoreResult<()> {
        self.send(DeviceCommand::MessageGuardian).await
    }

    pub async fn find_nearby(&self, place: NearbyPlace) -> CoreResult<()> {
        self.send(DeviceCommand::FindNearby(place)).await
    }

    pub async fn share_location(&self) -> CoreResult<()> {
        self.send(DeviceCommand::ShareLocation).await
    }

    pub async fn emergency_call(&self) -> CoreResult<()> {
        self.send(DeviceCommand::EmergencyCall).await
    }

    /// Current controller state
    pub async fn snapshot(&self) -> CoreResult<ControllerSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(DeviceCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| CoreError::ControllerClosed)
    }

    /// Subscribe to controller events from this point on
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// A sender that can be moved into feed or input tasks
    pub fn command_sender(&self) -> mpsc::Sender<DeviceCommand> {
        self.commands.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the controller and wait for it to release everything it holds
    pub async fn shutdown(self) -> CoreResult<()> {
        // Already stopped is fine; the join below still observes the exit.
        if self.commands.send(DeviceCommand::Shutdown).await.is_err() {
            debug!("Controller already stopped");
        }
        self.join().await
    }

    /// Wait for the controller to stop on its own
    pub async fn join(self) -> CoreResult<()> {
        self.task.await.map_err(|_| CoreError::ControllerClosed)
    }

    async fn send(&self, command: DeviceCommand) -> CoreResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CoreError::ControllerClosed)
    }
}

impl std::fmt::Debug for EscalationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscalationHandle")
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

//! Relay uplink.
//!
//! Keeps one socket to the relay and writes every outbound envelope to it.
//! While disconnected, envelopes are dropped rather than queued, and the
//! uplink retries with a doubling, capped delay.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use sos_types::SignalEnvelope;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::error::{DeviceError, DeviceResult};
use crate::watch::{describe, Inbound};

/// Doubling reconnect delay
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        Self {
            initial,
            max: max.max(initial),
            next: initial,
        }
    }

    /// Delay to wait now; the following one doubles up to the cap
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

enum Disconnect {
    /// Every envelope producer is gone; the uplink is done
    SourceClosed,
    /// The socket failed; reconnect
    Lost(DeviceError),
}

/// Outbound path from the device to the relay
#[derive(Debug, Clone)]
pub struct Uplink {
    relay_url: String,
    backoff: Backoff,
}

impl Uplink {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            relay_url: config.relay_url.clone(),
            backoff: Backoff::new(config.reconnect_initial(), config.reconnect_max()),
        }
    }

    /// Deliver envelopes until the sending side closes
    pub async fn run(
        mut self,
        mut envelopes: mpsc::UnboundedReceiver<SignalEnvelope>,
    ) -> DeviceResult<()> {
        loop {
            match connect_async(self.relay_url.as_str()).await {
                Ok((socket, _)) => {
                    info!(relay = %self.relay_url, "Uplink connected");
                    self.backoff.reset();
                    match pump(socket, &mut envelopes).await {
                        Disconnect::SourceClosed => {
                            info!("Uplink closed");
                            return Ok(());
                        }
                        Disconnect::Lost(e) => warn!(error = %e, "Uplink lost"),
                    }
                }
                Err(e) => {
                    let err = DeviceError::ConnectionLost(e.to_string());
                    warn!(relay = %self.relay_url, error = %err, "Uplink connect failed");
                }
            }

            let delay = self.backoff.next_delay();
            debug!(delay_ms = delay.as_millis() as u64, "Uplink reconnecting");
            if !drop_while_waiting(delay, &mut envelopes).await {
                return Ok(());
            }
        }
    }
}

/// Wait out `delay`, discarding envelopes produced meanwhile.
///
/// Returns `false` if the sending side closed.
async fn drop_while_waiting(
    delay: Duration,
    envelopes: &mut mpsc::UnboundedReceiver<SignalEnvelope>,
) -> bool {
    let wait = sleep(delay);
    tokio::pin!(wait);

    loop {
        tokio::select! {
            _ = &mut wait => return true,
            next = envelopes.recv() => match next {
                Some(envelope) => {
                    warn!(mode = %envelope.mode(), "Relay unreachable, envelope dropped");
                }
                None => return false,
            },
        }
    }
}

async fn pump(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    envelopes: &mut mpsc::UnboundedReceiver<SignalEnvelope>,
) -> Disconnect {
    let (mut outbound, mut inbound) = socket.split();

    loop {
        tokio::select! {
            next = envelopes.recv() => {
                let Some(envelope) = next else {
                    let _ = outbound.close().await;
                    return Disconnect::SourceClosed;
                };
                if let Err(e) = outbound.send(Message::Text(envelope.to_json())).await {
                    warn!(mode = %envelope.mode(), "Envelope lost with the connection");
                    return Disconnect::Lost(DeviceError::ConnectionLost(e.to_string()));
                }
                debug!(mode = %envelope.mode(), "Envelope sent");
            }
            message = inbound.next() => match message {
                Some(Ok(Message::Text(text))) => log_inbound(&text),
                Some(Ok(Message::Close(_))) | None => {
                    return Disconnect::Lost(DeviceError::ConnectionLost(
                        "relay closed the connection".to_string(),
                    ));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Disconnect::Lost(DeviceError::ConnectionLost(e.to_string()));
                }
            },
        }
    }
}

fn log_inbound(text: &str) {
    match Inbound::classify(text) {
        Inbound::Handshake(handshake) => info!(message = %handshake.message, "Relay handshake"),
        Inbound::Envelope(envelope) => debug!(peer = %describe(&envelope), "Peer envelope"),
        Inbound::Unreadable(e) => debug!(error = %e, "Unreadable relay message"),
    }
}

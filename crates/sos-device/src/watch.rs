//! Dispatcher view of the relay: classify and render inbound traffic.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::StreamExt;
use sos_types::{RelayHandshake, SignalEnvelope};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use crate::error::{DeviceError, DeviceResult};

/// One message received from the relay
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Greeting sent by the relay on connect
    Handshake(RelayHandshake),
    /// A valid envelope from some device
    Envelope(SignalEnvelope),
    /// Anything else; the relay forwards unreadable payloads too
    Unreadable(String),
}

impl Inbound {
    pub fn classify(payload: &str) -> Self {
        match serde_json::from_str::<SignalEnvelope>(payload) {
            Ok(envelope) => Inbound::Envelope(envelope),
            Err(envelope_err) => match serde_json::from_str::<RelayHandshake>(payload) {
                Ok(handshake) => Inbound::Handshake(handshake),
                Err(_) => Inbound::Unreadable(envelope_err.to_string()),
            },
        }
    }
}

/// Size of the recording carried in a `data:` URL, if it decodes
pub fn audio_bytes(data_url: &str) -> Option<usize> {
    let (_, encoded) = data_url.split_once(";base64,")?;
    STANDARD.decode(encoded).ok().map(|bytes| bytes.len())
}

/// One-line summary of an envelope for the dispatcher console
pub fn describe(envelope: &SignalEnvelope) -> String {
    let mut line = format!("[{}] {}", envelope.mode(), envelope.id());

    if let Some(coords) = envelope.coords() {
        line.push_str(&format!(" @ {:.4},{:.4}", coords.lat, coords.lng));
    }
    if let Some(station) = envelope.station() {
        line.push_str(&format!(" -> {}", station));
    }
    if let Some(audio) = envelope.audio() {
        match audio_bytes(audio) {
            Some(bytes) => line.push_str(&format!(" (audio evidence, {} bytes)", bytes)),
            None => line.push_str(" (audio evidence, undecodable)"),
        }
    }
    line
}

/// Connect to the relay and hand every inbound message to `on_message`
/// until the relay closes the socket.
pub async fn watch<F>(relay_url: &str, mut on_message: F) -> DeviceResult<()>
where
    F: FnMut(Inbound),
{
    let (socket, _) = connect_async(relay_url)
        .await
        .map_err(|e| DeviceError::ConnectionLost(e.to_string()))?;
    info!(relay = %relay_url, "Watching relay");

    let (_, mut inbound) = socket.split();
    while let Some(next) = inbound.next().await {
        match next.map_err(|e| DeviceError::ConnectionLost(e.to_string()))? {
            Message::Text(text) => on_message(Inbound::classify(&text)),
            Message::Binary(bytes) => {
                on_message(Inbound::classify(&String::from_utf8_lossy(&bytes)))
            }
            Message::Close(_) => break,
            other => debug!(?other, "Ignoring control frame"),
        }
    }

    info!("Relay closed the connection");
    Ok(())
}

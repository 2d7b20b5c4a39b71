//! The relay hub: one broadcast domain shared by every open connection.
//!
//! Each connection owns an outbound queue drained by its socket writer. A
//! payload from one connection is queued, byte for byte, on every other
//! connection that is open when the broadcast starts. The hub keeps no
//! history and no per-device identity.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sos_types::{RelayHandshake, SignalSummary};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{RelayError, RelayResult};

/// Identifier of one relay connection
pub type ConnectionId = Uuid;

/// Opaque payload as it travelled on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFrame {
    Text(String),
    Binary(Vec<u8>),
}

impl RelayFrame {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RelayFrame::Text(text) => text.as_bytes(),
            RelayFrame::Binary(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// Connection set and fan-out
#[derive(Debug)]
pub struct RelayHub {
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<RelayFrame>>,
    handshake: String,
    started_at: DateTime<Utc>,
}

impl RelayHub {
    /// Create a hub greeting each connection with `handshake_message`
    pub fn new(handshake_message: impl Into<String>) -> Self {
        Self {
            connections: DashMap::new(),
            handshake: RelayHandshake::connected(handshake_message).to_json(),
            started_at: Utc::now(),
        }
    }

    /// Add a connection.
    ///
    /// The handshake is queued before the connection joins the set, so it is
    /// always the first frame the connection sees.
    pub fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<RelayFrame>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        // The receiver is still in hand, so this cannot fail.
        let _ = tx.send(RelayFrame::Text(self.handshake.clone()));
        self.connections.insert(id, tx);

        info!(
            connection_id = %id,
            connections = self.connections.len(),
            "Client connected"
        );
        (id, rx)
    }

    /// Remove a connection; returns whether it was present
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        let removed = self.connections.remove(id).is_some();
        if removed {
            info!(
                connection_id = %id,
                connections = self.connections.len(),
                "Client disconnected"
            );
        }
        removed
    }

    /// Log the payload and forward it to every other connection.
    ///
    /// Returns the number of peers the frame was queued on.
    pub fn relay(&self, from: &ConnectionId, frame: RelayFrame) -> usize {
        match inspect(frame.as_bytes()) {
            Ok(summary) => info!(
                "SIGNAL: [{}] from {}",
                summary.mode.as_deref().unwrap_or("?"),
                summary.id.as_deref().unwrap_or("?")
            ),
            Err(e) => debug!(connection_id = %from, error = %e, "Forwarding unreadable payload"),
        }
        self.broadcast_from(from, frame)
    }

    /// Queue `frame` on every open connection except `from`.
    ///
    /// Iterates a snapshot of the set; connections whose queue has closed
    /// are dropped from the set and skipped.
    pub fn broadcast_from(&self, from: &ConnectionId, frame: RelayFrame) -> usize {
        let peers: Vec<(ConnectionId, mpsc::UnboundedSender<RelayFrame>)> = self
            .connections
            .iter()
            .filter(|entry| entry.key() != from)
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut delivered = 0;
        for (id, tx) in peers {
            if tx.send(frame.clone()).is_ok() {
                delivered += 1;
            } else {
                debug!(connection_id = %id, "Peer queue closed during broadcast");
                self.connections.remove(&id);
            }
        }

        debug!(connection_id = %from, peers = delivered, bytes = frame.len(), "Frame relayed");
        delivered
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Best-effort read of `id` and `mode` for logging
pub fn inspect(payload: &[u8]) -> RelayResult<SignalSummary> {
    SignalSummary::parse(payload).map_err(|e| RelayError::MalformedEnvelope(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<RelayFrame>) -> Vec<RelayFrame> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn test_handshake_is_first_frame() {
        let hub = RelayHub::new("Dispatch Hub Ready");
        let (_, mut rx) = hub.register();

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        let value: serde_json::Value = serde_json::from_slice(frames[0].as_bytes()).unwrap();
        assert_eq!(value["status"], "connected");
        assert_eq!(value["message"], "Dispatch Hub Ready");
    }

    #[test]
    fn test_broadcast_excludes_sender() {
        let hub = RelayHub::new("ready");
        let (a, mut rx_a) = hub.register();
        let (_, mut rx_b) = hub.register();
        let (_, mut rx_c) = hub.register();
        for rx in [&mut rx_a, &mut rx_b, &mut rx_c] {
            drain(rx);
        }

        let frame = RelayFrame::Text(r#"{"id":"USER_123","mode":"RISK"}"#.to_string());
        assert_eq!(hub.relay(&a, frame.clone()), 2);

        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b), vec![frame.clone()]);
        assert_eq!(drain(&mut rx_c), vec![frame]);
    }

    #[test]
    fn test_malformed_payload_still_forwarded() {
        let hub = RelayHub::new("ready");
        let (a, _rx_a) = hub.register();
        let (_, mut rx_b) = hub.register();
        drain(&mut rx_b);

        let frame = RelayFrame::Binary(vec![0xff, 0x00, 0x13]);
        assert!(matches!(
            inspect(frame.as_bytes()),
            Err(RelayError::MalformedEnvelope(_))
        ));
        assert_eq!(hub.relay(&a, frame.clone()), 1);
        assert_eq!(drain(&mut rx_b), vec![frame]);
    }

    #[test]
    fn test_closed_peer_is_pruned() {
        let hub = RelayHub::new("ready");
        let (a, _rx_a) = hub.register();
        let (_, rx_b) = hub.register();
        let (_, mut rx_c) = hub.register();
        drain(&mut rx_c);
        drop(rx_b);

        assert_eq!(hub.connection_count(), 3);
        assert_eq!(hub.broadcast_from(&a, RelayFrame::Text("x".into())), 1);
        assert_eq!(hub.connection_count(), 2);
        assert_eq!(drain(&mut rx_c).len(), 1);
    }

    #[test]
    fn test_unregister() {
        let hub = RelayHub::new("ready");
        let (a, _rx) = hub.register();
        assert!(hub.unregister(&a));
        assert!(!hub.unregister(&a));
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn test_lone_sender_reaches_nobody() {
        let hub = RelayHub::new("ready");
        let (a, mut rx_a) = hub.register();
        drain(&mut rx_a);
        assert_eq!(hub.relay(&a, RelayFrame::Text("{}".into())), 0);
        assert!(drain(&mut rx_a).is_empty());
    }
}

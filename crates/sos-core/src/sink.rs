//! Outbound envelope sinks

use sos_types::SignalEnvelope;
use tokio::sync::mpsc;

/// Where the escalation controller hands finished envelopes.
///
/// `send` must not block: network delivery happens elsewhere.
pub trait EnvelopeSink: Send + Sync {
    fn send(&self, envelope: SignalEnvelope);
}

/// Sink backed by an unbounded channel, drained by an uplink task
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SignalEnvelope>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SignalEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EnvelopeSink for ChannelSink {
    fn send(&self, envelope: SignalEnvelope) {
        if self.tx.send(envelope).is_err() {
            tracing::debug!("Envelope sink closed, dropping envelope");
        }
    }
}

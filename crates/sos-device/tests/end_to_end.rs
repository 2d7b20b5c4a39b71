//! Device runtime against a live relay on an ephemeral port.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::StreamExt;
use sos_device::config::DeviceConfig;
use sos_device::{watch, DeviceSession, Inbound, Uplink};
use sos_relay::config::RelayConfig;
use sos_relay::Server;
use sos_types::{Coord, SignalEnvelope, Stage};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_relay() -> (SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::new(RelayConfig::default()).unwrap();

    let (stop, stopped) = oneshot::channel::<()>();
    tokio::spawn(async move {
        server
            .serve(listener, async move {
                let _ = stopped.await;
            })
            .await
            .unwrap();
    });
    (addr, stop)
}

/// A dispatcher connection, past the handshake
async fn dispatcher(addr: SocketAddr) -> Client {
    let (mut client, _) = connect_async(format!("ws://{}/", addr)).await.unwrap();
    match next_inbound(&mut client).await {
        Inbound::Handshake(handshake) => assert_eq!(handshake.status, "connected"),
        other => panic!("expected handshake, got {:?}", other),
    }
    client
}

async fn next_inbound(client: &mut Client) -> Inbound {
    let message = timeout(Duration::from_secs(10), client.next())
        .await
        .expect("timed out waiting for the relay")
        .expect("relay closed")
        .expect("socket error");
    match message {
        Message::Text(text) => Inbound::classify(&text),
        other => panic!("unexpected frame {:?}", other),
    }
}

fn config_for(addr: SocketAddr) -> DeviceConfig {
    let mut config = DeviceConfig::default();
    config.relay_url = format!("ws://{}/", addr);
    config.reconnect_initial_ms = 20;
    config.reconnect_max_ms = 100;
    config
}

fn risk(id: &str) -> SignalEnvelope {
    SignalEnvelope::builder(id, Stage::Risk)
        .coords(Some(Coord::new(19.2183, 73.0868)))
        .station(Some("Thane Police Station".to_string()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_uplink_delivers_to_dispatchers() {
    let (addr, _stop) = start_relay().await;
    let mut watcher = dispatcher(addr).await;

    let (tx, rx) = mpsc::unbounded_channel();
    let uplink = tokio::spawn(Uplink::new(&config_for(addr)).run(rx));

    tx.send(risk("USER_1")).unwrap();
    tx.send(risk("USER_2")).unwrap();

    for expected in ["USER_1", "USER_2"] {
        match next_inbound(&mut watcher).await {
            Inbound::Envelope(envelope) => {
                assert_eq!(envelope.id(), expected);
                assert_eq!(envelope.mode(), Stage::Risk);
                assert_eq!(envelope.station(), Some("Thane Police Station"));
            }
            other => panic!("expected envelope, got {:?}", other),
        }
    }

    drop(tx);
    timeout(Duration::from_secs(5), uplink)
        .await
        .expect("uplink did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_uplink_drops_envelopes_while_relay_unreachable() {
    // Reserve a port, then free it so nothing is listening.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let uplink = tokio::spawn(Uplink::new(&config_for(addr)).run(rx));

    for i in 0..5 {
        tx.send(risk(&format!("USER_{}", i))).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    drop(tx);

    timeout(Duration::from_secs(5), uplink)
        .await
        .expect("uplink kept retrying after its source closed")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_watch_reports_each_message() {
    let (addr, _stop) = start_relay().await;

    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    let url = format!("ws://{}/", addr);
    let watcher = tokio::spawn(async move {
        watch(&url, move |inbound| {
            let _ = seen_tx.send(inbound);
        })
        .await
    });

    let first = timeout(Duration::from_secs(5), seen.recv()).await.unwrap();
    assert!(matches!(first, Some(Inbound::Handshake(_))));

    let mut device = dispatcher(addr).await;
    futures_util::SinkExt::send(&mut device, Message::Text(risk("USER_123").to_json()))
        .await
        .unwrap();
    futures_util::SinkExt::send(&mut device, Message::Text("garbage".to_string()))
        .await
        .unwrap();

    let envelope = timeout(Duration::from_secs(5), seen.recv()).await.unwrap();
    assert!(matches!(envelope, Some(Inbound::Envelope(e)) if e.id() == "USER_123"));
    let garbage = timeout(Duration::from_secs(5), seen.recv()).await.unwrap();
    assert!(matches!(garbage, Some(Inbound::Unreadable(_))));

    assert!(!watcher.is_finished());
    watcher.abort();
}

#[tokio::test]
async fn test_session_triple_reaches_dispatcher_as_proof() {
    let (addr, _stop) = start_relay().await;
    let mut watcher = dispatcher(addr).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(addr);
    config.profile_path = dir.path().join("profile.json");
    // Lookups fail fast against a closed port.
    config.nominatim_url = "http://127.0.0.1:9/reverse".to_string();
    config.escalation.recording_secs = 1;
    config.simulation.fix_interval_ms = 50;
    config.simulation.jitter_deg = 0.0;
    config.simulation.audio_chunk_ms = 100;

    let (mut console, input) = tokio::io::duplex(256);
    let session = tokio::spawn(
        DeviceSession::new(config.clone()).run(tokio::io::BufReader::new(input)),
    );

    // Let a position fix land before the gesture.
    tokio::time::sleep(Duration::from_millis(300)).await;
    console.write_all(b"triple\n").await.unwrap();

    match next_inbound(&mut watcher).await {
        Inbound::Envelope(envelope) => {
            assert_eq!(envelope.id(), "USER_123");
            assert_eq!(envelope.mode(), Stage::Proof);
            let audio = envelope.audio().expect("proof carries audio");
            assert!(audio.starts_with("data:audio/webm;base64,"));
            let coords = envelope.coords().expect("proof carries coords");
            assert!((coords.lat - 19.2183).abs() < 1e-9);
        }
        other => panic!("expected PROOF envelope, got {:?}", other),
    }

    console.write_all(b"quit\n").await.unwrap();
    timeout(Duration::from_secs(10), session)
        .await
        .expect("session did not end")
        .unwrap()
        .unwrap();

    let stored = std::fs::read_to_string(&config.profile_path).unwrap();
    assert!(stored.contains("PROOF"));
}

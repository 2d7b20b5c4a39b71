//! Relay behaviour over real sockets on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use sos_relay::config::RelayConfig;
use sos_relay::{RelayHub, Server};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Relay {
    addr: SocketAddr,
    hub: Arc<RelayHub>,
    _stop: oneshot::Sender<()>,
}

async fn start_relay(config: RelayConfig) -> Relay {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::new(config).unwrap();
    let hub = server.hub();

    let (stop, stopped) = oneshot::channel::<()>();
    tokio::spawn(async move {
        server
            .serve(listener, async move {
                let _ = stopped.await;
            })
            .await
            .unwrap();
    });

    Relay {
        addr,
        hub,
        _stop: stop,
    }
}

/// Connect and consume the handshake, which also proves registration
async fn connect(addr: SocketAddr) -> Client {
    let (mut client, _) = connect_async(format!("ws://{}/", addr)).await.unwrap();
    let handshake = next_message(&mut client).await;
    let value: serde_json::Value = match handshake {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("unexpected first frame {:?}", other),
    };
    assert_eq!(value["status"], "connected");
    client
}

async fn next_message(client: &mut Client) -> Message {
    timeout(Duration::from_secs(5), client.next())
        .await
        .expect("timed out waiting for frame")
        .expect("stream ended")
        .expect("socket error")
}

async fn assert_silent(client: &mut Client) {
    assert!(
        timeout(Duration::from_millis(200), client.next())
            .await
            .is_err(),
        "unexpected frame"
    );
}

const RISK: &str = r#"{"id":"USER_123","mode":"RISK","coords":{"lat":19.2,"lng":73.0},"station":"Thane Police Station","timestamp":"2024-05-01T10:00:00.000Z"}"#;

#[tokio::test]
async fn test_handshake_carries_configured_message() {
    let relay = start_relay(RelayConfig::default()).await;
    let (mut client, _) = connect_async(format!("ws://{}/", relay.addr))
        .await
        .unwrap();

    match next_message(&mut client).await {
        Message::Text(text) => {
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value["status"], "connected");
            assert_eq!(value["message"], "Dispatch Hub Ready");
        }
        other => panic!("unexpected frame {:?}", other),
    }
}

#[tokio::test]
async fn test_fanout_skips_sender_and_delivers_once() {
    let relay = start_relay(RelayConfig::default()).await;
    let mut device = connect(relay.addr).await;
    let mut dispatcher_a = connect(relay.addr).await;
    let mut dispatcher_b = connect(relay.addr).await;
    assert_eq!(relay.hub.connection_count(), 3);

    for i in 0..3 {
        let payload = RISK.replace("USER_123", &format!("USER_{}", i));
        device.send(Message::Text(payload)).await.unwrap();
    }

    for dispatcher in [&mut dispatcher_a, &mut dispatcher_b] {
        for i in 0..3 {
            let expected = RISK.replace("USER_123", &format!("USER_{}", i));
            assert_eq!(next_message(dispatcher).await, Message::Text(expected));
        }
        assert_silent(dispatcher).await;
    }
    assert_silent(&mut device).await;
}

#[tokio::test]
async fn test_malformed_payload_is_forwarded_and_connection_survives() {
    let relay = start_relay(RelayConfig::default()).await;
    let mut sender = connect(relay.addr).await;
    let mut peer = connect(relay.addr).await;

    sender
        .send(Message::Text("not an envelope".to_string()))
        .await
        .unwrap();
    assert_eq!(
        next_message(&mut peer).await,
        Message::Text("not an envelope".to_string())
    );

    sender
        .send(Message::Binary(vec![0xde, 0xad, 0xbe, 0xef]))
        .await
        .unwrap();
    assert_eq!(
        next_message(&mut peer).await,
        Message::Binary(vec![0xde, 0xad, 0xbe, 0xef])
    );

    sender.send(Message::Text(RISK.to_string())).await.unwrap();
    assert_eq!(
        next_message(&mut peer).await,
        Message::Text(RISK.to_string())
    );
}

#[tokio::test]
async fn test_closed_peer_leaves_broadcast_set() {
    let relay = start_relay(RelayConfig::default()).await;
    let mut sender = connect(relay.addr).await;
    let mut stays = connect(relay.addr).await;
    let mut leaves = connect(relay.addr).await;

    leaves.close(None).await.unwrap();
    timeout(Duration::from_secs(5), async {
        while relay.hub.connection_count() != 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection was never removed");

    sender.send(Message::Text(RISK.to_string())).await.unwrap();
    assert_eq!(
        next_message(&mut stays).await,
        Message::Text(RISK.to_string())
    );
}

#[tokio::test]
async fn test_health_reports_connections() {
    let relay = start_relay(RelayConfig::default()).await;
    let _a = connect(relay.addr).await;
    let _b = connect(relay.addr).await;

    let body: serde_json::Value = reqwest::get(format!("http://{}/health", relay.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["connections"], 2);
}

#[tokio::test]
async fn test_root_without_dashboard_is_not_found() {
    let relay = start_relay(RelayConfig::default()).await;

    let response = reqwest::get(format!("http://{}/", relay.addr)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dashboard_served_with_spa_fallback() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<html>dispatch</html>").unwrap();
    std::fs::write(dir.path().join("app.js"), "console.log('sos')").unwrap();

    let mut config = RelayConfig::default();
    config.server.static_dir = Some(dir.path().to_path_buf());
    let relay = start_relay(config).await;

    let index = reqwest::get(format!("http://{}/", relay.addr)).await.unwrap();
    assert!(index.status().is_success());
    assert_eq!(index.text().await.unwrap(), "<html>dispatch</html>");

    let asset = reqwest::get(format!("http://{}/app.js", relay.addr))
        .await
        .unwrap();
    assert_eq!(asset.text().await.unwrap(), "console.log('sos')");

    let deep_link = reqwest::get(format!("http://{}/dispatch/USER_123", relay.addr))
        .await
        .unwrap();
    assert!(deep_link.status().is_success());
    assert_eq!(deep_link.text().await.unwrap(), "<html>dispatch</html>");

    // The socket still works alongside the dashboard.
    let mut a = connect(relay.addr).await;
    let mut b = connect(relay.addr).await;
    a.send(Message::Text(RISK.to_string())).await.unwrap();
    assert_eq!(next_message(&mut b).await, Message::Text(RISK.to_string()));
}

#[test]
fn test_missing_static_dir_is_rejected() {
    let mut config = RelayConfig::default();
    config.server.static_dir = Some("/definitely/not/a/dashboard".into());
    assert!(Server::new(config).is_err());
}

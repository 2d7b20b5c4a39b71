//! Relay socket handler.
//!
//! One task per connection: a writer drains the connection's outbound queue
//! while the reader loop hands every inbound frame to the hub.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::Request,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{debug, warn};

use crate::api::state::AppState;
use crate::error::{ApiError, RelayError};
use crate::hub::{RelayFrame, RelayHub};

/// `GET /`: relay socket on upgrade, dashboard entry point otherwise
pub async fn root(
    State(state): State<AppState>,
    ws: Option<WebSocketUpgrade>,
    request: Request<Body>,
) -> Response {
    if let Some(ws) = ws {
        let hub = state.hub.clone();
        return ws.on_upgrade(move |socket| handle_socket(socket, hub));
    }

    let Some(index) = state.index_path() else {
        return ApiError::NotFound("no dashboard is served by this relay".to_string())
            .into_response();
    };
    match ServeFile::new(index).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(e) => ApiError::Internal(e.to_string()).into_response(),
    }
}

/// Drive one established relay connection until it closes
pub async fn handle_socket(socket: WebSocket, hub: Arc<RelayHub>) {
    let (mut sender, mut receiver) = socket.split();
    let (id, mut outbound) = hub.register();

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sender.send(frame.into()).await.is_err() {
                break;
            }
        }
    });

    while let Some(next) = receiver.next().await {
        match next {
            Ok(Message::Text(text)) => {
                hub.relay(&id, RelayFrame::Text(text));
            }
            Ok(Message::Binary(bytes)) => {
                hub.relay(&id, RelayFrame::Binary(bytes));
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                debug!(connection_id = %id, "Client closed relay connection");
                break;
            }
            Err(e) => {
                let err = RelayError::ConnectionLost(e.to_string());
                warn!(connection_id = %id, error = %err, "Relay connection dropped");
                break;
            }
        }
    }

    hub.unregister(&id);
    writer.abort();
}

impl From<RelayFrame> for Message {
    fn from(frame: RelayFrame) -> Self {
        match frame {
            RelayFrame::Text(text) => Message::Text(text),
            RelayFrame::Binary(bytes) => Message::Binary(bytes),
        }
    }
}

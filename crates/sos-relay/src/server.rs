//! Server setup and lifecycle management

use crate::api::{create_router, AppState};
use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use crate::hub::RelayHub;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Relay server
pub struct Server {
    config: RelayConfig,
    hub: Arc<RelayHub>,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: RelayConfig) -> RelayResult<Self> {
        if let Some(dir) = &config.server.static_dir {
            if !dir.is_dir() {
                return Err(RelayError::Config(format!(
                    "Static directory does not exist: {}",
                    dir.display()
                )));
            }
        }

        let hub = Arc::new(RelayHub::new(config.server.handshake_message.clone()));
        Ok(Self { config, hub })
    }

    /// The hub shared by every connection
    pub fn hub(&self) -> Arc<RelayHub> {
        self.hub.clone()
    }

    /// Bind the configured address and serve until Ctrl+C or SIGTERM
    pub async fn run(self) -> RelayResult<()> {
        let listener = TcpListener::bind(self.config.server.listen_addr).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> RelayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        let state = AppState::new(self.hub.clone(), self.config.server.static_dir.clone());
        let app = create_router(state, self.config.server.enable_cors);

        tracing::info!("Relay hub listening on {}", addr);
        if let Some(dir) = &self.config.server.static_dir {
            tracing::info!("Serving dashboard from {}", dir.display());
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| RelayError::Server(e.to_string()))?;

        tracing::info!(
            connections = self.hub.connection_count(),
            "Relay hub shutting down"
        );
        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}

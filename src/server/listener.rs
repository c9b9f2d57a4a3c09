//! Relay server listener
//!
//! Binds the ingestion and HTTP listeners, runs both axum services, the
//! reaper, and coordinates shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{ingest, relay, AppState};
use crate::error::Result;
use crate::registry::{RegistryConfig, SessionRegistry};
use crate::server::config::ServerConfig;
use crate::worker::Collaborators;

/// How long listeners get to finish open connections after shutdown
const LISTENER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Live camera relay server
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    collaborators: Collaborators,
}

impl RelayServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry_config(config, RegistryConfig::default())
    }

    /// Create a new server with custom registry configuration
    pub fn with_registry_config(config: ServerConfig, registry_config: RegistryConfig) -> Self {
        let collaborators = Collaborators::default().alert_cooldown(config.alert_cooldown);
        Self {
            config,
            registry: Arc::new(SessionRegistry::with_config(registry_config)),
            collaborators,
        }
    }

    /// Replace the face matcher, notifier and user directory
    ///
    /// The alert cooldown from the server config still applies.
    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators.alert_cooldown(self.config.alert_cooldown);
        self
    }

    /// Get a reference to the session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run the server
    ///
    /// This method blocks until a listener fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let ingest = TcpListener::bind(self.config.ingest_addr).await?;
        let http = TcpListener::bind(self.config.http_addr).await?;
        self.serve(ingest, http, shutdown).await
    }

    /// Serve on already bound listeners
    pub async fn serve<F>(&self, ingest: TcpListener, http: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let token = CancellationToken::new();
        let state = AppState {
            registry: Arc::clone(&self.registry),
            config: Arc::new(self.config.clone()),
            collaborators: self.collaborators.clone(),
            shutdown: token.clone(),
        };

        tracing::info!(addr = %ingest.local_addr()?, "Ingestion listening (WebSocket)");
        tracing::info!(addr = %http.local_addr()?, "Relay listening (HTTP)");

        let reaper = self.registry.spawn_reaper(token.clone());

        let ingest_app =
            ingest::router(state.clone()).into_make_service_with_connect_info::<SocketAddr>();
        let ingest_shutdown = token.clone();
        let mut ingest_task: JoinHandle<std::io::Result<()>> = tokio::spawn(async move {
            axum::serve(ingest, ingest_app)
                .with_graceful_shutdown(async move { ingest_shutdown.cancelled().await })
                .await
        });

        let http_app = relay::router(state);
        let http_shutdown = token.clone();
        let mut http_task: JoinHandle<std::io::Result<()>> = tokio::spawn(async move {
            axum::serve(http, http_app)
                .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
                .await
        });

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = &mut ingest_task => {
                tracing::error!("Ingestion listener exited");
                flatten(result)
            }
            result = &mut http_task => {
                tracing::error!("Relay listener exited");
                flatten(result)
            }
        };

        token.cancel();

        let sessions = self.registry.shutdown_all().await;
        tracing::info!(sessions, "Sessions torn down");

        for mut task in [ingest_task, http_task] {
            if task.is_finished() {
                continue;
            }
            if tokio::time::timeout(LISTENER_DRAIN_TIMEOUT, &mut task).await.is_err() {
                tracing::warn!("Listener did not drain in time, aborting");
                task.abort();
            }
        }

        let _ = reaper.await;
        result
    }
}

fn flatten(result: std::result::Result<std::io::Result<()>, tokio::task::JoinError>) -> Result<()> {
    Ok(result??)
}

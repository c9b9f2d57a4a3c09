//! Network front ends
//!
//! Two listeners share one [`AppState`]:
//! - [`ingest`]: WebSocket endpoint cameras push frames into
//! - [`relay`]: HTTP endpoint viewers pull annotated MJPEG streams from

pub mod config;
pub mod ingest;
pub mod listener;
pub mod relay;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::registry::SessionRegistry;
use crate::worker::Collaborators;

pub use config::ServerConfig;
pub use listener::RelayServer;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<ServerConfig>,
    pub collaborators: Collaborators,
    /// Cancelled when the server begins shutting down
    pub shutdown: CancellationToken,
}

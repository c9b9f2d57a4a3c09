//! Garud relay server
//!
//! Accepts camera WebSocket connections, annotates their frames and relays
//! them to viewers as MJPEG.
//!
//! ## Usage
//!
//! ```bash
//! # Defaults: cameras on :8888, viewers on :5000
//! garud-server
//!
//! # Custom ports and a shorter idle timeout
//! GARUD_INGEST_ADDR=0.0.0.0:9000 GARUD_HTTP_ADDR=0.0.0.0:8080 GARUD_IDLE_TIMEOUT_SECS=20 garud-server
//!
//! # Owner lookup from a JSON file
//! GARUD_DIRECTORY=./owners.json garud-server
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use garud::{Collaborators, RegistryConfig, RelayServer, ServerConfig, StaticDirectory};

/// Server configuration from environment
struct Config {
    server: ServerConfig,
    registry: RegistryConfig,
    directory_path: Option<PathBuf>,
    face_model_path: Option<PathBuf>,
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_secs)
}

impl Config {
    fn from_env() -> Self {
        let mut server = ServerConfig::default();
        if let Some(addr) = env_parse::<SocketAddr>("GARUD_INGEST_ADDR") {
            server = server.ingest_addr(addr);
        }
        if let Some(addr) = env_parse::<SocketAddr>("GARUD_HTTP_ADDR") {
            server = server.http_addr(addr);
        }
        if let Some(frames) = env_parse("GARUD_RECOGNITION_INTERVAL") {
            server = server.recognition_interval(frames);
        }
        if let Some(cooldown) = env_secs("GARUD_ALERT_COOLDOWN_SECS") {
            server = server.alert_cooldown(cooldown);
        }
        if let Some(quality) = env_parse("GARUD_JPEG_QUALITY") {
            server = server.jpeg_quality(quality);
        }
        if let Some(stall) = env_secs("GARUD_STALL_TIMEOUT_SECS") {
            server = server.stall_timeout(stall);
        }

        let mut registry = RegistryConfig::default();
        if let Some(idle) = env_secs("GARUD_IDLE_TIMEOUT_SECS") {
            registry = registry.idle_timeout(idle);
        }
        if let Some(interval) = env_secs("GARUD_REAP_INTERVAL_SECS") {
            registry = registry.reap_interval(interval);
        }

        Self {
            server,
            registry,
            directory_path: std::env::var("GARUD_DIRECTORY").map(PathBuf::from).ok(),
            face_model_path: std::env::var("GARUD_FACE_MODEL").map(PathBuf::from).ok(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = Config::from_env();

    info!("Garud relay starting");
    info!("  Ingestion: ws://{}", config.server.ingest_addr);
    info!("  Relay: http://{}", config.server.http_addr);
    info!("  Idle timeout: {:?}", config.registry.idle_timeout);
    info!("  Recognition interval: {} frames", config.server.recognition_interval);

    let mut collaborators = Collaborators::default();

    if let Some(ref path) = config.directory_path {
        let directory = StaticDirectory::from_file(path)
            .with_context(|| format!("Failed to load user directory {:?}", path))?;
        info!("  Directory: {} owners from {:?}", directory.len(), path);
        collaborators = collaborators.directory(directory);
    }

    if let Some(ref path) = config.face_model_path {
        collaborators = with_face_model(collaborators, path)?;
    } else {
        info!("  Face matcher: none (set GARUD_FACE_MODEL to enable detection)");
    }

    let server = RelayServer::with_registry_config(config.server, config.registry)
        .with_collaborators(collaborators);

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Relay server error")?;

    info!("Garud relay stopped");
    Ok(())
}

#[cfg(feature = "rustface")]
fn with_face_model(collaborators: Collaborators, path: &std::path::Path) -> Result<Collaborators> {
    let matcher = garud::recognition::RustfaceMatcher::from_file(path)
        .with_context(|| format!("Failed to load face model {:?}", path))?;
    info!("  Face matcher: rustface ({:?})", path);
    Ok(collaborators.matcher(matcher))
}

#[cfg(not(feature = "rustface"))]
fn with_face_model(collaborators: Collaborators, path: &std::path::Path) -> Result<Collaborators> {
    tracing::warn!(
        "GARUD_FACE_MODEL={:?} ignored: built without the `rustface` feature",
        path
    );
    Ok(collaborators)
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("garud=info")),
        )
        .init();
}

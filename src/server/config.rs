//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::media::{DEFAULT_JPEG_QUALITY, MIN_FRAME_BYTES};
use crate::notify::DEFAULT_ALERT_COOLDOWN;
use crate::recognition::throttle::DEFAULT_RECOGNITION_INTERVAL;
use crate::worker::WorkerSettings;

/// Default WebSocket ingestion port
pub const DEFAULT_INGEST_PORT: u16 = 8888;

/// Default HTTP relay port
pub const DEFAULT_HTTP_PORT: u16 = 5000;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address cameras connect to (WebSocket)
    pub ingest_addr: SocketAddr,

    /// Address viewers connect to (HTTP)
    pub http_addr: SocketAddr,

    /// Session id must arrive within this time
    pub handshake_timeout: Duration,

    /// Largest accepted WebSocket message
    pub max_message_size: usize,

    /// Smaller binary payloads are rejected without decoding
    pub min_frame_bytes: usize,

    /// Input queue capacity per session
    pub input_capacity: usize,

    /// Output queue capacity per session
    pub output_capacity: usize,

    /// Worker wait on the input queue before re-checking the running flag
    pub worker_poll: Duration,

    /// Relay wait on the output queue before sending a keep-alive frame
    pub relay_poll: Duration,

    /// Relay ends a stream after this long without a real frame
    pub stall_timeout: Duration,

    /// Frames between forced identification passes
    pub recognition_interval: u32,

    /// Minimum time between alerts for the same label
    pub alert_cooldown: Duration,

    /// JPEG quality for relayed frames
    pub jpeg_quality: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ingest_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_INGEST_PORT)),
            http_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_HTTP_PORT)),
            handshake_timeout: Duration::from_secs(10),
            max_message_size: 10 * 1024 * 1024, // 10MB
            min_frame_bytes: MIN_FRAME_BYTES,
            input_capacity: 5,
            output_capacity: 5,
            worker_poll: Duration::from_millis(500),
            relay_poll: Duration::from_secs(1),
            stall_timeout: Duration::from_secs(10),
            recognition_interval: DEFAULT_RECOGNITION_INTERVAL,
            alert_cooldown: DEFAULT_ALERT_COOLDOWN,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind addresses
    pub fn with_addrs(ingest_addr: SocketAddr, http_addr: SocketAddr) -> Self {
        Self {
            ingest_addr,
            http_addr,
            ..Default::default()
        }
    }

    /// Set the ingestion bind address
    pub fn ingest_addr(mut self, addr: SocketAddr) -> Self {
        self.ingest_addr = addr;
        self
    }

    /// Set the HTTP bind address
    pub fn http_addr(mut self, addr: SocketAddr) -> Self {
        self.http_addr = addr;
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set maximum WebSocket message size
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set minimum frame payload size
    pub fn min_frame_bytes(mut self, size: usize) -> Self {
        self.min_frame_bytes = size;
        self
    }

    /// Set input and output queue capacities (minimum 1)
    pub fn queue_capacity(mut self, input: usize, output: usize) -> Self {
        self.input_capacity = input.max(1);
        self.output_capacity = output.max(1);
        self
    }

    /// Set worker poll interval
    pub fn worker_poll(mut self, poll: Duration) -> Self {
        self.worker_poll = poll;
        self
    }

    /// Set relay poll interval (keep-alive cadence)
    pub fn relay_poll(mut self, poll: Duration) -> Self {
        self.relay_poll = poll;
        self
    }

    /// Set relay stall timeout
    pub fn stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Set recognition interval (minimum 1)
    pub fn recognition_interval(mut self, frames: u32) -> Self {
        self.recognition_interval = frames.max(1);
        self
    }

    /// Set alert cooldown
    pub fn alert_cooldown(mut self, cooldown: Duration) -> Self {
        self.alert_cooldown = cooldown;
        self
    }

    /// Set JPEG quality (1-100)
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Worker tuning derived from this config
    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            poll: self.worker_poll,
            recognition_interval: self.recognition_interval,
        }
    }
}

//! Statistics and metrics for relay sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Live per-session counters
///
/// Updated concurrently by the ingestion handler and the worker, so every
/// field is atomic. Use [`SessionStats::snapshot`] for a consistent-enough
/// view to report.
#[derive(Debug)]
pub struct SessionStats {
    started_at: Instant,
    /// Binary frames received (accepted or not)
    frames_received: AtomicU64,
    /// Frames rejected as undersized or undecodable
    frames_rejected: AtomicU64,
    /// Frames evicted from the input queue by newer ones
    input_evictions: AtomicU64,
    /// Frames annotated by the worker
    frames_processed: AtomicU64,
    /// Annotated frames evicted from the output queue
    output_evictions: AtomicU64,
    /// Full identification passes run
    recognition_passes: AtomicU64,
    /// Notifications dispatched
    notifications: AtomicU64,
}

impl SessionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            frames_received: AtomicU64::new(0),
            frames_rejected: AtomicU64::new(0),
            input_evictions: AtomicU64::new(0),
            frames_processed: AtomicU64::new(0),
            output_evictions: AtomicU64::new(0),
            recognition_passes: AtomicU64::new(0),
            notifications: AtomicU64::new(0),
        }
    }

    /// Count a received frame, returning its sequence number
    pub fn record_received(&self) -> u64 {
        self.frames_received.fetch_add(1, Ordering::Relaxed)
    }

    pub fn record_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_input_eviction(&self) {
        self.input_evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a processed frame, returning the new total
    pub fn record_processed(&self) -> u64 {
        self.frames_processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_output_eviction(&self) {
        self.output_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recognition_pass(&self) {
        self.recognition_passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the stats were created
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Average processed frames per second since creation
    pub fn processing_fps(&self) -> f64 {
        let secs = self.uptime().as_secs_f64();
        if secs > 0.0 {
            self.frames_processed.load(Ordering::Relaxed) as f64 / secs
        } else {
            0.0
        }
    }

    /// Take a point-in-time copy of the counters
    pub fn snapshot(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            input_evictions: self.input_evictions.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            output_evictions: self.output_evictions.load(Ordering::Relaxed),
            recognition_passes: self.recognition_passes.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            processing_fps: self.processing_fps(),
        }
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable copy of [`SessionStats`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStatsSnapshot {
    pub frames_received: u64,
    pub frames_rejected: u64,
    pub input_evictions: u64,
    pub frames_processed: u64,
    pub output_evictions: u64,
    pub recognition_passes: u64,
    pub notifications: u64,
    pub processing_fps: f64,
}

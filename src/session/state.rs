//! Per-client session state
//!
//! A [`Session`] is created when a camera completes the registration
//! handshake and is shared (via `Arc`) between the ingestion connection, the
//! worker, any viewers and the registry.
//!
//! ```text
//!   Registered ──first processed frame──► Active
//!       │                                   │
//!       └──────────────stop()───────────────┤
//!                                           ▼
//!                                        Draining ──worker joined──► Terminated
//! ```
//!
//! Phases only move forward. Cancellation (the running flag) is a
//! [`CancellationToken`]; once cancelled it stays cancelled.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::media::Frame;
use crate::queue::FrameQueue;
use crate::stats::SessionStats;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum SessionPhase {
    /// Handshake complete, no frame processed yet
    Registered = 0,
    /// At least one frame processed
    Active = 1,
    /// Stopped; worker may still be exiting
    Draining = 2,
    /// Worker gone
    Terminated = 3,
}

impl SessionPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionPhase::Registered,
            1 => SessionPhase::Active,
            2 => SessionPhase::Draining,
            _ => SessionPhase::Terminated,
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Registered => "registered",
            SessionPhase::Active => "active",
            SessionPhase::Draining => "draining",
            SessionPhase::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Why a session was torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    /// Client sent DISCONNECT or a close frame
    Disconnect,
    /// Transport failed or the peer vanished
    ConnectionLost,
    /// A new registration claimed the same id
    Replaced,
    /// No activity within the idle timeout
    Idle,
    /// Server is shutting down
    Shutdown,
    /// The worker hit a fatal error
    WorkerFailed,
}

impl fmt::Display for TeardownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            TeardownReason::Disconnect => "client disconnected",
            TeardownReason::ConnectionLost => "connection lost",
            TeardownReason::Replaced => "replaced by new registration",
            TeardownReason::Idle => "idle timeout",
            TeardownReason::Shutdown => "server shutdown",
            TeardownReason::WorkerFailed => "worker failed",
        };
        f.write_str(reason)
    }
}

/// Server-side state for one connected camera
pub struct Session {
    id: String,
    instance: u64,

    /// Decoded frames waiting for the worker
    pub input: FrameQueue<Frame>,

    /// Annotated frames waiting for the relay
    pub output: FrameQueue<Frame>,

    running: CancellationToken,
    stop_reason: OnceLock<TeardownReason>,
    phase: AtomicU8,
    created_at: Instant,

    /// Nanoseconds after `created_at` of the last activity
    last_active: AtomicU64,

    worker: Mutex<Option<JoinHandle<()>>>,

    pub stats: SessionStats,
}

impl Session {
    /// Create a session with the given queue capacities
    pub fn new(id: impl Into<String>, input_capacity: usize, output_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            input: FrameQueue::new(input_capacity),
            output: FrameQueue::new(output_capacity),
            running: CancellationToken::new(),
            stop_reason: OnceLock::new(),
            phase: AtomicU8::new(SessionPhase::Registered as u8),
            created_at: Instant::now(),
            last_active: AtomicU64::new(0),
            worker: Mutex::new(None),
            stats: SessionStats::new(),
        })
    }

    /// Client-supplied session id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Process-unique instance number
    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn advance(&self, phase: SessionPhase) -> SessionPhase {
        SessionPhase::from_u8(self.phase.fetch_max(phase as u8, Ordering::AcqRel))
    }

    /// Check if the session has not been stopped
    pub fn is_running(&self) -> bool {
        !self.running.is_cancelled()
    }

    /// Resolves once the session is stopped
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.running.cancelled()
    }

    /// Reason given by the call that stopped the session
    pub fn teardown_reason(&self) -> Option<TeardownReason> {
        self.stop_reason.get().copied()
    }

    /// Move `Registered → Active`; returns `true` on the transition
    pub fn mark_active(&self) -> bool {
        self.advance(SessionPhase::Active) == SessionPhase::Registered
    }

    /// Record activity now
    pub fn touch(&self) {
        let nanos = self.created_at.elapsed().as_nanos().min(u64::MAX as u128) as u64;
        self.last_active.fetch_max(nanos, Ordering::Relaxed);
    }

    /// Time of the last recorded activity
    pub fn last_active(&self) -> Instant {
        self.created_at + Duration::from_nanos(self.last_active.load(Ordering::Relaxed))
    }

    /// Time since the last recorded activity
    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_active())
    }

    /// Check if the last activity precedes `cutoff`
    pub fn is_idle_since(&self, cutoff: Instant) -> bool {
        self.last_active() < cutoff
    }

    /// Time since the session was created
    pub fn uptime(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Hand the worker's task handle to the session
    pub fn attach_worker(&self, handle: JoinHandle<()>) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        *worker = Some(handle);
    }

    /// Stop the session
    ///
    /// Clears the running flag, closes input and discards what is pending,
    /// and closes output so the worker and any viewer see end of stream.
    /// Returns `true` for the call that actually stopped it; only that
    /// call's `reason` is kept.
    pub fn stop(&self, reason: TeardownReason) -> bool {
        let first = self.advance(SessionPhase::Draining) < SessionPhase::Draining;
        if first {
            let _ = self.stop_reason.set(reason);
        }
        self.running.cancel();
        // Closed first so no frame slips in after the drain
        self.input.close();
        self.input.drain();
        self.output.close();
        first
    }

    /// Wait up to `grace` for the worker to exit, aborting it otherwise
    ///
    /// Returns `false` if the worker had to be aborted.
    pub async fn join_worker(&self, grace: Duration) -> bool {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(mut handle) = handle else {
            return true;
        };

        let clean = match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(
                    session = %self.id,
                    instance = self.instance,
                    error = %e,
                    "Worker task failed"
                );
                true
            }
            Err(_) => {
                tracing::warn!(
                    session = %self.id,
                    instance = self.instance,
                    grace_ms = grace.as_millis() as u64,
                    "Worker did not exit in time, aborting"
                );
                handle.abort();
                false
            }
        };

        self.advance(SessionPhase::Terminated);
        clean
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("instance", &self.instance)
            .field("phase", &self.phase())
            .field("running", &self.is_running())
            .field("input", &self.input)
            .field("output", &self.output)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{PutOutcome, Recv};
    use image::RgbImage;

    fn frame(seq: u64) -> Frame {
        Frame::new(RgbImage::new(2, 2), seq)
    }

    #[test]
    fn test_instances_are_unique() {
        let a = Session::new("cam", 5, 5);
        let b = Session::new("cam", 5, 5);
        assert_ne!(a.instance(), b.instance());
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_phase_only_moves_forward() {
        let session = Session::new("cam", 5, 5);
        assert_eq!(session.phase(), SessionPhase::Registered);

        assert!(session.mark_active());
        assert!(!session.mark_active());
        assert_eq!(session.phase(), SessionPhase::Active);

        assert!(session.stop(TeardownReason::Disconnect));
        assert_eq!(session.phase(), SessionPhase::Draining);

        // Too late to become active again
        assert!(!session.mark_active());
        assert_eq!(session.phase(), SessionPhase::Draining);
    }

    #[tokio::test]
    async fn test_stop_drains_and_closes() {
        let session = Session::new("cam", 5, 5);
        session.input.try_put(frame(0));
        session.input.try_put(frame(1));
        session.output.try_put(frame(0));

        assert!(session.is_running());
        assert!(session.stop(TeardownReason::Disconnect));
        assert!(!session.stop(TeardownReason::Disconnect));
        assert!(!session.is_running());

        // Ingestion racing the stop cannot refill the input
        assert_eq!(session.input.try_put(frame(2)), PutOutcome::Closed);

        // Pending input discarded, processed output still delivered
        assert!(matches!(session.input.try_get(), Some(Recv::End)));
        assert!(matches!(session.output.try_get(), Some(Recv::Item(_))));
        assert!(matches!(session.output.try_get(), Some(Recv::End)));

        // Cancellation future resolves immediately
        session.cancelled().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_and_idle() {
        let session = Session::new("cam", 5, 5);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(session.idle_for(), Duration::from_secs(30));

        session.touch();
        assert_eq!(session.idle_for(), Duration::ZERO);

        tokio::time::advance(Duration::from_secs(5)).await;
        let cutoff = Instant::now() - Duration::from_secs(10);
        assert!(!session.is_idle_since(cutoff));

        tokio::time::advance(Duration::from_secs(6)).await;
        let cutoff = Instant::now() - Duration::from_secs(10);
        assert!(session.is_idle_since(cutoff));
    }

    #[tokio::test]
    async fn test_join_worker_clean_exit() {
        let session = Session::new("cam", 5, 5);
        let token = session.running.clone();
        session.attach_worker(tokio::spawn(async move { token.cancelled().await }));

        session.stop(TeardownReason::Shutdown);
        assert!(session.join_worker(Duration::from_secs(1)).await);
        assert_eq!(session.phase(), SessionPhase::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_worker_aborts_stuck_worker() {
        let session = Session::new("cam", 5, 5);
        session.attach_worker(tokio::spawn(std::future::pending::<()>()));

        session.stop(TeardownReason::Shutdown);
        assert!(!session.join_worker(Duration::from_secs(2)).await);
        assert_eq!(session.phase(), SessionPhase::Terminated);
    }

    #[test]
    fn test_first_stop_reason_is_kept() {
        let session = Session::new("cam", 5, 5);
        assert_eq!(session.teardown_reason(), None);

        assert!(session.stop(TeardownReason::WorkerFailed));
        assert!(!session.stop(TeardownReason::ConnectionLost));
        assert_eq!(session.teardown_reason(), Some(TeardownReason::WorkerFailed));
    }

    #[test]
    fn test_teardown_reason_display() {
        assert_eq!(TeardownReason::Idle.to_string(), "idle timeout");
        assert_eq!(TeardownReason::Replaced.to_string(), "replaced by new registration");
    }
}

//! Frame processing worker
//!
//! One task per session. It pulls decoded frames from the session's input
//! queue, runs them through the recognition pipeline on the blocking pool,
//! and pushes annotated frames to the output queue.
//!
//! ```text
//!   input.get(poll) ──► spawn_blocking(process_frame) ──► output.try_put
//!         │                                                    │
//!    TimedOut: re-check running                     known labels ──► AlertGate ──► Notifier
//!    End: exit                                                       (detached task)
//! ```
//!
//! Whatever way the worker exits, the output queue is closed so viewers see
//! end of stream.

pub mod pipeline;

use std::sync::Arc;
use std::time::Duration;

use crate::directory::{NoDirectory, OwnerContext, UserDirectory};
use crate::error::WorkerError;
use crate::media::Frame;
use crate::notify::{AlertGate, LogNotifier, Notifier};
use crate::queue::{PutOutcome, Recv};
use crate::recognition::throttle::DEFAULT_RECOGNITION_INTERVAL;
use crate::recognition::{FaceMatcher, NullMatcher, RecognitionThrottle};
use crate::session::{Session, TeardownReason};

pub use pipeline::{process_frame, Processed};

/// External capabilities shared by every worker
#[derive(Clone)]
pub struct Collaborators {
    pub matcher: Arc<dyn FaceMatcher>,
    pub notifier: Arc<dyn Notifier>,
    pub directory: Arc<dyn UserDirectory>,
    /// Server-wide alert cooldown
    pub alerts: Arc<AlertGate>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            matcher: Arc::new(NullMatcher),
            notifier: Arc::new(LogNotifier),
            directory: Arc::new(NoDirectory),
            alerts: Arc::new(AlertGate::default()),
        }
    }
}

impl Collaborators {
    /// Set the face matcher
    pub fn matcher(mut self, matcher: impl FaceMatcher + 'static) -> Self {
        self.matcher = Arc::new(matcher);
        self
    }

    /// Set the notifier
    pub fn notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    /// Set the user directory
    pub fn directory(mut self, directory: impl UserDirectory + 'static) -> Self {
        self.directory = Arc::new(directory);
        self
    }

    /// Set the per-label alert cooldown
    pub fn alert_cooldown(mut self, cooldown: Duration) -> Self {
        self.alerts = Arc::new(AlertGate::new(cooldown));
        self
    }
}

/// Worker tuning
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// Input queue wait before re-checking the running flag
    pub poll: Duration,
    /// Frames between forced identification passes
    pub recognition_interval: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(500),
            recognition_interval: DEFAULT_RECOGNITION_INTERVAL,
        }
    }
}

/// Closes the output queue on drop, including on panic or abort
struct OutputCloser(Arc<Session>);

impl Drop for OutputCloser {
    fn drop(&mut self) {
        self.0.output.close();
    }
}

/// Processing loop for one session
pub struct Worker {
    session: Arc<Session>,
    collaborators: Collaborators,
    settings: WorkerSettings,
    throttle: RecognitionThrottle,
    owner: Option<Arc<OwnerContext>>,
}

impl Worker {
    /// Start the worker for `session` and attach its handle to the session
    pub fn spawn(session: Arc<Session>, collaborators: Collaborators, settings: WorkerSettings) {
        let worker = Worker {
            session: Arc::clone(&session),
            collaborators,
            settings,
            throttle: RecognitionThrottle::new(settings.recognition_interval),
            owner: None,
        };
        session.attach_worker(tokio::spawn(worker.run()));
    }

    async fn run(mut self) {
        let _closer = OutputCloser(Arc::clone(&self.session));
        let session = Arc::clone(&self.session);

        self.owner = match self.collaborators.directory.resolve(session.id()).await {
            Ok(owner) => owner.map(Arc::new),
            Err(e) => {
                tracing::warn!(session = %session.id(), error = %e, "Owner lookup failed");
                None
            }
        };

        tracing::debug!(
            session = %session.id(),
            instance = session.instance(),
            owner = self.owner.as_ref().map(|o| o.uid.as_str()).unwrap_or("-"),
            "Worker started"
        );

        while session.is_running() {
            let frame = match session.input.get(self.settings.poll).await {
                Recv::Item(frame) => frame,
                Recv::TimedOut => continue,
                Recv::End => break,
            };

            if let Err(e) = self.handle_frame(frame).await {
                tracing::error!(
                    session = %session.id(),
                    instance = session.instance(),
                    error = %e,
                    "Worker failed, stopping session"
                );
                session.stop(TeardownReason::WorkerFailed);
                break;
            }
        }

        tracing::debug!(
            session = %session.id(),
            instance = session.instance(),
            processed = session.stats.snapshot().frames_processed,
            "Worker exited"
        );
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<(), WorkerError> {
        let session = &self.session;
        let matcher = Arc::clone(&self.collaborators.matcher);
        let mut throttle = std::mem::replace(
            &mut self.throttle,
            RecognitionThrottle::new(self.settings.recognition_interval),
        );
        let id = session.id().to_string();
        let fps = session.stats.processing_fps();

        let (throttle, processed) = tokio::task::spawn_blocking(move || {
            let processed = process_frame(matcher.as_ref(), &mut throttle, frame, &id, fps);
            (throttle, processed)
        })
        .await
        .map_err(|e| WorkerError::Fatal(e.to_string()))?;
        self.throttle = throttle;

        session.stats.record_processed();
        if processed.recognition_pass {
            session.stats.record_recognition_pass();
        }
        if session.mark_active() {
            tracing::info!(session = %session.id(), instance = session.instance(), "Session active");
        }

        for label in processed.known_labels() {
            self.dispatch_alert(label);
        }

        match session.output.try_put(processed.frame) {
            PutOutcome::Stored => {}
            PutOutcome::Evicted => session.stats.record_output_eviction(),
            PutOutcome::Closed => {
                tracing::trace!(session = %session.id(), "Output closed, frame discarded");
            }
        }

        Ok(())
    }

    fn dispatch_alert(&self, label: &str) {
        if !self.collaborators.alerts.should_notify(label) {
            return;
        }
        self.session.stats.record_notification();

        let notifier = Arc::clone(&self.collaborators.notifier);
        let owner = self.owner.clone();
        let label = label.to_string();
        let session_id = self.session.id().to_string();

        tokio::spawn(async move {
            if let Err(e) = notifier
                .on_known_face_detected(&label, &session_id, owner.as_deref())
                .await
            {
                tracing::warn!(session = %session_id, label = %label, error = %e, "Notification failed");
            }
        });
    }
}

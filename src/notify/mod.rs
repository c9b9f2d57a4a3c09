//! Known-face notifications
//!
//! When a worker identifies a known person it hands the label to a
//! [`Notifier`]. Delivery (push messages, guardian escalation) lives behind
//! the trait; this module only decides *whether* to call it, via the
//! server-wide [`AlertGate`] cooldown.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::directory::OwnerContext;
use crate::error::CollaboratorError;

/// Default minimum time between alerts for the same label
pub const DEFAULT_ALERT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Receives known-face events
///
/// Called from a detached task; a slow or failing notifier never stalls
/// frame processing.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn on_known_face_detected(
        &self,
        label: &str,
        session_id: &str,
        owner: Option<&OwnerContext>,
    ) -> Result<(), CollaboratorError>;
}

/// Notifier that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn on_known_face_detected(
        &self,
        label: &str,
        session_id: &str,
        owner: Option<&OwnerContext>,
    ) -> Result<(), CollaboratorError> {
        tracing::info!(
            session = %session_id,
            label = %label,
            owner = owner.map(|o| o.uid.as_str()).unwrap_or("-"),
            guardians = owner.map(|o| o.guardians.len()).unwrap_or(0),
            "Known face detected"
        );
        Ok(())
    }
}

/// Per-label alert cooldown shared by every session
#[derive(Debug)]
pub struct AlertGate {
    cooldown: Duration,
    last_sent: Mutex<HashMap<String, Instant>>,
}

impl AlertGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether `label` may be alerted now, and if so start its cooldown
    pub fn should_notify(&self, label: &str) -> bool {
        let now = Instant::now();
        let mut last_sent = self.last_sent.lock().unwrap_or_else(PoisonError::into_inner);

        match last_sent.get(label) {
            Some(at) if now.duration_since(*at) < self.cooldown => false,
            _ => {
                last_sent.insert(label.to_string(), now);
                true
            }
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

impl Default for AlertGate {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_COOLDOWN)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Notifier recording every call
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub(crate) calls: Mutex<Vec<(String, String, Option<String>)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn on_known_face_detected(
            &self,
            label: &str,
            session_id: &str,
            owner: Option<&OwnerContext>,
        ) -> Result<(), CollaboratorError> {
            self.calls.lock().unwrap().push((
                label.to_string(),
                session_id.to_string(),
                owner.map(|o| o.uid.clone()),
            ));
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_gate_cooldown() {
        let gate = AlertGate::new(Duration::from_secs(300));

        assert!(gate.should_notify("alice"));
        assert!(!gate.should_notify("alice"));
        // Other labels are independent
        assert!(gate.should_notify("bob"));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(!gate.should_notify("alice"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(gate.should_notify("alice"));
        assert!(!gate.should_notify("alice"));
    }

    #[tokio::test]
    async fn test_log_notifier_succeeds() {
        LogNotifier
            .on_known_face_detected("alice", "cam-1", None)
            .await
            .unwrap();
    }
}

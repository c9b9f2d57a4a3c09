//! Session registry implementation
//!
//! The single owner of the id → session map. Every mutation happens through
//! one of the operations below; lock guards are never held across a worker
//! join or any other await that can take long.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::config::RegistryConfig;
use crate::session::{Session, TeardownReason};

/// Central registry of live sessions
pub struct SessionRegistry {
    /// Map of session id to the current instance
    sessions: RwLock<HashMap<String, Arc<Session>>>,

    /// Configuration
    config: RegistryConfig,
}

impl SessionRegistry {
    /// Create a new session registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new session registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Install a session, replacing any prior session with the same id
    ///
    /// The prior session is stopped while the write lock is held, so no
    /// lookup can observe both as running. Its worker is then joined
    /// (bounded by the teardown grace) before this returns.
    pub async fn register(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        let prior = {
            let mut sessions = self.sessions.write().await;
            let prior = sessions.insert(session.id().to_string(), Arc::clone(&session));
            if let Some(ref prior) = prior {
                prior.stop(TeardownReason::Replaced);
            }
            prior
        };

        match prior {
            Some(prior) => {
                tracing::info!(
                    session = %session.id(),
                    instance = session.instance(),
                    replaced = prior.instance(),
                    "Session registered, replacing prior instance"
                );
                prior.join_worker(self.config.teardown_grace).await;
                tracing::info!(
                    session = %prior.id(),
                    instance = prior.instance(),
                    reason = %TeardownReason::Replaced,
                    "Session torn down"
                );
                Some(prior)
            }
            None => {
                tracing::info!(
                    session = %session.id(),
                    instance = session.instance(),
                    "Session registered"
                );
                None
            }
        }
    }

    /// Look up the current session for `id`
    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Remove the entry for `id` without stopping it
    pub async fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(id)
    }

    /// Record activity for `id`; returns `false` if it is not registered
    pub async fn touch(&self, id: &str) -> bool {
        match self.sessions.read().await.get(id) {
            Some(session) => {
                session.touch();
                true
            }
            None => false,
        }
    }

    /// Sessions whose last activity precedes `cutoff`
    pub async fn list_idle(&self, cutoff: Instant) -> Vec<Arc<Session>> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|session| session.is_idle_since(cutoff))
            .cloned()
            .collect()
    }

    /// Tear a session down
    ///
    /// Stops the session, removes its entry if that entry is still this
    /// instance, and joins its worker. Safe to call more than once and on a
    /// session that has already been replaced. Returns `true` if the entry
    /// was removed by this call.
    ///
    /// A session already stopped elsewhere keeps its original reason.
    pub async fn terminate(&self, session: &Arc<Session>, reason: TeardownReason) -> bool {
        let stopped = session.stop(reason);

        let removed = {
            let mut sessions = self.sessions.write().await;
            match sessions.get(session.id()) {
                Some(current) if current.instance() == session.instance() => {
                    sessions.remove(session.id());
                    true
                }
                _ => false,
            }
        };

        session.join_worker(self.config.teardown_grace).await;

        // Replacement, reaping and shutdown log their own teardown
        if stopped || removed {
            tracing::info!(
                session = %session.id(),
                instance = session.instance(),
                reason = %session.teardown_reason().unwrap_or(reason),
                "Session torn down"
            );
        }

        removed
    }

    /// Reap a session if it is still registered and still idle
    ///
    /// Both conditions are checked under the write lock, so a session that
    /// was replaced or saw activity after it was listed is left alone.
    pub async fn reap_if_idle(&self, session: &Arc<Session>, cutoff: Instant) -> bool {
        let reaped = {
            let mut sessions = self.sessions.write().await;
            match sessions.get(session.id()) {
                Some(current)
                    if current.instance() == session.instance()
                        && session.is_idle_since(cutoff) =>
                {
                    sessions.remove(session.id());
                    session.stop(TeardownReason::Idle);
                    true
                }
                _ => false,
            }
        };

        if reaped {
            session.join_worker(self.config.teardown_grace).await;
            tracing::info!(
                session = %session.id(),
                instance = session.instance(),
                idle_secs = session.idle_for().as_secs(),
                reason = %TeardownReason::Idle,
                "Session torn down"
            );
        }

        reaped
    }

    /// Tear down every session concurrently
    pub async fn shutdown_all(&self) -> usize {
        let sessions: Vec<Arc<Session>> = {
            let mut map = self.sessions.write().await;
            map.drain().map(|(_, session)| session).collect()
        };

        for session in &sessions {
            session.stop(TeardownReason::Shutdown);
        }

        let grace = self.config.teardown_grace;
        join_all(sessions.iter().map(|session| session.join_worker(grace))).await;

        for session in &sessions {
            tracing::info!(
                session = %session.id(),
                instance = session.instance(),
                reason = %session.teardown_reason().unwrap_or(TeardownReason::Shutdown),
                "Session torn down"
            );
        }

        sessions.len()
    }

    /// Registered session ids, sorted
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Get total number of sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! Owner lookup for camera sessions
//!
//! A session id usually identifies the user who owns the camera. The worker
//! resolves it once at startup so notifications can carry the owner's
//! details; a missing or failing directory just means "no context".

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;

/// Who owns a camera and whom to escalate to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerContext {
    pub uid: String,
    pub name: String,
    /// Guardian user ids, in escalation order
    #[serde(default)]
    pub guardians: Vec<String>,
}

/// Resolves a session id to its owner
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn resolve(&self, session_id: &str) -> Result<Option<OwnerContext>, CollaboratorError>;
}

/// Directory that knows nobody
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDirectory;

#[async_trait]
impl UserDirectory for NoDirectory {
    async fn resolve(&self, _session_id: &str) -> Result<Option<OwnerContext>, CollaboratorError> {
        Ok(None)
    }
}

/// In-memory directory keyed by session id
#[derive(Debug, Default)]
pub struct StaticDirectory {
    owners: RwLock<HashMap<String, OwnerContext>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the owner of `session_id`
    pub fn insert(&self, session_id: impl Into<String>, owner: OwnerContext) {
        let mut owners = self
            .owners
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        owners.insert(session_id.into(), owner);
    }

    /// Parse a JSON object mapping session ids to owners
    ///
    /// ```json
    /// { "cam-1": { "uid": "u1", "name": "Asha", "guardians": ["u2"] } }
    /// ```
    pub fn from_json(json: &str) -> Result<Self, CollaboratorError> {
        let owners: HashMap<String, OwnerContext> =
            serde_json::from_str(json).map_err(|e| CollaboratorError::Directory(e.to_string()))?;
        Ok(Self {
            owners: RwLock::new(owners),
        })
    }

    /// Load [`StaticDirectory::from_json`] input from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CollaboratorError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| CollaboratorError::Directory(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.owners
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn resolve(&self, session_id: &str) -> Result<Option<OwnerContext>, CollaboratorError> {
        let owners = self
            .owners
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(owners.get(session_id).cloned())
    }
}

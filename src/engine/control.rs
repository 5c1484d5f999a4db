//! engine::control
//!
//! Sequences remote operations per repository.
//!
//! Each repository id gets its own async mutex; operations against the
//! same repository run one at a time while distinct repositories proceed
//! concurrently. This keeps a refresh and a mutation against one
//! repository from racing each other at the remote without serializing
//! the whole engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

use crate::core::{Issue, Model, RepoId};
use crate::remote::{Remote, RemoteError};

/// Per-repository serialization of remote operations.
pub struct RepoOpControl {
    remote: Arc<dyn Remote>,
    locks: Mutex<HashMap<RepoId, Arc<AsyncMutex<()>>>>,
}

impl RepoOpControl {
    /// Create a controller over the given remote.
    pub fn new(remote: Arc<dyn Remote>) -> Self {
        Self {
            remote,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, id: &RepoId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        Arc::clone(locks.entry(id.clone()).or_default())
    }

    /// Download a full snapshot, serialized with other operations on the
    /// same repository.
    pub async fn open_repository(&self, id: &RepoId) -> Result<Model, RemoteError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        self.remote.open_repository(id).await
    }

    /// Download a refreshed snapshot, serialized per repository.
    pub async fn update_model(&self, model: &Model) -> Result<Model, RemoteError> {
        let lock = self.lock_for(&model.repo);
        let _guard = lock.lock().await;
        self.remote.update_model(model).await
    }

    /// Replace an issue's labels on the remote, serialized per
    /// repository.
    pub async fn replace_issue_labels(
        &self,
        issue: &Issue,
        labels: &[String],
    ) -> Result<bool, RemoteError> {
        let lock = self.lock_for(&issue.repo);
        let _guard = lock.lock().await;
        self.remote.replace_issue_labels(issue, labels).await
    }

    /// Remove the locally stored snapshot, serialized per repository.
    pub async fn remove_repository(&self, id: &RepoId) -> Result<bool, RemoteError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;
        self.remote.remove_repository(id).await
    }
}

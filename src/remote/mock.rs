//! remote::mock
//!
//! Mock remote implementation for deterministic testing.
//!
//! # Design
//!
//! The mock stores repository snapshots in memory as the "upstream
//! truth" and allows configuring failure scenarios per operation. Beyond
//! the failure injection, two pieces exist for exercising the engine's
//! interleavings:
//!
//! - a one-shot pause gate: [`MockRemote::pause_on`] makes the next call
//!   of that operation park until [`MockRemote::release`], letting tests
//!   hold one remote call in flight while issuing others;
//! - a queued per-call result list for label replacement, so two
//!   concurrent mutations can be given different outcomes in call order.
//!
//! Every call is recorded for verification.
//!
//! # Example
//!
//! ```
//! use hubsync::core::{Model, RepoId};
//! use hubsync::remote::mock::MockRemote;
//! use hubsync::remote::Remote;
//!
//! # tokio_test::block_on(async {
//! let repo = RepoId::new("owner/repo").unwrap();
//! let mock = MockRemote::with_repos(vec![Model::new(repo.clone(), vec![], vec![], vec![])]);
//!
//! assert!(mock.is_repository_valid(&repo).await.unwrap());
//! let model = mock.open_repository(&repo).await.unwrap();
//! assert_eq!(model.repo, repo);
//! # });
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;

use super::traits::{RateLimits, Remote, RemoteError};
use crate::core::{Issue, Model, RawMetadata, RepoId};

/// The operations a mock can pause or fail on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    Validate,
    Open,
    Update,
    Metadata,
    ReplaceLabels,
    RateLimit,
    Stored,
    Remove,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    /// Fail is_repository_valid with the given error.
    Validate(RemoteError),
    /// Fail open_repository with the given error.
    Open(RemoteError),
    /// Fail update_model with the given error.
    Update(RemoteError),
    /// Fail update_model for one repository only.
    UpdateFor(RepoId, RemoteError),
    /// Fail get_issue_metadata with the given error.
    Metadata(RemoteError),
    /// Fail replace_issue_labels with the given error.
    ReplaceLabels(RemoteError),
    /// Fail rate_limit with the given error.
    RateLimit(RemoteError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone)]
pub enum RecordedOp {
    Validate {
        repo: RepoId,
    },
    Open {
        repo: RepoId,
    },
    Update {
        repo: RepoId,
    },
    Metadata {
        repo: RepoId,
        issues: Vec<u64>,
    },
    ReplaceLabels {
        repo: RepoId,
        number: u64,
        labels: Vec<String>,
    },
    RateLimit,
    Stored,
    Remove {
        repo: RepoId,
    },
}

impl RecordedOp {
    /// The operation kind of this record.
    pub fn kind(&self) -> RemoteOp {
        match self {
            RecordedOp::Validate { .. } => RemoteOp::Validate,
            RecordedOp::Open { .. } => RemoteOp::Open,
            RecordedOp::Update { .. } => RemoteOp::Update,
            RecordedOp::Metadata { .. } => RemoteOp::Metadata,
            RecordedOp::ReplaceLabels { .. } => RemoteOp::ReplaceLabels,
            RecordedOp::RateLimit => RemoteOp::RateLimit,
            RecordedOp::Stored => RemoteOp::Stored,
            RecordedOp::Remove { .. } => RemoteOp::Remove,
        }
    }
}

#[derive(Debug)]
struct Inner {
    /// Upstream truth: snapshot served per repository.
    repos: HashMap<RepoId, Model>,
    /// Ids that validate successfully without a seeded snapshot.
    valid: HashSet<RepoId>,
    /// Raw metadata served per repository and issue number.
    metadata: HashMap<RepoId, HashMap<u64, RawMetadata>>,
    /// Rate limits served by rate_limit().
    rate: RateLimits,
    /// Configured failures.
    fail_on: Vec<FailOn>,
    /// Queued results for replace_issue_labels, consumed in call order.
    label_results: VecDeque<Result<bool, RemoteError>>,
    /// One-shot pause: the next call of this kind parks until release().
    paused: Option<RemoteOp>,
    /// Recorded operations for verification.
    operations: Vec<RecordedOp>,
    /// Release signal for parked calls.
    release_tx: watch::Sender<u64>,
    release_rx: watch::Receiver<u64>,
}

impl Inner {
    fn fail_for(&self, kind: RemoteOp, repo: Option<&RepoId>) -> Option<RemoteError> {
        self.fail_on.iter().find_map(|f| match (f, kind) {
            (FailOn::Validate(e), RemoteOp::Validate) => Some(e.clone()),
            (FailOn::Open(e), RemoteOp::Open) => Some(e.clone()),
            (FailOn::Update(e), RemoteOp::Update) => Some(e.clone()),
            (FailOn::UpdateFor(r, e), RemoteOp::Update) if Some(r) == repo => Some(e.clone()),
            (FailOn::Metadata(e), RemoteOp::Metadata) => Some(e.clone()),
            (FailOn::ReplaceLabels(e), RemoteOp::ReplaceLabels) => Some(e.clone()),
            (FailOn::RateLimit(e), RemoteOp::RateLimit) => Some(e.clone()),
            _ => None,
        })
    }
}

/// A parked call's handle on the release signal.
type Gate = Option<(watch::Receiver<u64>, u64)>;

/// Mock remote for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share
/// state.
#[derive(Debug, Clone)]
pub struct MockRemote {
    inner: Arc<Mutex<Inner>>,
}

impl MockRemote {
    /// Create a new empty mock remote.
    pub fn new() -> Self {
        let (release_tx, release_rx) = watch::channel(0u64);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                repos: HashMap::new(),
                valid: HashSet::new(),
                metadata: HashMap::new(),
                rate: RateLimits {
                    remaining: 5000,
                    reset_epoch: 0,
                },
                fail_on: Vec::new(),
                label_results: VecDeque::new(),
                paused: None,
                operations: Vec::new(),
                release_tx,
                release_rx,
            })),
        }
    }

    /// Create a mock remote seeded with upstream snapshots.
    pub fn with_repos(models: Vec<Model>) -> Self {
        let mock = Self::new();
        {
            let mut inner = mock.inner.lock().unwrap();
            for model in models {
                inner.valid.insert(model.repo.clone());
                inner.repos.insert(model.repo.clone(), model);
            }
        }
        mock
    }

    /// Configure the mock to fail on a specific operation.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.inner.lock().unwrap().fail_on.push(fail_on);
        self
    }

    /// Clear all failure configuration.
    pub fn clear_fail_on(&self) {
        self.inner.lock().unwrap().fail_on.clear();
    }

    /// Replace or add the upstream snapshot for a repository.
    pub fn set_model(&self, model: Model) {
        let mut inner = self.inner.lock().unwrap();
        inner.valid.insert(model.repo.clone());
        inner.repos.insert(model.repo.clone(), model);
    }

    /// Make an id validate successfully without seeding a snapshot.
    pub fn mark_valid(&self, id: RepoId) {
        self.inner.lock().unwrap().valid.insert(id);
    }

    /// Seed raw metadata for one issue.
    pub fn set_metadata(&self, repo: RepoId, number: u64, raw: RawMetadata) {
        let mut inner = self.inner.lock().unwrap();
        inner.metadata.entry(repo).or_default().insert(number, raw);
    }

    /// Configure the rate limits served by rate_limit().
    pub fn set_rate_limits(&self, rate: RateLimits) {
        self.inner.lock().unwrap().rate = rate;
    }

    /// Queue a result for the next replace_issue_labels call. Queued
    /// results are consumed in call order and take precedence over
    /// `FailOn::ReplaceLabels`.
    pub fn push_label_result(&self, result: Result<bool, RemoteError>) {
        self.inner.lock().unwrap().label_results.push_back(result);
    }

    /// Park the next call of `op` until release(). One-shot: the first
    /// matching call consumes the pause.
    pub fn pause_on(&self, op: RemoteOp) {
        self.inner.lock().unwrap().paused = Some(op);
    }

    /// Release every currently parked call.
    pub fn release(&self) {
        let inner = self.inner.lock().unwrap();
        inner.release_tx.send_modify(|v| *v += 1);
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<RecordedOp> {
        self.inner.lock().unwrap().operations.clone()
    }

    /// Count recorded operations of one kind.
    pub fn count(&self, kind: RemoteOp) -> usize {
        self.inner
            .lock()
            .unwrap()
            .operations
            .iter()
            .filter(|op| op.kind() == kind)
            .count()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        self.inner.lock().unwrap().operations.clear();
    }

    /// The current upstream snapshot for a repository (for verification).
    pub fn model(&self, id: &RepoId) -> Option<Model> {
        self.inner.lock().unwrap().repos.get(id).cloned()
    }

    /// Record a call and, if a pause is configured for its kind, take it.
    /// The release-signal snapshot is captured under the same lock so a
    /// release that races this call cannot be missed.
    fn enter(&self, record: RecordedOp) -> Gate {
        let mut inner = self.inner.lock().unwrap();
        let kind = record.kind();
        inner.operations.push(record);
        if inner.paused == Some(kind) {
            inner.paused = None;
            let rx = inner.release_rx.clone();
            let seen = *rx.borrow();
            Some((rx, seen))
        } else {
            None
        }
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait(gate: Gate) {
    if let Some((mut rx, seen)) = gate {
        while *rx.borrow() == seen {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

#[async_trait]
impl Remote for MockRemote {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn is_repository_valid(&self, id: &RepoId) -> Result<bool, RemoteError> {
        let gate = self.enter(RecordedOp::Validate { repo: id.clone() });
        wait(gate).await;

        let inner = self.inner.lock().unwrap();
        if let Some(e) = inner.fail_for(RemoteOp::Validate, Some(id)) {
            return Err(e);
        }
        Ok(inner.valid.contains(id) || inner.repos.contains_key(id))
    }

    async fn open_repository(&self, id: &RepoId) -> Result<Model, RemoteError> {
        let gate = self.enter(RecordedOp::Open { repo: id.clone() });
        wait(gate).await;

        let inner = self.inner.lock().unwrap();
        if let Some(e) = inner.fail_for(RemoteOp::Open, Some(id)) {
            return Err(e);
        }
        inner
            .repos
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn update_model(&self, model: &Model) -> Result<Model, RemoteError> {
        let gate = self.enter(RecordedOp::Update {
            repo: model.repo.clone(),
        });
        wait(gate).await;

        let inner = self.inner.lock().unwrap();
        if let Some(e) = inner.fail_for(RemoteOp::Update, Some(&model.repo)) {
            return Err(e);
        }
        inner
            .repos
            .get(&model.repo)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(model.repo.to_string()))
    }

    async fn get_issue_metadata(
        &self,
        id: &RepoId,
        issues: &[u64],
    ) -> Result<HashMap<u64, RawMetadata>, RemoteError> {
        let gate = self.enter(RecordedOp::Metadata {
            repo: id.clone(),
            issues: issues.to_vec(),
        });
        wait(gate).await;

        let inner = self.inner.lock().unwrap();
        if let Some(e) = inner.fail_for(RemoteOp::Metadata, Some(id)) {
            return Err(e);
        }
        let per_repo = inner.metadata.get(id);
        let mut result = HashMap::new();
        for number in issues {
            if let Some(raw) = per_repo.and_then(|m| m.get(number)) {
                result.insert(*number, raw.clone());
            }
        }
        Ok(result)
    }

    async fn replace_issue_labels(
        &self,
        issue: &Issue,
        labels: &[String],
    ) -> Result<bool, RemoteError> {
        // The outcome is decided at entry, under the same lock as the
        // recording, so queued results pair with calls in arrival order
        // even when an earlier call is still parked at the gate.
        let (gate, decision) = {
            let mut inner = self.inner.lock().unwrap();
            inner.operations.push(RecordedOp::ReplaceLabels {
                repo: issue.repo.clone(),
                number: issue.number,
                labels: labels.to_vec(),
            });
            let gate = if inner.paused == Some(RemoteOp::ReplaceLabels) {
                inner.paused = None;
                let rx = inner.release_rx.clone();
                let seen = *rx.borrow();
                Some((rx, seen))
            } else {
                None
            };
            let decision = inner
                .label_results
                .pop_front()
                .or_else(|| inner.fail_for(RemoteOp::ReplaceLabels, Some(&issue.repo)).map(Err));
            (gate, decision)
        };
        wait(gate).await;

        let result = decision.unwrap_or(Ok(true));
        if let Ok(true) = result {
            let mut inner = self.inner.lock().unwrap();
            if let Some(model) = inner.repos.get_mut(&issue.repo) {
                if let Some(upstream) = model.issue_mut(issue.number) {
                    upstream.labels = labels.to_vec();
                }
            }
        }
        result
    }

    async fn rate_limit(&self) -> Result<RateLimits, RemoteError> {
        let gate = self.enter(RecordedOp::RateLimit);
        wait(gate).await;

        let inner = self.inner.lock().unwrap();
        if let Some(e) = inner.fail_for(RemoteOp::RateLimit, None) {
            return Err(e);
        }
        Ok(inner.rate)
    }

    async fn stored_repositories(&self) -> Result<HashSet<String>, RemoteError> {
        let gate = self.enter(RecordedOp::Stored);
        wait(gate).await;

        let inner = self.inner.lock().unwrap();
        Ok(inner.repos.keys().map(|id| id.to_string()).collect())
    }

    async fn remove_repository(&self, id: &RepoId) -> Result<bool, RemoteError> {
        let gate = self.enter(RecordedOp::Remove { repo: id.clone() });
        wait(gate).await;

        let mut inner = self.inner.lock().unwrap();
        inner.valid.remove(id);
        Ok(inner.repos.remove(id).is_some())
    }
}

//! store
//!
//! The in-memory repository store: one entry per repository identifier,
//! each either pending (open requested, snapshot not yet installed) or
//! present (snapshot installed).
//!
//! # Design
//!
//! The store is a pure data structure with no I/O. It is owned by the
//! engine behind a mutex and mutated only in short critical sections that
//! never span a remote call, so it needs no internal locking.
//!
//! The pending/present split is an explicit state tag rather than a
//! separate pending set: a repository identifier is in exactly one of
//! {absent, pending, present}, which makes the open state machine
//! directly testable.
//!
//! The store also owns the logical clock. Label patches stamp the issue
//! with a fresh [`Stamp`] under the same borrow that applies the patch,
//! and reverts are gated on stamp equality, so a failed remote round-trip
//! can never clobber a newer local edit.

use std::collections::{HashMap, HashSet};

use crate::core::{Issue, IssueMetadata, Model, RepoId, Stamp, User};

/// State of one repository identifier in the store.
#[derive(Debug, Clone, PartialEq)]
enum RepoEntry {
    /// Open requested; snapshot not yet installed.
    Pending,
    /// Snapshot installed.
    Present(Model),
}

/// In-memory map of repository identifier to snapshot state, plus the
/// designated default repository and the logical clock.
#[derive(Debug, Default)]
pub struct RepoStore {
    entries: HashMap<RepoId, RepoEntry>,
    default_repo: Option<RepoId>,
    clock: Stamp,
}

impl RepoStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with snapshots already installed.
    pub fn with_models(models: Vec<Model>) -> Self {
        let mut store = Self::new();
        for model in models {
            store.install(model);
        }
        store
    }

    /// True if a snapshot is installed for `id`.
    pub fn contains(&self, id: &RepoId) -> bool {
        matches!(self.entries.get(id), Some(RepoEntry::Present(_)))
    }

    /// True if an open is in flight for `id`.
    pub fn is_pending(&self, id: &RepoId) -> bool {
        matches!(self.entries.get(id), Some(RepoEntry::Pending))
    }

    /// Mark `id` pending. Returns false (and changes nothing) when the
    /// id is already pending or present; the single caller that sees
    /// true owns the open and must later install or clear.
    pub fn mark_pending(&mut self, id: RepoId) -> bool {
        match self.entries.get(&id) {
            Some(_) => false,
            None => {
                self.entries.insert(id, RepoEntry::Pending);
                true
            }
        }
    }

    /// Drop a pending marker. Present entries are left untouched.
    pub fn clear_pending(&mut self, id: &RepoId) {
        if self.is_pending(id) {
            self.entries.remove(id);
        }
    }

    /// Install a snapshot, replacing any pending marker or previous
    /// snapshot for the same id.
    pub fn install(&mut self, model: Model) {
        self.entries
            .insert(model.repo.clone(), RepoEntry::Present(model));
    }

    /// Install refreshed snapshots in one pass. Only repositories still
    /// present are replaced; snapshots for repositories removed since the
    /// refresh started are dropped, and repositories without an update
    /// keep their previous snapshot.
    pub fn merge_refreshed(&mut self, updated: Vec<Model>) {
        for model in updated {
            if self.contains(&model.repo) {
                self.install(model);
            }
        }
    }

    /// Clones of all installed snapshots.
    pub fn models(&self) -> Vec<Model> {
        self.entries
            .values()
            .filter_map(|e| match e {
                RepoEntry::Present(m) => Some(m.clone()),
                RepoEntry::Pending => None,
            })
            .collect()
    }

    /// Borrow the snapshot for `id`, if installed.
    pub fn get(&self, id: &RepoId) -> Option<&Model> {
        match self.entries.get(id) {
            Some(RepoEntry::Present(m)) => Some(m),
            _ => None,
        }
    }

    /// Identifiers of all installed snapshots.
    pub fn repo_ids(&self) -> HashSet<RepoId> {
        self.entries
            .iter()
            .filter(|(_, e)| matches!(e, RepoEntry::Present(_)))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Remove the entry for `id` (pending or present). Clears the
    /// default-repo designation if it referred to `id`.
    pub fn remove(&mut self, id: &RepoId) -> bool {
        let removed = self.entries.remove(id).is_some();
        if removed && self.default_repo.as_ref() == Some(id) {
            self.default_repo = None;
        }
        removed
    }

    /// Designate the default repository. The id must be pending or
    /// present; returns false otherwise.
    pub fn set_default_repo(&mut self, id: RepoId) -> bool {
        if self.entries.contains_key(&id) {
            self.default_repo = Some(id);
            true
        } else {
            false
        }
    }

    /// The designated default repository, if any.
    pub fn default_repo(&self) -> Option<&RepoId> {
        self.default_repo.as_ref()
    }

    /// True when no snapshots are installed and no opens are pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn tick(&mut self) -> Stamp {
        self.clock = self.clock.next();
        self.clock
    }

    /// Replace an issue's label set, stamping a fresh logical timestamp.
    ///
    /// Looks the issue up by (repository id, issue number) rather than
    /// trusting any caller-held reference. Returns a clone of the patched
    /// issue (carrying the stamp the revert must later match), or `None`
    /// when the repository or issue is not in the store.
    pub fn replace_issue_labels(
        &mut self,
        repo: &RepoId,
        number: u64,
        labels: Vec<String>,
    ) -> Option<Issue> {
        let stamp = self.tick();
        let model = match self.entries.get_mut(repo) {
            Some(RepoEntry::Present(m)) => m,
            _ => return None,
        };
        let issue = model.issue_mut(number)?;
        issue.labels = labels;
        issue.labels_last_modified_at = stamp;
        Some(issue.clone())
    }

    /// Conditionally restore an issue's label set after a failed remote
    /// confirmation.
    ///
    /// The revert proceeds only when `expected` equals the stamp
    /// currently on the stored issue, i.e. no other mutation has touched
    /// the labels since the optimistic apply. A mismatch means a newer
    /// local edit has superseded this one and the revert is abandoned.
    /// Returns true iff the labels were restored.
    pub fn revert_issue_labels(
        &mut self,
        repo: &RepoId,
        number: u64,
        original_labels: Vec<String>,
        expected: Stamp,
    ) -> bool {
        let current = match self.get(repo).and_then(|m| m.issue(number)) {
            Some(issue) => issue.labels_last_modified_at,
            None => return false,
        };
        if current != expected {
            return false;
        }
        self.replace_issue_labels(repo, number, original_labels)
            .is_some()
    }

    /// Install derived metadata for issues of one repository. Issues
    /// absent from the map are left untouched. Returns false when the
    /// repository has no installed snapshot.
    pub fn insert_metadata(&mut self, repo: &RepoId, metadata: HashMap<u64, IssueMetadata>) -> bool {
        let model = match self.entries.get_mut(repo) {
            Some(RepoEntry::Present(m)) => m,
            _ => return false,
        };
        for (number, meta) in metadata {
            if let Some(issue) = model.issue_mut(number) {
                issue.metadata = Some(meta);
            }
        }
        true
    }

    /// Users across all installed snapshots, deduplicated by login.
    pub fn users(&self) -> Vec<User> {
        let mut seen = HashSet::new();
        let mut users = Vec::new();
        for model in self.entries.values().filter_map(|e| match e {
            RepoEntry::Present(m) => Some(m),
            RepoEntry::Pending => None,
        }) {
            for user in &model.users {
                if seen.insert(user.login.clone()) {
                    users.push(user.clone());
                }
            }
        }
        users
    }
}

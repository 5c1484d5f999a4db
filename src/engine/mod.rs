//! engine
//!
//! The synchronization engine: the public entry point the UI layer
//! drives.
//!
//! # Architecture
//!
//! The engine owns the repository store and funnels every mutation
//! through it:
//!
//! 1. **Open**: validate the id, mark it pending (the mutual-exclusion
//!    point for duplicate opens), fetch a snapshot, install it
//! 2. **Refresh**: fan out per-repository snapshot updates, install the
//!    successes in one atomic pass
//! 3. **Mutate**: apply label changes locally first, confirm remotely,
//!    revert conditionally on failure
//! 4. **Metadata**: bulk-fetch per-issue records and merge them against
//!    the signed-in user
//!
//! After every remote-consuming operation the engine forwards the
//! remaining call budget to the UI sink.
//!
//! # Invariants
//!
//! - The store is locked only for short critical sections, never across
//!   a remote call; the remote calls are the only suspension points
//! - Public operations resolve to booleans; remote failures are caught
//!   at the point of use, logged, and never cross this boundary
//! - A failed mutation is reverted only when its logical stamp still
//!   matches the stored issue, so a stale revert can never clobber a
//!   newer local edit

pub mod control;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;

use crate::core::{Issue, IssueMetadata, Model, RepoId};
use crate::prefs::Preferences;
use crate::remote::{RateLimits, Remote};
use crate::store::RepoStore;
use crate::ui::{build_groups, UiSink, ViewUpdate};

pub use control::RepoOpControl;

/// The synchronization engine.
///
/// Owns the repository store; shared across tasks behind an `Arc`.
pub struct SyncEngine {
    store: Mutex<RepoStore>,
    remote: Arc<dyn Remote>,
    control: Arc<RepoOpControl>,
    sink: Arc<dyn UiSink>,
    prefs: Arc<dyn Preferences>,
}

impl SyncEngine {
    /// Create an engine with an empty store.
    pub fn new(
        remote: Arc<dyn Remote>,
        sink: Arc<dyn UiSink>,
        prefs: Arc<dyn Preferences>,
    ) -> Self {
        Self::with_store(remote, sink, prefs, RepoStore::new())
    }

    /// Create an engine over an existing store (tests, session restore).
    pub fn with_store(
        remote: Arc<dyn Remote>,
        sink: Arc<dyn UiSink>,
        prefs: Arc<dyn Preferences>,
        store: RepoStore,
    ) -> Self {
        let control = Arc::new(RepoOpControl::new(Arc::clone(&remote)));
        Self {
            store: Mutex::new(store),
            remote,
            control,
            sink,
            prefs,
        }
    }

    /// Open `id` as the primary repository.
    pub async fn open_primary_repository(&self, id: &str) -> bool {
        self.open_repository(id, true).await
    }

    /// Open the repository if it isn't already open, else just refresh
    /// the UI when it was designated primary.
    ///
    /// Resolves to true only when a snapshot was newly fetched and
    /// installed. A malformed id, an id unknown to the remote, a
    /// duplicate open (already installed or already in flight), and any
    /// remote failure all resolve to false without disturbing the store.
    pub async fn open_repository(&self, id: &str, is_primary: bool) -> bool {
        let id = match RepoId::new(id) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("rejecting open: {}", e);
                return false;
            }
        };

        if is_primary {
            self.prefs.set_last_viewed_repository(&id);
        }

        {
            let mut store = self.store.lock().unwrap();
            if !store.mark_pending(id.clone()) {
                drop(store);
                // Panels without an explicit repo follow the primary, so
                // the view changes even without a re-fetch.
                if is_primary {
                    self.refresh_ui();
                }
                return false;
            }
        }

        let valid = match self.remote.is_repository_valid(&id).await {
            Ok(valid) => valid,
            Err(e) => {
                tracing::error!("validating {} failed: {}", id, e);
                self.store.lock().unwrap().clear_pending(&id);
                return false;
            }
        };
        if !valid {
            tracing::warn!("{} is not a repository on {}", id, self.remote.name());
            self.store.lock().unwrap().clear_pending(&id);
            return false;
        }

        tracing::info!("opening {}", id);
        self.sink.status_message(&format!("Opening {}", id));

        match self.control.open_repository(&id).await {
            Ok(model) => {
                self.store.lock().unwrap().install(model);
                self.refresh_ui();
                self.forward_rate_limits().await;
                true
            }
            Err(e) => {
                tracing::error!("opening {} failed: {}", id, e);
                self.store.lock().unwrap().clear_pending(&id);
                self.forward_rate_limits().await;
                false
            }
        }
    }

    /// Refresh every open repository concurrently.
    ///
    /// Per-repository failures are tolerated: the successes are
    /// installed in one atomic pass and the failures keep their previous
    /// snapshot. Resolves to true only when every repository refreshed.
    pub async fn refresh(&self) -> bool {
        let models = self.store.lock().unwrap().models();
        let names = models
            .iter()
            .map(|m| m.repo.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        tracing::info!("refreshing {}", names);
        self.sink.status_message(&format!("Refreshing {}", names));

        let mut tasks = JoinSet::new();
        for model in models {
            let control = Arc::clone(&self.control);
            tasks.spawn(async move {
                let repo = model.repo.clone();
                (repo, control.update_model(&model).await)
            });
        }

        let mut updated = Vec::new();
        let mut all_ok = true;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(model))) => updated.push(model),
                Ok((repo, Err(e))) => {
                    all_ok = false;
                    tracing::warn!("refreshing {} failed: {}", repo, e);
                }
                Err(e) => {
                    all_ok = false;
                    tracing::error!("refresh task failed: {}", e);
                }
            }
        }

        self.store.lock().unwrap().merge_refreshed(updated);
        self.refresh_ui();
        self.forward_rate_limits().await;
        all_ok
    }

    /// Replace an issue's labels: locally first for responsiveness, then
    /// on the remote.
    ///
    /// The local apply goes through the store by (repository, number)
    /// rather than the caller's possibly stale reference. On remote
    /// failure the labels are restored to the caller's view only if no
    /// newer mutation stamped the issue in the meantime; a newer edit
    /// wins and the revert is abandoned. Resolves to true iff the remote
    /// confirmed the change.
    pub async fn replace_issue_labels(&self, issue: &Issue, new_labels: Vec<String>) -> bool {
        let original_labels = issue.labels.clone();

        tracing::info!("changing labels for {} locally", issue);
        let patched = self.store.lock().unwrap().replace_issue_labels(
            &issue.repo,
            issue.number,
            new_labels.clone(),
        );
        let patched = match patched {
            Some(patched) => patched,
            None => {
                tracing::error!("{} not found in store", issue);
                return false;
            }
        };
        self.refresh_ui();

        tracing::info!("changing labels for {} on {}", issue, self.remote.name());
        let confirmed = match self.control.replace_issue_labels(&patched, &new_labels).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::error!("remote rejected label change for {}", issue);
                false
            }
            Err(e) => {
                tracing::error!("replacing labels for {} failed: {}", issue, e);
                false
            }
        };

        if !confirmed {
            let reverted = self.store.lock().unwrap().revert_issue_labels(
                &patched.repo,
                patched.number,
                original_labels,
                patched.labels_last_modified_at,
            );
            if reverted {
                tracing::info!("reverted labels for {}", issue);
                self.refresh_ui();
            } else {
                tracing::info!("labels for {} changed since; leaving them", issue);
            }
        }

        self.forward_rate_limits().await;
        confirmed
    }

    /// Retrieve metadata for the given issues, merge it against the
    /// signed-in user, and install it into the store.
    pub async fn get_issue_metadata(&self, repo_id: &str, issues: &[Issue]) -> bool {
        let id = match RepoId::new(repo_id) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("rejecting metadata request: {}", e);
                return false;
            }
        };

        self.sink
            .status_message(&format!("Getting metadata for {}...", id));
        let numbers: Vec<u64> = issues.iter().map(|i| i.number).collect();
        tracing::info!("getting metadata for {} issues of {}", numbers.len(), id);

        let raw = match self.remote.get_issue_metadata(&id, &numbers).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!("fetching metadata for {} failed: {}", id, e);
                return false;
            }
        };

        let current_user = self.prefs.username();
        let enriched = raw
            .into_iter()
            .map(|(number, raw)| (number, IssueMetadata::full(raw, current_user.as_deref())))
            .collect();

        let inserted = self.store.lock().unwrap().insert_metadata(&id, enriched);
        if inserted {
            self.sink
                .status_message(&format!("Received metadata from {}!", id));
        }
        inserted
    }

    /// True when a snapshot is installed for `id` (case-insensitive).
    pub fn is_already_open(&self, id: &str) -> bool {
        match RepoId::new(id) {
            Ok(id) => self.store.lock().unwrap().contains(&id),
            Err(_) => false,
        }
    }

    /// Lower-cased ids of all open repositories.
    pub fn open_repositories(&self) -> HashSet<String> {
        self.store
            .lock()
            .unwrap()
            .repo_ids()
            .into_iter()
            .map(|id| id.to_string())
            .collect()
    }

    /// Clone of the installed snapshot for `id`, if any.
    pub fn get_repo(&self, id: &str) -> Option<Model> {
        let id = RepoId::new(id).ok()?;
        self.store.lock().unwrap().get(&id).cloned()
    }

    /// Designate the default repository. False when `id` is malformed or
    /// not known to the store.
    pub fn set_default_repo(&self, id: &str) -> bool {
        match RepoId::new(id) {
            Ok(id) => self.store.lock().unwrap().set_default_repo(id),
            Err(_) => false,
        }
    }

    /// The designated default repository.
    pub fn default_repo(&self) -> Option<RepoId> {
        self.store.lock().unwrap().default_repo().cloned()
    }

    /// Drop models whose repository is referenced by no current filter.
    /// `in_use` is compared case-insensitively.
    pub fn remove_unused_models(&self, in_use: &HashSet<String>) {
        let in_use: HashSet<String> = in_use.iter().map(|r| r.to_lowercase()).collect();
        let mut store = self.store.lock().unwrap();
        for id in store.repo_ids() {
            if !in_use.contains(id.as_str()) {
                tracing::info!("dropping unused model {}", id);
                store.remove(&id);
            }
        }
    }

    /// Repositories with a locally stored snapshot, per the remote.
    pub async fn stored_repositories(&self) -> HashSet<String> {
        match self.remote.stored_repositories().await {
            Ok(repos) => repos,
            Err(e) => {
                tracing::error!("listing stored repositories failed: {}", e);
                HashSet::new()
            }
        }
    }

    /// Remove a locally stored snapshot.
    pub async fn remove_stored_repository(&self, id: &str) -> bool {
        let id = match RepoId::new(id) {
            Ok(id) => id,
            Err(_) => return false,
        };
        match self.control.remove_repository(&id).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::error!("removing stored repository {} failed: {}", id, e);
                false
            }
        }
    }

    /// Query the remote call budget directly.
    pub async fn rate_limits(&self) -> Option<RateLimits> {
        match self.remote.rate_limit().await {
            Ok(limits) => Some(limits),
            Err(e) => {
                tracing::warn!("rate limit query failed: {}", e);
                None
            }
        }
    }

    /// Best-effort: query the budget and forward it to the sink. Never
    /// affects the primary operation's result.
    async fn forward_rate_limits(&self) {
        if let Some(limits) = self.rate_limits().await {
            self.sink.update_rate_limits(limits);
        }
    }

    /// Recompute the view for the sink's active filters and deliver it.
    fn refresh_ui(&self) {
        let filters = self.sink.active_filters();
        let update = {
            let store = self.store.lock().unwrap();
            ViewUpdate {
                groups: build_groups(&filters, &store.models(), store.default_repo()),
                users: store.users(),
            }
        };
        self.sink.refresh(update);
    }
}

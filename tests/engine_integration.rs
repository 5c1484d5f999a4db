//! Integration tests for the synchronization engine.
//!
//! These drive the public `SyncEngine` surface against `MockRemote`,
//! exercising the open state machine, the optimistic mutation protocol,
//! refresh fan-out, the metadata pipeline, and rate-limit forwarding.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};

use hubsync::core::{Issue, IssueState, Label, Model, RawMetadata, RepoId, Stamp, User};
use hubsync::core::{IssueComment, IssueEvent, IssueMetadata};
use hubsync::engine::SyncEngine;
use hubsync::prefs::{MemoryPreferences, Preferences};
use hubsync::remote::mock::{FailOn, MockRemote, RemoteOp};
use hubsync::remote::{RateLimits, RemoteError};
use hubsync::store::RepoStore;
use hubsync::ui::{Filter, UiSink, ViewUpdate};

// =============================================================================
// Fixtures
// =============================================================================

fn repo(id: &str) -> RepoId {
    RepoId::new(id).unwrap()
}

fn issue(repo_id: &str, number: u64, labels: &[&str]) -> Issue {
    Issue {
        repo: repo(repo_id),
        number,
        title: format!("Issue {}", number),
        state: IssueState::Open,
        author: "alice".into(),
        assignee: None,
        labels: labels.iter().map(|s| s.to_string()).collect(),
        updated_at: Utc.with_ymd_and_hms(2016, 4, 1, 12, 0, 0).unwrap(),
        labels_last_modified_at: Stamp::default(),
        metadata: None,
    }
}

fn model(repo_id: &str, issues: Vec<Issue>) -> Model {
    Model::new(
        repo(repo_id),
        issues,
        vec![Label {
            name: "bug".into(),
            color: "ff0000".into(),
        }],
        vec![User {
            login: "alice".into(),
            name: None,
        }],
    )
}

/// A sink recording everything the engine delivers.
#[derive(Default)]
struct RecordingSink {
    filters: Vec<Filter>,
    refreshes: Mutex<Vec<ViewUpdate>>,
    rate_limits: Mutex<Vec<RateLimits>>,
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn with_filters(filters: Vec<Filter>) -> Self {
        Self {
            filters,
            ..Self::default()
        }
    }

    fn refresh_count(&self) -> usize {
        self.refreshes.lock().unwrap().len()
    }

    fn last_refresh(&self) -> Option<ViewUpdate> {
        self.refreshes.lock().unwrap().last().cloned()
    }

    fn last_rate_limits(&self) -> Option<RateLimits> {
        self.rate_limits.lock().unwrap().last().copied()
    }

    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl UiSink for RecordingSink {
    fn active_filters(&self) -> Vec<Filter> {
        self.filters.clone()
    }

    fn refresh(&self, update: ViewUpdate) {
        self.refreshes.lock().unwrap().push(update);
    }

    fn update_rate_limits(&self, limits: RateLimits) {
        self.rate_limits.lock().unwrap().push(limits);
    }

    fn status_message(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

struct Harness {
    engine: Arc<SyncEngine>,
    mock: MockRemote,
    sink: Arc<RecordingSink>,
    prefs: Arc<MemoryPreferences>,
}

fn harness(mock: MockRemote, installed: Vec<Model>) -> Harness {
    harness_with_filters(mock, installed, vec![Filter::default()])
}

fn harness_with_filters(mock: MockRemote, installed: Vec<Model>, filters: Vec<Filter>) -> Harness {
    let sink = Arc::new(RecordingSink::with_filters(filters));
    let prefs = Arc::new(MemoryPreferences::with_username("alice"));
    let engine = Arc::new(SyncEngine::with_store(
        Arc::new(mock.clone()),
        Arc::clone(&sink) as Arc<dyn UiSink>,
        Arc::clone(&prefs) as Arc<dyn Preferences>,
        RepoStore::with_models(installed),
    ));
    Harness {
        engine,
        mock,
        sink,
        prefs,
    }
}

fn stored_labels(engine: &SyncEngine, repo_id: &str, number: u64) -> Vec<String> {
    engine
        .get_repo(repo_id)
        .unwrap()
        .issue(number)
        .unwrap()
        .labels
        .clone()
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    while !condition() {
        tokio::task::yield_now().await;
    }
}

// =============================================================================
// Repository lifecycle
// =============================================================================

mod opening {
    use super::*;

    #[tokio::test]
    async fn open_fetches_installs_and_notifies() {
        let mock = MockRemote::with_repos(vec![model("a/a", vec![issue("a/a", 1, &["bug"])])]);
        mock.set_rate_limits(RateLimits {
            remaining: 4990,
            reset_epoch: 1_700_000_000,
        });
        let h = harness(mock, vec![]);

        assert!(h.engine.open_repository("a/a", false).await);
        assert!(h.engine.is_already_open("a/a"));

        // The refresh signal carries grouped elements and the user set.
        let update = h.sink.last_refresh().unwrap();
        assert_eq!(update.groups.len(), 1);
        assert_eq!(update.groups[0].elements.len(), 1);
        assert_eq!(update.users.len(), 1);

        // Rate limits were queried and forwarded.
        assert_eq!(
            h.sink.last_rate_limits(),
            Some(RateLimits {
                remaining: 4990,
                reset_epoch: 1_700_000_000,
            })
        );
        assert!(h.mock.count(RemoteOp::RateLimit) >= 1);
        assert!(h.sink.messages().iter().any(|m| m.contains("Opening a/a")));
    }

    #[tokio::test]
    async fn concurrent_opens_fetch_once() {
        let mock = MockRemote::with_repos(vec![model("a/a", vec![])]);
        let h = harness(mock, vec![]);
        h.mock.pause_on(RemoteOp::Validate);

        let first = {
            let engine = Arc::clone(&h.engine);
            tokio::spawn(async move { engine.open_repository("a/a", false).await })
        };
        wait_until(|| h.mock.count(RemoteOp::Validate) == 1).await;

        // The second open sees the pending marker and bows out without
        // touching the remote.
        assert!(!h.engine.open_repository("a/a", false).await);
        assert_eq!(h.mock.count(RemoteOp::Validate), 1);
        assert_eq!(h.mock.count(RemoteOp::Open), 0);

        h.mock.release();
        assert!(first.await.unwrap());
        assert_eq!(h.mock.count(RemoteOp::Open), 1);
        assert!(h.engine.is_already_open("a/a"));
    }

    #[tokio::test]
    async fn invalid_repository_clears_pending() {
        let mock = MockRemote::new();
        let h = harness(mock, vec![]);

        assert!(!h.engine.open_repository("a/a", false).await);

        // The pending marker is gone: a later open fetches again.
        h.mock.set_model(model("a/a", vec![]));
        assert!(h.engine.open_repository("a/a", false).await);
    }

    #[tokio::test]
    async fn fetch_failure_clears_pending_and_forwards_rate_limits() {
        let mock = MockRemote::new().fail_on(FailOn::Open(RemoteError::NetworkError(
            "connection refused".into(),
        )));
        mock.mark_valid(repo("a/a"));
        let h = harness(mock, vec![]);

        assert!(!h.engine.open_repository("a/a", false).await);
        assert!(!h.engine.is_already_open("a/a"));
        assert!(h.sink.last_rate_limits().is_some());

        // The failed open left no pending marker behind.
        h.mock.clear_fail_on();
        h.mock.set_model(model("a/a", vec![]));
        assert!(h.engine.open_repository("a/a", false).await);
    }

    #[tokio::test]
    async fn primary_open_of_open_repo_still_refreshes_ui() {
        let mock = MockRemote::with_repos(vec![model("a/a", vec![])]);
        let h = harness(mock, vec![model("a/a", vec![])]);

        let before = h.sink.refresh_count();
        assert!(!h.engine.open_repository("a/a", true).await);
        assert_eq!(h.sink.refresh_count(), before + 1);
        assert_eq!(h.prefs.last_viewed_repository(), Some(repo("a/a")));

        // A non-primary duplicate open does not refresh.
        let before = h.sink.refresh_count();
        assert!(!h.engine.open_repository("a/a", false).await);
        assert_eq!(h.sink.refresh_count(), before);
    }

    #[tokio::test]
    async fn case_insensitive_identity() {
        let mock = MockRemote::with_repos(vec![model("foo/bar", vec![])]);
        let h = harness(mock, vec![]);

        assert!(h.engine.open_repository("foo/bar", false).await);
        assert!(h.engine.is_already_open("Foo/Bar"));

        // The differently-cased spelling is the same repository.
        assert!(!h.engine.open_repository("FOO/BAR", false).await);
        assert_eq!(h.mock.count(RemoteOp::Open), 1);
    }
}

mod refreshing {
    use super::*;

    #[tokio::test]
    async fn refresh_installs_updated_snapshots() {
        let mock = MockRemote::with_repos(vec![model("a/a", vec![issue("a/a", 1, &["new"])])]);
        let h = harness(mock, vec![model("a/a", vec![issue("a/a", 1, &["old"])])]);

        assert!(h.engine.refresh().await);
        assert_eq!(stored_labels(&h.engine, "a/a", 1), vec!["new".to_string()]);
    }

    #[tokio::test]
    async fn partial_failure_keeps_failed_repos_previous_snapshot() {
        let mock = MockRemote::with_repos(vec![
            model("x/x", vec![issue("x/x", 1, &["upstream"])]),
            model("y/y", vec![issue("y/y", 2, &["upstream"])]),
        ])
        .fail_on(FailOn::UpdateFor(
            repo("x/x"),
            RemoteError::NetworkError("connection reset".into()),
        ));
        let h = harness(
            mock,
            vec![
                model("x/x", vec![issue("x/x", 1, &["local"])]),
                model("y/y", vec![issue("y/y", 2, &["local"])]),
            ],
        );

        // Tolerated per-repository: the call itself reports failure but
        // installs what it got.
        assert!(!h.engine.refresh().await);

        assert_eq!(stored_labels(&h.engine, "x/x", 1), vec!["local".to_string()]);
        assert_eq!(
            stored_labels(&h.engine, "y/y", 2),
            vec!["upstream".to_string()]
        );
    }

    #[tokio::test]
    async fn refresh_touches_every_open_repo() {
        let mock = MockRemote::with_repos(vec![model("a/a", vec![]), model("b/b", vec![])]);
        let h = harness(
            mock,
            vec![model("a/a", vec![]), model("b/b", vec![])],
        );

        assert!(h.engine.refresh().await);
        assert_eq!(h.mock.count(RemoteOp::Update), 2);
        assert!(h.sink.last_rate_limits().is_some());
    }
}

// =============================================================================
// Optimistic label replacement
// =============================================================================

mod label_replacement {
    use super::*;

    #[tokio::test]
    async fn optimistic_visibility_before_confirmation() {
        let mock = MockRemote::with_repos(vec![model("a/a", vec![issue("a/a", 1, &["a"])])]);
        let h = harness(mock, vec![model("a/a", vec![issue("a/a", 1, &["a"])])]);
        h.mock.pause_on(RemoteOp::ReplaceLabels);

        let view = h.engine.get_repo("a/a").unwrap().issue(1).unwrap().clone();
        let task = {
            let engine = Arc::clone(&h.engine);
            tokio::spawn(async move {
                engine.replace_issue_labels(&view, vec!["b".into()]).await
            })
        };
        wait_until(|| h.mock.count(RemoteOp::ReplaceLabels) == 1).await;

        // The remote has not confirmed, but the store already shows B.
        assert!(!task.is_finished());
        assert_eq!(stored_labels(&h.engine, "a/a", 1), vec!["b".to_string()]);

        h.mock.release();
        assert!(task.await.unwrap());
        assert_eq!(stored_labels(&h.engine, "a/a", 1), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn failure_without_intervening_edit_reverts() {
        let mock = MockRemote::with_repos(vec![model("a/a", vec![issue("a/a", 1, &["a"])])])
            .fail_on(FailOn::ReplaceLabels(RemoteError::NetworkError(
                "timed out".into(),
            )));
        let h = harness(mock, vec![model("a/a", vec![issue("a/a", 1, &["a"])])]);

        let view = h.engine.get_repo("a/a").unwrap().issue(1).unwrap().clone();
        assert!(!h.engine.replace_issue_labels(&view, vec!["b".into()]).await);

        assert_eq!(stored_labels(&h.engine, "a/a", 1), vec!["a".to_string()]);
        // The revert pushed a second UI refresh after the optimistic one.
        assert!(h.sink.refresh_count() >= 2);
    }

    #[tokio::test]
    async fn rejected_change_also_reverts() {
        let mock = MockRemote::with_repos(vec![model("a/a", vec![issue("a/a", 1, &["a"])])]);
        mock.push_label_result(Ok(false));
        let h = harness(mock, vec![model("a/a", vec![issue("a/a", 1, &["a"])])]);

        let view = h.engine.get_repo("a/a").unwrap().issue(1).unwrap().clone();
        assert!(!h.engine.replace_issue_labels(&view, vec!["b".into()]).await);
        assert_eq!(stored_labels(&h.engine, "a/a", 1), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn stale_failure_never_clobbers_newer_edit() {
        let mock = MockRemote::with_repos(vec![model("a/a", vec![issue("a/a", 1, &["a"])])]);
        mock.pause_on(RemoteOp::ReplaceLabels);
        mock.push_label_result(Err(RemoteError::NetworkError("timed out".into())));
        mock.push_label_result(Ok(true));
        let h = harness(mock, vec![model("a/a", vec![issue("a/a", 1, &["a"])])]);

        // First mutation: applied locally, then parked at the remote,
        // destined to fail.
        let view_a = h.engine.get_repo("a/a").unwrap().issue(1).unwrap().clone();
        let first = {
            let engine = Arc::clone(&h.engine);
            tokio::spawn(async move {
                engine.replace_issue_labels(&view_a, vec!["b".into()]).await
            })
        };
        wait_until(|| h.mock.count(RemoteOp::ReplaceLabels) == 1).await;
        assert_eq!(stored_labels(&h.engine, "a/a", 1), vec!["b".to_string()]);

        // Second mutation supersedes it locally before the first
        // settles; its remote call queues behind the first.
        let view_b = h.engine.get_repo("a/a").unwrap().issue(1).unwrap().clone();
        let second = {
            let engine = Arc::clone(&h.engine);
            tokio::spawn(async move {
                engine.replace_issue_labels(&view_b, vec!["c".into()]).await
            })
        };
        wait_until(|| stored_labels(&h.engine, "a/a", 1) == vec!["c".to_string()]).await;

        h.mock.release();
        assert!(!first.await.unwrap());
        assert!(second.await.unwrap());

        // The failed first mutation must not have restored A.
        assert_eq!(stored_labels(&h.engine, "a/a", 1), vec!["c".to_string()]);
        assert_eq!(
            h.mock.model(&repo("a/a")).unwrap().issue(1).unwrap().labels,
            vec!["c".to_string()]
        );
    }

    #[tokio::test]
    async fn confirmation_updates_upstream() {
        let mock = MockRemote::with_repos(vec![model("a/a", vec![issue("a/a", 1, &["a"])])]);
        let h = harness(mock, vec![model("a/a", vec![issue("a/a", 1, &["a"])])]);

        let view = h.engine.get_repo("a/a").unwrap().issue(1).unwrap().clone();
        assert!(h.engine.replace_issue_labels(&view, vec!["b".into()]).await);

        assert_eq!(
            h.mock.model(&repo("a/a")).unwrap().issue(1).unwrap().labels,
            vec!["b".to_string()]
        );
        assert!(h.sink.last_rate_limits().is_some());
    }
}

// =============================================================================
// Metadata pipeline
// =============================================================================

mod metadata {
    use super::*;

    fn raw_with_activity() -> RawMetadata {
        RawMetadata {
            events: vec![IssueEvent {
                actor: "alice".into(),
                kind: hubsync::core::EventKind::Labeled,
                occurred_at: Utc.with_ymd_and_hms(2016, 4, 1, 9, 0, 0).unwrap(),
            }],
            comments: vec![IssueComment {
                author: "bob".into(),
                body: "ping".into(),
                created_at: Utc.with_ymd_and_hms(2016, 4, 1, 10, 0, 0).unwrap(),
            }],
        }
    }

    #[tokio::test]
    async fn metadata_is_merged_against_signed_in_user() {
        let mock = MockRemote::with_repos(vec![model("a/a", vec![issue("a/a", 1, &[])])]);
        mock.set_metadata(repo("a/a"), 1, raw_with_activity());
        let h = harness(mock, vec![model("a/a", vec![issue("a/a", 1, &[])])]);

        let issues = vec![h.engine.get_repo("a/a").unwrap().issue(1).unwrap().clone()];
        assert!(h.engine.get_issue_metadata("a/a", &issues).await);

        let meta = h
            .engine
            .get_repo("a/a")
            .unwrap()
            .issue(1)
            .unwrap()
            .metadata
            .clone()
            .unwrap();
        // alice is signed in: only bob's comment counts as non-self.
        assert_eq!(
            meta.non_self_updated_at,
            Some(Utc.with_ymd_and_hms(2016, 4, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(meta.non_self_comment_count, 1);
    }

    #[tokio::test]
    async fn failure_leaves_prior_metadata_untouched() {
        let prior = IssueMetadata::full(raw_with_activity(), Some("alice"));
        let mut seeded = issue("a/a", 1, &[]);
        seeded.metadata = Some(prior.clone());

        let mock = MockRemote::with_repos(vec![model("a/a", vec![])]).fail_on(FailOn::Metadata(
            RemoteError::NetworkError("connection refused".into()),
        ));
        let h = harness(mock, vec![model("a/a", vec![seeded])]);

        let issues = vec![h.engine.get_repo("a/a").unwrap().issue(1).unwrap().clone()];
        assert!(!h.engine.get_issue_metadata("a/a", &issues).await);

        let current = h
            .engine
            .get_repo("a/a")
            .unwrap()
            .issue(1)
            .unwrap()
            .metadata
            .clone();
        assert_eq!(current, Some(prior));
    }

    #[tokio::test]
    async fn metadata_for_unopened_repo_is_false() {
        let mock = MockRemote::with_repos(vec![model("a/a", vec![])]);
        mock.set_metadata(repo("a/a"), 1, RawMetadata::default());
        let h = harness(mock, vec![]);

        assert!(!h.engine.get_issue_metadata("a/a", &[issue("a/a", 1, &[])]).await);
    }
}

// =============================================================================
// Store-facing helpers
// =============================================================================

mod helpers {
    use super::*;

    #[tokio::test]
    async fn open_repositories_are_lower_cased() {
        let mock = MockRemote::new();
        let h = harness(mock, vec![model("Foo/Bar", vec![])]);

        let open = h.engine.open_repositories();
        let expected: HashSet<String> = [String::from("foo/bar")].into_iter().collect();
        assert_eq!(open, expected);
    }

    #[tokio::test]
    async fn stored_repositories_pass_through() {
        let mock = MockRemote::with_repos(vec![model("a/a", vec![])]);
        let h = harness(mock, vec![]);

        assert!(h.engine.stored_repositories().await.contains("a/a"));
        assert!(h.engine.remove_stored_repository("a/a").await);
        assert!(!h.engine.remove_stored_repository("a/a").await);
    }

    #[tokio::test]
    async fn default_repo_drives_empty_filters() {
        let mock = MockRemote::new();
        let h = harness_with_filters(
            mock,
            vec![
                model("a/a", vec![issue("a/a", 1, &[])]),
                model("b/b", vec![issue("b/b", 2, &[])]),
            ],
            vec![Filter::default()],
        );

        h.engine.set_default_repo("a/a");
        assert!(h.engine.refresh().await);

        let update = h.sink.last_refresh().unwrap();
        assert_eq!(update.groups.len(), 1);
        assert_eq!(update.groups[0].elements.len(), 1);
        assert_eq!(update.groups[0].elements[0].issue.number, 1);
    }
}

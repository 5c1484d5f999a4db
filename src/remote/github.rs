//! remote::github
//!
//! GitHub remote implementation using the REST v3 API.
//!
//! # Design
//!
//! Implements the `Remote` trait against GitHub. Snapshots are assembled
//! from the issues and labels endpoints (pull requests are filtered out
//! of the issues listing); metadata comes from the per-issue events and
//! comments endpoints; the call budget from `/rate_limit`.
//!
//! Fetched snapshots are mirrored into an on-disk JSON cache, which backs
//! `stored_repositories`/`remove_repository`. Cache writes are
//! best-effort: a failed write is logged and never fails the fetch that
//! produced the snapshot.
//!
//! # Rate Limiting
//!
//! This implementation returns `RemoteError::RateLimited` when the
//! budget is exhausted and does not retry; backing off is the caller's
//! responsibility.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

use super::traits::{RateLimits, Remote, RemoteError};
use crate::core::{
    EventKind, Issue, IssueComment, IssueEvent, IssueState, Label, Model, RawMetadata, RepoId,
    Stamp, User,
};

/// Default GitHub API base URL.
const DEFAULT_API_BASE: &str = "https://api.github.com";

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = "hubsync";

/// Page size for listing endpoints.
const PER_PAGE: usize = 100;

/// GitHub remote implementation.
pub struct GitHubRemote {
    /// HTTP client for making requests
    client: Client,
    /// API base URL (configurable for GitHub Enterprise and tests)
    api_base: String,
    /// Directory holding the on-disk snapshot cache
    cache_dir: PathBuf,
}

// Custom Debug to avoid exposing the authorization header material.
impl std::fmt::Debug for GitHubRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubRemote")
            .field("api_base", &self.api_base)
            .field("cache_dir", &self.cache_dir)
            .finish()
    }
}

impl GitHubRemote {
    /// Create a new GitHub remote authenticating with a token.
    ///
    /// The snapshot cache defaults to the platform cache directory.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::NetworkError` if the HTTP client cannot be
    /// constructed.
    pub fn new(token: &str) -> Result<Self, RemoteError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| RemoteError::AuthFailed(e.to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| RemoteError::NetworkError(e.to_string()))?;

        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("hubsync")
            .join("repos");

        Ok(Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            cache_dir,
        })
    }

    /// Override the API base URL (GitHub Enterprise, test servers).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Override the snapshot cache directory.
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    async fn get(&self, path: &str) -> Result<Response, RemoteError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| RemoteError::NetworkError(e.to_string()))?;
        check_status(response).await
    }

    async fn fetch_snapshot(&self, id: &RepoId) -> Result<Model, RemoteError> {
        tracing::debug!("fetching snapshot for {}", id);

        let issues = self.fetch_issues(id).await?;
        let labels = self.fetch_labels(id).await?;
        let users = collect_users(&issues);

        let model = Model::new(id.clone(), issues, labels, users);
        if let Err(e) = self.write_cached(&model) {
            tracing::warn!("failed to cache snapshot for {}: {:#}", id, e);
        }

        tracing::info!(
            "fetched {} with {} issues",
            id,
            model.issues.len()
        );
        Ok(model)
    }

    async fn fetch_issues(&self, id: &RepoId) -> Result<Vec<Issue>, RemoteError> {
        let mut issues = Vec::new();
        let mut page = 1usize;
        loop {
            let path = format!(
                "repos/{}/issues?state=all&direction=asc&per_page={}&page={}",
                id, PER_PAGE, page
            );
            let batch: Vec<ApiIssue> = self
                .get(&path)
                .await?
                .json()
                .await
                .map_err(|e| RemoteError::NetworkError(e.to_string()))?;
            let batch_len = batch.len();

            issues.extend(
                batch
                    .into_iter()
                    .filter(|i| i.pull_request.is_none())
                    .map(|i| i.into_issue(id.clone())),
            );

            if batch_len < PER_PAGE {
                return Ok(issues);
            }
            page += 1;
        }
    }

    async fn fetch_labels(&self, id: &RepoId) -> Result<Vec<Label>, RemoteError> {
        let path = format!("repos/{}/labels?per_page={}", id, PER_PAGE);
        let labels: Vec<ApiLabel> = self
            .get(&path)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::NetworkError(e.to_string()))?;
        Ok(labels
            .into_iter()
            .map(|l| Label {
                name: l.name,
                color: l.color,
            })
            .collect())
    }

    fn cache_path(&self, id: &RepoId) -> PathBuf {
        self.cache_dir
            .join(format!("{}.json", id.as_str().replace('/', "__")))
    }

    fn write_cached(&self, model: &Model) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.cache_dir)
            .with_context(|| format!("creating {}", self.cache_dir.display()))?;
        let path = self.cache_path(&model.repo);
        let json = serde_json::to_string_pretty(model).context("serializing snapshot")?;
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

/// Map HTTP failure statuses onto the remote error taxonomy.
async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let rate_exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "0");
    let message = response.text().await.unwrap_or_default();

    Err(match status {
        StatusCode::UNAUTHORIZED => RemoteError::AuthFailed(message),
        StatusCode::FORBIDDEN if rate_exhausted => RemoteError::RateLimited,
        StatusCode::FORBIDDEN => RemoteError::AuthFailed(message),
        StatusCode::NOT_FOUND => RemoteError::NotFound(message),
        _ => RemoteError::ApiError {
            status: status.as_u16(),
            message,
        },
    })
}

fn collect_users(issues: &[Issue]) -> Vec<User> {
    let mut seen = HashSet::new();
    let mut users = Vec::new();
    for issue in issues {
        for login in std::iter::once(&issue.author).chain(issue.assignee.iter()) {
            if seen.insert(login.clone()) {
                users.push(User {
                    login: login.clone(),
                    name: None,
                });
            }
        }
    }
    users
}

fn event_kind(event: &str) -> EventKind {
    match event {
        "labeled" => EventKind::Labeled,
        "unlabeled" => EventKind::Unlabeled,
        "milestoned" => EventKind::Milestoned,
        "demilestoned" => EventKind::Demilestoned,
        "renamed" => EventKind::Renamed,
        "assigned" => EventKind::Assigned,
        "unassigned" => EventKind::Unassigned,
        "closed" => EventKind::Closed,
        "reopened" => EventKind::Reopened,
        _ => EventKind::Other,
    }
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ApiLabel {
    name: String,
    color: String,
}

#[derive(Debug, Deserialize)]
struct ApiIssue {
    number: u64,
    title: String,
    state: String,
    user: ApiUser,
    assignee: Option<ApiUser>,
    #[serde(default)]
    labels: Vec<ApiLabel>,
    updated_at: DateTime<Utc>,
    /// Present when the record is actually a pull request.
    pull_request: Option<serde_json::Value>,
}

impl ApiIssue {
    fn into_issue(self, repo: RepoId) -> Issue {
        Issue {
            repo,
            number: self.number,
            title: self.title,
            state: if self.state == "closed" {
                IssueState::Closed
            } else {
                IssueState::Open
            },
            author: self.user.login,
            assignee: self.assignee.map(|u| u.login),
            labels: self.labels.into_iter().map(|l| l.name).collect(),
            updated_at: self.updated_at,
            labels_last_modified_at: Stamp::default(),
            metadata: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiEvent {
    event: String,
    actor: Option<ApiUser>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ApiComment {
    user: ApiUser,
    #[serde(default)]
    body: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ApiRateLimit {
    rate: ApiRate,
}

#[derive(Debug, Deserialize)]
struct ApiRate {
    remaining: u32,
    reset: i64,
}

#[async_trait]
impl Remote for GitHubRemote {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn is_repository_valid(&self, id: &RepoId) -> Result<bool, RemoteError> {
        tracing::debug!("validating {}", id);
        match self.get(&format!("repos/{}", id)).await {
            Ok(_) => Ok(true),
            Err(RemoteError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn open_repository(&self, id: &RepoId) -> Result<Model, RemoteError> {
        self.fetch_snapshot(id).await
    }

    async fn update_model(&self, model: &Model) -> Result<Model, RemoteError> {
        self.fetch_snapshot(&model.repo).await
    }

    async fn get_issue_metadata(
        &self,
        id: &RepoId,
        issues: &[u64],
    ) -> Result<HashMap<u64, RawMetadata>, RemoteError> {
        let mut result = HashMap::new();
        for &number in issues {
            let events: Vec<ApiEvent> = self
                .get(&format!("repos/{}/issues/{}/events", id, number))
                .await?
                .json()
                .await
                .map_err(|e| RemoteError::NetworkError(e.to_string()))?;
            let comments: Vec<ApiComment> = self
                .get(&format!("repos/{}/issues/{}/comments", id, number))
                .await?
                .json()
                .await
                .map_err(|e| RemoteError::NetworkError(e.to_string()))?;

            result.insert(
                number,
                RawMetadata {
                    events: events
                        .into_iter()
                        .map(|e| IssueEvent {
                            actor: e.actor.map(|a| a.login).unwrap_or_default(),
                            kind: event_kind(&e.event),
                            occurred_at: e.created_at,
                        })
                        .collect(),
                    comments: comments
                        .into_iter()
                        .map(|c| IssueComment {
                            author: c.user.login,
                            body: c.body.unwrap_or_default(),
                            created_at: c.created_at,
                        })
                        .collect(),
                },
            );
        }
        Ok(result)
    }

    async fn replace_issue_labels(
        &self,
        issue: &Issue,
        labels: &[String],
    ) -> Result<bool, RemoteError> {
        tracing::debug!("replacing labels for {} on the server", issue);
        let response = self
            .client
            .put(self.url(&format!(
                "repos/{}/issues/{}/labels",
                issue.repo, issue.number
            )))
            .json(&serde_json::json!({ "labels": labels }))
            .send()
            .await
            .map_err(|e| RemoteError::NetworkError(e.to_string()))?;

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            return Ok(false);
        }
        check_status(response).await?;
        Ok(true)
    }

    async fn rate_limit(&self) -> Result<RateLimits, RemoteError> {
        let limits: ApiRateLimit = self
            .get("rate_limit")
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::NetworkError(e.to_string()))?;
        Ok(RateLimits {
            remaining: limits.rate.remaining,
            reset_epoch: limits.rate.reset,
        })
    }

    async fn stored_repositories(&self) -> Result<HashSet<String>, RemoteError> {
        let entries = match std::fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => return Err(RemoteError::CacheError(e.to_string())),
        };

        let mut repos = HashSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| RemoteError::CacheError(e.to_string()))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(".json") {
                repos.insert(stem.replace("__", "/"));
            }
        }
        Ok(repos)
    }

    async fn remove_repository(&self, id: &RepoId) -> Result<bool, RemoteError> {
        match std::fs::remove_file(self.cache_path(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RemoteError::CacheError(e.to_string())),
        }
    }
}

//! remote::traits
//!
//! The Remote Access Port: the async operations the engine consumes to
//! validate, download, and mutate repositories on the remote service.
//!
//! # Design
//!
//! The `Remote` trait is async because every operation involves network
//! I/O; each call is a suspension point for the engine. All methods
//! return `Result` so failures can be handled gracefully: the engine
//! catches errors at the point of use and translates them into boolean
//! results, never letting them cross its public boundary.
//!
//! Implementations must be safe for concurrent invocation; the engine
//! issues concurrent requests during a refresh.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use thiserror::Error;

use crate::core::{Issue, Model, RawMetadata, RepoId};

/// Errors from remote operations.
///
/// These map to the common failure modes of a hosted issue-tracking
/// service.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// Authentication failed (invalid token, expired, insufficient permissions).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Network or connection error.
    #[error("network error: {0}")]
    NetworkError(String),

    /// Local snapshot-cache I/O failed.
    #[error("cache error: {0}")]
    CacheError(String),
}

/// Remaining remote call budget and its reset time.
///
/// Advisory only: queried after remote-consuming operations and forwarded
/// to the UI so the user can be warned before the budget runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    /// Calls remaining in the current window.
    pub remaining: u32,
    /// Unix epoch second at which the budget resets.
    pub reset_epoch: i64,
}

/// The Remote Access Port consumed by the synchronization engine.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the engine shares one instance
/// across concurrent tasks.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Get the remote name (e.g., "github", "mock").
    fn name(&self) -> &'static str;

    /// Check whether `id` names an accessible repository.
    ///
    /// # Errors
    ///
    /// Network and auth failures are errors; an id that is well-formed
    /// but unknown to the service resolves to `Ok(false)`.
    async fn is_repository_valid(&self, id: &RepoId) -> Result<bool, RemoteError>;

    /// Download a full snapshot of the repository.
    async fn open_repository(&self, id: &RepoId) -> Result<Model, RemoteError>;

    /// Download a refreshed snapshot superseding `model`.
    async fn update_model(&self, model: &Model) -> Result<Model, RemoteError>;

    /// Fetch raw metadata records for the given issues of one repository.
    ///
    /// The result maps issue numbers to their records; issues the remote
    /// knows nothing about are simply absent from the map.
    async fn get_issue_metadata(
        &self,
        id: &RepoId,
        issues: &[u64],
    ) -> Result<HashMap<u64, RawMetadata>, RemoteError>;

    /// Replace the label set of an issue on the remote.
    ///
    /// Resolves to `Ok(false)` when the service rejects the change
    /// without a transport-level failure.
    async fn replace_issue_labels(
        &self,
        issue: &Issue,
        labels: &[String],
    ) -> Result<bool, RemoteError>;

    /// Query the remaining call budget and its reset time.
    async fn rate_limit(&self) -> Result<RateLimits, RemoteError>;

    /// Identifiers of repositories with a locally stored snapshot.
    async fn stored_repositories(&self) -> Result<HashSet<String>, RemoteError>;

    /// Remove the locally stored snapshot for `id`. Resolves to
    /// `Ok(false)` when none was stored.
    async fn remove_repository(&self, id: &RepoId) -> Result<bool, RemoteError>;
}

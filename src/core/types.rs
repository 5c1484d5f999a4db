//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`RepoId`] - Validated, case-insensitive repository identifier
//! - [`Stamp`] - Strictly monotonic logical timestamp for label mutations
//! - [`Issue`] - A single issue inside a repository snapshot
//! - [`Label`] / [`User`] - Repository label and user records
//! - [`Model`] - A full repository snapshot at a point in time
//!
//! # Validation
//!
//! `RepoId` enforces validity at construction time and normalizes to
//! lower case, so two spellings of the same repository can never coexist
//! in the store. Invalid identifiers are unrepresentable.
//!
//! # Examples
//!
//! ```
//! use hubsync::core::types::RepoId;
//!
//! let id = RepoId::new("HubSync/Example").unwrap();
//! assert_eq!(id.as_str(), "hubsync/example");
//! assert_eq!(id, RepoId::new("hubsync/EXAMPLE").unwrap());
//!
//! assert!(RepoId::new("no-slash").is_err());
//! assert!(RepoId::new("too/many/parts").is_err());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::metadata::IssueMetadata;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid repository id: {0}")]
    InvalidRepoId(String),
}

/// A validated repository identifier of the form `owner/name`.
///
/// Identifiers are case-insensitive: the stored form is lower-cased at
/// construction and all comparisons use it. Both components must be
/// non-empty and may contain only alphanumerics, `-`, `_`, and `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId(String);

impl RepoId {
    /// Create a new validated repository id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRepoId` if the identifier is not of the
    /// form `owner/name` or contains disallowed characters.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id.to_lowercase()))
    }

    fn validate(id: &str) -> Result<(), TypeError> {
        let mut parts = id.split('/');
        let (owner, name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) => (owner, name),
            _ => {
                return Err(TypeError::InvalidRepoId(format!(
                    "'{}' is not of the form owner/name",
                    id
                )))
            }
        };

        for component in [owner, name] {
            if component.is_empty() {
                return Err(TypeError::InvalidRepoId(format!(
                    "'{}' has an empty component",
                    id
                )));
            }
            if let Some(c) = component
                .chars()
                .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '-' | '_' | '.'))
            {
                return Err(TypeError::InvalidRepoId(format!(
                    "'{}' contains invalid character '{}'",
                    id, c
                )));
            }
        }

        Ok(())
    }

    /// Get the normalized (lower-cased) id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `owner` component of the id.
    pub fn owner(&self) -> &str {
        self.0.split('/').next().unwrap_or_default()
    }

    /// The `name` component of the id.
    pub fn name(&self) -> &str {
        self.0.split('/').nth(1).unwrap_or_default()
    }
}

impl TryFrom<String> for RepoId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RepoId> for String {
    fn from(id: RepoId) -> Self {
        id.0
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A strictly monotonic logical timestamp.
///
/// Stamps are issued only by the store's clock and gate the revert of a
/// failed optimistic mutation: a revert proceeds only when the stamp it
/// recorded is still the one on the stored issue. Logical counters remove
/// the wall-clock collision ambiguity of comparing modification times.
///
/// The default stamp is the zero stamp, which the clock never issues;
/// snapshots rehydrated from a cache therefore never match an in-flight
/// revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Stamp(u64);

impl Stamp {
    /// The stamp following this one.
    pub fn next(self) -> Stamp {
        Stamp(self.0 + 1)
    }

    /// True for the zero stamp, which no clock ever issues.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

/// Issue state as reported by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl std::fmt::Display for IssueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueState::Open => write!(f, "open"),
            IssueState::Closed => write!(f, "closed"),
        }
    }
}

/// A repository label definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Label name (unique within a repository).
    pub name: String,
    /// Hex color without the leading `#`.
    pub color: String,
}

/// A user known to a repository (issue author or assignee).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Account login.
    pub login: String,
    /// Display name, when the remote provides one.
    pub name: Option<String>,
}

/// A single issue inside a repository snapshot.
///
/// The issue number is immutable and scoped to its repository. The label
/// set is the only field the engine patches in place; every such patch
/// stamps `labels_last_modified_at` with a fresh [`Stamp`] before any
/// remote call is issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Repository this issue belongs to.
    pub repo: RepoId,
    /// Issue number, unique within the repository.
    pub number: u64,
    /// Issue title.
    pub title: String,
    /// Open or closed.
    pub state: IssueState,
    /// Login of the user who opened the issue.
    pub author: String,
    /// Login of the assignee, if any.
    pub assignee: Option<String>,
    /// Names of the labels currently applied.
    pub labels: Vec<String>,
    /// Last modification time reported by the remote.
    pub updated_at: DateTime<Utc>,
    /// Logical time of the last local label mutation. Not persisted:
    /// cached snapshots rehydrate at the zero stamp.
    #[serde(skip)]
    pub labels_last_modified_at: Stamp,
    /// Supplementary metadata, present once fetched.
    pub metadata: Option<IssueMetadata>,
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

/// A full repository snapshot: all issues, labels, and users for one
/// repository identifier at a point in time.
///
/// Snapshots are replaced wholesale on refresh; in-place patches go
/// through the store's label-replacement primitives only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Repository this snapshot replicates.
    pub repo: RepoId,
    /// All issues, in remote order.
    pub issues: Vec<Issue>,
    /// Label definitions for the repository.
    pub labels: Vec<Label>,
    /// Users referenced by the snapshot.
    pub users: Vec<User>,
}

impl Model {
    /// Create a snapshot, taking ownership of its contents.
    pub fn new(repo: RepoId, issues: Vec<Issue>, labels: Vec<Label>, users: Vec<User>) -> Self {
        Self {
            repo,
            issues,
            labels,
            users,
        }
    }

    /// Look up an issue by number.
    pub fn issue(&self, number: u64) -> Option<&Issue> {
        self.issues.iter().find(|i| i.number == number)
    }

    pub(crate) fn issue_mut(&mut self, number: u64) -> Option<&mut Issue> {
        self.issues.iter_mut().find(|i| i.number == number)
    }

    /// Look up a label definition by name.
    pub fn label(&self, name: &str) -> Option<&Label> {
        self.labels.iter().find(|l| l.name == name)
    }
}

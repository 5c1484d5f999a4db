//! core::metadata
//!
//! Per-issue supplementary metadata and its merge with the signed-in
//! user's identity.
//!
//! # Design
//!
//! The remote returns raw event and comment records per issue. The
//! derived form distinguishes self-authored activity from others': the
//! interesting question for the UI is "when did someone *else* last
//! touch this issue". [`IssueMetadata::full`] is a pure function of the
//! fetched records and the current user identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kinds of events that can happen to an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Labeled,
    Unlabeled,
    Milestoned,
    Demilestoned,
    Renamed,
    Assigned,
    Unassigned,
    Closed,
    Reopened,
    /// Any event kind this client does not model specially.
    #[serde(other)]
    Other,
}

/// An event that happened to an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueEvent {
    /// Login of the user who triggered the event.
    pub actor: String,
    /// What happened.
    pub kind: EventKind,
    /// When it happened.
    pub occurred_at: DateTime<Utc>,
}

/// A comment on an issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueComment {
    /// Login of the comment author.
    pub author: String,
    /// Comment body.
    pub body: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Raw metadata as fetched from the remote, before merging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMetadata {
    /// Events in the order the remote returned them.
    pub events: Vec<IssueEvent>,
    /// Comments in the order the remote returned them.
    pub comments: Vec<IssueComment>,
}

/// Derived metadata for one issue.
///
/// `non_self_updated_at` is the latest event or comment time attributed
/// to anyone other than the current user; `None` when all recorded
/// activity is self-authored (or there is none).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueMetadata {
    /// Events carried over from the raw form.
    pub events: Vec<IssueEvent>,
    /// Comments carried over from the raw form.
    pub comments: Vec<IssueComment>,
    /// Latest activity time by someone other than the current user.
    pub non_self_updated_at: Option<DateTime<Utc>>,
    /// Number of comments authored by someone other than the current user.
    pub non_self_comment_count: usize,
}

impl IssueMetadata {
    /// Derive the full form from raw records and the current user.
    ///
    /// With no known current user every record counts as non-self, which
    /// errs on the side of showing activity.
    pub fn full(raw: RawMetadata, current_user: Option<&str>) -> Self {
        let is_self = |login: &str| current_user.is_some_and(|u| u.eq_ignore_ascii_case(login));

        let latest_event = raw
            .events
            .iter()
            .filter(|e| !is_self(&e.actor))
            .map(|e| e.occurred_at)
            .max();
        let latest_comment = raw
            .comments
            .iter()
            .filter(|c| !is_self(&c.author))
            .map(|c| c.created_at)
            .max();

        let non_self_comment_count = raw.comments.iter().filter(|c| !is_self(&c.author)).count();

        Self {
            non_self_updated_at: latest_event.max(latest_comment),
            non_self_comment_count,
            events: raw.events,
            comments: raw.comments,
        }
    }
}

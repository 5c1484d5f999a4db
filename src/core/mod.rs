//! core
//!
//! Domain types and pure derivations shared by the store, the remote
//! port, and the engine.

pub mod metadata;
pub mod types;

pub use metadata::{EventKind, IssueComment, IssueEvent, IssueMetadata, RawMetadata};
pub use types::{Issue, IssueState, Label, Model, RepoId, Stamp, TypeError, User};

//! hubsync - A client-side synchronization engine for issue repositories
//!
//! hubsync keeps a local, mutable replica of a set of remote issue
//! repositories consistent with the authoritative service, while letting
//! a UI layer perform optimistic local mutations that are confirmed
//! asynchronously and conditionally reverted on failure.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`engine`] - The synchronization engine (public entry point for the UI layer)
//! - [`store`] - In-memory repository store with explicit pending/present states
//! - [`remote`] - Remote Access Port: the `Remote` trait, GitHub adapter, test mock
//! - [`core`] - Domain types and pure metadata derivations
//! - [`ui`] - Notification sink trait and view grouping
//! - [`prefs`] - Preferences collaborator (last-viewed repository, username)
//!
//! # Correctness Invariants
//!
//! hubsync maintains the following invariants:
//!
//! 1. A repository identifier is in exactly one of {absent, pending,
//!    present}; concurrent opens of the same repository fetch once
//! 2. All store mutations flow through the engine in short critical
//!    sections that never span a remote call
//! 3. A failed optimistic mutation is reverted only when its logical
//!    stamp still matches the stored issue; newer local edits always win
//! 4. Remote failures never cross the engine's public boundary as errors

pub mod core;
pub mod engine;
pub mod prefs;
pub mod remote;
pub mod store;
pub mod ui;

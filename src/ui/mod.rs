//! ui
//!
//! UI-facing seams: the notification sink trait and the view grouping
//! the engine computes for it.

pub mod sink;
pub mod view;

pub use sink::{NullSink, UiSink};
pub use view::{build_groups, Filter, FilterGroup, ViewElement, ViewUpdate};

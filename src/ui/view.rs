//! ui::view
//!
//! Grouping of store contents into the refresh payload the UI consumes.
//!
//! A [`Filter`] is the distilled form of a panel's filter expression: an
//! optional repository and an optional label name. A filter with no
//! explicit repository follows the store's default repository, which is
//! why designating a new primary repository refreshes the UI even when
//! nothing was re-fetched.

use serde::{Deserialize, Serialize};

use crate::core::{Issue, Label, Model, RepoId, User};

/// A panel filter: which issues one UI panel shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filter {
    /// Restrict to one repository; `None` follows the default repository.
    pub repo: Option<RepoId>,
    /// Restrict to issues carrying this label.
    pub label: Option<String>,
}

impl Filter {
    /// True when `issue` passes this filter given the current default
    /// repository.
    pub fn matches(&self, issue: &Issue, default_repo: Option<&RepoId>) -> bool {
        let target = self.repo.as_ref().or(default_repo);
        if let Some(repo) = target {
            if issue.repo != *repo {
                return false;
            }
        }
        if let Some(label) = &self.label {
            if !issue.labels.iter().any(|l| l == label) {
                return false;
            }
        }
        true
    }

    /// The repository this filter pins, if any.
    pub fn repo(&self) -> Option<&RepoId> {
        self.repo.as_ref()
    }
}

/// An issue packaged for rendering: the issue plus its resolved label
/// definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewElement {
    pub issue: Issue,
    pub labels: Vec<Label>,
}

/// The elements one filter currently shows.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGroup {
    pub filter: Filter,
    pub elements: Vec<ViewElement>,
}

/// The refresh payload: elements grouped by active filter, plus the
/// current user set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewUpdate {
    pub groups: Vec<FilterGroup>,
    pub users: Vec<User>,
}

/// Group the issues of `models` by the given filters.
pub fn build_groups(
    filters: &[Filter],
    models: &[Model],
    default_repo: Option<&RepoId>,
) -> Vec<FilterGroup> {
    filters
        .iter()
        .map(|filter| {
            let elements = models
                .iter()
                .flat_map(|model| {
                    model
                        .issues
                        .iter()
                        .filter(|issue| filter.matches(issue, default_repo))
                        .map(|issue| ViewElement {
                            issue: issue.clone(),
                            labels: issue
                                .labels
                                .iter()
                                .filter_map(|name| model.label(name).cloned())
                                .collect(),
                        })
                })
                .collect();
            FilterGroup {
                filter: filter.clone(),
                elements,
            }
        })
        .collect()
}

//! Visibility filters driven by the tag dropdown, tag checkboxes and the
//! free-text search box.

use crate::markers::MarkerIndex;
use crate::normalize::NormalizedRecord;
use crate::surface::{MarkerId, RenderSurface};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// How several checked tags combine. Fixed per deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagMatch {
    /// A marker must carry every checked tag.
    #[default]
    All,
    /// A marker must carry at least one checked tag.
    Any,
}

impl TagMatch {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "all" | "and" => Some(TagMatch::All),
            "any" | "or" => Some(TagMatch::Any),
            _ => None,
        }
    }
}

/// Current state of the filter controls.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Selection {
    /// Nothing selected, everything visible.
    #[default]
    All,
    /// Dropdown with a single tag.
    Tag(String),
    /// Set of checked tag checkboxes.
    Tags(Vec<String>),
    /// Free-text search over organization names and tags.
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterOutcome {
    pub visible: usize,
    pub hidden: usize,
    /// Markers passing the filter, in index order.
    pub matches: Vec<MarkerId>,
    /// Marker the view moved to (text search only).
    pub focused: Option<MarkerId>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FilterEngine {
    policy: TagMatch,
}

impl FilterEngine {
    pub fn new(policy: TagMatch) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> TagMatch {
        self.policy
    }

    pub fn matches(&self, selection: &Selection, record: &NormalizedRecord) -> bool {
        match selection {
            Selection::All => true,
            Selection::Tag(tag) => tag.trim().is_empty() || record.has_tag(tag),
            Selection::Tags(tags) => {
                let mut checked = tags.iter().filter(|t| !t.trim().is_empty()).peekable();
                if checked.peek().is_none() {
                    return true;
                }
                match self.policy {
                    TagMatch::All => checked.all(|t| record.has_tag(t)),
                    TagMatch::Any => checked.any(|t| record.has_tag(t)),
                }
            }
            Selection::Text(query) => {
                let query = query.trim().to_lowercase();
                query.is_empty()
                    || record.org_name.to_lowercase().contains(&query)
                    || record.tag_line().to_lowercase().contains(&query)
            }
        }
    }

    /// Compute and apply visibility for every marker.
    ///
    /// A non-empty text search also focuses the first match.
    pub fn apply<S: RenderSurface>(
        &self,
        selection: &Selection,
        index: &mut MarkerIndex<S>,
    ) -> FilterOutcome {
        let decisions = index.apply_visibility(|record| self.matches(selection, record));

        let mut outcome = FilterOutcome::default();
        for (id, visible) in decisions {
            if visible {
                outcome.visible += 1;
                outcome.matches.push(id);
            } else {
                outcome.hidden += 1;
            }
        }

        if let Selection::Text(query) = selection
            && !query.trim().is_empty()
            && let Some(&first) = outcome.matches.first()
        {
            if index.focus(first).is_ok() {
                outcome.focused = Some(first);
            }
        }

        debug!(
            "Filter {:?} left {} visible, {} hidden",
            selection, outcome.visible, outcome.hidden
        );
        outcome
    }
}

/// Sorted, unique tags across the index, for the tag dropdown.
pub fn tag_options<S: RenderSurface>(index: &MarkerIndex<S>) -> Vec<String> {
    index
        .entries()
        .iter()
        .flat_map(|entry| entry.record.tags.iter().cloned())
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect()
}

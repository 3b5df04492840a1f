//! Legend view-models derived from the marker index.
//!
//! A legend is rebuilt from scratch after every load cycle. It carries no
//! presentation of its own; front ends render its sections and forward
//! checkbox, reset and member-click events back here.

use crate::color::ColorAssigner;
use crate::error::{LoadError, Result};
use crate::markers::{GroupingMode, MarkerEntry, MarkerIndex};
use crate::surface::{MarkerId, RenderSurface};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendMember {
    pub marker: MarkerId,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendSection {
    pub key: String,
    pub color: String,
    pub checked: bool,
    pub members: Vec<LegendMember>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Legend {
    pub mode: GroupingMode,
    sections: Vec<LegendSection>,
}

impl Legend {
    pub fn empty(mode: GroupingMode) -> Self {
        Self {
            mode,
            sections: Vec::new(),
        }
    }

    /// One section per group of the index, every checkbox checked.
    pub fn build<S: RenderSurface>(
        index: &MarkerIndex<S>,
        mode: GroupingMode,
        colors: &mut ColorAssigner,
    ) -> Self {
        let sections = index
            .groups()
            .map(|(key, members)| LegendSection {
                key: key.to_string(),
                color: colors.color_for(key),
                checked: true,
                members: members
                    .iter()
                    .filter_map(|id| index.get(*id))
                    .map(|entry| LegendMember {
                        marker: entry.id,
                        label: entry.record.org_name.clone(),
                    })
                    .collect(),
            })
            .collect();
        Self { mode, sections }
    }

    pub fn sections(&self) -> &[LegendSection] {
        &self.sections
    }

    pub fn section(&self, key: &str) -> Option<&LegendSection> {
        self.sections.iter().find(|s| s.key == key)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Category key to checkbox state, in legend order.
    pub fn state(&self) -> Vec<(&str, bool)> {
        self.sections
            .iter()
            .map(|s| (s.key.as_str(), s.checked))
            .collect()
    }

    /// Check or uncheck a category and assign its markers' visibility to match.
    ///
    /// Markers in several categories take the state of the last toggle.
    pub fn toggle<S: RenderSurface>(
        &mut self,
        key: &str,
        checked: bool,
        index: &mut MarkerIndex<S>,
    ) -> Result<usize> {
        let section = self
            .sections
            .iter_mut()
            .find(|s| s.key == key)
            .ok_or_else(|| LoadError::UnknownCategory(key.to_string()))?;
        section.checked = checked;
        index.set_group_visible(key, checked)
    }

    /// Re-check every category and show every marker.
    pub fn reset<S: RenderSurface>(&mut self, index: &mut MarkerIndex<S>) {
        for section in &mut self.sections {
            section.checked = true;
        }
        index.show_all();
    }

    /// A legend entry was clicked.
    pub fn focus_member<'a, S: RenderSurface>(
        &self,
        marker: MarkerId,
        index: &'a mut MarkerIndex<S>,
    ) -> Result<&'a MarkerEntry> {
        index.focus(marker)
    }
}

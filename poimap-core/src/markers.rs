//! Markers of the current load cycle and the category groups they belong to.

use crate::error::{LoadError, Result};
use crate::normalize::NormalizedRecord;
use crate::popup::Popup;
use crate::surface::{MarkerId, RenderSurface};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Which key a legend groups markers by. One mode per legend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingMode {
    /// One group per tag; a marker with several tags sits in several groups.
    #[default]
    Tag,
    /// One group per organization name.
    Organization,
}

impl GroupingMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tag" | "tags" => Some(GroupingMode::Tag),
            "org" | "orgs" | "organization" | "organisation" => Some(GroupingMode::Organization),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupingMode::Tag => "tag",
            GroupingMode::Organization => "organization",
        }
    }

    /// Group keys of a record, without duplicates, in record order.
    pub fn keys_for(&self, record: &NormalizedRecord) -> Vec<String> {
        match self {
            GroupingMode::Tag => {
                let mut keys: Vec<String> = Vec::with_capacity(record.tags.len());
                for tag in &record.tags {
                    if !keys.contains(tag) {
                        keys.push(tag.clone());
                    }
                }
                keys
            }
            GroupingMode::Organization => vec![record.org_name.clone()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerEntry {
    pub id: MarkerId,
    pub record: NormalizedRecord,
    pub groups: Vec<String>,
    pub color: String,
    pub visible: bool,
}

/// Owns every marker of the current load cycle.
///
/// The index is torn down with [`MarkerIndex::clear`] and rebuilt with
/// [`MarkerIndex::add`] on every refresh; it is never patched in place.
pub struct MarkerIndex<S: RenderSurface> {
    surface: S,
    entries: Vec<MarkerEntry>,
    groups: Vec<(String, Vec<MarkerId>)>,
    group_lookup: HashMap<String, usize>,
    focused: Option<MarkerId>,
}

impl<S: RenderSurface> MarkerIndex<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            entries: Vec::new(),
            groups: Vec::new(),
            group_lookup: HashMap::new(),
            focused: None,
        }
    }

    /// Remove every marker from the surface and empty the index.
    pub fn clear(&mut self) {
        for entry in &self.entries {
            self.surface.remove_marker(entry.id);
        }
        debug!("Cleared {} markers", self.entries.len());
        self.entries.clear();
        self.groups.clear();
        self.group_lookup.clear();
        self.focused = None;
    }

    /// Place a marker for `record` and register it under `group_keys`.
    pub fn add(&mut self, record: NormalizedRecord, group_keys: &[String], color: &str) -> MarkerId {
        let id = MarkerId(self.entries.len());
        let popup = Popup::from_record(&record);
        self.surface
            .place_marker(id, record.coordinates(), color, &popup);

        let mut groups: Vec<String> = Vec::with_capacity(group_keys.len());
        for key in group_keys {
            if groups.contains(key) {
                continue;
            }
            let slot = match self.group_lookup.get(key) {
                Some(&slot) => slot,
                None => {
                    self.groups.push((key.clone(), Vec::new()));
                    self.group_lookup.insert(key.clone(), self.groups.len() - 1);
                    self.groups.len() - 1
                }
            };
            self.groups[slot].1.push(id);
            groups.push(key.clone());
        }

        self.entries.push(MarkerEntry {
            id,
            record,
            groups,
            color: color.to_string(),
            visible: true,
        });
        id
    }

    pub fn get(&self, id: MarkerId) -> Option<&MarkerEntry> {
        self.entries.get(id.0)
    }

    pub fn entries(&self) -> &[MarkerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Groups in the order their keys were first registered.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &[MarkerId])> {
        self.groups
            .iter()
            .map(|(key, members)| (key.as_str(), members.as_slice()))
    }

    pub fn group(&self, key: &str) -> Option<&[MarkerId]> {
        self.group_lookup
            .get(key)
            .map(|&slot| self.groups[slot].1.as_slice())
    }

    pub fn visible_count(&self) -> usize {
        self.entries.iter().filter(|e| e.visible).count()
    }

    pub fn set_visible(&mut self, id: MarkerId, visible: bool) -> Result<()> {
        let entry = self
            .entries
            .get_mut(id.0)
            .ok_or(LoadError::UnknownMarker(id.0))?;
        assign_visible(&mut self.surface, entry, visible);
        Ok(())
    }

    /// Decide every marker's visibility from its record.
    ///
    /// Returns the decisions in index order.
    pub fn apply_visibility<F>(&mut self, mut decide: F) -> Vec<(MarkerId, bool)>
    where
        F: FnMut(&NormalizedRecord) -> bool,
    {
        let surface = &mut self.surface;
        self.entries
            .iter_mut()
            .map(|entry| {
                let visible = decide(&entry.record);
                assign_visible(surface, entry, visible);
                (entry.id, visible)
            })
            .collect()
    }

    /// Assign visibility to every member of a group. Returns the member count.
    pub fn set_group_visible(&mut self, key: &str, visible: bool) -> Result<usize> {
        let members = self
            .group(key)
            .ok_or_else(|| LoadError::UnknownCategory(key.to_string()))?
            .to_vec();
        for id in &members {
            self.set_visible(*id, visible)?;
        }
        Ok(members.len())
    }

    pub fn show_all(&mut self) {
        self.apply_visibility(|_| true);
    }

    /// Re-center on a marker and open its popup.
    pub fn focus(&mut self, id: MarkerId) -> Result<&MarkerEntry> {
        let entry = self.entries.get(id.0).ok_or(LoadError::UnknownMarker(id.0))?;
        self.surface.focus(id, entry.record.coordinates());
        self.focused = Some(id);
        Ok(entry)
    }

    /// Marker whose popup was opened last in this cycle.
    pub fn focused(&self) -> Option<MarkerId> {
        self.focused
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }
}

fn assign_visible<S: RenderSurface>(surface: &mut S, entry: &mut MarkerEntry, visible: bool) {
    if entry.visible != visible {
        entry.visible = visible;
        surface.set_marker_visible(entry.id, visible);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::MemorySurface;

    fn record(id: &str, org: &str, tags: &[&str]) -> NormalizedRecord {
        NormalizedRecord {
            id: id.to_string(),
            org_name: org.to_string(),
            address: None,
            email: None,
            phone: None,
            website: None,
            social: None,
            image_url: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            latitude: 40.7,
            longitude: -74.0,
        }
    }

    fn keys(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_add_registers_every_group() {
        let mut index = MarkerIndex::new(MemorySurface::new());
        let a = index.add(record("a", "A", &["Gallery", "Museum"]), &keys(&["Gallery", "Museum"]), "#111111");
        let b = index.add(record("b", "B", &["Museum"]), &keys(&["Museum"]), "#222222");

        assert_eq!(index.group("Gallery"), Some(&[a][..]));
        assert_eq!(index.group("Museum"), Some(&[a, b][..]));
        let order: Vec<&str> = index.groups().map(|(k, _)| k).collect();
        assert_eq!(order, vec!["Gallery", "Museum"]);
        assert_eq!(index.surface().len(), 2);
    }

    #[test]
    fn test_duplicate_group_keys_collapse() {
        let mut index = MarkerIndex::new(MemorySurface::new());
        let id = index.add(record("a", "A", &["Art", "Art"]), &keys(&["Art", "Art"]), "#111111");

        assert_eq!(index.group("Art"), Some(&[id][..]));
        assert_eq!(index.get(id).unwrap().groups, vec!["Art"]);
    }

    #[test]
    fn test_clear_removes_markers_from_surface() {
        let mut index = MarkerIndex::new(MemorySurface::new());
        index.add(record("a", "A", &["Art"]), &keys(&["Art"]), "#111111");
        index.clear();

        assert!(index.is_empty());
        assert!(index.surface().is_empty());
        assert_eq!(index.groups().count(), 0);
    }

    #[test]
    fn test_group_visibility_reaches_surface() {
        let mut index = MarkerIndex::new(MemorySurface::new());
        let a = index.add(record("a", "A", &["Art"]), &keys(&["Art"]), "#111111");
        let b = index.add(record("b", "B", &["Dance"]), &keys(&["Dance"]), "#222222");

        assert_eq!(index.set_group_visible("Art", false).unwrap(), 1);

        assert!(!index.surface().marker(a).unwrap().visible);
        assert!(index.surface().marker(b).unwrap().visible);
        assert_eq!(index.visible_count(), 1);

        index.show_all();
        assert_eq!(index.surface().visible_count(), 2);
    }

    #[test]
    fn test_apply_visibility_decides_per_record() {
        let mut index = MarkerIndex::new(MemorySurface::new());
        let a = index.add(record("a", "A", &["Art"]), &keys(&["Art"]), "#111111");
        let b = index.add(record("b", "B", &["Dance"]), &keys(&["Dance"]), "#222222");

        let decisions = index.apply_visibility(|r| r.has_tag("dance"));

        assert_eq!(decisions, vec![(a, false), (b, true)]);
        assert!(!index.surface().marker(a).unwrap().visible);
        assert!(index.surface().marker(b).unwrap().visible);
        assert_eq!(index.visible_count(), 1);
    }

    #[test]
    fn test_unknown_group_is_an_error() {
        let mut index = MarkerIndex::new(MemorySurface::new());
        assert!(matches!(
            index.set_group_visible("Nope", false),
            Err(LoadError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_focus_centers_and_opens_popup() {
        let mut index = MarkerIndex::new(MemorySurface::new());
        let id = index.add(record("a", "A", &[]), &[], "#111111");

        index.focus(id).unwrap();

        assert_eq!(index.surface().open_popup(), Some(id));
        assert_eq!(index.focused(), Some(id));
        assert_eq!(index.surface().center().unwrap().latitude, 40.7);
    }

    #[test]
    fn test_grouping_mode_keys() {
        let r = record("a", "Queens Gallery", &["Art", "Gallery", "Art"]);
        assert_eq!(GroupingMode::Tag.keys_for(&r), vec!["Art", "Gallery"]);
        assert_eq!(GroupingMode::Organization.keys_for(&r), vec!["Queens Gallery"]);
        assert_eq!(GroupingMode::from_str("ORG"), Some(GroupingMode::Organization));
        assert_eq!(GroupingMode::from_str("colour"), None);
    }
}

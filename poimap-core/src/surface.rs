//! The rendering surface markers are drawn on.
//!
//! Map engines (tiles, projection, drawing) live outside this crate; they are
//! driven through [`RenderSurface`]. [`MemorySurface`] keeps the same state in
//! memory and backs the terminal front ends and the tests.

use crate::popup::Popup;
use poimap_source::Coordinates;
use serde::Serialize;
use std::collections::BTreeMap;

/// Handle of a marker inside one load cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MarkerId(pub usize);

impl std::fmt::Display for MarkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub trait RenderSurface {
    /// Draw a marker with its popup; new markers are visible.
    fn place_marker(&mut self, id: MarkerId, at: Coordinates, color: &str, popup: &Popup);

    fn remove_marker(&mut self, id: MarkerId);

    fn set_marker_visible(&mut self, id: MarkerId, visible: bool);

    /// Re-center the view on the marker and open its popup.
    fn focus(&mut self, id: MarkerId, at: Coordinates);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedMarker {
    pub at: Coordinates,
    pub color: String,
    pub popup: Popup,
    pub visible: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MemorySurface {
    markers: BTreeMap<MarkerId, PlacedMarker>,
    center: Option<Coordinates>,
    open_popup: Option<MarkerId>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker(&self, id: MarkerId) -> Option<&PlacedMarker> {
        self.markers.get(&id)
    }

    pub fn markers(&self) -> impl Iterator<Item = (&MarkerId, &PlacedMarker)> {
        self.markers.iter()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn visible_count(&self) -> usize {
        self.markers.values().filter(|m| m.visible).count()
    }

    pub fn center(&self) -> Option<Coordinates> {
        self.center
    }

    pub fn open_popup(&self) -> Option<MarkerId> {
        self.open_popup
    }
}

impl RenderSurface for MemorySurface {
    fn place_marker(&mut self, id: MarkerId, at: Coordinates, color: &str, popup: &Popup) {
        self.markers.insert(
            id,
            PlacedMarker {
                at,
                color: color.to_string(),
                popup: popup.clone(),
                visible: true,
            },
        );
    }

    fn remove_marker(&mut self, id: MarkerId) {
        self.markers.remove(&id);
        if self.open_popup == Some(id) {
            self.open_popup = None;
        }
    }

    fn set_marker_visible(&mut self, id: MarkerId, visible: bool) {
        if let Some(marker) = self.markers.get_mut(&id) {
            marker.visible = visible;
        }
    }

    fn focus(&mut self, id: MarkerId, at: Coordinates) {
        self.center = Some(at);
        self.open_popup = Some(id);
    }
}

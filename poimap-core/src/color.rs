//! First-seen-order color assignment for category keys.

use std::collections::HashMap;

/// Ten visually distinct hex colors.
pub const DEFAULT_PALETTE: &[&str] = &[
    "#4e79a7", "#f28e2b", "#e15759", "#76b7b2", "#59a14f", "#edc948", "#b07aa1", "#ff9da7",
    "#9c755f", "#bab0ac",
];

/// Color for markers that belong to no category.
pub const UNGROUPED_COLOR: &str = "#3fb1ce";

/// Hands out palette colors to category keys in the order they are first seen.
///
/// The same key keeps its color until [`ColorAssigner::reset`]; once the
/// palette is exhausted colors are reused cyclically.
#[derive(Debug, Clone)]
pub struct ColorAssigner {
    palette: Vec<String>,
    assigned: HashMap<String, String>,
    order: Vec<String>,
}

impl ColorAssigner {
    pub fn new() -> Self {
        Self::with_palette(DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect())
    }

    /// Custom palette; an empty one falls back to [`DEFAULT_PALETTE`].
    pub fn with_palette(palette: Vec<String>) -> Self {
        let palette = if palette.is_empty() {
            DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect()
        } else {
            palette
        };
        Self {
            palette,
            assigned: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn color_for(&mut self, key: &str) -> String {
        if let Some(color) = self.assigned.get(key) {
            return color.clone();
        }
        let color = self.palette[self.order.len() % self.palette.len()].clone();
        self.assigned.insert(key.to_string(), color.clone());
        self.order.push(key.to_string());
        color
    }

    /// Color of an already assigned key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.assigned.get(key).map(String::as_str)
    }

    /// Keys in assignment order.
    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn palette(&self) -> &[String] {
        &self.palette
    }

    pub fn reset(&mut self) {
        self.assigned.clear();
        self.order.clear();
    }
}

impl Default for ColorAssigner {
    fn default() -> Self {
        Self::new()
    }
}

/// Split `#rrggbb` into its channels.
pub fn hex_to_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StickerState {
    #[default]
    Clipped,
    Expanded,
}

/// Independent expanded/clipped flag per block index.
#[derive(Debug, Clone, Default)]
pub struct StickerStates {
    expanded: HashMap<usize, bool>,
}

impl StickerStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, index: usize) -> StickerState {
        if self.expanded.get(&index).copied().unwrap_or(false) {
            StickerState::Expanded
        } else {
            StickerState::Clipped
        }
    }

    /// Flips block `index` and returns its new state.
    pub fn toggle_expanded(&mut self, index: usize) -> StickerState {
        let flag = self.expanded.entry(index).or_insert(false);
        *flag = !*flag;
        self.state(index)
    }

    pub fn expanded_count(&self) -> usize {
        self.expanded.values().filter(|flag| **flag).count()
    }

    /// Used when a new result replaces the current one.
    pub fn reset(&mut self) {
        self.expanded.clear();
    }
}

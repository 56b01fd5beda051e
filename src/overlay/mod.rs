//! Sticker layout over a translated image.
//!
//! Everything here is recomputed from the immutable `TranslationResult` and
//! the container size measured for the current render; nothing is cached.

mod layout;
mod render;
mod state;

pub use layout::{
    Anchor, Extent, PlacedSticker, StickerFrame, StickerLayout, compute_layout, font_size,
    layout_overlay, present,
};
pub use render::{OverlayStyle, mime_for_path, render_overlay_svg, render_svg_bytes};
pub use state::{StickerState, StickerStates};

use serde::{Deserialize, Serialize};

/// Rendered size of the element the image is drawn into, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_measured(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// Legibility and hit-target policy for stickers.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPolicy {
    pub min_hit_px: f64,
    pub min_font_px: f64,
    pub max_font_px: f64,
    /// Font size cap as a share of the clipped sticker height.
    pub font_height_ratio: f64,
    /// Average glyph width over font size.
    pub glyph_aspect: f64,
    pub expanded_max_width_px: f64,
}

impl Default for LayoutPolicy {
    fn default() -> Self {
        Self {
            min_hit_px: 20.0,
            min_font_px: 10.0,
            max_font_px: 120.0,
            font_height_ratio: 0.9,
            glyph_aspect: 0.6,
            expanded_max_width_px: 300.0,
        }
    }
}

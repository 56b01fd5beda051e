use serde::Serialize;

use super::{LayoutPolicy, Size, StickerState, StickerStates};
use crate::result::{Block, ImageDimensions, TranslationResult};

const CLIPPED_Z: u32 = 10;
const EXPANDED_Z: u32 = 50;
const CLIPPED_PADDING_PX: f64 = 1.0;
const EXPANDED_PADDING_PX: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StickerLayout {
    pub left_percent: f64,
    pub top_percent: f64,
    pub width_percent: f64,
    pub height_percent: f64,
    pub font_size_px: f64,
    pub min_hit_px: f64,
    /// Region size in pixels for the container this layout was computed for.
    pub region_px: Size,
    /// Region is under the hit-target floor, so the clipped sticker is
    /// centered on the anchor instead of filling the region.
    pub recentered: bool,
    pub anchor_x_percent: f64,
    pub anchor_y_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Anchor {
    TopLeft { left_percent: f64, top_percent: f64 },
    Center { x_percent: f64, y_percent: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "unit", content = "value")]
pub enum Extent {
    Percent(f64),
    Px(f64),
    /// Natural content size.
    Auto,
}

/// Box the UI paints for one sticker in one presentation state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StickerFrame {
    pub anchor: Anchor,
    pub width: Extent,
    pub height: Extent,
    pub min_width_px: f64,
    pub min_height_px: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_width_px: Option<f64>,
    pub font_size_px: f64,
    pub padding_px: f64,
    pub z_index: u32,
    pub emphasized: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedSticker {
    pub index: usize,
    pub text: String,
    pub state: StickerState,
    pub layout: StickerLayout,
    pub frame: StickerFrame,
}

/// Positions one block's sticker for the current container.
///
/// Falls back to the intrinsic image size while the container has not been
/// measured yet.
pub fn compute_layout(
    block: &Block,
    image: ImageDimensions,
    container: Option<Size>,
    policy: &LayoutPolicy,
) -> StickerLayout {
    let unit = block.bounding_box;
    let current = container
        .filter(Size::is_measured)
        .unwrap_or_else(|| Size::new(image.width as f64, image.height as f64));
    let region = Size::new(unit.width * current.width, unit.height * current.height);
    let recentered = region.width < policy.min_hit_px || region.height < policy.min_hit_px;
    let (anchor_x, anchor_y) = unit.center();

    StickerLayout {
        left_percent: unit.x * 100.0,
        top_percent: unit.y * 100.0,
        width_percent: unit.width * 100.0,
        height_percent: unit.height * 100.0,
        font_size_px: font_size(region, &block.translated_text, policy),
        min_hit_px: policy.min_hit_px,
        region_px: region,
        recentered,
        anchor_x_percent: anchor_x * 100.0,
        anchor_y_percent: anchor_y * 100.0,
    }
}

/// `sqrt(area / (len * glyph_aspect))`, clamped to
/// `[min_font, min(ratio * clipped height, max_font)]`.
pub fn font_size(region: Size, text: &str, policy: &LayoutPolicy) -> f64 {
    let len = text.chars().count().max(1) as f64;
    let area = region.width.max(0.0) * region.height.max(0.0);
    let estimate = (area / (len * policy.glyph_aspect)).sqrt();
    let clipped_height = region.height.max(policy.min_hit_px);
    let upper = (policy.font_height_ratio * clipped_height).min(policy.max_font_px);
    estimate.min(upper).max(policy.min_font_px)
}

pub fn present(layout: &StickerLayout, state: StickerState, policy: &LayoutPolicy) -> StickerFrame {
    let region = layout.region_px;
    match state {
        StickerState::Clipped if layout.recentered => {
            let width = region.width.max(layout.min_hit_px);
            let height = region.height.max(layout.min_hit_px);
            StickerFrame {
                anchor: Anchor::Center {
                    x_percent: layout.anchor_x_percent,
                    y_percent: layout.anchor_y_percent,
                },
                width: Extent::Px(width),
                height: Extent::Px(height),
                min_width_px: width,
                min_height_px: height,
                max_width_px: None,
                font_size_px: layout.font_size_px,
                padding_px: CLIPPED_PADDING_PX,
                z_index: CLIPPED_Z,
                emphasized: false,
            }
        }
        StickerState::Clipped => StickerFrame {
            anchor: top_left(layout),
            width: Extent::Percent(layout.width_percent),
            height: Extent::Percent(layout.height_percent),
            min_width_px: region.width,
            min_height_px: region.height,
            max_width_px: None,
            font_size_px: layout.font_size_px,
            padding_px: CLIPPED_PADDING_PX,
            z_index: CLIPPED_Z,
            emphasized: false,
        },
        StickerState::Expanded => StickerFrame {
            anchor: top_left(layout),
            width: Extent::Auto,
            height: Extent::Auto,
            min_width_px: region.width,
            min_height_px: region.height,
            max_width_px: Some(policy.expanded_max_width_px),
            font_size_px: layout.font_size_px,
            padding_px: EXPANDED_PADDING_PX,
            z_index: EXPANDED_Z,
            emphasized: true,
        },
    }
}

fn top_left(layout: &StickerLayout) -> Anchor {
    Anchor::TopLeft {
        left_percent: layout.left_percent,
        top_percent: layout.top_percent,
    }
}

/// Lays out every block that has a translation, in paint order.
pub fn layout_overlay(
    result: &TranslationResult,
    container: Option<Size>,
    states: &StickerStates,
    policy: &LayoutPolicy,
) -> Vec<PlacedSticker> {
    if result.image_dimensions.is_empty() {
        return Vec::new();
    }
    let mut stickers: Vec<PlacedSticker> = result
        .blocks
        .iter()
        .enumerate()
        .filter(|(_, block)| !block.translated_text.is_empty())
        .map(|(index, block)| {
            let layout = compute_layout(block, result.image_dimensions, container, policy);
            let state = states.state(index);
            PlacedSticker {
                index,
                text: block.translated_text.clone(),
                state,
                layout,
                frame: present(&layout, state, policy),
            }
        })
        .collect();
    stickers.sort_by_key(|sticker| sticker.frame.z_index);
    stickers
}

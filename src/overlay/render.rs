use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use resvg::render;
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::Pixmap;
use usvg::{Options, Tree, fontdb};

use super::{Anchor, LayoutPolicy, PlacedSticker, Size, StickerStates, layout_overlay};
use crate::result::TranslationResult;
use crate::settings::Settings;

const LINE_HEIGHT: f64 = 1.1;
const FILL_OPACITY: f64 = 0.6;
const STROKE_OPACITY: f64 = 0.2;

pub struct OverlayStyle {
    pub text_color: String,
    pub fill_color: String,
    pub stroke_color: String,
}

impl From<&Settings> for OverlayStyle {
    fn from(settings: &Settings) -> Self {
        Self {
            text_color: settings.overlay_text_color.clone(),
            fill_color: settings.overlay_fill_color.clone(),
            stroke_color: settings.overlay_stroke_color.clone(),
        }
    }
}

/// Draws the clipped stickers over the image at its intrinsic size.
pub fn render_overlay_svg(
    image_bytes: &[u8],
    image_mime: &str,
    size: Size,
    result: &TranslationResult,
    policy: &LayoutPolicy,
    style: &OverlayStyle,
    show_overlay: bool,
) -> String {
    let encoded = BASE64.encode(image_bytes);
    let data_uri = format!("data:{};base64,{}", image_mime, encoded);

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = size.width,
        h = size.height
    ));
    svg.push_str(&format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
        uri = data_uri,
        w = size.width,
        h = size.height
    ));

    if show_overlay {
        let stickers = layout_overlay(result, Some(size), &StickerStates::new(), policy);
        for sticker in &stickers {
            push_sticker(&mut svg, sticker, size, policy, style);
        }
    }

    svg.push_str("</svg>");
    svg
}

fn push_sticker(
    svg: &mut String,
    sticker: &PlacedSticker,
    size: Size,
    policy: &LayoutPolicy,
    style: &OverlayStyle,
) {
    let frame = &sticker.frame;
    let width = (sticker.layout.width_percent / 100.0 * size.width).max(frame.min_width_px);
    let height = (sticker.layout.height_percent / 100.0 * size.height).max(frame.min_height_px);
    let (x, y) = match frame.anchor {
        Anchor::TopLeft {
            left_percent,
            top_percent,
        } => (left_percent / 100.0 * size.width, top_percent / 100.0 * size.height),
        Anchor::Center {
            x_percent,
            y_percent,
        } => (
            x_percent / 100.0 * size.width - width / 2.0,
            y_percent / 100.0 * size.height - height / 2.0,
        ),
    };

    svg.push_str(&format!(
        r#"<rect x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}" rx="2" fill="{fill}" fill-opacity="{fo}" stroke="{stroke}" stroke-opacity="{so}"/>"#,
        x = x,
        y = y,
        w = width,
        h = height,
        fill = escape_xml(&style.fill_color),
        fo = FILL_OPACITY,
        stroke = escape_xml(&style.stroke_color),
        so = STROKE_OPACITY
    ));

    let font_size = frame.font_size_px;
    let inner_w = (width - frame.padding_px * 2.0).max(1.0);
    let max_chars = (inner_w / (font_size * policy.glyph_aspect)).floor().max(1.0) as usize;
    let lines = wrap_words(&sticker.text, max_chars);
    let line_height = font_size * LINE_HEIGHT;
    let block_height = line_height * lines.len() as f64;
    let center_x = x + width / 2.0;
    let first_baseline = y + (height - block_height) / 2.0 + font_size;

    svg.push_str(&format!(
        r#"<text x="{cx:.2}" font-family="sans-serif" font-size="{fs:.2}" font-weight="500" fill="{color}" text-anchor="middle">"#,
        cx = center_x,
        fs = font_size,
        color = escape_xml(&style.text_color)
    ));
    for (index, line) in lines.iter().enumerate() {
        svg.push_str(&format!(
            r#"<tspan x="{cx:.2}" y="{y:.2}">{text}</tspan>"#,
            cx = center_x,
            y = first_baseline + line_height * index as f64,
            text = escape_xml(line)
        ));
    }
    svg.push_str("</text>");
}

/// Greedy word wrap by character count; over-long words keep their own line.
pub(crate) fn wrap_words(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(text.trim().to_string());
    }
    lines
}

pub fn render_svg_bytes(svg: &str, output_mime: &str) -> Result<Vec<u8>> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    let options = Options {
        fontdb: Arc::new(db),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse SVG")?;
    let size = tree.size().to_int_size();
    let mut pixmap =
        Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());
    let image = image::RgbaImage::from_raw(size.width(), size.height(), pixmap.data().to_vec())
        .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))?;
    let format = image_format_from_mime(output_mime)
        .ok_or_else(|| anyhow!("unsupported output image mime '{}'", output_mime))?;
    let image = match format {
        image::ImageFormat::Jpeg => image::DynamicImage::ImageRgb8(
            image::DynamicImage::ImageRgba8(image).to_rgb8(),
        ),
        _ => image::DynamicImage::ImageRgba8(image),
    };
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .with_context(|| "failed to encode image from SVG")?;
    Ok(bytes)
}

pub fn mime_for_path(path: &std::path::Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "svg" => Some("image/svg+xml"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

fn image_format_from_mime(mime: &str) -> Option<image::ImageFormat> {
    match mime {
        "image/png" => Some(image::ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Some(image::ImageFormat::Jpeg),
        "image/webp" => Some(image::ImageFormat::WebP),
        _ => None,
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

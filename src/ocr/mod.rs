//! OCR response model and the reduction from raw annotations to text regions.

pub mod extract;
pub mod geom;

use serde::Deserialize;

pub use extract::{ExtractedBlock, ExtractedPage, extract_regions, reduce_page};
pub use geom::normalize_box;

/// The two detection modes offered by the OCR collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMode {
    /// Short, scattered strings such as signs and menus.
    Sparse,
    /// Paragraph-heavy documents.
    Dense,
}

impl DetectionMode {
    pub fn feature_type(&self) -> &'static str {
        match self {
            DetectionMode::Sparse => "TEXT_DETECTION",
            DetectionMode::Dense => "DOCUMENT_TEXT_DETECTION",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextAnnotation {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub pages: Vec<Page>,
}

impl TextAnnotation {
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub blocks: Vec<OcrBlock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrBlock {
    #[serde(default)]
    pub bounding_box: BoundingPoly,
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Paragraph {
    #[serde(default)]
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Word {
    #[serde(default)]
    pub symbols: Vec<Symbol>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Symbol {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub property: Option<TextProperty>,
}

impl Symbol {
    pub fn has_break(&self) -> bool {
        self.property
            .as_ref()
            .is_some_and(|property| property.detected_break.is_some())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextProperty {
    #[serde(default)]
    pub detected_break: Option<DetectedBreak>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetectedBreak {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoundingPoly {
    #[serde(default)]
    pub vertices: Vec<Vertex>,
}

/// Pixel-space vertex; the service omits coordinates that are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Vertex {
    #[serde(default)]
    pub x: i64,
    #[serde(default)]
    pub y: i64,
}

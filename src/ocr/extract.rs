use tracing::{debug, info, warn};

use super::{DetectionMode, OcrBlock, TextAnnotation, Word, normalize_box};
use crate::error::PipelineError;
use crate::preprocess::EncodedImage;
use crate::providers::OcrService;
use crate::result::{ImageDimensions, UnitBox};

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedBlock {
    pub text: String,
    pub bounding_box: UnitBox,
}

/// Everything the OCR stage knows about one image, in OCR order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    pub original_text: String,
    pub dimensions: ImageDimensions,
    pub blocks: Vec<ExtractedBlock>,
}

/// Runs sparse detection, then dense detection once if the first pass found
/// nothing. `Ok(None)` is the no-text terminal state.
pub async fn extract_regions<O: OcrService + ?Sized>(
    ocr: &O,
    image: &EncodedImage,
    max_text_chars: usize,
) -> Result<Option<ExtractedPage>, PipelineError> {
    let annotation = match annotate(ocr, image, DetectionMode::Sparse).await? {
        Some(annotation) => Some(annotation),
        None => {
            info!("no text with sparse detection, trying dense detection");
            annotate(ocr, image, DetectionMode::Dense).await?
        }
    };
    Ok(annotation.map(|annotation| {
        let mut page = reduce_page(&annotation, max_text_chars);
        if page.dimensions.is_empty() {
            // Text without page geometry: the submitted image is the page.
            page.dimensions = ImageDimensions::new(image.width, image.height);
        }
        page
    }))
}

async fn annotate<O: OcrService + ?Sized>(
    ocr: &O,
    image: &EncodedImage,
    mode: DetectionMode,
) -> Result<Option<TextAnnotation>, PipelineError> {
    ocr.annotate(image, mode)
        .await
        .map_err(|err| PipelineError::OcrService(format!("{:#}", err)))
}

pub fn reduce_page(annotation: &TextAnnotation, max_text_chars: usize) -> ExtractedPage {
    let original_text = sanitize_text(&annotation.text, max_text_chars);
    let Some(page) = annotation.pages.first() else {
        return ExtractedPage {
            original_text,
            dimensions: ImageDimensions::default(),
            blocks: Vec::new(),
        };
    };

    let blocks = page
        .blocks
        .iter()
        .enumerate()
        .filter_map(|(index, block)| {
            let text = block_text(block);
            if text.is_empty() {
                return None;
            }
            match normalize_box(&block.bounding_box.vertices, page.width, page.height) {
                Some(bounding_box) => Some(ExtractedBlock { text, bounding_box }),
                None => {
                    warn!(
                        "dropping block {} with malformed geometry ({} vertices)",
                        index,
                        block.bounding_box.vertices.len()
                    );
                    None
                }
            }
        })
        .collect::<Vec<_>>();
    debug!("reduced {} OCR blocks to {}", page.blocks.len(), blocks.len());

    ExtractedPage {
        original_text,
        dimensions: ImageDimensions::new(page.width, page.height),
        blocks,
    }
}

/// Trimmed text of one block; paragraphs and words join without separators.
pub fn block_text(block: &OcrBlock) -> String {
    block
        .paragraphs
        .iter()
        .flat_map(|paragraph| paragraph.words.iter())
        .map(word_text)
        .collect::<String>()
        .trim()
        .to_string()
}

fn word_text(word: &Word) -> String {
    let glyphs: String = word.symbols.iter().map(|s| s.text.as_str()).collect();
    match word.symbols.last() {
        Some(last) if last.has_break() => glyphs + " ",
        _ => glyphs,
    }
}

pub fn sanitize_text(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect::<String>().trim().to_string()
}

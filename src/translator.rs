use tracing::{info, warn};

use crate::error::PipelineError;
use crate::ocr::{self, ExtractedPage};
use crate::preprocess::EncodedImage;
use crate::providers::{OcrService, TranslationItem, TranslationService};
use crate::result::{Block, TranslationResult};
use crate::settings::Settings;

pub const TRANSLATION_FAILED: &str = "Translation failed, but text was extracted";

/// Drives one image through OCR and a single batched translation call.
#[derive(Debug, Clone)]
pub struct Translator<O, T> {
    ocr: O,
    translation: T,
    settings: Settings,
}

impl<O: OcrService, T: TranslationService> Translator<O, T> {
    pub fn new(ocr: O, translation: T, settings: Settings) -> Self {
        Self {
            ocr,
            translation,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn translation_service(&self) -> &T {
        &self.translation
    }

    pub async fn exec(
        &self,
        image: &EncodedImage,
        target_lang: &str,
    ) -> Result<TranslationResult, PipelineError> {
        let extracted =
            ocr::extract_regions(&self.ocr, image, self.settings.max_text_chars).await?;
        let Some(page) = extracted else {
            info!("no text found in image");
            return Ok(TranslationResult::no_text_found());
        };
        Ok(self.translate_page(page, target_lang).await)
    }

    /// Never fails: a translation error keeps the OCR text and sets `error`.
    pub async fn translate_page(&self, page: ExtractedPage, target_lang: &str) -> TranslationResult {
        let request = batch_request(&page);
        info!(
            "translating page with {} blocks to {}",
            page.blocks.len(),
            target_lang
        );
        match self
            .translation
            .translate_batch(request, target_lang)
            .await
        {
            Ok(items) => apply_translations(page, &items),
            Err(err) => {
                let err = PipelineError::TranslationService(format!("{:#}", err));
                warn!("{}", err);
                untranslated(page)
            }
        }
    }
}

/// Element 0 is the full page, element `i + 1` is block `i`.
pub fn batch_request(page: &ExtractedPage) -> Vec<String> {
    std::iter::once(page.original_text.clone())
        .chain(page.blocks.iter().map(|block| block.text.clone()))
        .collect()
}

pub fn apply_translations(page: ExtractedPage, items: &[TranslationItem]) -> TranslationResult {
    let expected = page.blocks.len() + 1;
    let translated_at = |index: usize| {
        items
            .get(index)
            .map(|item| item.translated_text.clone())
            .unwrap_or_default()
    };

    let error = if items.len() < expected {
        warn!(
            "translation response has {} entries, expected {}",
            items.len(),
            expected
        );
        Some(format!(
            "Translation response had {} of {} entries",
            items.len(),
            expected
        ))
    } else {
        None
    };

    TranslationResult {
        translated_text: translated_at(0),
        detected_language: items
            .first()
            .and_then(|item| item.detected_source_language.clone()),
        original_text: page.original_text,
        image_dimensions: page.dimensions,
        blocks: page
            .blocks
            .into_iter()
            .enumerate()
            .map(|(index, block)| Block {
                text: block.text,
                translated_text: translated_at(index + 1),
                bounding_box: block.bounding_box,
            })
            .collect(),
        message: None,
        error,
    }
}

pub fn untranslated(page: ExtractedPage) -> TranslationResult {
    TranslationResult {
        original_text: page.original_text,
        translated_text: String::new(),
        detected_language: None,
        image_dimensions: page.dimensions,
        blocks: page
            .blocks
            .into_iter()
            .map(|block| Block {
                text: block.text,
                translated_text: String::new(),
                bounding_box: block.bounding_box,
            })
            .collect(),
        message: None,
        error: Some(TRANSLATION_FAILED.to_string()),
    }
}

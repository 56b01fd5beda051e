use thiserror::Error;

/// Failures that end a submission before a `TranslationResult` exists.
///
/// Translation failures are only surfaced here by the service layer; the
/// coordinator folds them back into the result's `error` field.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unreadable image: {0}")]
    UnreadableImage(String),

    #[error("encoded image is {size} bytes, over the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("OCR service error: {0}")]
    OcrService(String),

    #[error("translation service error: {0}")]
    TranslationService(String),
}

impl PipelineError {
    /// Message safe to show to the person who submitted the image.
    pub fn user_message(&self) -> &'static str {
        match self {
            PipelineError::UnreadableImage(_) => "Failed to load image",
            PipelineError::PayloadTooLarge { .. } => "Image too large",
            PipelineError::OcrService(_) => "Image processing failed",
            PipelineError::TranslationService(_) => "Translation failed",
        }
    }
}

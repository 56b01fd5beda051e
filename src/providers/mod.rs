use anyhow::{Result, anyhow};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;

use crate::ocr::{DetectionMode, TextAnnotation};
use crate::preprocess::EncodedImage;

mod google_translate;
mod google_vision;

pub use google_translate::{Detection, GoogleTranslate};
pub use google_vision::GoogleVision;

#[cfg(test)]
pub(crate) use google_vision::parse_annotate_response;

/// One element of a batch translation response.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationItem {
    #[serde(default)]
    pub translated_text: String,
    #[serde(default)]
    pub detected_source_language: Option<String>,
}

/// Resolves to `None` when the image holds no recognizable text.
pub type OcrFuture = Pin<Box<dyn Future<Output = Result<Option<TextAnnotation>>> + Send>>;
pub type TranslateFuture = Pin<Box<dyn Future<Output = Result<Vec<TranslationItem>>> + Send>>;
pub type DetectFuture = Pin<Box<dyn Future<Output = Result<Option<Detection>>> + Send>>;

pub trait OcrService: Send + Sync {
    fn annotate(&self, image: &EncodedImage, mode: DetectionMode) -> OcrFuture;
}

/// Batch translation; the response must keep the request order.
pub trait TranslationService: Send + Sync {
    fn translate_batch(&self, texts: Vec<String>, target_lang: &str) -> TranslateFuture;

    /// Source language guess for `text`; services without detection say `None`.
    fn detect(&self, _text: &str) -> DetectFuture {
        Box::pin(async { Ok(None) })
    }
}

pub fn resolve_key(override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key.filter(|key| !key.trim().is_empty()) {
        return Ok(key.to_string());
    }
    get_env("GOOGLE_API_KEY").ok_or_else(|| anyhow!("API key not found (checked GOOGLE_API_KEY)"))
}

/// Error object shared by the Google REST APIs.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServiceError {
    pub(crate) code: Option<i64>,
    pub(crate) message: Option<String>,
    pub(crate) status: Option<String>,
}

impl ServiceError {
    pub(crate) fn describe(&self) -> String {
        format_error_parts(
            self.message.clone(),
            self.status.clone(),
            self.code.map(|value| value.to_string()),
        )
    }
}

pub(crate) fn extract_service_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<ServiceError>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed.error.map(|error| error.describe())
}

fn format_error_parts(
    message: Option<String>,
    kind: Option<String>,
    code: Option<String>,
) -> String {
    let mut parts = Vec::new();
    if let Some(message) = message
        && !message.trim().is_empty()
    {
        parts.push(message);
    }
    if let Some(kind) = kind
        && !kind.trim().is_empty()
    {
        parts.push(format!("type: {}", kind));
    }
    if let Some(code) = code
        && !code.trim().is_empty()
    {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(" | ")
    }
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_key_wins() {
        assert_eq!(resolve_key(Some("abc")).expect("key"), "abc");
    }

    #[test]
    fn service_errors_are_flattened() {
        let body = r#"{"error":{"code":403,"message":"API key not valid","status":"PERMISSION_DENIED"}}"#;
        assert_eq!(
            extract_service_error(body).as_deref(),
            Some("API key not valid | type: PERMISSION_DENIED | code: 403")
        );
        assert_eq!(
            extract_service_error(r#"{"error":{}}"#).as_deref(),
            Some("unknown error")
        );
        assert!(extract_service_error("<html>").is_none());
    }
}

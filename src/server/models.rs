use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct ImageTranslateRequest {
    pub(crate) image_base64: Option<String>,
    pub(crate) target_lang: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct TextTranslateRequest {
    pub(crate) text: Option<String>,
    pub(crate) target_lang: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TextTranslateResponse {
    pub(crate) translated_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) detected_language: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct DetectRequest {
    pub(crate) text: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct DetectResponse {
    pub(crate) language: String,
    pub(crate) confidence: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

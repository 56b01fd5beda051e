use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    DetectFuture, ServiceError, TranslateFuture, TranslationItem, TranslationService,
    extract_service_error,
};
use crate::settings::DEFAULT_TRANSLATE_ENDPOINT;

#[derive(Debug, Clone)]
pub struct GoogleTranslate {
    key: String,
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub language: String,
    pub confidence: f64,
}

impl GoogleTranslate {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            endpoint: DEFAULT_TRANSLATE_ENDPOINT.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        if !endpoint.trim().is_empty() {
            self.endpoint = endpoint.trim_end_matches('/').to_string();
        }
        self
    }

    async fn post<B: Serialize>(&self, url: &str, body: &B) -> Result<String> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", self.key.clone())
            .json(body)
            .send()
            .await
            .with_context(|| "failed to reach Translation API")?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(anyhow!(
                "Translation API error ({}): {}",
                status,
                extract_service_error(&text).unwrap_or(text)
            ));
        }
        Ok(text)
    }
}

impl TranslationService for GoogleTranslate {
    fn translate_batch(&self, texts: Vec<String>, target_lang: &str) -> TranslateFuture {
        let service = self.clone();
        let body = build_translate_request(texts, target_lang);
        Box::pin(async move {
            debug!("translating {} strings to {}", body.q.len(), body.target);
            let text = service.post(&service.endpoint, &body).await?;
            parse_translate_response(&text)
        })
    }

    fn detect(&self, text: &str) -> DetectFuture {
        let service = self.clone();
        let body = DetectRequest {
            q: vec![text.to_string()],
        };
        Box::pin(async move {
            let url = format!("{}/detect", service.endpoint);
            let text = service.post(&url, &body).await?;
            parse_detect_response(&text)
        })
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TranslateRequest {
    q: Vec<String>,
    target: String,
    format: &'static str,
}

#[derive(Debug, Serialize)]
struct DetectRequest {
    q: Vec<String>,
}

pub(crate) fn build_translate_request(texts: Vec<String>, target_lang: &str) -> TranslateRequest {
    TranslateRequest {
        q: texts,
        target: target_lang.to_string(),
        format: "text",
    }
}

pub(crate) fn parse_translate_response(body: &str) -> Result<Vec<TranslationItem>> {
    let payload: TranslateResponse = serde_json::from_str(body)
        .map_err(|err| anyhow!("failed to parse Translation response JSON: {}", err))?;
    if let Some(error) = payload.error {
        return Err(anyhow!("Translation API error: {}", error.describe()));
    }
    Ok(payload
        .data
        .map(|data| data.translations)
        .unwrap_or_default())
}

fn parse_detect_response(body: &str) -> Result<Option<Detection>> {
    let payload: DetectResponse = serde_json::from_str(body)
        .map_err(|err| anyhow!("failed to parse detection response JSON: {}", err))?;
    if let Some(error) = payload.error {
        return Err(anyhow!("Translation API error: {}", error.describe()));
    }
    let detection = payload
        .data
        .and_then(|data| data.detections.into_iter().next())
        .and_then(|candidates| candidates.into_iter().next())
        .filter(|candidate| !candidate.language.trim().is_empty())
        .map(|candidate| Detection {
            language: candidate.language,
            confidence: candidate.confidence.unwrap_or(0.0),
        });
    Ok(detection)
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: Option<TranslateData>,
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    #[serde(default)]
    translations: Vec<TranslationItem>,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    data: Option<DetectData>,
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
struct DetectData {
    #[serde(default)]
    detections: Vec<Vec<DetectCandidate>>,
}

#[derive(Debug, Deserialize)]
struct DetectCandidate {
    #[serde(default)]
    language: String,
    confidence: Option<f64>,
}

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{OcrFuture, OcrService, ServiceError, extract_service_error};
use crate::ocr::{DetectionMode, TextAnnotation};
use crate::preprocess::EncodedImage;
use crate::settings::DEFAULT_VISION_ENDPOINT;

#[derive(Debug, Clone)]
pub struct GoogleVision {
    key: String,
    endpoint: String,
    client: reqwest::Client,
}

impl GoogleVision {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            endpoint: DEFAULT_VISION_ENDPOINT.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        if !endpoint.trim().is_empty() {
            self.endpoint = endpoint;
        }
        self
    }
}

impl OcrService for GoogleVision {
    fn annotate(&self, image: &EncodedImage, mode: DetectionMode) -> OcrFuture {
        let body = build_annotate_request(image.base64(), mode);
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let key = self.key.clone();
        Box::pin(async move {
            debug!("requesting {}", mode.feature_type());
            let response = client
                .post(&endpoint)
                .header("x-goog-api-key", key)
                .json(&body)
                .send()
                .await
                .with_context(|| "failed to reach Vision API")?;

            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(anyhow!(
                    "Vision API error ({}): {}",
                    status,
                    extract_service_error(&text).unwrap_or(text)
                ));
            }
            parse_annotate_response(&text)
        })
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AnnotateRequest {
    requests: Vec<AnnotateImageRequest>,
}

#[derive(Debug, Serialize)]
struct AnnotateImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
}

#[derive(Debug, Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
    max_results: u32,
}

pub(crate) fn build_annotate_request(content: String, mode: DetectionMode) -> AnnotateRequest {
    AnnotateRequest {
        requests: vec![AnnotateImageRequest {
            image: ImageContent { content },
            features: vec![Feature {
                kind: mode.feature_type(),
                max_results: 1,
            }],
        }],
    }
}

/// `Ok(None)` means the call succeeded but found no text.
pub(crate) fn parse_annotate_response(
    body: &str,
) -> Result<Option<TextAnnotation>, anyhow::Error> {
    let payload: AnnotateResponse = serde_json::from_str(body)
        .map_err(|err| anyhow!("failed to parse Vision response JSON: {}", err))?;
    if let Some(error) = payload.error {
        return Err(anyhow!("Vision API error: {}", error.describe()));
    }
    let Some(first) = payload.responses.into_iter().next() else {
        return Ok(None);
    };
    if let Some(error) = first.error {
        return Err(anyhow!("Vision API error: {}", error.describe()));
    }
    Ok(first
        .full_text_annotation
        .filter(|annotation| annotation.has_text()))
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    full_text_annotation: Option<TextAnnotation>,
    error: Option<ServiceError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_json_snapshot;

    #[test]
    fn annotate_request_body_snapshot() {
        let body = build_annotate_request("aGVsbG8=".to_string(), DetectionMode::Dense);
        assert_json_snapshot!(body);
    }

    #[test]
    fn parses_menu_fixture() {
        let payload = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/vision_menu_response.json"
        ));
        let annotation = parse_annotate_response(payload)
            .expect("parse")
            .expect("annotation");
        assert_eq!(annotation.pages.len(), 1);
        assert_eq!(annotation.pages[0].width, 400);
        assert_eq!(annotation.pages[0].blocks.len(), 5);
        let empty_block = &annotation.pages[0].blocks[3];
        assert_eq!(empty_block.bounding_box.vertices[0].x, 0);
        assert_eq!(empty_block.bounding_box.vertices[1].y, 0);
    }

    #[test]
    fn empty_responses_mean_no_text() {
        assert!(parse_annotate_response(r#"{"responses":[{}]}"#)
            .expect("parse")
            .is_none());
        assert!(parse_annotate_response(r#"{"responses":[]}"#)
            .expect("parse")
            .is_none());
        assert!(
            parse_annotate_response(r#"{"responses":[{"fullTextAnnotation":{"text":"  "}}]}"#)
                .expect("parse")
                .is_none()
        );
    }

    #[test]
    fn error_objects_are_errors() {
        let per_image = r#"{"responses":[{"error":{"code":3,"message":"Bad image data."}}]}"#;
        let err = parse_annotate_response(per_image).unwrap_err();
        assert!(err.to_string().contains("Bad image data."));

        let top_level = r#"{"error":{"code":400,"message":"Invalid JSON","status":"INVALID_ARGUMENT"}}"#;
        assert!(parse_annotate_response(top_level).is_err());
    }
}

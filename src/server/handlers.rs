use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::models::{
    DetectRequest, DetectResponse, ErrorResponse, ImageTranslateRequest, TextTranslateRequest,
    TextTranslateResponse,
};
use super::state::ServerState;
use crate::error::PipelineError;
use crate::ocr::extract::sanitize_text;
use crate::preprocess::{PreprocessOptions, preprocess};
use crate::providers::{OcrService, TranslationService};
use crate::result::TranslationResult;
use crate::settings::{DEFAULT_TARGET_LANG, Settings};
use crate::translator::Translator;

/// Base64 image bodies of up to ~10MB.
const MAX_BODY_BYTES: usize = 11 * 1024 * 1024;
const DETECT_MAX_CHARS: usize = 500;
const FALLBACK_LANGUAGE: &str = "en";

type Rejection = (StatusCode, Json<ErrorResponse>);

pub async fn run_server<O, T>(translator: Translator<O, T>, addr: String) -> Result<()>
where
    O: OcrService + 'static,
    T: TranslationService + 'static,
{
    let state = Arc::new(ServerState { translator });
    let app = Router::new()
        .route("/health", get(health))
        .route("/image-translate", post(image_translate::<O, T>))
        .route("/translate", post(translate_text::<O, T>))
        .route("/detect", post(detect::<O, T>))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn(cors_middleware));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| "failed to bind server address")?;
    info!("listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type"),
    );
}

async fn image_translate<O, T>(
    State(state): State<Arc<ServerState<O, T>>>,
    Json(payload): Json<ImageTranslateRequest>,
) -> Result<Json<TranslationResult>, Rejection>
where
    O: OcrService + 'static,
    T: TranslationService + 'static,
{
    image_translate_request(&state.translator, payload)
        .await
        .map(Json)
        .map_err(ServerError::into_rejection)
}

async fn translate_text<O, T>(
    State(state): State<Arc<ServerState<O, T>>>,
    Json(payload): Json<TextTranslateRequest>,
) -> Result<Json<TextTranslateResponse>, Rejection>
where
    O: OcrService + 'static,
    T: TranslationService + 'static,
{
    text_translate_request(&state.translator, payload)
        .await
        .map(Json)
        .map_err(ServerError::into_rejection)
}

async fn detect<O, T>(
    State(state): State<Arc<ServerState<O, T>>>,
    Json(payload): Json<DetectRequest>,
) -> Result<Json<DetectResponse>, Rejection>
where
    O: OcrService + 'static,
    T: TranslationService + 'static,
{
    detect_request(state.translator.translation_service(), payload)
        .await
        .map(Json)
        .map_err(ServerError::into_rejection)
}

#[derive(Debug)]
pub(crate) struct ServerError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl ServerError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    fn into_rejection(self) -> Rejection {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
    }
}

impl From<PipelineError> for ServerError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::UnreadableImage(_) | PipelineError::PayloadTooLarge { .. } => {
                ServerError::bad_request(err.user_message())
            }
            PipelineError::OcrService(_) | PipelineError::TranslationService(_) => {
                ServerError::internal(err.user_message())
            }
        }
    }
}

pub(crate) async fn image_translate_request<O, T>(
    translator: &Translator<O, T>,
    request: ImageTranslateRequest,
) -> Result<TranslationResult, ServerError>
where
    O: OcrService,
    T: TranslationService,
{
    let settings = translator.settings();
    let target_lang = resolve_target_lang(settings, request.target_lang.as_deref())?;
    let encoded = request
        .image_base64
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ServerError::bad_request("Image data is required"))?;
    let bytes = BASE64
        .decode(strip_data_uri(encoded))
        .map_err(|_| ServerError::bad_request("Invalid image data"))?;

    let image = preprocess(&bytes, PreprocessOptions::from(settings)).map_err(|err| {
        warn!("rejecting image: {}", err);
        ServerError::from(err)
    })?;
    translator.exec(&image, &target_lang).await.map_err(|err| {
        error!("image translation failed: {}", err);
        ServerError::from(err)
    })
}

pub(crate) async fn text_translate_request<O, T>(
    translator: &Translator<O, T>,
    request: TextTranslateRequest,
) -> Result<TextTranslateResponse, ServerError>
where
    O: OcrService,
    T: TranslationService,
{
    let settings = translator.settings();
    let target_lang = resolve_target_lang(settings, request.target_lang.as_deref())?;
    let text = required_text(request.text.as_deref(), settings.max_text_chars)?;
    let items = translator
        .translation_service()
        .translate_batch(vec![text], &target_lang)
        .await
        .map_err(|err| {
            error!("text translation failed: {:#}", err);
            ServerError::internal("Translation failed")
        })?;
    let first = items.into_iter().next().unwrap_or_default();
    Ok(TextTranslateResponse {
        translated_text: sanitize_text(&first.translated_text, settings.max_text_chars),
        detected_language: first.detected_source_language,
    })
}

pub(crate) async fn detect_request<T>(
    service: &T,
    request: DetectRequest,
) -> Result<DetectResponse, ServerError>
where
    T: TranslationService + ?Sized,
{
    let text = required_text(request.text.as_deref(), DETECT_MAX_CHARS)?;
    let detection = service.detect(&text).await.map_err(|err| {
        error!("language detection failed: {:#}", err);
        ServerError::internal("Detection failed")
    })?;
    Ok(match detection {
        Some(detection) => DetectResponse {
            language: detection.language,
            confidence: detection.confidence,
        },
        None => DetectResponse {
            language: FALLBACK_LANGUAGE.to_string(),
            confidence: 0.0,
        },
    })
}

fn resolve_target_lang(settings: &Settings, requested: Option<&str>) -> Result<String, ServerError> {
    let lang = requested
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_TARGET_LANG);
    if !settings.supports_language(lang) {
        return Err(ServerError::bad_request("Invalid target language"));
    }
    Ok(lang.to_string())
}

fn required_text(text: Option<&str>, max_chars: usize) -> Result<String, ServerError> {
    let text = text.ok_or_else(|| ServerError::bad_request("Text is required"))?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ServerError::bad_request("Text cannot be empty"));
    }
    if trimmed.chars().count() > max_chars {
        return Err(ServerError::bad_request(format!(
            "Text exceeds {} character limit",
            max_chars
        )));
    }
    Ok(trimmed.to_string())
}

fn strip_data_uri(value: &str) -> &str {
    match value.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{DetectionMode, TextAnnotation};
    use crate::preprocess::EncodedImage;
    use crate::providers::{DetectFuture, Detection, OcrFuture, TranslateFuture};
    use crate::translator::tests::{NoOcr, TestTranslate};
    use anyhow::anyhow;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    struct FixtureOcr;

    impl OcrService for FixtureOcr {
        fn annotate(&self, _image: &EncodedImage, _mode: DetectionMode) -> OcrFuture {
            Box::pin(async {
                let body = include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/tests/fixtures/vision_menu_response.json"
                ));
                crate::providers::parse_annotate_response(body)
            })
        }
    }

    struct BrokenOcr;

    impl OcrService for BrokenOcr {
        fn annotate(&self, _image: &EncodedImage, _mode: DetectionMode) -> OcrFuture {
            Box::pin(async { Err::<Option<TextAnnotation>, _>(anyhow!("PERMISSION_DENIED")) })
        }
    }

    struct Detector(Option<Detection>);

    impl TranslationService for Detector {
        fn translate_batch(&self, _texts: Vec<String>, _target_lang: &str) -> TranslateFuture {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn detect(&self, _text: &str) -> DetectFuture {
            let detection = self.0.clone();
            Box::pin(async move { Ok(detection) })
        }
    }

    fn png_base64() -> String {
        let mut bytes = Vec::new();
        RgbImage::new(40, 30)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode png");
        BASE64.encode(bytes)
    }

    fn image_request(image: Option<String>, lang: Option<&str>) -> ImageTranslateRequest {
        ImageTranslateRequest {
            image_base64: image,
            target_lang: lang.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn image_request_returns_translated_blocks() {
        let translator = Translator::new(
            FixtureOcr,
            TestTranslate::mapping(&[("Abierto", "Open")]),
            Settings::default(),
        );
        let uri = format!("data:image/png;base64,{}", png_base64());
        let result = image_translate_request(&translator, image_request(Some(uri), Some("en")))
            .await
            .expect("result");
        let translated: Vec<&str> = result
            .blocks
            .iter()
            .map(|block| block.translated_text.as_str())
            .collect();
        assert_eq!(translated, vec!["MENU", "Tacos $50", "Open"]);
    }

    #[tokio::test]
    async fn image_request_validates_input() {
        let translator = Translator::new(NoOcr, TestTranslate::mapping(&[]), Settings::default());

        let missing = image_translate_request(&translator, image_request(None, None))
            .await
            .unwrap_err();
        assert_eq!(missing.status, StatusCode::BAD_REQUEST);
        assert_eq!(missing.message, "Image data is required");

        let lang = image_translate_request(&translator, image_request(Some(png_base64()), Some("fr")))
            .await
            .unwrap_err();
        assert_eq!(lang.message, "Invalid target language");

        let garbage = BASE64.encode(b"definitely not an image");
        let unreadable = image_translate_request(&translator, image_request(Some(garbage), None))
            .await
            .unwrap_err();
        assert_eq!(unreadable.status, StatusCode::BAD_REQUEST);
        assert_eq!(unreadable.message, "Failed to load image");
    }

    #[tokio::test]
    async fn blank_image_is_not_an_http_error() {
        let translator = Translator::new(NoOcr, TestTranslate::mapping(&[]), Settings::default());
        let result = image_translate_request(&translator, image_request(Some(png_base64()), None))
            .await
            .expect("result");
        assert_eq!(result.message.as_deref(), Some(crate::result::NO_TEXT_FOUND));
    }

    #[tokio::test]
    async fn ocr_failure_maps_to_server_error() {
        let translator = Translator::new(BrokenOcr, TestTranslate::mapping(&[]), Settings::default());
        let err = image_translate_request(&translator, image_request(Some(png_base64()), None))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Image processing failed");
    }

    #[tokio::test]
    async fn text_request_trims_and_translates() {
        let service = TestTranslate::mapping(&[("Abierto", "Open")]);
        let translator = Translator::new(NoOcr, service.clone(), Settings::default());
        let response = text_translate_request(
            &translator,
            TextTranslateRequest {
                text: Some("  Abierto \n".to_string()),
                target_lang: Some("en".to_string()),
            },
        )
        .await
        .expect("response");
        assert_eq!(
            response,
            TextTranslateResponse {
                translated_text: "Open".to_string(),
                detected_language: Some("es".to_string()),
            }
        );
        let requests = service.requests.lock().expect("requests");
        assert_eq!(requests[0].0, vec!["Abierto".to_string()]);
    }

    #[tokio::test]
    async fn text_request_rejects_blank_and_oversized_text() {
        let translator = Translator::new(NoOcr, TestTranslate::mapping(&[]), Settings::default());
        let blank = text_translate_request(
            &translator,
            TextTranslateRequest {
                text: Some("   ".to_string()),
                target_lang: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(blank.message, "Text cannot be empty");

        let oversized = text_translate_request(
            &translator,
            TextTranslateRequest {
                text: Some("a".repeat(5001)),
                target_lang: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(oversized.message, "Text exceeds 5000 character limit");
    }

    #[tokio::test]
    async fn text_request_failure_is_internal() {
        let service = TestTranslate::new(|_| Err(anyhow!("quota")));
        let translator = Translator::new(NoOcr, service, Settings::default());
        let err = text_translate_request(
            &translator,
            TextTranslateRequest {
                text: Some("Hola".to_string()),
                target_lang: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Translation failed");
    }

    #[tokio::test]
    async fn detect_falls_back_to_english() {
        let request = || DetectRequest {
            text: Some("Hola".to_string()),
        };
        let unknown = detect_request(&Detector(None), request()).await.expect("detect");
        assert_eq!(
            unknown,
            DetectResponse {
                language: "en".to_string(),
                confidence: 0.0,
            }
        );

        let spanish = Detector(Some(Detection {
            language: "es".to_string(),
            confidence: 0.92,
        }));
        let detected = detect_request(&spanish, request()).await.expect("detect");
        assert_eq!(detected.language, "es");
        assert_eq!(detected.confidence, 0.92);

        let long = DetectRequest {
            text: Some("x".repeat(501)),
        };
        assert!(detect_request(&spanish, long).await.is_err());
    }

    #[test]
    fn data_uri_prefix_is_optional() {
        assert_eq!(strip_data_uri("data:image/png;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_uri("AAAA"), "AAAA");
    }

    #[test]
    fn pipeline_errors_map_to_status() {
        let err = ServerError::from(PipelineError::PayloadTooLarge { size: 10, max: 5 });
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Image too large");
        let err = ServerError::from(PipelineError::OcrService("down".to_string()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub mod error;
pub mod logging;
pub mod ocr;
pub mod overlay;
pub mod preprocess;
pub mod providers;
pub mod result;
pub mod server;
pub mod session;
pub mod settings;
mod translator;

pub use error::PipelineError;
pub use overlay::{LayoutPolicy, PlacedSticker, Size, StickerStates};
pub use preprocess::{EncodedImage, PreprocessOptions, preprocess};
pub use providers::{GoogleTranslate, GoogleVision, OcrService, TranslationService};
pub use result::{Block, ImageDimensions, TranslationResult, UnitBox};
pub use session::{Outcome, Session, SubmissionKey};
pub use settings::Settings;
pub use translator::{TRANSLATION_FAILED, Translator};

pub type GoogleTranslator = Translator<GoogleVision, GoogleTranslate>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "text" | "txt" => Ok(OutputFormat::Text),
            other => Err(anyhow!("unknown output format '{}' (expected json or text)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub image: String,
    pub lang: String,
    pub key: Option<String>,
    pub settings_path: Option<String>,
    pub container: Option<Size>,
    pub output: Option<String>,
    pub format: OutputFormat,
    pub show_overlay: bool,
}

pub async fn run(config: Config) -> Result<String> {
    let settings = settings::load_settings(config.settings_path.as_deref().map(Path::new))?;
    validate_lang(&settings, &config.lang)?;
    let image = load_image(&config.image, &settings)?;
    let translator = build_translator(settings, config.key.as_deref())?;

    let result = translator.exec(&image, &config.lang).await?;
    info!(
        "translated {} blocks from {}",
        result.blocks.len(),
        config.image
    );

    if let Some(output) = config.output.as_deref() {
        write_overlay(
            Path::new(output),
            &image,
            &result,
            translator.settings(),
            config.show_overlay,
        )?;
    }

    format_output(
        &result,
        config.format,
        config.container,
        &StickerStates::new(),
        &translator.settings().overlay,
    )
}

pub fn build_translator(settings: Settings, key: Option<&str>) -> Result<GoogleTranslator> {
    let key = providers::resolve_key(key).with_context(|| "no Google API key available")?;
    let ocr = GoogleVision::new(key.clone()).with_endpoint(settings.ocr_endpoint.clone());
    let translation =
        GoogleTranslate::new(key).with_endpoint(settings.translate_endpoint.clone());
    Ok(Translator::new(ocr, translation, settings))
}

/// Reads and preprocesses the image once; the encoding is reused per language.
pub fn load_image(path: &str, settings: &Settings) -> Result<EncodedImage> {
    let bytes = fs::read(path).with_context(|| format!("failed to read image: {}", path))?;
    let image = preprocess(&bytes, PreprocessOptions::from(settings))
        .with_context(|| format!("failed to prepare image: {}", path))?;
    Ok(image)
}

pub fn validate_lang(settings: &Settings, lang: &str) -> Result<()> {
    if settings.supports_language(lang) {
        return Ok(());
    }
    Err(anyhow!(
        "unsupported target language '{}' (enabled: {})",
        lang,
        settings.languages.join(", ")
    ))
}

/// Parses a `WIDTHxHEIGHT` viewport such as `390x292.5`.
pub fn parse_size(value: &str) -> Result<Size> {
    let (width, height) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("expected WIDTHxHEIGHT, got '{}'", value))?;
    let width: f64 = width
        .trim()
        .parse()
        .with_context(|| format!("invalid width in '{}'", value))?;
    let height: f64 = height
        .trim()
        .parse()
        .with_context(|| format!("invalid height in '{}'", value))?;
    let size = Size::new(width, height);
    if !size.is_measured() {
        return Err(anyhow!("container size must be positive: '{}'", value));
    }
    Ok(size)
}

#[derive(Serialize)]
struct LayoutReport<'a> {
    result: &'a TranslationResult,
    container: Size,
    stickers: Vec<PlacedSticker>,
}

/// Renders a result for the terminal; with a container the JSON also carries
/// the sticker layout under the given expanded/clipped states.
pub fn format_output(
    result: &TranslationResult,
    format: OutputFormat,
    container: Option<Size>,
    states: &StickerStates,
    policy: &LayoutPolicy,
) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(format_text(result)),
        OutputFormat::Json => match container {
            Some(container) => {
                let report = LayoutReport {
                    result,
                    container,
                    stickers: overlay::layout_overlay(result, Some(container), states, policy),
                };
                Ok(serde_json::to_string_pretty(&report)?)
            }
            None => Ok(serde_json::to_string_pretty(result)?),
        },
    }
}

pub fn format_text(result: &TranslationResult) -> String {
    if let Some(message) = result.message.as_deref() {
        return message.to_string();
    }
    let mut lines = vec![result.original_text.trim_end().to_string()];
    lines.push("---".to_string());
    lines.push(result.translated_text.clone());
    if let Some(lang) = result.detected_language.as_deref() {
        lines.push(format!("detected: {}", lang));
    }
    if !result.blocks.is_empty() {
        lines.push(String::new());
        for block in &result.blocks {
            lines.push(format!("{} => {}", block.text, block.translated_text));
        }
    }
    if let Some(error) = result.error.as_deref() {
        lines.push(format!("error: {}", error));
    }
    lines.join("\n")
}

/// Writes the overlay as SVG, or rasterized when the extension is an image type.
pub fn write_overlay(
    path: &Path,
    image: &EncodedImage,
    result: &TranslationResult,
    settings: &Settings,
    show_overlay: bool,
) -> Result<()> {
    let mime = overlay::mime_for_path(path)
        .ok_or_else(|| anyhow!("unsupported overlay output: {}", path.display()))?;
    let svg = overlay::render_overlay_svg(
        &image.bytes,
        image.mime,
        Size::new(image.width as f64, image.height as f64),
        result,
        &settings.overlay,
        &overlay::OverlayStyle::from(settings),
        show_overlay,
    );
    let bytes = if mime == "image/svg+xml" {
        svg.into_bytes()
    } else {
        overlay::render_svg_bytes(&svg, mime)?
    };
    fs::write(path, bytes)
        .with_context(|| format!("failed to write overlay: {}", path.display()))?;
    info!("overlay written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::NO_TEXT_FOUND;

    fn menu_result() -> TranslationResult {
        TranslationResult {
            original_text: "MENU\nAbierto\n".to_string(),
            translated_text: "MENU\nOpen".to_string(),
            detected_language: Some("es".to_string()),
            image_dimensions: ImageDimensions::new(400, 300),
            blocks: vec![
                Block {
                    text: "MENU".to_string(),
                    translated_text: "MENU".to_string(),
                    bounding_box: UnitBox {
                        x: 0.1,
                        y: 0.1,
                        width: 0.4,
                        height: 0.1,
                    },
                },
                Block {
                    text: "Abierto".to_string(),
                    translated_text: "Open".to_string(),
                    bounding_box: UnitBox {
                        x: 0.1,
                        y: 0.5,
                        width: 0.4,
                        height: 0.1,
                    },
                },
            ],
            ..TranslationResult::default()
        }
    }

    #[test]
    fn parses_container_sizes() {
        assert_eq!(parse_size("390x292.5").expect("size"), Size::new(390.0, 292.5));
        assert_eq!(parse_size(" 800X600 ").expect("size"), Size::new(800.0, 600.0));
        assert!(parse_size("800").is_err());
        assert!(parse_size("0x10").is_err());
        assert!(parse_size("axb").is_err());
    }

    #[test]
    fn parses_output_format() {
        assert_eq!("json".parse::<OutputFormat>().expect("json"), OutputFormat::Json);
        assert_eq!("TEXT".parse::<OutputFormat>().expect("text"), OutputFormat::Text);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn rejects_disabled_languages() {
        let settings = Settings::default();
        assert!(validate_lang(&settings, "zh").is_ok());
        let err = validate_lang(&settings, "fr").unwrap_err();
        assert!(err.to_string().contains("es, en, zh"));
    }

    #[test]
    fn text_output_lists_block_pairs() {
        let text = format_text(&menu_result());
        assert_eq!(
            text,
            "MENU\nAbierto\n---\nMENU\nOpen\ndetected: es\n\nMENU => MENU\nAbierto => Open"
        );
        assert_eq!(format_text(&TranslationResult::no_text_found()), NO_TEXT_FOUND);
    }

    #[test]
    fn json_output_includes_layout_for_container() {
        let policy = LayoutPolicy::default();
        let states = StickerStates::new();
        let plain = format_output(&menu_result(), OutputFormat::Json, None, &states, &policy)
            .expect("json");
        let plain: serde_json::Value = serde_json::from_str(&plain).expect("parse");
        assert_eq!(plain["blocks"][1]["translatedText"], "Open");

        let with_layout = format_output(
            &menu_result(),
            OutputFormat::Json,
            Some(Size::new(400.0, 300.0)),
            &states,
            &policy,
        )
        .expect("json");
        let with_layout: serde_json::Value = serde_json::from_str(&with_layout).expect("parse");
        assert_eq!(with_layout["stickers"].as_array().map(Vec::len), Some(2));
        assert_eq!(with_layout["stickers"][1]["text"], "Open");
        assert_eq!(with_layout["stickers"][1]["frame"]["anchor"]["kind"], "topLeft");
        assert_eq!(with_layout["container"]["width"], 400.0);
    }

    #[test]
    fn json_layout_recenters_short_regions_in_small_containers() {
        let policy = LayoutPolicy::default();
        let output = format_output(
            &menu_result(),
            OutputFormat::Json,
            Some(Size::new(200.0, 150.0)),
            &StickerStates::new(),
            &policy,
        )
        .expect("json");
        let output: serde_json::Value = serde_json::from_str(&output).expect("parse");
        assert_eq!(output["stickers"][1]["frame"]["anchor"]["kind"], "center");
    }
}

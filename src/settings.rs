use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::overlay::LayoutPolicy;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

pub const DEFAULT_TARGET_LANG: &str = "es";
pub const DEFAULT_VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";
pub const DEFAULT_TRANSLATE_ENDPOINT: &str =
    "https://translation.googleapis.com/language/translate/v2";

#[derive(Debug, Clone)]
pub struct Settings {
    pub max_dimension: u32,
    pub jpeg_quality: u8,
    pub max_payload_bytes: usize,
    pub ocr_endpoint: String,
    pub translate_endpoint: String,
    pub max_text_chars: usize,
    pub languages: Vec<String>,
    pub overlay: LayoutPolicy,
    pub overlay_text_color: String,
    pub overlay_fill_color: String,
    pub overlay_stroke_color: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_dimension: 1024,
            jpeg_quality: 85,
            max_payload_bytes: 7_864_320,
            ocr_endpoint: DEFAULT_VISION_ENDPOINT.to_string(),
            translate_endpoint: DEFAULT_TRANSLATE_ENDPOINT.to_string(),
            max_text_chars: 5000,
            languages: vec!["es".to_string(), "en".to_string(), "zh".to_string()],
            overlay: LayoutPolicy::default(),
            overlay_text_color: "#ffffff".to_string(),
            overlay_fill_color: "#000000".to_string(),
            overlay_stroke_color: "#ffffff".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    image: Option<ImageSettings>,
    ocr: Option<OcrSettings>,
    translate: Option<TranslateSettings>,
    overlay: Option<OverlaySettings>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageSettings {
    max_dimension: Option<u32>,
    jpeg_quality: Option<u8>,
    max_payload_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    endpoint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslateSettings {
    endpoint: Option<String>,
    max_text_chars: Option<usize>,
    languages: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlaySettings {
    min_hit_px: Option<f64>,
    min_font_px: Option<f64>,
    max_font_px: Option<f64>,
    font_height_ratio: Option<f64>,
    glyph_aspect: Option<f64>,
    expanded_max_width_px: Option<f64>,
    text_color: Option<String>,
    fill_color: Option<String>,
    stroke_color: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings
                .merge_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        }
    }

    Ok(settings)
}

impl Settings {
    /// Layers one TOML document over the current values.
    pub fn merge_str(&mut self, content: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)?;
        self.merge(parsed);
        Ok(())
    }

    pub fn supports_language(&self, code: &str) -> bool {
        self.languages.iter().any(|lang| lang == code)
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(image) = incoming.image {
            if let Some(max) = image.max_dimension
                && max > 0
            {
                self.max_dimension = max;
            }
            if let Some(quality) = image.jpeg_quality
                && (1..=100).contains(&quality)
            {
                self.jpeg_quality = quality;
            }
            if let Some(max) = image.max_payload_bytes
                && max > 0
            {
                self.max_payload_bytes = max;
            }
        }
        if let Some(ocr) = incoming.ocr
            && let Some(endpoint) = non_blank(ocr.endpoint)
        {
            self.ocr_endpoint = endpoint;
        }
        if let Some(translate) = incoming.translate {
            if let Some(endpoint) = non_blank(translate.endpoint) {
                self.translate_endpoint = endpoint;
            }
            if let Some(max) = translate.max_text_chars
                && max > 0
            {
                self.max_text_chars = max;
            }
            if let Some(languages) = translate.languages {
                let languages: Vec<String> = languages
                    .into_iter()
                    .map(|lang| lang.trim().to_string())
                    .filter(|lang| !lang.is_empty())
                    .collect();
                if !languages.is_empty() {
                    self.languages = languages;
                }
            }
        }
        if let Some(overlay) = incoming.overlay {
            let policy = &mut self.overlay;
            let font_bounds = (policy.min_font_px, policy.max_font_px);
            merge_positive(&mut policy.min_hit_px, overlay.min_hit_px);
            merge_positive(&mut policy.min_font_px, overlay.min_font_px);
            merge_positive(&mut policy.max_font_px, overlay.max_font_px);
            if policy.min_font_px > policy.max_font_px {
                warn!(
                    "ignoring overlay font bounds {}..{}: minimum exceeds maximum",
                    policy.min_font_px, policy.max_font_px
                );
                (policy.min_font_px, policy.max_font_px) = font_bounds;
            }
            merge_positive(&mut policy.font_height_ratio, overlay.font_height_ratio);
            merge_positive(&mut policy.glyph_aspect, overlay.glyph_aspect);
            merge_positive(
                &mut policy.expanded_max_width_px,
                overlay.expanded_max_width_px,
            );
            if let Some(color) = non_blank(overlay.text_color) {
                self.overlay_text_color = color;
            }
            if let Some(color) = non_blank(overlay.fill_color) {
                self.overlay_fill_color = color;
            }
            if let Some(color) = non_blank(overlay.stroke_color) {
                self.overlay_stroke_color = color;
            }
        }
    }
}

fn merge_positive(target: &mut f64, value: Option<f64>) {
    if let Some(value) = value
        && value.is_finite()
        && value > 0.0
    {
        *target = value;
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".lens-translator"))
        }
    })
}

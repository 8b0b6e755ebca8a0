//! Runtime configuration.
//!
//! Settings are read from a TOML file (`~/.config/bdrow/config.toml` by
//! default) and a handful of `BDROW_*` environment variables. Every field has
//! a default, so a missing file is not an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::BdrowResult;

/// Default Gemini REST endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default timeline length in seconds.
pub const DEFAULT_MAX_SECONDS: u32 = 15;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub timeline: TimelineConfig,
    pub editor: EditorConfig,
    pub storage: StorageConfig,
}

/// Remote generation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL, without the `v1beta/...` path.
    pub base_url: String,

    /// Model for text-only prompts.
    pub text_model: String,

    /// Model for image generation and image+text edits.
    pub image_generation_model: String,

    /// Model used to translate prompts to English before image edits.
    pub enhancer_model: String,

    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,

    /// Translate image-edit prompts to English first.
    pub translate_prompts: bool,

    /// Phrases that route a text-only prompt to image generation.
    pub image_triggers: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            text_model: "gemini-2.5-flash-lite".to_string(),
            image_generation_model: "gemini-2.5-flash-image-preview".to_string(),
            enhancer_model: "gemini-2.5-flash-lite".to_string(),
            connect_timeout_secs: 60,
            request_timeout_secs: 60,
            translate_prompts: true,
            image_triggers: default_image_triggers(),
        }
    }
}

/// Trigger phrases recognised by default.
pub fn default_image_triggers() -> Vec<String> {
    [
        "画像を生成",
        "画像を作成",
        "イメージを生成",
        "generate image",
        "generate an image",
        "create image",
        "create an image",
        "draw an image",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Timeline settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimelineConfig {
    pub max_seconds: u32,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            max_seconds: DEFAULT_MAX_SECONDS,
        }
    }
}

/// Raster editor settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditorConfig {
    /// Display density (pixels per dp).
    pub density: f32,

    /// User font scale applied on top of density for text.
    pub font_scale: f32,

    /// Font file used for text overlays. Probed from common locations when unset.
    pub font_path: Option<PathBuf>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            density: 1.0,
            font_scale: 1.0,
            font_path: None,
        }
    }
}

/// Local persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Encrypted credential file. Defaults to `{data_dir}/bdrow/credentials.json`.
    pub credential_path: Option<PathBuf>,

    /// Secret mixed into the credential encryption key.
    pub store_secret: String,

    /// Export root. Defaults to the user's picture directory.
    pub export_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            credential_path: None,
            store_secret: "bdrow-local-store".to_string(),
            export_dir: None,
        }
    }
}

impl Config {
    /// Default config file location, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("bdrow").join("config.toml"))
    }

    /// Parses configuration from TOML text.
    pub fn from_toml_str(text: &str) -> BdrowResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Loads the config file at `path`, or the default location when `None`.
    ///
    /// A missing file yields defaults; a malformed one is an error. Environment
    /// overrides are applied last.
    pub fn load(path: Option<&Path>) -> BdrowResult<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(ref p) if p.exists() => {
                let text = std::fs::read_to_string(p)?;
                tracing::debug!(path = %p.display(), "loading config");
                Self::from_toml_str(&text)?
            }
            Some(ref p) => {
                tracing::debug!(path = %p.display(), "config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `BDROW_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("BDROW_API_BASE_URL") {
            self.api.base_url = url;
        }
        if let Some(secret) = non_empty("BDROW_STORE_SECRET") {
            self.storage.store_secret = secret;
        }
        if let Some(font) = non_empty("BDROW_FONT") {
            self.editor.font_path = Some(PathBuf::from(font));
        }
    }

    /// Resolved credential file path.
    pub fn credential_path(&self) -> PathBuf {
        self.storage.credential_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("bdrow")
                .join("credentials.json")
        })
    }

    /// Resolved export root.
    pub fn export_dir(&self) -> PathBuf {
        self.storage
            .export_dir
            .clone()
            .or_else(dirs::picture_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.api.connect_timeout_secs, 60);
        assert_eq!(config.timeline.max_seconds, 15);
        assert!(config.api.translate_prompts);
        assert!(config.api.image_triggers.iter().any(|t| t == "画像を生成"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [api]
            text_model = "gemini-2.0-flash"
            translate_prompts = false

            [editor]
            density = 2.75
            "#,
        )
        .unwrap();

        assert_eq!(config.api.text_model, "gemini-2.0-flash");
        assert!(!config.api.translate_prompts);
        assert_eq!(config.api.base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.editor.density, 2.75);
        assert_eq!(config.editor.font_scale, 1.0);
        assert_eq!(config.timeline.max_seconds, 15);
    }

    #[test]
    fn test_malformed_toml_is_error() {
        assert!(Config::from_toml_str("[api\nbase_url = 3").is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config.timeline.max_seconds, DEFAULT_MAX_SECONDS);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            "BDROW_API_BASE_URL" => Some("http://localhost:8080".to_string()),
            "BDROW_STORE_SECRET" => Some("   ".to_string()),
            "BDROW_FONT" => Some("/tmp/font.ttf".to_string()),
            _ => None,
        });

        assert_eq!(config.api.base_url, "http://localhost:8080");
        // Blank values are ignored.
        assert_eq!(config.storage.store_secret, "bdrow-local-store");
        assert_eq!(config.editor.font_path, Some(PathBuf::from("/tmp/font.ttf")));
    }

    #[test]
    fn test_explicit_storage_paths() {
        let mut config = Config::default();
        config.storage.credential_path = Some(PathBuf::from("/tmp/creds.json"));
        config.storage.export_dir = Some(PathBuf::from("/tmp/pics"));
        assert_eq!(config.credential_path(), PathBuf::from("/tmp/creds.json"));
        assert_eq!(config.export_dir(), PathBuf::from("/tmp/pics"));
    }
}

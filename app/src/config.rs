use anyhow::{Context, Result};
use greentext_core::config::config_dir;
use greentext_core::export::ExportFormat;
use greentext_core::llm::{
    LlmProviderKind, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, MAX_TOKENS_RANGE, MAX_TOKENS_STEP,
    TEMPERATURE_RANGE, TEMPERATURE_STEP,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Sidebar choices remembered between launches. Never holds API keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiSettings {
    #[serde(default)]
    pub provider: LlmProviderKind,
    #[serde(default = "UiSettings::default_temperature")]
    pub temperature: f32,
    #[serde(default = "UiSettings::default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub export_format: ExportFormat,
    #[serde(default = "UiSettings::default_window_size")]
    pub window_size: [f32; 2],
    #[serde(default)]
    pub last_key_name: Option<String>,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::default(),
            temperature: UiSettings::default_temperature(),
            max_tokens: UiSettings::default_max_tokens(),
            export_format: ExportFormat::default(),
            window_size: UiSettings::default_window_size(),
            last_key_name: None,
        }
    }
}

impl UiSettings {
    fn default_temperature() -> f32 {
        DEFAULT_TEMPERATURE
    }

    fn default_max_tokens() -> u32 {
        DEFAULT_MAX_TOKENS
    }

    fn default_window_size() -> [f32; 2] {
        [1100.0, 780.0]
    }

    /// Clamp slider values into range and onto their step grid.
    pub fn sanitized(mut self) -> Self {
        let temperature = self
            .temperature
            .clamp(*TEMPERATURE_RANGE.start(), *TEMPERATURE_RANGE.end());
        let steps = (temperature / TEMPERATURE_STEP).round();
        self.temperature = steps / (1.0 / TEMPERATURE_STEP).round();
        let max_tokens = self
            .max_tokens
            .clamp(*MAX_TOKENS_RANGE.start(), *MAX_TOKENS_RANGE.end());
        self.max_tokens = (max_tokens + MAX_TOKENS_STEP / 2) / MAX_TOKENS_STEP * MAX_TOKENS_STEP;
        self
    }
}

pub fn ui_settings_path() -> PathBuf {
    config_dir().join("ui_settings.json")
}

pub async fn load_ui_settings() -> Result<UiSettings> {
    load_ui_settings_from(&ui_settings_path()).await
}

pub async fn save_ui_settings(settings: &UiSettings) -> Result<()> {
    save_ui_settings_to(&ui_settings_path(), settings).await
}

pub async fn load_ui_settings_from(path: &Path) -> Result<UiSettings> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => match serde_json::from_str::<UiSettings>(&contents) {
            Ok(settings) => Ok(settings.sanitized()),
            Err(err) => {
                let defaults = UiSettings::default();
                save_ui_settings_to(path, &defaults).await?;
                warn!(
                    error = ?err,
                    "failed to parse ui_settings.json, resetting to defaults"
                );
                Ok(defaults)
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let defaults = UiSettings::default();
            save_ui_settings_to(path, &defaults).await?;
            Ok(defaults)
        }
        Err(err) => Err(err).context("failed to read ui_settings.json"),
    }
}

pub async fn save_ui_settings_to(path: &Path, settings: &UiSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let serialized = serde_json::to_string_pretty(settings)?;
    tokio::fs::write(path, serialized)
        .await
        .with_context(|| format!("failed to write ui_settings.json at {}", path.display()))
}

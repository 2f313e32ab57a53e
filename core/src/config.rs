use crate::error::ConfigError;
use crate::llm::LlmProviderKind;
use directories::BaseDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

const DEFAULT_OPENAI_MODEL: &str = "gpt-4.5-preview";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20240620";
const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
const CREDENTIALS_FILE: &str = "saved_keys.json";

#[derive(Debug, Clone)]
pub struct GreentextConfig {
    pub openai: OpenAiSettings,
    pub anthropic: AnthropicSettings,
    pub credentials_path: PathBuf,
    pub export: ExportSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiSettings {
    pub model: String,
    pub base_url: String,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_OPENAI_MODEL.to_string(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnthropicSettings {
    pub model: String,
    pub base_url: String,
    pub version: String,
}

impl Default for AnthropicSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_ANTHROPIC_MODEL.to_string(),
            base_url: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            version: DEFAULT_ANTHROPIC_VERSION.to_string(),
        }
    }
}

/// Optional font overrides for image export. Bundled fonts are used otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSettings {
    pub mono_font: Option<PathBuf>,
    pub header_font: Option<PathBuf>,
}

impl Default for GreentextConfig {
    fn default() -> Self {
        Self {
            openai: OpenAiSettings::default(),
            anthropic: AnthropicSettings::default(),
            credentials_path: config_dir().join(CREDENTIALS_FILE),
            export: ExportSettings::default(),
        }
    }
}

/// Environment values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub openai_model: Option<String>,
    pub anthropic_model: Option<String>,
    pub credentials_path: Option<PathBuf>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            openai_model: read("GREENTEXT_OPENAI_MODEL"),
            anthropic_model: read("GREENTEXT_ANTHROPIC_MODEL"),
            credentials_path: read("GREENTEXT_CREDENTIALS").map(PathBuf::from),
        }
    }
}

impl GreentextConfig {
    /// Load `greentext.yaml` from the usual locations, falling back to defaults
    /// when none exists. A `.env` file in the working directory is honoured.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let overrides = EnvOverrides::from_env();
        match locate_config_file() {
            Some(path) => Self::load_from(&path, &overrides),
            None => resolve(ConfigFile::default(), &overrides),
        }
    }

    pub fn load_from(path: &Path, overrides: &EnvOverrides) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            ConfigError::Invalid(format!("failed to read {}: {err}", path.display()))
        })?;
        debug!(path = %path.display(), "loaded greentext config");
        Self::from_yaml_str(&contents, overrides)
    }

    pub fn from_yaml_str(contents: &str, overrides: &EnvOverrides) -> Result<Self, ConfigError> {
        let file: ConfigFile = if contents.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(contents)
                .map_err(|err| ConfigError::Invalid(format!("invalid greentext.yaml: {err}")))?
        };
        resolve(file, overrides)
    }
}

/// API key from `OPENAI_API_KEY` / `ANTHROPIC_API_KEY`, used when no key was entered.
pub fn api_key_from_env(provider: &LlmProviderKind) -> Option<String> {
    let var = match provider {
        LlmProviderKind::OpenAi => "OPENAI_API_KEY",
        LlmProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        LlmProviderKind::Mock => return None,
    };
    std::env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Directory holding `greentext.yaml`, `saved_keys.json` and `ui_settings.json`.
pub fn config_dir() -> PathBuf {
    if let Some(base) = BaseDirs::new() {
        base.config_dir().join("greentext")
    } else {
        PathBuf::from(".greentext")
    }
}

fn resolve(file: ConfigFile, overrides: &EnvOverrides) -> Result<GreentextConfig, ConfigError> {
    let openai_section = file.openai.unwrap_or_default();
    let anthropic_section = file.anthropic.unwrap_or_default();

    let openai = OpenAiSettings {
        model: pick(
            overrides.openai_model.clone(),
            openai_section.model,
            DEFAULT_OPENAI_MODEL,
        ),
        base_url: checked_url(openai_section.base_url, DEFAULT_OPENAI_BASE_URL, "openai")?,
    };
    let anthropic = AnthropicSettings {
        model: pick(
            overrides.anthropic_model.clone(),
            anthropic_section.model,
            DEFAULT_ANTHROPIC_MODEL,
        ),
        base_url: checked_url(
            anthropic_section.base_url,
            DEFAULT_ANTHROPIC_BASE_URL,
            "anthropic",
        )?,
        version: pick(None, anthropic_section.version, DEFAULT_ANTHROPIC_VERSION),
    };
    let credentials_path = overrides
        .credentials_path
        .clone()
        .or(file.credentials_path)
        .unwrap_or_else(|| config_dir().join(CREDENTIALS_FILE));
    let export = file.export.unwrap_or_default();

    Ok(GreentextConfig {
        openai,
        anthropic,
        credentials_path,
        export: ExportSettings {
            mono_font: export.mono_font,
            header_font: export.header_font,
        },
    })
}

fn pick(preferred: Option<String>, configured: Option<String>, fallback: &str) -> String {
    preferred
        .or(configured)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn checked_url(
    configured: Option<String>,
    fallback: &str,
    section: &str,
) -> Result<String, ConfigError> {
    let value = pick(None, configured, fallback);
    Url::parse(&value)
        .map_err(|err| ConfigError::Invalid(format!("{section}.base_url `{value}`: {err}")))?;
    Ok(value)
}

fn locate_config_file() -> Option<PathBuf> {
    config_candidates().into_iter().find(|path| path.exists())
}

fn config_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(base) = BaseDirs::new() {
        let config_dir = base.config_dir().join("greentext");
        paths.push(config_dir.join("greentext.yaml"));
        paths.push(config_dir.join("greentext.yml"));
        let home_dir = base.home_dir();
        paths.push(home_dir.join(".greentext").join("greentext.yaml"));
        paths.push(home_dir.join(".greentext").join("greentext.yml"));
    } else {
        paths.push(PathBuf::from("greentext.yaml"));
        paths.push(PathBuf::from("greentext.yml"));
    }
    paths
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    openai: Option<ProviderSection>,
    #[serde(default)]
    anthropic: Option<ProviderSection>,
    #[serde(default)]
    credentials_path: Option<PathBuf>,
    #[serde(default)]
    export: Option<ExportSection>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderSection {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExportSection {
    #[serde(default)]
    mono_font: Option<PathBuf>,
    #[serde(default)]
    header_font: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = GreentextConfig::from_yaml_str("", &EnvOverrides::default()).expect("config");
        assert_eq!(config.openai, OpenAiSettings::default());
        assert_eq!(config.anthropic, AnthropicSettings::default());
        assert!(config.credentials_path.ends_with("saved_keys.json"));
    }

    #[test]
    fn file_values_override_defaults() {
        let yaml = r#"
openai:
  model: gpt-4o
  base_url: http://localhost:8080/v1
anthropic:
  version: "2024-01-01"
credentials_path: /tmp/keys.json
export:
  mono_font: /usr/share/fonts/mono.ttf
"#;
        let config = GreentextConfig::from_yaml_str(yaml, &EnvOverrides::default()).expect("config");
        assert_eq!(config.openai.model, "gpt-4o");
        assert_eq!(config.openai.base_url, "http://localhost:8080/v1");
        assert_eq!(config.anthropic.model, "claude-3-5-sonnet-20240620");
        assert_eq!(config.anthropic.version, "2024-01-01");
        assert_eq!(config.credentials_path, PathBuf::from("/tmp/keys.json"));
        assert_eq!(
            config.export.mono_font,
            Some(PathBuf::from("/usr/share/fonts/mono.ttf"))
        );
        assert!(config.export.header_font.is_none());
    }

    #[test]
    fn environment_wins_over_file() {
        let overrides = EnvOverrides {
            openai_model: Some("gpt-4o-mini".into()),
            anthropic_model: None,
            credentials_path: Some(PathBuf::from("/var/keys.json")),
        };
        let config = GreentextConfig::from_yaml_str("openai:\n  model: gpt-4o\n", &overrides)
            .expect("config");
        assert_eq!(config.openai.model, "gpt-4o-mini");
        assert_eq!(config.credentials_path, PathBuf::from("/var/keys.json"));
    }

    #[test]
    fn rejects_bad_base_url() {
        let err = GreentextConfig::from_yaml_str(
            "anthropic:\n  base_url: not a url\n",
            &EnvOverrides::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_yaml() {
        let err = GreentextConfig::from_yaml_str("openai: [", &EnvOverrides::default())
            .unwrap_err();
        assert!(err.user_message().contains("greentext.yaml"));
    }
}

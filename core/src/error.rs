use crate::llm::LlmProviderKind;
use thiserror::Error;

/// Failures while reading or rewriting the saved-keys file.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to access saved keys: {0}")]
    Io(#[from] std::io::Error),

    #[error("saved keys file is malformed: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("failed to serialize saved keys: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("key name must not be empty")]
    EmptyName,

    #[error("API key must not be empty")]
    EmptySecret,

    #[error("{0} does not use saved keys")]
    NoSavedKeys(LlmProviderKind),
}

/// Failures of a single generate action.
///
/// `MissingCredential`, `EmptyPrompt` and `InvalidParameters` are raised before
/// any request is sent. Everything else happens once the stream is open and
/// ends that generation.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Please enter your {provider} API key")]
    MissingCredential { provider: LlmProviderKind },

    #[error("Please enter a prompt")]
    EmptyPrompt,

    #[error("Invalid generation parameters: {0}")]
    InvalidParameters(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Failed to decode stream event: {0}")]
    Decode(#[from] serde_json::Error),
}

impl GenerationError {
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential { .. } | Self::EmptyPrompt | Self::InvalidParameters(_)
        )
    }

    /// Message shown to the user for a failed generate action.
    pub fn user_message(&self) -> String {
        if self.is_preflight() {
            self.to_string()
        } else {
            format!("Error while generating text: {self}")
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Failures while rendering an export artifact.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("No completed greentext to export")]
    NotComplete,

    #[error("failed to encode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to load font: {0}")]
    Font(String),

    #[error("failed to build PDF: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Invalid(detail) => {
                format!("Greentext not configured: {detail}. Update greentext.yaml.")
            }
        }
    }
}

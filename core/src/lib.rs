pub mod config;
pub mod error;
pub mod export;
pub mod format;
pub mod llm;
pub mod state;
pub mod store;
pub mod telemetry;


pub use config::GreentextConfig;
pub use error::{ConfigError, CredentialError, ExportError, GenerationError};
pub use export::{ExportArtifact, ExportFormat, Exporter};
pub use format::{format_lines, format_text, PostHeader, RenderedPost};
pub use llm::{GenerationRequest, LlmDriver, LlmProviderKind, StreamChunk};
pub use state::{AppState, GenerationSession, SessionPhase};
pub use store::{CredentialStore, SavedKeys, StoredKey};

use crate::config::{AnthropicSettings, GreentextConfig, OpenAiSettings};
use crate::error::GenerationError;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource, RequestBuilderExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{debug, trace, warn};

pub const TEMPERATURE_RANGE: RangeInclusive<f32> = 0.0..=2.0;
pub const TEMPERATURE_STEP: f32 = 0.1;
pub const DEFAULT_TEMPERATURE: f32 = 1.0;
pub const MAX_TOKENS_RANGE: RangeInclusive<u32> = 50..=1000;
pub const MAX_TOKENS_STEP: u32 = 50;
pub const DEFAULT_MAX_TOKENS: u32 = 300;

pub const GREENTEXT_SYSTEM_PROMPT: &str = "You are creating authentic 4chan greentext stories. \
Follow these rules exactly:\n\
1. Every line MUST start with '>' (no space after >)\n\
2. First line should typically be '>be me' or similar\n\
3. Keep lines very short - rarely more than 10-15 words\n\
4. Use 4chan terminology: anon, mfw (my face when), tfw (that feel when), etc.\n\
5. Be edgy, self-deprecating, and include twist endings\n\
6. No paragraph breaks - just line breaks\n\
7. Include at least one reaction line like '>mfw' at the end\n\
8. Keep content edgy, absurd and vulgar - this is 4chan style\n\
DO NOT include anything except the greentext lines. Do not explain or preface.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum LlmProviderKind {
    #[default]
    OpenAi,
    Anthropic,
    Mock,
}

impl LlmProviderKind {
    pub const ALL: [LlmProviderKind; 3] = [
        LlmProviderKind::OpenAi,
        LlmProviderKind::Anthropic,
        LlmProviderKind::Mock,
    ];

    /// Label used by the provider selector.
    pub fn label(&self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic (Claude)",
            Self::Mock => "Mock (offline)",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Mock)
    }
}

impl fmt::Display for LlmProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "OpenAI"),
            Self::Anthropic => write!(f, "Anthropic"),
            Self::Mock => write!(f, "Mock"),
        }
    }
}

impl FromStr for LlmProviderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "mock" => Ok(Self::Mock),
            other => Err(format!(
                "unknown provider `{other}` (expected openai, anthropic or mock)"
            )),
        }
    }
}

/// One generate action. Built fresh for every click and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub provider: LlmProviderKind,
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.prompt.trim().is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }
        if !TEMPERATURE_RANGE.contains(&self.temperature) {
            return Err(GenerationError::InvalidParameters(format!(
                "temperature {} outside {:?}",
                self.temperature, TEMPERATURE_RANGE
            )));
        }
        if !MAX_TOKENS_RANGE.contains(&self.max_tokens) {
            return Err(GenerationError::InvalidParameters(format!(
                "max tokens {} outside {:?}",
                self.max_tokens, MAX_TOKENS_RANGE
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    pub delta: String,
    pub done: bool,
}

impl StreamChunk {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            delta: text.into(),
            done: false,
        }
    }

    pub fn done() -> Self {
        Self {
            delta: String::new(),
            done: true,
        }
    }
}

/// Fragments of one generation, terminated by a `done` chunk or an error.
pub type ChunkReceiver = mpsc::UnboundedReceiver<Result<StreamChunk, GenerationError>>;
pub type ChunkSender = mpsc::UnboundedSender<Result<StreamChunk, GenerationError>>;

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Open a token stream for `request`. Empty fragments never reach the receiver.
    async fn open_stream(
        &self,
        request: &GenerationRequest,
        api_key: &str,
    ) -> Result<ChunkReceiver, GenerationError>;
}

#[derive(Debug, Clone, Default)]
pub struct LlmSettings {
    pub openai: OpenAiSettings,
    pub anthropic: AnthropicSettings,
}

impl From<&GreentextConfig> for LlmSettings {
    fn from(config: &GreentextConfig) -> Self {
        Self {
            openai: config.openai.clone(),
            anthropic: config.anthropic.clone(),
        }
    }
}

/// Selects a provider adapter per request. Adapters (and their HTTP clients)
/// are built fresh for every generation unless an override is registered.
#[derive(Clone)]
pub struct LlmDriver {
    settings: LlmSettings,
    overrides: HashMap<LlmProviderKind, Arc<dyn GenerationProvider>>,
}

impl LlmDriver {
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            settings,
            overrides: HashMap::new(),
        }
    }

    pub fn from_config(config: &GreentextConfig) -> Self {
        Self::new(LlmSettings::from(config))
    }

    pub fn fake() -> Self {
        Self::new(LlmSettings::default())
            .with_provider(LlmProviderKind::Mock, Arc::new(MockProvider::instant()))
    }

    /// Route `kind` to `provider` instead of the built-in adapter.
    pub fn with_provider(
        mut self,
        kind: LlmProviderKind,
        provider: Arc<dyn GenerationProvider>,
    ) -> Self {
        self.overrides.insert(kind, provider);
        self
    }

    pub fn model_for(&self, kind: &LlmProviderKind) -> String {
        match kind {
            LlmProviderKind::OpenAi => self.settings.openai.model.clone(),
            LlmProviderKind::Anthropic => self.settings.anthropic.model.clone(),
            LlmProviderKind::Mock => "mock".to_string(),
        }
    }

    /// Build a request using the configured model for `provider`.
    pub fn request(
        &self,
        provider: LlmProviderKind,
        prompt: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> GenerationRequest {
        GenerationRequest {
            model: self.model_for(&provider),
            provider,
            prompt: prompt.into(),
            temperature,
            max_tokens,
        }
    }

    /// Check credentials and input, then open the provider's stream.
    pub async fn open(
        &self,
        request: &GenerationRequest,
        api_key: Option<&str>,
    ) -> Result<ChunkReceiver, GenerationError> {
        let api_key = api_key.map(str::trim).unwrap_or_default();
        if request.provider.requires_api_key() && api_key.is_empty() {
            return Err(GenerationError::MissingCredential {
                provider: request.provider.clone(),
            });
        }
        request.validate()?;
        debug!(
            provider = ?request.provider,
            model = %request.model,
            temperature = request.temperature,
            max_tokens = request.max_tokens,
            "opening generation stream"
        );
        let provider = self.provider_for(&request.provider);
        provider.open_stream(request, api_key).await
    }

    fn provider_for(&self, kind: &LlmProviderKind) -> Arc<dyn GenerationProvider> {
        if let Some(provider) = self.overrides.get(kind) {
            return provider.clone();
        }
        match kind {
            LlmProviderKind::OpenAi => Arc::new(OpenAiProvider::new(self.settings.openai.clone())),
            LlmProviderKind::Anthropic => {
                Arc::new(AnthropicProvider::new(self.settings.anthropic.clone()))
            }
            LlmProviderKind::Mock => Arc::new(MockProvider::default()),
        }
    }
}

/// What a single server-sent event means for the fragment stream.
#[derive(Debug, PartialEq, Eq)]
enum SseOutcome {
    Fragment(String),
    Ignore,
    Done,
}

struct OpenAiProvider {
    settings: OpenAiSettings,
}

impl OpenAiProvider {
    fn new(settings: OpenAiSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl GenerationProvider for OpenAiProvider {
    async fn open_stream(
        &self,
        request: &GenerationRequest,
        api_key: &str,
    ) -> Result<ChunkReceiver, GenerationError> {
        let body = serde_json::json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": GREENTEXT_SYSTEM_PROMPT },
                { "role": "user", "content": request.prompt },
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": true,
        });
        let source = reqwest::Client::new()
            .post(format!(
                "{}/chat/completions",
                self.settings.base_url.trim_end_matches('/')
            ))
            .bearer_auth(api_key)
            .json(&body)
            .eventsource()
            .map_err(|err| GenerationError::Transport(err.to_string()))?;
        Ok(pump_events(source, parse_openai_event))
    }
}

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    delta: OpenAiDelta,
}

#[derive(Deserialize, Default)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

fn parse_openai_event(data: &str) -> Result<SseOutcome, GenerationError> {
    if data.trim() == "[DONE]" {
        return Ok(SseOutcome::Done);
    }
    let chunk: OpenAiStreamChunk = serde_json::from_str(data)?;
    if let Some(error) = chunk.error {
        return Err(GenerationError::Upstream(error.message));
    }
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(SseOutcome::Ignore);
    };
    if let Some(refusal) = choice.delta.refusal {
        return Err(GenerationError::Upstream(format!("refused: {refusal}")));
    }
    Ok(SseOutcome::Fragment(choice.delta.content.unwrap_or_default()))
}

struct AnthropicProvider {
    settings: AnthropicSettings,
}

impl AnthropicProvider {
    fn new(settings: AnthropicSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl GenerationProvider for AnthropicProvider {
    async fn open_stream(
        &self,
        request: &GenerationRequest,
        api_key: &str,
    ) -> Result<ChunkReceiver, GenerationError> {
        let body = serde_json::json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "system": GREENTEXT_SYSTEM_PROMPT,
            "messages": [
                { "role": "user", "content": request.prompt },
            ],
            "stream": true,
        });
        let source = reqwest::Client::new()
            .post(format!(
                "{}/messages",
                self.settings.base_url.trim_end_matches('/')
            ))
            .header("x-api-key", api_key)
            .header("anthropic-version", &self.settings.version)
            .json(&body)
            .eventsource()
            .map_err(|err| GenerationError::Transport(err.to_string()))?;
        Ok(pump_events(source, parse_anthropic_event))
    }
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum AnthropicStreamEvent {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: AnthropicDelta },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(rename = "error")]
    Error { error: ApiErrorBody },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum AnthropicDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

fn parse_anthropic_event(data: &str) -> Result<SseOutcome, GenerationError> {
    match serde_json::from_str::<AnthropicStreamEvent>(data)? {
        AnthropicStreamEvent::ContentBlockDelta {
            delta: AnthropicDelta::TextDelta { text },
        } => Ok(SseOutcome::Fragment(text)),
        AnthropicStreamEvent::ContentBlockDelta {
            delta: AnthropicDelta::Other,
        } => Ok(SseOutcome::Ignore),
        AnthropicStreamEvent::MessageStop => Ok(SseOutcome::Done),
        AnthropicStreamEvent::Error { error } => Err(GenerationError::Upstream(error.message)),
        AnthropicStreamEvent::Other => {
            trace!(data, "ignoring anthropic event");
            Ok(SseOutcome::Ignore)
        }
    }
}

/// Drive an event source on a background task, forwarding non-empty fragments.
/// The stream only completes on the provider's own completion signal; a
/// connection that ends without one is a transport failure.
fn pump_events(
    mut source: EventSource,
    parse: fn(&str) -> Result<SseOutcome, GenerationError>,
) -> ChunkReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut completed = false;
        while let Some(event) = source.next().await {
            let outcome = match event {
                Ok(Event::Open) => continue,
                Ok(Event::Message(message)) => parse(&message.data),
                Err(reqwest_eventsource::Error::StreamEnded) => Err(GenerationError::Transport(
                    "stream ended before completion".to_string(),
                )),
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    let body = response.text().await.unwrap_or_default();
                    Err(GenerationError::Http {
                        status: status.as_u16(),
                        body,
                    })
                }
                Err(err) => Err(GenerationError::Transport(err.to_string())),
            };
            match outcome {
                Ok(SseOutcome::Fragment(text)) => {
                    if text.is_empty() {
                        continue;
                    }
                    if tx.send(Ok(StreamChunk::delta(text))).is_err() {
                        warn!("fragment receiver dropped before stream completion");
                        source.close();
                        return;
                    }
                }
                Ok(SseOutcome::Ignore) => {}
                Ok(SseOutcome::Done) => {
                    completed = true;
                    break;
                }
                Err(err) => {
                    source.close();
                    let _ = tx.send(Err(err));
                    return;
                }
            }
        }
        source.close();
        let chunk = if completed {
            Ok(StreamChunk::done())
        } else {
            Err(GenerationError::Transport(
                "stream ended before completion".to_string(),
            ))
        };
        let _ = tx.send(chunk);
    });
    rx
}

/// Offline provider streaming a canned greentext word by word.
pub struct MockProvider {
    delay: Duration,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(20),
        }
    }
}

impl MockProvider {
    pub fn instant() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    pub fn fragments_for(request: &GenerationRequest) -> Vec<String> {
        let topic: String = request.prompt.trim().chars().take(60).collect();
        let story = format!(
            ">be me\n>{}\n>ask the mock provider for a story\n\
             it answers one word at a time\n\n>no network involved\n>mfw",
            topic.to_lowercase()
        );
        let mut fragments = Vec::new();
        let mut current = String::new();
        let budget = request.max_tokens as usize;
        for ch in story.chars() {
            current.push(ch);
            if ch == ' ' || ch == '\n' {
                fragments.push(std::mem::take(&mut current));
                // framing events arrive as empty fragments
                fragments.push(String::new());
                if fragments.len() / 2 >= budget {
                    return fragments;
                }
            }
        }
        if !current.is_empty() {
            fragments.push(current);
        }
        fragments
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    async fn open_stream(
        &self,
        request: &GenerationRequest,
        _api_key: &str,
    ) -> Result<ChunkReceiver, GenerationError> {
        let fragments = Self::fragments_for(request);
        let delay = self.delay;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            for fragment in fragments {
                if fragment.is_empty() {
                    continue;
                }
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                if tx.send(Ok(StreamChunk::delta(fragment))).is_err() {
                    return;
                }
            }
            let _ = tx.send(Ok(StreamChunk::done()));
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(provider: LlmProviderKind, prompt: &str) -> GenerationRequest {
        LlmDriver::fake().request(provider, prompt, DEFAULT_TEMPERATURE, DEFAULT_MAX_TOKENS)
    }

    #[test]
    fn parses_openai_content_delta() {
        let data = r#"{"id":"x","choices":[{"index":0,"delta":{"content":">be me"},"finish_reason":null}]}"#;
        assert_eq!(
            parse_openai_event(data).unwrap(),
            SseOutcome::Fragment(">be me".into())
        );
    }

    #[test]
    fn openai_role_frame_is_empty_fragment() {
        let data = r#"{"choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}"#;
        assert_eq!(
            parse_openai_event(data).unwrap(),
            SseOutcome::Fragment(String::new())
        );
    }

    #[test]
    fn openai_done_marker_ends_stream() {
        assert_eq!(parse_openai_event("[DONE]").unwrap(), SseOutcome::Done);
    }

    #[test]
    fn openai_error_payload_is_upstream_error() {
        let data = r#"{"error":{"message":"quota exceeded","type":"insufficient_quota"}}"#;
        assert!(matches!(
            parse_openai_event(data),
            Err(GenerationError::Upstream(message)) if message == "quota exceeded"
        ));
    }

    #[test]
    fn parses_anthropic_text_delta() {
        let data = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":">mfw"}}"#;
        assert_eq!(
            parse_anthropic_event(data).unwrap(),
            SseOutcome::Fragment(">mfw".into())
        );
    }

    #[test]
    fn anthropic_framing_events_are_ignored() {
        for data in [
            r#"{"type":"message_start","message":{"id":"msg"}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"{"type":"ping"}"#,
            r#"{"type":"content_block_stop","index":0}"#,
        ] {
            assert_eq!(parse_anthropic_event(data).unwrap(), SseOutcome::Ignore);
        }
        assert_eq!(
            parse_anthropic_event(r#"{"type":"message_stop"}"#).unwrap(),
            SseOutcome::Done
        );
    }

    #[test]
    fn anthropic_error_event_is_upstream_error() {
        let data = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert!(matches!(
            parse_anthropic_event(data),
            Err(GenerationError::Upstream(message)) if message == "Overloaded"
        ));
    }

    #[test]
    fn provider_names_parse() {
        assert_eq!("OpenAI".parse::<LlmProviderKind>(), Ok(LlmProviderKind::OpenAi));
        assert_eq!("claude".parse::<LlmProviderKind>(), Ok(LlmProviderKind::Anthropic));
        assert!("gemini".parse::<LlmProviderKind>().is_err());
    }

    #[tokio::test]
    async fn missing_key_is_rejected_before_streaming() {
        let driver = LlmDriver::fake();
        let err = driver
            .open(&request(LlmProviderKind::OpenAi, "find a usb stick"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::MissingCredential { .. }));
        assert!(err.is_preflight());
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected() {
        let driver = LlmDriver::fake();
        let err = driver
            .open(&request(LlmProviderKind::Anthropic, "   "), Some("sk-ant"))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::EmptyPrompt));
    }

    #[tokio::test]
    async fn out_of_range_parameters_are_rejected() {
        let driver = LlmDriver::fake();
        let mut req = request(LlmProviderKind::Mock, "prompt");
        req.temperature = 2.5;
        assert!(matches!(
            driver.open(&req, None).await,
            Err(GenerationError::InvalidParameters(_))
        ));
        req.temperature = 1.0;
        req.max_tokens = 10;
        assert!(matches!(
            driver.open(&req, None).await,
            Err(GenerationError::InvalidParameters(_))
        ));
    }

    #[test]
    fn configured_models_are_used() {
        let driver = LlmDriver::fake();
        assert_eq!(driver.model_for(&LlmProviderKind::OpenAi), "gpt-4.5-preview");
        assert_eq!(
            driver.model_for(&LlmProviderKind::Anthropic),
            "claude-3-5-sonnet-20240620"
        );
    }

    #[test]
    fn mock_fragments_include_framing_gaps() {
        let fragments = MockProvider::fragments_for(&request(LlmProviderKind::Mock, "Cats"));
        assert!(fragments.iter().any(String::is_empty));
        let joined: String = fragments.concat();
        assert!(joined.starts_with(">be me\n>cats\n"));
        assert!(joined.ends_with(">mfw"));
    }
}

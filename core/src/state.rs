use crate::config::GreentextConfig;
use crate::error::{ExportError, GenerationError};
use crate::export::{ExportArtifact, ExportFormat, Exporter};
use crate::format::{PostHeader, RenderedPost};
use crate::llm::{ChunkReceiver, GenerationRequest, LlmDriver, LlmProviderKind};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Streaming,
    Complete,
}

/// Accumulated text and header of one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSession {
    pub id: Uuid,
    pub provider: LlmProviderKind,
    pub full_text: String,
    pub header: PostHeader,
    pub is_complete: bool,
}

impl GenerationSession {
    fn start(provider: LlmProviderKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider,
            full_text: String::new(),
            header: PostHeader::mint(),
            is_complete: false,
        }
    }

    pub fn post_info(&self) -> String {
        self.header.post_info()
    }

    pub fn render(&self) -> RenderedPost {
        RenderedPost::new(&self.header, &self.full_text)
    }
}

/// Shared session context handed to every UI handler.
///
/// Holds the current generation (streaming or complete) plus the last finished
/// one, which is restored if a newer generation fails mid-stream.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<RwLock<InnerState>>,
    llm: LlmDriver,
    exporter: Exporter,
}

#[derive(Default)]
struct InnerState {
    current: Option<GenerationSession>,
    previous: Option<GenerationSession>,
    last_error: Option<String>,
}

impl AppState {
    pub fn new(llm: LlmDriver, exporter: Exporter) -> Self {
        Self {
            inner: Arc::new(RwLock::new(InnerState::default())),
            llm,
            exporter,
        }
    }

    pub fn from_config(config: &GreentextConfig) -> Self {
        Self::new(
            LlmDriver::from_config(config),
            Exporter::new(config.export.clone()),
        )
    }

    pub fn llm(&self) -> &LlmDriver {
        &self.llm
    }

    pub fn phase(&self) -> SessionPhase {
        match &self.inner.read().current {
            None => SessionPhase::Idle,
            Some(session) if session.is_complete => SessionPhase::Complete,
            Some(_) => SessionPhase::Streaming,
        }
    }

    pub fn current_session(&self) -> Option<GenerationSession> {
        self.inner.read().current.clone()
    }

    pub fn completed_session(&self) -> Option<GenerationSession> {
        self.inner
            .read()
            .current
            .as_ref()
            .filter(|session| session.is_complete)
            .cloned()
    }

    /// Post for the current session. Calling this repeatedly never touches the
    /// provider or re-rolls the header.
    pub fn render_post(&self) -> Option<RenderedPost> {
        self.inner.read().current.as_ref().map(GenerationSession::render)
    }

    pub fn success_message(&self) -> Option<String> {
        self.completed_session()
            .map(|session| {
                format!(
                    "Greentext generated successfully with {}!",
                    session.provider.label()
                )
            })
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.read().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.inner.write().last_error = None;
    }

    /// Idle/Complete -> Streaming. Clears the buffer and mints a new header.
    pub fn start_session(&self, provider: LlmProviderKind) -> Uuid {
        let session = GenerationSession::start(provider);
        let id = session.id;
        let mut inner = self.inner.write();
        if let Some(finished) = inner.current.take().filter(|s| s.is_complete) {
            inner.previous = Some(finished);
        }
        inner.current = Some(session);
        inner.last_error = None;
        id
    }

    /// Append a fragment to the streaming session `id`. Fragments for any other
    /// session, or arriving after completion, are dropped.
    pub fn append_fragment(&self, id: Uuid, fragment: &str) -> bool {
        if fragment.is_empty() {
            return false;
        }
        let mut inner = self.inner.write();
        match inner.current.as_mut() {
            Some(session) if session.id == id && !session.is_complete => {
                session.full_text.push_str(fragment);
                true
            }
            _ => false,
        }
    }

    /// Streaming -> Complete. Freezes the buffer.
    pub fn complete_session(&self, id: Uuid) -> bool {
        let mut inner = self.inner.write();
        let Some(session) = inner.current.as_mut().filter(|s| s.id == id && !s.is_complete)
        else {
            return false;
        };
        session.is_complete = true;
        info!(
            session = %id,
            provider = ?session.provider,
            chars = session.full_text.len(),
            "generation complete"
        );
        inner.previous = None;
        true
    }

    /// Abandon the streaming session `id`. The partial buffer is discarded and
    /// the last completed session, if any, becomes current again.
    pub fn fail_session(&self, id: Uuid, err: &GenerationError) -> bool {
        let mut inner = self.inner.write();
        let partial_chars = match &inner.current {
            Some(session) if session.id == id && !session.is_complete => session.full_text.len(),
            _ => return false,
        };
        warn!(
            session = %id,
            partial_chars,
            error = %err,
            "generation failed; discarding partial output"
        );
        inner.current = inner.previous.take();
        inner.last_error = Some(err.user_message());
        true
    }

    /// Validate and open a stream for `request`, then drive a new session from
    /// it on a background task. The returned receiver mirrors the provider's
    /// chunks after they have been applied to the session.
    pub async fn generate_streaming(
        &self,
        request: GenerationRequest,
        api_key: Option<String>,
    ) -> Result<(Uuid, ChunkReceiver), GenerationError> {
        let mut stream = match self.llm.open(&request, api_key.as_deref()).await {
            Ok(stream) => stream,
            Err(err) => {
                self.inner.write().last_error = Some(err.user_message());
                return Err(err);
            }
        };

        let id = self.start_session(request.provider.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        let state = self.clone();

        tokio::spawn(async move {
            while let Some(result) = stream.recv().await {
                match result {
                    Ok(chunk) if chunk.done => {
                        state.complete_session(id);
                        let _ = tx.send(Ok(chunk));
                        return;
                    }
                    Ok(chunk) => {
                        state.append_fragment(id, &chunk.delta);
                        let _ = tx.send(Ok(chunk));
                    }
                    Err(err) => {
                        state.fail_session(id, &err);
                        let _ = tx.send(Err(err));
                        return;
                    }
                }
            }
            let err = GenerationError::Transport("stream closed before completion".to_string());
            state.fail_session(id, &err);
            let _ = tx.send(Err(err));
        });

        Ok((id, rx))
    }

    /// Render the completed session as `format`. Always renders anew.
    pub fn export(&self, format: ExportFormat) -> Result<ExportArtifact, ExportError> {
        let session = self.completed_session().ok_or(ExportError::NotComplete)?;
        self.exporter
            .render(format, &session.full_text, &session.post_info())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChunkSender, GenerationProvider, StreamChunk};
    use async_trait::async_trait;

    enum Step {
        Fragment(&'static str),
        Fail(&'static str),
    }

    /// Plays a fixed script, then drops the sender without a done chunk unless
    /// `finish` is set.
    struct ScriptedProvider {
        steps: Vec<Step>,
        finish: bool,
    }

    #[async_trait]
    impl GenerationProvider for ScriptedProvider {
        async fn open_stream(
            &self,
            _request: &GenerationRequest,
            _api_key: &str,
        ) -> Result<ChunkReceiver, GenerationError> {
            let (tx, rx): (ChunkSender, ChunkReceiver) = mpsc::unbounded_channel();
            for step in &self.steps {
                match step {
                    Step::Fragment(text) => {
                        let _ = tx.send(Ok(StreamChunk::delta(*text)));
                    }
                    Step::Fail(message) => {
                        let _ = tx.send(Err(GenerationError::Transport(message.to_string())));
                    }
                }
            }
            if self.finish {
                let _ = tx.send(Ok(StreamChunk::done()));
            }
            Ok(rx)
        }
    }

    fn scripted_state(steps: Vec<Step>, finish: bool) -> AppState {
        let llm = LlmDriver::fake().with_provider(
            LlmProviderKind::OpenAi,
            Arc::new(ScriptedProvider { steps, finish }),
        );
        AppState::new(llm, Exporter::default())
    }

    async fn drain(mut rx: ChunkReceiver) -> Result<(), GenerationError> {
        while let Some(result) = rx.recv().await {
            if result?.done {
                return Ok(());
            }
        }
        Ok(())
    }

    async fn generate(
        state: &AppState,
        provider: LlmProviderKind,
        prompt: &str,
    ) -> Result<(), GenerationError> {
        let request = state.llm().request(provider, prompt, 1.0, 300);
        let (_, rx) = state
            .generate_streaming(request, Some("sk-test".to_string()))
            .await?;
        drain(rx).await
    }

    #[tokio::test]
    async fn mock_generation_runs_idle_streaming_complete() {
        let state = AppState::new(LlmDriver::fake(), Exporter::default());
        assert_eq!(state.phase(), SessionPhase::Idle);
        assert!(state.render_post().is_none());

        let request = state.llm().request(LlmProviderKind::Mock, "Cats", 1.0, 300);
        let (id, rx) = state.generate_streaming(request, None).await.expect("open");
        assert_eq!(state.phase(), SessionPhase::Streaming);
        drain(rx).await.expect("stream");

        assert_eq!(state.phase(), SessionPhase::Complete);
        let session = state.completed_session().expect("complete");
        assert_eq!(session.id, id);
        assert!(session.full_text.starts_with(">be me\n>cats\n"));
        assert_eq!(
            state.success_message().as_deref(),
            Some("Greentext generated successfully with Mock (offline)!")
        );
    }

    #[tokio::test]
    async fn complete_session_redisplays_identically() {
        let state = AppState::new(LlmDriver::fake(), Exporter::default());
        generate(&state, LlmProviderKind::Mock, "usb stick").await.expect("generate");

        let first = state.render_post().expect("post");
        let second = state.render_post().expect("post");
        assert_eq!(first, second);
        assert_eq!(first.to_string(), second.to_string());
        assert!(first.lines.iter().all(|line| line.starts_with('>')));
    }

    #[tokio::test]
    async fn new_generation_mints_new_header_and_clears_buffer() {
        let state = AppState::new(LlmDriver::fake(), Exporter::default());
        generate(&state, LlmProviderKind::Mock, "first").await.expect("generate");
        let first = state.completed_session().expect("first");

        let second_id = state.start_session(LlmProviderKind::Mock);
        let second = state.current_session().expect("second");
        assert_eq!(second.id, second_id);
        assert!(second.full_text.is_empty());
        assert_ne!(second.id, first.id);
        assert_eq!(state.phase(), SessionPhase::Streaming);
    }

    #[tokio::test]
    async fn mid_stream_failure_restores_previous_post() {
        let state = scripted_state(
            vec![Step::Fragment(">be me\n"), Step::Fail("connection reset")],
            false,
        );
        generate(&state, LlmProviderKind::Mock, "first")
            .await
            .expect("mock");
        let finished = state.completed_session().expect("complete");

        let err = generate(&state, LlmProviderKind::OpenAi, "second")
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Transport(_)));
        assert_eq!(state.phase(), SessionPhase::Complete);
        assert_eq!(state.completed_session(), Some(finished));
        assert_eq!(
            state.last_error().as_deref(),
            Some("Error while generating text: Transport error: connection reset")
        );
    }

    #[tokio::test]
    async fn failure_without_previous_post_returns_to_idle() {
        let state = scripted_state(vec![Step::Fragment(">be me\n")], false);
        let err = generate(&state, LlmProviderKind::OpenAi, "prompt")
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Transport(_)));
        assert_eq!(state.phase(), SessionPhase::Idle);
        assert!(state.render_post().is_none());
    }

    #[tokio::test]
    async fn scripted_stream_accumulates_fragments() {
        let state = scripted_state(
            vec![Step::Fragment(">be me"), Step::Fragment("\n>test streams\n")],
            true,
        );
        generate(&state, LlmProviderKind::OpenAi, "prompt").await.expect("generate");
        let session = state.completed_session().expect("complete");
        assert_eq!(session.full_text, ">be me\n>test streams\n");
        assert_eq!(session.provider, LlmProviderKind::OpenAi);
    }

    #[tokio::test]
    async fn preflight_error_keeps_existing_session() {
        let state = AppState::new(LlmDriver::fake(), Exporter::default());
        generate(&state, LlmProviderKind::Mock, "first").await.expect("generate");
        let before = state.completed_session();

        let request = state.llm().request(LlmProviderKind::Anthropic, "second", 1.0, 300);
        let err = state.generate_streaming(request, None).await.unwrap_err();
        assert!(err.is_preflight());
        assert_eq!(state.completed_session(), before);
        assert_eq!(
            state.last_error().as_deref(),
            Some("Please enter your Anthropic API key")
        );
    }

    #[test]
    fn stale_session_ids_are_ignored() {
        let state = AppState::new(LlmDriver::fake(), Exporter::default());
        let stale = state.start_session(LlmProviderKind::Mock);
        let live = state.start_session(LlmProviderKind::Mock);

        assert!(!state.append_fragment(stale, ">late"));
        assert!(!state.complete_session(stale));
        assert!(state.append_fragment(live, ">be me"));
        assert!(!state.append_fragment(live, ""));
        assert!(state.complete_session(live));
        assert!(!state.append_fragment(live, ">after"));
        assert_eq!(
            state.completed_session().map(|s| s.full_text).as_deref(),
            Some(">be me")
        );
    }

    #[test]
    fn export_requires_a_completed_session() {
        let state = AppState::new(LlmDriver::fake(), Exporter::default());
        assert!(matches!(
            state.export(ExportFormat::Text),
            Err(ExportError::NotComplete)
        ));

        let id = state.start_session(LlmProviderKind::Mock);
        state.append_fragment(id, ">be me\n>fail\n");
        assert!(matches!(
            state.export(ExportFormat::Text),
            Err(ExportError::NotComplete)
        ));

        state.complete_session(id);
        let artifact = state.export(ExportFormat::Text).expect("export");
        assert_eq!(artifact.bytes, b">be me\n>fail\n".to_vec());
        assert_eq!(artifact.file_name(), "greentext.txt");
    }
}

use crate::config::{save_ui_settings_to, UiSettings};
use crate::settings::SettingsPanel;
use crate::ui::{post_scroll_area, ExportBar, PostView, PromptBar, PromptBarState, ThemePalette};
use egui::{self, RichText};
use greentext_core::error::GenerationError;
use greentext_core::export::{ExportArtifact, ExportFormat};
use greentext_core::llm::ChunkReceiver;
use greentext_core::state::{AppState, SessionPhase};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type OpenResult = Result<(Uuid, ChunkReceiver), GenerationError>;

pub struct GreentextApp {
    state: AppState,
    runtime: Arc<Runtime>,
    settings: SettingsPanel,
    ui_settings: UiSettings,
    settings_path: Option<PathBuf>,
    palette: ThemePalette,
    prompt: PromptBarState,
    export_format: ExportFormat,
    opening: bool,
    stream: Option<ChunkReceiver>,
    tx: UnboundedSender<OpenResult>,
    rx: UnboundedReceiver<OpenResult>,
    export_notice: Option<String>,
    export_error: Option<String>,
    window_size_dirty: bool,
    visuals_applied: bool,
}

impl GreentextApp {
    pub fn new(
        state: AppState,
        runtime: Arc<Runtime>,
        settings: SettingsPanel,
        ui_settings: UiSettings,
    ) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            state,
            runtime,
            settings,
            export_format: ui_settings.export_format,
            ui_settings,
            settings_path: None,
            palette: ThemePalette::board(),
            prompt: PromptBarState::default(),
            opening: false,
            stream: None,
            tx,
            rx,
            export_notice: None,
            export_error: None,
            window_size_dirty: false,
            visuals_applied: false,
        }
    }

    /// Persist sidebar choices to `path` whenever they change.
    pub fn with_settings_path(mut self, path: PathBuf) -> Self {
        self.settings_path = Some(path);
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn prompt_mut(&mut self) -> &mut String {
        &mut self.prompt.draft
    }

    pub fn settings_mut(&mut self) -> &mut SettingsPanel {
        &mut self.settings
    }

    pub fn ui_settings(&self) -> &UiSettings {
        &self.ui_settings
    }

    /// Remember the viewport size. Returns true when it moved by more than a
    /// pixel; sub-pixel jitter is ignored.
    pub fn record_window_size(&mut self, size: [f32; 2]) -> bool {
        let [width, height] = self.ui_settings.window_size;
        if (width - size[0]).abs() <= 1.0 && (height - size[1]).abs() <= 1.0 {
            return false;
        }
        self.ui_settings.window_size = size;
        self.window_size_dirty = true;
        true
    }

    pub fn is_busy(&self) -> bool {
        self.opening || self.stream.is_some()
    }

    /// Kick off a generation with the current sidebar settings.
    pub fn generate(&mut self) {
        if self.is_busy() {
            return;
        }
        self.export_notice = None;
        self.export_error = None;
        let request = self.state.llm().request(
            self.settings.provider(),
            self.prompt.draft.clone(),
            self.settings.temperature(),
            self.settings.max_tokens(),
        );
        let api_key = self.settings.api_key();
        let state = self.state.clone();
        let tx = self.tx.clone();
        self.opening = true;
        self.runtime.spawn(async move {
            let result = state.generate_streaming(request, api_key).await;
            if tx.send(result).is_err() {
                warn!("UI has been dropped before the stream opened");
            }
        });
    }

    fn process_background_results(&mut self) {
        while let Ok(result) = self.rx.try_recv() {
            self.opening = false;
            match result {
                Ok((id, stream)) => {
                    debug!(session = %id, "stream opened");
                    self.stream = Some(stream);
                }
                Err(err) if err.is_preflight() => {
                    debug!(error = %err, "generation rejected before sending");
                }
                Err(err) => {
                    error!(error = %err, "failed to open generation stream");
                }
            }
        }

        let mut finished = false;
        if let Some(stream) = self.stream.as_mut() {
            loop {
                match stream.try_recv() {
                    Ok(Ok(chunk)) if chunk.done => {
                        finished = true;
                        break;
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => {
                        error!(error = %err, "generation stream failed");
                        finished = true;
                        break;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        finished = true;
                        break;
                    }
                }
            }
        }
        if finished {
            self.stream = None;
        }
    }

    fn download(&mut self) {
        self.export_notice = None;
        self.export_error = None;
        let artifact = match self.state.export(self.export_format) {
            Ok(artifact) => artifact,
            Err(err) => {
                error!(error = %err, format = ?self.export_format, "export failed");
                self.export_error = Some(err.to_string());
                return;
            }
        };
        let Some(path) = choose_destination(&artifact) else {
            return;
        };
        match artifact.write_to(&path) {
            Ok(()) => {
                info!(path = %path.display(), bytes = artifact.bytes.len(), "export written");
                self.export_notice = Some(format!("Saved {}", path.display()));
            }
            Err(err) => {
                error!(error = %err, path = %path.display(), "failed to write export");
                self.export_error = Some(err.to_string());
            }
        }
    }

    fn persist_settings(&mut self) {
        self.ui_settings.provider = self.settings.provider();
        self.ui_settings.temperature = self.settings.temperature();
        self.ui_settings.max_tokens = self.settings.max_tokens();
        self.ui_settings.export_format = self.export_format;
        self.ui_settings.last_key_name = self.settings.selected_key_name().map(str::to_string);
        self.window_size_dirty = false;
        let Some(path) = self.settings_path.clone() else {
            return;
        };
        let settings = self.ui_settings.clone();
        self.runtime.spawn(async move {
            if let Err(err) = save_ui_settings_to(&path, &settings).await {
                warn!(error = ?err, "failed to persist UI settings");
            }
        });
    }

    fn show_post_area(&mut self, ui: &mut egui::Ui) {
        let phase = self.state.phase();
        if self.is_busy() {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label(format!(
                    "Generating greentext with {}...",
                    self.settings.provider()
                ));
            });
        }
        if let Some(error) = self.state.last_error() {
            ui.colored_label(self.palette.warning, error);
        }

        if let Some(post) = self.state.render_post() {
            let palette = self.palette;
            post_scroll_area(ui, phase == SessionPhase::Streaming, |ui| {
                PostView::show(ui, &post, &palette);
            });
        }

        if phase != SessionPhase::Complete || self.is_busy() {
            return;
        }
        if let Some(message) = self.state.success_message() {
            ui.colored_label(self.palette.success, message);
        }
        ui.add_space(8.0);
        let output = ExportBar::show(ui, &mut self.export_format);
        if output.format_changed.is_some() {
            self.export_notice = None;
            self.export_error = None;
            self.persist_settings();
        }
        if output.download {
            self.download();
        }
        if let Some(notice) = &self.export_notice {
            ui.colored_label(self.palette.success, notice);
        }
        if let Some(error) = &self.export_error {
            ui.colored_label(self.palette.warning, format!("Export failed: {error}"));
        }
    }
}

fn choose_destination(artifact: &ExportArtifact) -> Option<PathBuf> {
    rfd::FileDialog::new()
        .set_file_name(artifact.file_name())
        .add_filter(artifact.format.label(), &[artifact.format.extension()])
        .save_file()
}

/// Draw one frame. Split from `eframe::App` so it can run against a bare
/// `egui::Context`.
pub fn render_ui(ctx: &egui::Context, app: &mut GreentextApp) {
    if !app.visuals_applied {
        ctx.set_visuals(app.palette.visuals());
        app.visuals_applied = true;
    }
    app.process_background_results();

    if let Some(rect) = ctx.input(|i| i.viewport().inner_rect) {
        app.record_window_size([rect.width(), rect.height()]);
    }
    // write once the resize drag has been released
    if app.window_size_dirty && !ctx.input(|i| i.pointer.any_down()) {
        app.persist_settings();
    }

    egui::TopBottomPanel::top("title").show(ctx, |ui| {
        ui.vertical_centered(|ui| {
            ui.heading(
                RichText::new("Greentext Generator")
                    .color(app.palette.title)
                    .strong(),
            );
            ui.label("Generate 4chan-style greentext stories using AI");
        });
    });

    egui::SidePanel::left("settings")
        .resizable(true)
        .default_width(280.0)
        .show(ctx, |ui| {
            let palette = app.palette;
            let response = app.settings.show(ui, &palette, app.state.llm());
            if response.any() {
                app.persist_settings();
            }
        });

    egui::CentralPanel::default().show(ctx, |ui| {
        let busy = app.is_busy();
        let output = PromptBar::show(ui, &mut app.prompt, &app.palette, busy);
        if output.generate {
            app.generate();
        }
        ui.add_space(10.0);
        app.show_post_area(ui);
    });

    if app.is_busy() {
        ctx.request_repaint();
    }
}

impl eframe::App for GreentextApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        render_ui(ctx, self);
    }
}

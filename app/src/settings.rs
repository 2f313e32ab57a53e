use crate::config::UiSettings;
use crate::ui::ThemePalette;
use egui::{self, Frame, Margin, RichText, Stroke};
use greentext_core::config::api_key_from_env;
use greentext_core::error::CredentialError;
use greentext_core::llm::{
    LlmDriver, LlmProviderKind, MAX_TOKENS_RANGE, MAX_TOKENS_STEP, TEMPERATURE_RANGE,
    TEMPERATURE_STEP,
};
use greentext_core::store::{CredentialStore, SavedKeys};
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Saved,
    New,
}

impl KeySource {
    fn label(self) -> &'static str {
        match self {
            KeySource::Saved => "Select a saved key",
            KeySource::New => "Enter a new key",
        }
    }
}

struct Feedback {
    message: String,
    success: bool,
    created: Instant,
}

impl Feedback {
    fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: true,
            created: Instant::now(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: false,
            created: Instant::now(),
        }
    }

    fn is_fresh(&self) -> bool {
        // failures stay until replaced
        !self.success || self.created.elapsed() < Duration::from_secs(6)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SettingsResponse {
    pub provider_changed: bool,
    pub parameters_changed: bool,
    pub key_changed: bool,
}

impl SettingsResponse {
    pub fn any(&self) -> bool {
        self.provider_changed || self.parameters_changed || self.key_changed
    }
}

/// Sidebar with provider, credential and sampling controls.
pub struct SettingsPanel {
    store: CredentialStore,
    saved: SavedKeys,
    provider: LlmProviderKind,
    key_source: KeySource,
    selected_key: Option<String>,
    entered_key: String,
    remember_key: bool,
    key_name: String,
    feedback: Option<Feedback>,
    temperature: f32,
    max_tokens: u32,
}

impl SettingsPanel {
    pub fn new(store: CredentialStore, settings: &UiSettings) -> Self {
        let mut panel = Self {
            store,
            saved: SavedKeys::default(),
            provider: settings.provider.clone(),
            key_source: KeySource::New,
            selected_key: settings.last_key_name.clone(),
            entered_key: String::new(),
            remember_key: false,
            key_name: String::new(),
            feedback: None,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        };
        panel.reload_keys();
        panel
    }

    pub fn provider(&self) -> LlmProviderKind {
        self.provider.clone()
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn key_source(&self) -> KeySource {
        self.key_source
    }

    pub fn selected_key_name(&self) -> Option<&str> {
        match self.key_source {
            KeySource::Saved => self.selected_key.as_deref(),
            KeySource::New => None,
        }
    }

    pub fn feedback(&self) -> Option<(&str, bool)> {
        self.feedback
            .as_ref()
            .filter(|feedback| feedback.is_fresh())
            .map(|feedback| (feedback.message.as_str(), feedback.success))
    }

    pub fn set_provider(&mut self, provider: LlmProviderKind) {
        if provider != self.provider {
            self.provider = provider;
            self.entered_key.clear();
            self.key_name.clear();
            self.remember_key = false;
            self.selected_key = None;
            self.reconcile_selection();
        }
    }

    pub fn set_entered_key(&mut self, key: impl Into<String>) {
        self.key_source = KeySource::New;
        self.entered_key = key.into();
    }

    pub fn select_saved_key(&mut self, name: &str) -> bool {
        if self.saved.get(&self.provider, name).is_none() {
            return false;
        }
        self.key_source = KeySource::Saved;
        self.selected_key = Some(name.to_string());
        true
    }

    /// Key for the next generation: the selected saved key, the key typed in,
    /// or the provider's environment variable.
    pub fn api_key(&self) -> Option<String> {
        let chosen = match self.key_source {
            KeySource::Saved => self
                .selected_key
                .as_deref()
                .and_then(|name| self.saved.get(&self.provider, name))
                .map(|stored| stored.record.key),
            KeySource::New => Some(self.entered_key.trim().to_string()),
        };
        chosen
            .filter(|key| !key.is_empty())
            .or_else(|| api_key_from_env(&self.provider))
    }

    /// Persist the typed key under `name` and switch to it.
    pub fn save_entered_key(&mut self, name: &str) -> Result<(), CredentialError> {
        match self.store.save(&self.provider, name, &self.entered_key) {
            Ok(stored) => {
                self.feedback = Some(Feedback::success(format!(
                    "Saved {} key as: {}",
                    stored.provider, stored.name
                )));
                self.reload_keys();
                self.key_source = KeySource::Saved;
                self.selected_key = Some(stored.name);
                self.entered_key.clear();
                self.key_name.clear();
                self.remember_key = false;
                Ok(())
            }
            Err(err) => {
                self.feedback = Some(Feedback::failure(format!("Error saving key: {err}")));
                Err(err)
            }
        }
    }

    pub fn delete_selected_key(&mut self) -> Result<bool, CredentialError> {
        let Some(name) = self.selected_key.clone() else {
            return Ok(false);
        };
        match self.store.delete(&self.provider, &name) {
            Ok(true) => {
                self.feedback = Some(Feedback::success(format!("Deleted key: {name}")));
                self.selected_key = None;
                self.reload_keys();
                Ok(true)
            }
            Ok(false) => {
                self.feedback = Some(Feedback::failure(format!("No saved key named {name}")));
                self.reload_keys();
                Ok(false)
            }
            Err(err) => {
                self.feedback = Some(Feedback::failure(format!("Error deleting key: {err}")));
                Err(err)
            }
        }
    }

    pub fn saved_names(&self) -> Vec<String> {
        self.saved.names(&self.provider)
    }

    fn reload_keys(&mut self) {
        self.saved = match self.store.try_load() {
            Ok(keys) => keys,
            Err(err) => {
                warn!(error = %err, path = %self.store.path().display(), "error loading saved keys");
                self.feedback = Some(Feedback::failure(format!(
                    "Error loading saved keys: {err}"
                )));
                SavedKeys::default()
            }
        };
        self.reconcile_selection();
    }

    fn reconcile_selection(&mut self) {
        let names = self.saved.names(&self.provider);
        if names.is_empty() {
            self.key_source = KeySource::New;
            self.selected_key = None;
            return;
        }
        let still_present = self
            .selected_key
            .as_ref()
            .is_some_and(|name| names.contains(name));
        if !still_present {
            self.selected_key = names.first().cloned();
        }
        if self.entered_key.trim().is_empty() {
            self.key_source = KeySource::Saved;
        }
    }

    pub fn show(
        &mut self,
        ui: &mut egui::Ui,
        palette: &ThemePalette,
        llm: &LlmDriver,
    ) -> SettingsResponse {
        let mut response = SettingsResponse::default();
        ui.heading("Settings");
        ui.add_space(8.0);

        ui.label(RichText::new("AI Provider").strong());
        let previous = self.provider.clone();
        let mut selection = previous.clone();
        for kind in LlmProviderKind::ALL {
            ui.radio_value(&mut selection, kind.clone(), kind.label());
        }
        if selection != previous {
            self.set_provider(selection);
            response.provider_changed = true;
        }

        ui.add_space(10.0);
        if self.provider.requires_api_key() {
            response.key_changed = self.credential_section(ui, palette);
        } else {
            ui.label(
                RichText::new("The mock provider runs offline and needs no key.")
                    .color(palette.text_secondary)
                    .small(),
            );
        }

        if let Some((message, success)) = self.feedback() {
            let color = if success {
                palette.success
            } else {
                palette.warning
            };
            ui.colored_label(color, message);
        }

        ui.add_space(16.0);
        ui.label(RichText::new("Generation Settings").strong());
        Frame::none()
            .fill(palette.surface)
            .stroke(Stroke::new(1.0, palette.post_border))
            .inner_margin(Margin::symmetric(8.0, 6.0))
            .show(ui, |ui| {
                ui.label(
                    RichText::new(format!("Using model {}", llm.model_for(&self.provider)))
                        .small(),
                );
            });
        ui.add_space(6.0);
        let temperature = egui::Slider::new(&mut self.temperature, TEMPERATURE_RANGE)
            .step_by(f64::from(TEMPERATURE_STEP))
            .text("Temperature");
        if ui
            .add(temperature)
            .on_hover_text("Higher values make output more random, lower values more deterministic")
            .changed()
        {
            response.parameters_changed = true;
        }
        let max_tokens = egui::Slider::new(&mut self.max_tokens, MAX_TOKENS_RANGE)
            .step_by(f64::from(MAX_TOKENS_STEP))
            .text("Max Length");
        if ui
            .add(max_tokens)
            .on_hover_text("Maximum length of the generated text")
            .changed()
        {
            response.parameters_changed = true;
        }
        response
    }

    fn credential_section(&mut self, ui: &mut egui::Ui, palette: &ThemePalette) -> bool {
        let mut changed = false;
        let names = self.saved_names();
        if !names.is_empty() {
            ui.label(RichText::new("API Key Options").strong());
            for source in [KeySource::Saved, KeySource::New] {
                if ui
                    .radio_value(&mut self.key_source, source, source.label())
                    .changed()
                {
                    changed = true;
                }
            }
        }

        let mut delete_requested = false;
        let mut save_requested = None;
        match self.key_source {
            KeySource::Saved => {
                let selected = self.selected_key.clone().unwrap_or_default();
                egui::ComboBox::from_id_source("saved_key")
                    .selected_text(selected.as_str())
                    .show_ui(ui, |ui| {
                        for name in &names {
                            if ui
                                .selectable_label(selected == *name, name.as_str())
                                .clicked()
                            {
                                self.selected_key = Some(name.clone());
                                changed = true;
                            }
                        }
                    });
                if let Some(stored) = self
                    .selected_key
                    .as_deref()
                    .and_then(|name| self.saved.get(&self.provider, name))
                {
                    ui.colored_label(
                        palette.success,
                        format!("Using saved key: {}", stored.name),
                    );
                    ui.label(
                        RichText::new(format!("{} · {}", stored.record.masked(), stored.record.hash))
                            .monospace()
                            .small()
                            .color(palette.text_secondary),
                    );
                }
                if ui.button("Delete this saved key").clicked() {
                    delete_requested = true;
                }
            }
            KeySource::New => {
                ui.label(format!("{} API Key", self.provider));
                if ui
                    .add(egui::TextEdit::singleline(&mut self.entered_key).password(true))
                    .changed()
                {
                    changed = true;
                }
                if !self.entered_key.trim().is_empty() {
                    ui.checkbox(&mut self.remember_key, "Save this key for future use");
                    if self.remember_key {
                        ui.horizontal(|ui| {
                            ui.add(
                                egui::TextEdit::singleline(&mut self.key_name)
                                    .hint_text(format!("e.g., My {} Key", self.provider)),
                            );
                            if ui
                                .add_enabled(
                                    !self.key_name.trim().is_empty(),
                                    egui::Button::new("Save Key"),
                                )
                                .clicked()
                            {
                                save_requested = Some(self.key_name.clone());
                            }
                        });
                    }
                }
            }
        }
        ui.label(
            RichText::new(format!(
                "Your {} API key is only sent to the provider's API",
                self.provider
            ))
            .small()
            .color(palette.text_secondary),
        );

        if delete_requested && self.delete_selected_key().is_ok() {
            changed = true;
        }
        if let Some(name) = save_requested {
            if self.save_entered_key(&name).is_ok() {
                changed = true;
            }
        }
        changed
    }
}

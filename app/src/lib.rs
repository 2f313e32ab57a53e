pub mod app;
pub mod config;
pub mod settings;
pub mod ui;

pub use app::{render_ui, GreentextApp};
pub use config::{load_ui_settings, save_ui_settings, ui_settings_path, UiSettings};
pub use settings::{KeySource, SettingsPanel};

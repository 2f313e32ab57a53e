use egui::{self, Align, Color32, Frame, Layout, Margin, RichText, ScrollArea};
use greentext_core::export::ExportFormat;
use greentext_core::format::RenderedPost;

/// Imageboard colours used throughout the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThemePalette {
    pub background: Color32,
    pub surface: Color32,
    pub post_background: Color32,
    pub post_border: Color32,
    pub header: Color32,
    pub post_number: Color32,
    pub greentext: Color32,
    pub title: Color32,
    pub text_primary: Color32,
    pub text_secondary: Color32,
    pub warning: Color32,
    pub success: Color32,
}

impl ThemePalette {
    pub fn board() -> Self {
        Self {
            background: color_from_hex("#EEF2FF"),
            surface: color_from_hex("#F0F0F0"),
            post_background: color_from_hex("#F0E0D6"),
            post_border: color_from_hex("#D9BFB7"),
            header: color_from_hex("#117743"),
            post_number: color_from_hex("#800000"),
            greentext: color_from_hex("#789922"),
            title: color_from_hex("#800000"),
            text_primary: color_from_hex("#000000"),
            text_secondary: color_from_hex("#5F5F5F"),
            warning: color_from_hex("#B02020"),
            success: color_from_hex("#2E7D32"),
        }
    }

    pub fn visuals(&self) -> egui::Visuals {
        let mut visuals = egui::Visuals::light();
        visuals.window_fill = self.surface;
        visuals.panel_fill = self.background;
        visuals.extreme_bg_color = self.surface;
        visuals.widgets.noninteractive.bg_fill = self.surface;
        visuals.widgets.noninteractive.fg_stroke.color = self.text_primary;
        visuals.widgets.inactive.weak_bg_fill = self.post_background;
        visuals.widgets.inactive.bg_stroke = egui::Stroke::new(1.0, self.post_border);
        visuals.widgets.inactive.fg_stroke.color = self.header;
        visuals.widgets.hovered.weak_bg_fill = color_from_hex("#EAD6CA");
        visuals.widgets.active.fg_stroke.color = self.text_primary;
        visuals.dark_mode = false;
        visuals
    }
}

pub fn color_from_hex(hex: &str) -> Color32 {
    let trimmed = hex.trim_start_matches('#');
    if trimmed.len() == 6 {
        if let Ok(value) = u32::from_str_radix(trimmed, 16) {
            let r = ((value >> 16) & 0xFF) as u8;
            let g = ((value >> 8) & 0xFF) as u8;
            let b = (value & 0xFF) as u8;
            return Color32::from_rgb(r, g, b);
        }
    }
    Color32::WHITE
}

/// Board-style post: green header, maroon post number, greentext body.
pub struct PostView;

impl PostView {
    pub fn show(ui: &mut egui::Ui, post: &RenderedPost, palette: &ThemePalette) {
        Frame::none()
            .fill(palette.post_background)
            .stroke(egui::Stroke::new(1.0, palette.post_border))
            .inner_margin(Margin::same(10.0))
            .show(ui, |ui| {
                ui.set_width(ui.available_width());
                ui.horizontal(|ui| {
                    ui.label(
                        RichText::new(format!("Anonymous {}", post.header.timestamp))
                            .color(palette.header)
                            .strong(),
                    );
                    ui.label(RichText::new(&post.header.post_id).color(palette.post_number));
                });
                ui.add_space(5.0);
                ui.spacing_mut().item_spacing.y = 1.0;
                for line in &post.lines {
                    ui.label(RichText::new(line).monospace().color(palette.greentext));
                }
            });
    }
}

#[derive(Debug, Clone, Default)]
pub struct PromptBarState {
    pub draft: String,
}

#[derive(Default)]
pub struct PromptBarOutput {
    pub generate: bool,
}

pub struct PromptBar;

impl PromptBar {
    pub fn show(
        ui: &mut egui::Ui,
        state: &mut PromptBarState,
        palette: &ThemePalette,
        busy: bool,
    ) -> PromptBarOutput {
        let mut output = PromptBarOutput::default();
        ui.label(RichText::new("Enter your greentext prompt:").strong());
        Frame::none()
            .fill(palette.surface)
            .rounding(5.0)
            .stroke(egui::Stroke::new(1.0, palette.post_border))
            .inner_margin(Margin::symmetric(10.0, 8.0))
            .show(ui, |ui| {
                let textarea = egui::TextEdit::multiline(&mut state.draft)
                    .desired_rows(5)
                    .desired_width(f32::INFINITY)
                    .hint_text("e.g., Be an anon who finds a mysterious USB drive")
                    .frame(false);
                let response = ui.add(textarea);
                let shortcut =
                    ui.input(|i| i.key_pressed(egui::Key::Enter) && i.modifiers.command);
                if shortcut && response.has_focus() && !busy {
                    output.generate = true;
                }
            });
        ui.add_space(6.0);
        let label = if busy {
            "Generating…"
        } else {
            "Generate Greentext"
        };
        let button = egui::Button::new(RichText::new(label).strong().color(palette.header))
            .min_size(egui::vec2(ui.available_width(), 32.0));
        if ui.add_enabled(!busy, button).clicked() {
            output.generate = true;
        }
        output
    }
}

#[derive(Default)]
pub struct ExportBarOutput {
    pub format_changed: Option<ExportFormat>,
    pub download: bool,
}

/// Format selector plus download button for a completed post.
pub struct ExportBar;

impl ExportBar {
    pub fn show(ui: &mut egui::Ui, selected: &mut ExportFormat) -> ExportBarOutput {
        let mut output = ExportBarOutput::default();
        ui.heading("Download Options");
        ui.horizontal(|ui| {
            ui.label("Choose download format:");
            let previous = *selected;
            egui::ComboBox::from_id_source("export_format")
                .selected_text(selected.label())
                .show_ui(ui, |ui| {
                    for format in ExportFormat::ALL {
                        ui.selectable_value(selected, format, format.label());
                    }
                });
            if *selected != previous {
                output.format_changed = Some(*selected);
            }
            ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                if ui.button(selected.download_label()).clicked() {
                    output.download = true;
                }
            });
        });
        output
    }
}

/// Scrollable area for the post; sticks to the bottom while text streams in.
pub fn post_scroll_area(
    ui: &mut egui::Ui,
    streaming: bool,
    add_contents: impl FnOnce(&mut egui::Ui),
) {
    let max_height = (ui.available_height() - 140.0).max(120.0);
    ScrollArea::vertical()
        .id_source("post_scroll")
        .auto_shrink([false, true])
        .max_height(max_height)
        .stick_to_bottom(streaming)
        .show(ui, add_contents);
}

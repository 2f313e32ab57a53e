use crate::config::ExportSettings;
use crate::error::ExportError;
use ab_glyph::FontVec;
use epaint::text::FontDefinitions;
use std::path::Path;

const BUNDLED_MONO: &str = "Hack";
const BUNDLED_HEADER: &str = "Ubuntu-Light";

/// Fonts used by the image exporter: a monospace face for the greentext lines
/// and a proportional face for the post header.
pub struct ExportFonts {
    pub mono: FontVec,
    pub header: FontVec,
}

impl ExportFonts {
    /// Load configured font files, falling back to the fonts bundled with egui.
    pub fn load(settings: &ExportSettings) -> Result<Self, ExportError> {
        let definitions = FontDefinitions::default();
        let mono = match &settings.mono_font {
            Some(path) => from_file(path)?,
            None => bundled(&definitions, BUNDLED_MONO)?,
        };
        let header = match &settings.header_font {
            Some(path) => from_file(path)?,
            None => bundled(&definitions, BUNDLED_HEADER)?,
        };
        Ok(Self { mono, header })
    }

    pub fn bundled() -> Result<Self, ExportError> {
        Self::load(&ExportSettings::default())
    }
}

fn from_file(path: &Path) -> Result<FontVec, ExportError> {
    let bytes = std::fs::read(path)
        .map_err(|err| ExportError::Font(format!("{}: {err}", path.display())))?;
    FontVec::try_from_vec(bytes)
        .map_err(|err| ExportError::Font(format!("{}: {err}", path.display())))
}

fn bundled(definitions: &FontDefinitions, name: &str) -> Result<FontVec, ExportError> {
    let data = definitions
        .font_data
        .get(name)
        .ok_or_else(|| ExportError::Font(format!("bundled font {name} is missing")))?;
    FontVec::try_from_vec_and_index(data.font.to_vec(), data.index)
        .map_err(|err| ExportError::Font(format!("bundled font {name}: {err}")))
}

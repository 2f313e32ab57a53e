//! Conversions of a finished greentext into downloadable files.
//!
//! Every converter takes the raw generated text plus the post header line and
//! produces a fresh byte buffer. Nothing is cached: selecting a format again
//! renders again.

mod fonts;
mod pdf;
mod png;
mod text;

pub use self::fonts::ExportFonts;
pub use self::pdf::to_pdf;
pub use self::png::{canvas_height, to_png};
pub use self::text::to_text;

use crate::config::ExportSettings;
use crate::error::ExportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Text,
    Image,
    Pdf,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 3] = [ExportFormat::Text, ExportFormat::Image, ExportFormat::Pdf];

    pub fn label(self) -> &'static str {
        match self {
            Self::Text => "Text (.txt)",
            Self::Image => "Image (.png)",
            Self::Pdf => "PDF (.pdf)",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Self::Text => "greentext.txt",
            Self::Image => "greentext.png",
            Self::Pdf => "greentext.pdf",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Text => "text/plain",
            Self::Image => "image/png",
            Self::Pdf => "application/pdf",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Image => "png",
            Self::Pdf => "pdf",
        }
    }

    pub fn download_label(self) -> &'static str {
        match self {
            Self::Text => "Download as Text File",
            Self::Image => "Download as Image",
            Self::Pdf => "Download as PDF",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "txt" | "text" => Ok(Self::Text),
            "png" | "image" => Ok(Self::Image),
            "pdf" => Ok(Self::Pdf),
            other => Err(format!("unknown export format `{other}` (expected txt, png or pdf)")),
        }
    }
}

/// Rendered file contents plus the metadata needed to offer it for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub format: ExportFormat,
    pub bytes: Vec<u8>,
}

impl ExportArtifact {
    pub fn mime(&self) -> &'static str {
        self.format.mime()
    }

    pub fn file_name(&self) -> &'static str {
        self.format.file_name()
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ExportError> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }
}

/// Dispatches to the converter for a format.
#[derive(Debug, Clone, Default)]
pub struct Exporter {
    settings: ExportSettings,
}

impl Exporter {
    pub fn new(settings: ExportSettings) -> Self {
        Self { settings }
    }

    pub fn render(
        &self,
        format: ExportFormat,
        full_text: &str,
        post_info: &str,
    ) -> Result<ExportArtifact, ExportError> {
        let bytes = match format {
            ExportFormat::Text => to_text(full_text),
            ExportFormat::Image => {
                let fonts = ExportFonts::load(&self.settings)?;
                to_png(full_text, post_info, &fonts)?
            }
            ExportFormat::Pdf => to_pdf(full_text, post_info)?,
        };
        debug!(format = ?format, bytes = bytes.len(), "rendered export");
        Ok(ExportArtifact { format, bytes })
    }
}

//! Output formats and their artifact extensions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Artifact format requested by the host's rendering medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Scalable vector image (`.svg`), used for HTML output.
    Vector,
    /// Raster image (`.png`), the fallback for every other builder.
    #[default]
    Raster,
    /// Document (`.pdf`), used for PDF output.
    Document,
}

impl OutputFormat {
    /// All formats, in declaration order.
    pub const ALL: [OutputFormat; 3] = [
        OutputFormat::Vector,
        OutputFormat::Raster,
        OutputFormat::Document,
    ];

    /// File extension of the compiled artifact, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Vector => "svg",
            OutputFormat::Raster => "png",
            OutputFormat::Document => "pdf",
        }
    }

    /// Maps a host builder format name onto an artifact format.
    ///
    /// `html` renders vector images and `pdf` embeds PDFs. Anything else,
    /// including unknown builders, falls back to raster.
    pub fn from_builder_format(builder: &str) -> Self {
        match builder {
            "html" => OutputFormat::Vector,
            "pdf" => OutputFormat::Document,
            _ => OutputFormat::Raster,
        }
    }

    /// Returns the format whose extension matches `ext`, if any.
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.extension() == ext)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Error returned when parsing an unknown format name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown output format '{0}' (expected svg, png or pdf)")]
pub struct ParseFormatError(String);

impl FromStr for OutputFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "svg" | "vector" => Ok(OutputFormat::Vector),
            "png" | "raster" => Ok(OutputFormat::Raster),
            "pdf" | "document" => Ok(OutputFormat::Document),
            _ => Err(ParseFormatError(s.to_string())),
        }
    }
}

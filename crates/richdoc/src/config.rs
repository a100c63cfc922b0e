//! Export configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ecow::EcoString;
use serde::{Deserialize, Serialize};

use crate::error::ResultExt;

/// The configuration of one export.
///
/// Every field has a default, so an empty TOML file is a valid
/// configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportConfig {
    /// The document default font family.
    pub default_font: EcoString,
    /// The document default font size, in points.
    pub default_font_size: f32,
    /// The font family of code marks and code blocks.
    pub monospace_font: EcoString,
    /// The total width of a table without explicit column widths, in twips.
    pub table_width: u32,
    /// The widest an image may be placed, in pixels.
    pub max_image_width: u32,
    /// The number of leading header rows of tables that do not say.
    pub header_rows: u32,
    /// The number of leading header columns of tables that do not say.
    pub header_columns: u32,
    /// The time limit of a single image fetch, in milliseconds.
    pub image_timeout_ms: Option<u64>,
    /// Font files to embed into the package.
    pub embedded_fonts: Vec<FontSource>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_font: "Calibri".into(),
            default_font_size: 11.0,
            monospace_font: "Courier New".into(),
            table_width: 9000,
            max_image_width: 600,
            header_rows: 0,
            header_columns: 0,
            image_timeout_ms: None,
            embedded_fonts: Vec::new(),
        }
    }
}

impl ExportConfig {
    /// Parses a configuration from TOML.
    pub fn from_toml(source: &str) -> crate::Result<Self> {
        toml::from_str(source).context("invalid configuration")
    }

    /// Loads a configuration from a TOML file.
    ///
    /// Relative font paths are resolved against the directory of the file.
    pub async fn load(path: &Path) -> crate::Result<Self> {
        let source = tokio::fs::read_to_string(path)
            .await
            .context("cannot read configuration")?;
        let mut config = Self::from_toml(&source)?;
        if let Some(base) = path.parent() {
            for font in &mut config.embedded_fonts {
                font.rebase(base);
            }
        }
        Ok(config)
    }

    /// The time limit of a single image fetch.
    pub fn image_timeout(&self) -> Option<Duration> {
        self.image_timeout_ms.map(Duration::from_millis)
    }
}

/// A font family whose files are embedded into the package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FontSource {
    /// The family name, as referenced by runs.
    pub family: EcoString,
    /// The regular face.
    pub regular: Option<PathBuf>,
    /// The bold face.
    pub bold: Option<PathBuf>,
    /// The italic face.
    pub italic: Option<PathBuf>,
    /// The bold italic face.
    pub bold_italic: Option<PathBuf>,
}

impl FontSource {
    /// The faces of the family that have a file, in the order the package
    /// lists them.
    pub fn faces(&self) -> impl Iterator<Item = (FontFace, &Path)> {
        [
            (FontFace::Regular, &self.regular),
            (FontFace::Bold, &self.bold),
            (FontFace::Italic, &self.italic),
            (FontFace::BoldItalic, &self.bold_italic),
        ]
        .into_iter()
        .filter_map(|(face, path)| Some((face, path.as_deref()?)))
    }

    fn rebase(&mut self, base: &Path) {
        for path in [
            &mut self.regular,
            &mut self.bold,
            &mut self.italic,
            &mut self.bold_italic,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// A face of an embedded font family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFace {
    /// Upright, normal weight.
    Regular,
    /// Upright, bold weight.
    Bold,
    /// Italic, normal weight.
    Italic,
    /// Italic, bold weight.
    BoldItalic,
}

impl FontFace {
    /// The font table element that references this face.
    pub fn element(self) -> &'static str {
        match self {
            Self::Regular => "w:embedRegular",
            Self::Bold => "w:embedBold",
            Self::Italic => "w:embedItalic",
            Self::BoldItalic => "w:embedBoldItalic",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(ExportConfig::from_toml("").unwrap(), ExportConfig::default());
    }

    #[test]
    fn reads_camel_case_keys() {
        let config = ExportConfig::from_toml(
            r#"
            defaultFont = "Noto Serif"
            tableWidth = 8000
            imageTimeoutMs = 1500

            [[embeddedFonts]]
            family = "Vazirmatn"
            regular = "fonts/Vazirmatn-Regular.ttf"
            boldItalic = "fonts/Vazirmatn-BoldItalic.ttf"
            "#,
        )
        .unwrap();
        assert_eq!(config.default_font, "Noto Serif");
        assert_eq!(config.table_width, 8000);
        assert_eq!(config.max_image_width, 600);
        assert_eq!(config.image_timeout(), Some(Duration::from_millis(1500)));

        let faces: Vec<_> = config.embedded_fonts[0].faces().map(|(f, _)| f).collect();
        assert_eq!(faces, [FontFace::Regular, FontFace::BoldItalic]);
    }

    #[tokio::test]
    async fn load_rebases_font_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("richdoc.toml");
        tokio::fs::write(&path, "[[embeddedFonts]]\nfamily = \"X\"\nregular = \"x.ttf\"\n")
            .await
            .unwrap();

        let config = ExportConfig::load(&path).await.unwrap();
        assert_eq!(
            config.embedded_fonts[0].regular.as_deref(),
            Some(dir.path().join("x.ttf").as_path())
        );
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let err = ExportConfig::from_toml("tableWidth = \"wide\"").unwrap_err();
        assert!(err.to_string().starts_with("invalid configuration"));
    }
}

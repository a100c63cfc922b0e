//! Document style management for DOCX export

use docx_rs::*;

use crate::config::ExportConfig;

/// The style of a body paragraph in a quotation.
pub const BLOCKQUOTE: &str = "Blockquote";
/// The style of a code block paragraph.
pub const CODE_BLOCK: &str = "CodeBlock";
/// The character style of hyperlinks.
pub const HYPERLINK: &str = "Hyperlink";
/// The table style.
pub const TABLE: &str = "Table";

/// The style id of a heading level.
pub fn heading(level: u8) -> &'static str {
    match level {
        1 => "Heading1",
        2 => "Heading2",
        3 => "Heading3",
        4 => "Heading4",
        5 => "Heading5",
        _ => "Heading6",
    }
}

/// A run font set with every script slot naming the same family.
pub fn run_fonts(family: &str) -> RunFonts {
    RunFonts::new()
        .ascii(family)
        .hi_ansi(family)
        .east_asia(family)
        .cs(family)
}

/// Points to the half-points the package measures font sizes in.
pub fn half_points(pt: f32) -> usize {
    (pt * 2.0).round().max(1.0) as usize
}

/// Document style management
#[derive(Clone, Debug)]
pub struct DocxStyles {
    default_font: String,
    default_size: usize,
    monospace_font: String,
}

impl DocxStyles {
    /// Create a new style manager
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            default_font: config.default_font.to_string(),
            default_size: half_points(config.default_font_size),
            monospace_font: config.monospace_font.to_string(),
        }
    }

    /// Create a heading style with the specified parameters
    fn create_heading_style(level: u8, size: usize) -> Style {
        Style::new(heading(level), StyleType::Paragraph)
            .name(format!("Heading {level}"))
            .size(size)
            .bold()
    }

    /// Initialize all document styles
    pub fn initialize_styles(&self, docx: Docx) -> Docx {
        let docx = docx
            .default_fonts(run_fonts(&self.default_font))
            .default_size(self.default_size);

        let code_block = Style::new(CODE_BLOCK, StyleType::Paragraph)
            .name("Code Block")
            .fonts(run_fonts(&self.monospace_font))
            .size(18);

        let hyperlink = Style::new(HYPERLINK, StyleType::Character)
            .name("Hyperlink")
            .color("0000FF")
            .underline("single");

        let blockquote = Style::new(BLOCKQUOTE, StyleType::Paragraph)
            .name("Block Quote")
            .indent(Some(720), None, None, None)
            .italic();

        let table = Style::new(TABLE, StyleType::Table)
            .name("Table")
            .table_align(TableAlignmentType::Center);

        [32, 28, 26, 24, 22, 20]
            .into_iter()
            .zip(1..)
            .fold(docx, |docx, (size, level)| {
                docx.add_style(Self::create_heading_style(level, size))
            })
            .add_style(code_block)
            .add_style(hyperlink)
            .add_style(blockquote)
            .add_style(table)
    }
}

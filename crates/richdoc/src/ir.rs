//! Compiled blocks: the flat output of the block compiler, consumed by the
//! package assembler.

use std::fmt::{self, Write};

use bytes::Bytes;
use ecow::EcoString;

/// Paragraph alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// Flush left.
    Left,
    /// Centered.
    Center,
    /// Flush right.
    Right,
    /// Justified.
    Justify,
    /// The leading edge of the writing direction.
    Start,
    /// The trailing edge of the writing direction.
    End,
}

impl Alignment {
    /// Parses an alignment attribute value.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "left" => Some(Self::Left),
            "center" | "centre" => Some(Self::Center),
            "right" => Some(Self::Right),
            "justify" | "justified" | "both" => Some(Self::Justify),
            "start" => Some(Self::Start),
            "end" => Some(Self::End),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
            Self::Justify => "justify",
            Self::Start => "start",
            Self::End => "end",
        }
    }
}

/// A highlight behind a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Highlight {
    /// One of the package format's named highlight colors.
    Named(&'static str),
    /// A solid background shading, as 6 uppercase hex digits.
    Shading(String),
}

/// Run-level formatting properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunFormat {
    /// Bold weight.
    pub bold: bool,
    /// Italic style.
    pub italic: bool,
    /// Single underline.
    pub underline: bool,
    /// Single strike-through.
    pub strike: bool,
    /// Lowered script position.
    pub subscript: bool,
    /// Raised script position.
    pub superscript: bool,
    /// Set in the monospace font.
    pub monospace: bool,
    /// Foreground color, as 6 uppercase hex digits.
    pub color: Option<String>,
    /// Highlight or background shading.
    pub highlight: Option<Highlight>,
    /// Font family.
    pub font: Option<EcoString>,
    /// Font size in points.
    pub size_pt: Option<f32>,
    /// Right-to-left run.
    pub rtl: bool,
}

/// A styled piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    /// The text.
    pub text: EcoString,
    /// The resolved formatting.
    pub format: RunFormat,
}

impl TextRun {
    /// Creates a run of unformatted text.
    pub fn plain(text: impl Into<EcoString>) -> Self {
        Self {
            text: text.into(),
            format: RunFormat::default(),
        }
    }
}

/// The raster formats the package stores verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// Portable Network Graphics.
    Png,
    /// JPEG.
    Jpeg,
    /// Graphics Interchange Format.
    Gif,
    /// Windows bitmap.
    Bmp,
}

/// An image placed into a paragraph.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRun {
    /// The encoded image.
    pub data: Bytes,
    /// The encoding of `data`.
    pub kind: ImageKind,
    /// Display width in pixels.
    pub width: u32,
    /// Display height in pixels.
    pub height: u32,
    /// Alternative text.
    pub alt: Option<EcoString>,
}

/// An inline unit of a paragraph.
#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    /// A styled run.
    Text(TextRun),
    /// A hyperlink wrapping a styled run.
    Link {
        /// The link target.
        target: EcoString,
        /// The linked run.
        run: TextRun,
    },
    /// A forced line break.
    LineBreak(RunFormat),
    /// The checkbox of a task item.
    Checkbox {
        /// Whether the item is checked.
        checked: bool,
    },
    /// An image.
    Image(ImageRun),
}

/// The list a paragraph belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMarker {
    /// A bullet of an unordered list instance.
    Bullet {
        /// The list instance, starting at 1.
        instance: u32,
        /// The nesting level, starting at 0.
        level: u32,
    },
    /// A number of an ordered list instance.
    Numbered {
        /// The list instance, starting at 1.
        instance: u32,
        /// The nesting level, starting at 0.
        level: u32,
    },
    /// A task item, indented but not numbered.
    Task {
        /// The nesting level, starting at 0.
        level: u32,
    },
}

/// What a paragraph is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParagraphKind {
    /// Body text.
    Body,
    /// A heading of level 1 to 6.
    Heading(u8),
    /// A block quotation paragraph.
    Quote,
    /// A code block.
    Code,
    /// A thematic break.
    ThematicBreak,
    /// A page break.
    PageBreak,
    /// A standalone image.
    Image,
}

/// A paragraph-like block.
#[derive(Debug, Clone, PartialEq)]
pub struct Paragraph {
    /// What the paragraph is.
    pub kind: ParagraphKind,
    /// The inline content.
    pub inlines: Vec<Inline>,
    /// The alignment, if any was resolved.
    pub align: Option<Alignment>,
    /// Whether the paragraph is laid out right to left.
    pub bidi: bool,
    /// The list the paragraph belongs to.
    pub list: Option<ListMarker>,
}

impl Paragraph {
    /// Creates a paragraph of the given kind.
    pub fn new(kind: ParagraphKind, inlines: Vec<Inline>) -> Self {
        Self {
            kind,
            inlines,
            align: None,
            bidi: false,
            list: None,
        }
    }

    /// Creates an empty body paragraph holding one empty run.
    pub fn empty() -> Self {
        Self::new(ParagraphKind::Body, vec![Inline::Text(TextRun::plain(""))])
    }
}

/// A cell of a compiled table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableCell {
    /// The content of the cell, never empty.
    pub blocks: Vec<Block>,
    /// The number of grid columns spanned, when more than one.
    pub col_span: Option<u32>,
    /// The number of rows spanned, when more than one.
    pub row_span: Option<u32>,
    /// Whether the cell is a header cell.
    pub header: bool,
}

/// A row of a compiled table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    /// The cells in logical order.
    pub cells: Vec<TableCell>,
    /// Whether the row repeats as a header row.
    pub header: bool,
}

/// A table-like block.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Width of every grid column, in twips.
    pub column_widths: Vec<u32>,
    /// The rows.
    pub rows: Vec<TableRow>,
    /// Whether columns are laid out right to left.
    pub rtl: bool,
}

/// A top-level output unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// A paragraph-like block.
    Paragraph(Paragraph),
    /// A table-like block.
    Table(Table),
}

impl Block {
    /// The table, if this block is one.
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Self::Table(t) => Some(t),
            Self::Paragraph(_) => None,
        }
    }
}

/// Renders a block sequence as an indented plain-text outline.
pub fn outline(blocks: &[Block]) -> String {
    let mut out = String::new();
    // Writing into a string cannot fail.
    let _ = write_blocks(&mut out, blocks, 0);
    out
}

fn write_blocks(out: &mut String, blocks: &[Block], depth: usize) -> fmt::Result {
    for block in blocks {
        match block {
            Block::Paragraph(p) => write_paragraph(out, p, depth)?,
            Block::Table(t) => write_table(out, t, depth)?,
        }
    }
    Ok(())
}

fn write_paragraph(out: &mut String, p: &Paragraph, depth: usize) -> fmt::Result {
    write!(out, "{:indent$}", "", indent = depth * 2)?;
    match p.kind {
        ParagraphKind::Body => write!(out, "p")?,
        ParagraphKind::Heading(level) => write!(out, "h{level}")?,
        ParagraphKind::Quote => write!(out, "quote")?,
        ParagraphKind::Code => write!(out, "code")?,
        ParagraphKind::ThematicBreak => write!(out, "hr")?,
        ParagraphKind::PageBreak => write!(out, "page-break")?,
        ParagraphKind::Image => write!(out, "image")?,
    }
    if let Some(align) = p.align {
        write!(out, " align={}", align.name())?;
    }
    if p.bidi {
        write!(out, " bidi")?;
    }
    match p.list {
        Some(ListMarker::Bullet { instance, level }) => write!(out, " bullet={instance}@{level}")?,
        Some(ListMarker::Numbered { instance, level }) => write!(out, " num={instance}@{level}")?,
        Some(ListMarker::Task { level }) => write!(out, " task@{level}")?,
        None => {}
    }
    for inline in &p.inlines {
        write!(out, " ")?;
        match inline {
            Inline::Text(run) => write_run(out, run)?,
            Inline::Link { target, run } => {
                write!(out, "<{target}>")?;
                write_run(out, run)?;
            }
            Inline::LineBreak(_) => write!(out, "⏎")?,
            Inline::Checkbox { checked } => {
                write!(out, "{}", if *checked { "[x]" } else { "[ ]" })?
            }
            Inline::Image(img) => write!(out, "[img {}x{}]", img.width, img.height)?,
        }
    }
    writeln!(out)
}

fn write_run(out: &mut String, run: &TextRun) -> fmt::Result {
    write!(out, "{:?}", run.text.as_str())?;
    let f = &run.format;
    let flags = [
        (f.bold, "b"),
        (f.italic, "i"),
        (f.underline, "u"),
        (f.strike, "s"),
        (f.subscript, "sub"),
        (f.superscript, "sup"),
        (f.monospace, "mono"),
        (f.rtl, "rtl"),
    ];
    let mut props: Vec<String> = flags
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, name)| name.to_string())
        .collect();
    if let Some(color) = &f.color {
        props.push(format!("color={color}"));
    }
    match &f.highlight {
        Some(Highlight::Named(name)) => props.push(format!("hl={name}")),
        Some(Highlight::Shading(hex)) => props.push(format!("shd={hex}")),
        None => {}
    }
    if let Some(font) = &f.font {
        props.push(format!("font={font}"));
    }
    if let Some(size) = f.size_pt {
        props.push(format!("{size}pt"));
    }
    if !props.is_empty() {
        write!(out, "{{{}}}", props.join(","))?;
    }
    Ok(())
}

fn write_table(out: &mut String, t: &Table, depth: usize) -> fmt::Result {
    write!(out, "{:indent$}table", "", indent = depth * 2)?;
    let widths: Vec<String> = t.column_widths.iter().map(u32::to_string).collect();
    write!(out, " cols=[{}]", widths.join(","))?;
    if t.rtl {
        write!(out, " rtl")?;
    }
    writeln!(out)?;
    for row in &t.rows {
        write!(out, "{:indent$}row", "", indent = (depth + 1) * 2)?;
        if row.header {
            write!(out, " header")?;
        }
        writeln!(out)?;
        for cell in &row.cells {
            write!(out, "{:indent$}cell", "", indent = (depth + 2) * 2)?;
            if cell.header {
                write!(out, " header")?;
            }
            if let Some(span) = cell.col_span {
                write!(out, " colspan={span}")?;
            }
            if let Some(span) = cell.row_span {
                write!(out, " rowspan={span}")?;
            }
            writeln!(out)?;
            write_blocks(out, &cell.blocks, depth + 3)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outline_of_formatted_paragraph() {
        let mut para = Paragraph::new(
            ParagraphKind::Heading(2),
            vec![Inline::Text(TextRun {
                text: "Hi".into(),
                format: RunFormat {
                    bold: true,
                    color: Some("FF0000".into()),
                    size_pt: Some(10.5),
                    ..RunFormat::default()
                },
            })],
        );
        para.align = Some(Alignment::Center);
        insta::assert_snapshot!(outline(&[Block::Paragraph(para)]).trim_end(), @r###"h2 align=center "Hi"{b,color=FF0000,10.5pt}"###);
    }
}

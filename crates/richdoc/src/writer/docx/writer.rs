//! DOCX document writer implementation

use std::io::Cursor;

use docx_rs::*;

use crate::Result;
use crate::config::ExportConfig;
use crate::error::ResultExt;
use crate::ir::{self, Alignment, Block, Highlight, Inline, ListMarker, ParagraphKind, RunFormat};

use super::fonts::{self, EmbeddedFont};
use super::numbering::DocxNumbering;
use super::package::Package;
use super::patch::{DocumentPatches, ParagraphPatch, patch_document};
use super::styles::{self, DocxStyles, half_points, run_fonts};

const DOCUMENT: &str = "word/document.xml";

/// EMU per CSS pixel.
const EMU_PER_PX: u32 = 9525;

const QUOTE_FILL: &str = "F2F2F2";
const CODE_FILL: &str = "F6F8FA";
const HEADER_FILL: &str = "F2F2F2";

/// DOCX writer that assembles a package from compiled blocks
pub struct DocxWriter<'a> {
    config: &'a ExportConfig,
    styles: DocxStyles,
    numbering: DocxNumbering,
    patches: DocumentPatches,
}

impl<'a> DocxWriter<'a> {
    /// Creates a writer using the styling defaults of `config`.
    pub fn new(config: &'a ExportConfig) -> Self {
        Self {
            config,
            styles: DocxStyles::new(config),
            numbering: DocxNumbering::new(),
            patches: DocumentPatches::default(),
        }
    }

    /// Generates the package of a block sequence, embedding `fonts`.
    pub fn write(mut self, blocks: &[Block], fonts: &[EmbeddedFont]) -> Result<Vec<u8>> {
        let mut docx = self.styles.initialize_styles(Docx::new());

        let placeholder = [Block::Paragraph(ir::Paragraph::empty())];
        let blocks = if blocks.is_empty() {
            &placeholder[..]
        } else {
            blocks
        };

        for block in blocks {
            docx = match block {
                Block::Paragraph(para) => docx.add_paragraph(self.process_paragraph(para)),
                Block::Table(table) => docx.add_table(self.process_table(table)),
            };
        }
        let docx = self.numbering.finish(docx);

        let mut buffer = Vec::new();
        docx.build()
            .pack(&mut Cursor::new(&mut buffer))
            .map_err(|e| format!("failed to pack DOCX: {e}"))?;

        if self.patches.is_noop() && fonts.is_empty() {
            return Ok(buffer);
        }

        let mut package = Package::read(&buffer).context("failed to reopen DOCX")?;
        if !self.patches.is_noop() {
            let xml = package
                .xml(DOCUMENT)?
                .ok_or("packed DOCX has no document part")?;
            let patched =
                patch_document(xml, &self.patches).context("failed to finish document")?;
            package.set(DOCUMENT, patched);
        }
        fonts::embed(&mut package, fonts)?;
        package.write()
    }

    /// Process paragraph
    fn process_paragraph(&mut self, para: &ir::Paragraph) -> Paragraph {
        let mut out = Paragraph::new();

        let style = match para.kind {
            ParagraphKind::Heading(level) => Some(styles::heading(level)),
            ParagraphKind::Quote => Some(styles::BLOCKQUOTE),
            ParagraphKind::Code => Some(styles::CODE_BLOCK),
            _ => None,
        };
        if let Some(style) = style {
            out = out.style(style);
        }
        if let Some(align) = para.align {
            out = out.align(alignment_type(align));
        }

        match para.list {
            Some(ListMarker::Numbered { instance, level }) => {
                let id = self.numbering.ordered(instance, level);
                out = out.numbering(NumberingId::new(id), IndentLevel::new(level as usize));
            }
            Some(ListMarker::Bullet { instance, level }) => {
                let id = self.numbering.bullet(instance, level);
                out = out.numbering(NumberingId::new(id), IndentLevel::new(level as usize));
            }
            Some(ListMarker::Task { level }) => {
                out = out.indent(Some(DocxNumbering::indent_of(level)), None, None, None);
            }
            None => {}
        }

        // Patches are recorded in the order the paragraphs end up in the
        // document part, so this one goes before the content of the runs.
        self.patches.paragraphs.push(ParagraphPatch {
            bidi: para.bidi,
            rtl_runs: para.inlines.iter().any(is_rtl),
            shading: match para.kind {
                ParagraphKind::Quote => Some(QUOTE_FILL),
                ParagraphKind::Code => Some(CODE_FILL),
                _ => None,
            },
            bottom_border: para.kind == ParagraphKind::ThematicBreak,
        });

        for inline in &para.inlines {
            out = self.process_inline(out, inline);
        }
        if para.kind == ParagraphKind::PageBreak {
            out = out.add_run(Run::new().add_break(BreakType::Page));
        }
        out
    }

    /// Process inline element and add to the paragraph
    fn process_inline(&mut self, para: Paragraph, inline: &Inline) -> Paragraph {
        match inline {
            Inline::Text(run) => {
                para.add_run(self.format_run(Run::new().add_text(run.text.as_str()), &run.format))
            }
            Inline::Link { target, run } => {
                let text = self
                    .format_run(Run::new().add_text(run.text.as_str()), &run.format)
                    .style(styles::HYPERLINK);
                let hyperlink = match target.strip_prefix('#') {
                    Some(anchor) => Hyperlink::new(anchor, HyperlinkType::Anchor),
                    None => Hyperlink::new(target.as_str(), HyperlinkType::External),
                };
                para.add_hyperlink(hyperlink.add_run(text))
            }
            Inline::LineBreak(format) => {
                let run = Run::new().add_break(BreakType::TextWrapping);
                para.add_run(self.format_run(run, format))
            }
            Inline::Checkbox { checked } => {
                let glyph = if *checked { "☒ " } else { "☐ " };
                para.add_run(Run::new().add_text(glyph))
            }
            Inline::Image(image) => {
                self.patches.images.push(image.alt.clone());
                let pic = Pic::new(&image.data).size(
                    image.width.saturating_mul(EMU_PER_PX),
                    image.height.saturating_mul(EMU_PER_PX),
                );
                para.add_run(Run::new().add_image(pic))
            }
        }
    }

    /// Applies resolved run formatting.
    fn format_run(&self, mut run: Run, format: &RunFormat) -> Run {
        if format.bold {
            run = run.bold();
        }
        if format.italic {
            run = run.italic();
        }
        if format.underline {
            run = run.underline("single");
        }
        if format.strike {
            run = run.strike();
        }
        if format.superscript {
            run = run.vert_align(VertAlignType::SuperScript);
        } else if format.subscript {
            run = run.vert_align(VertAlignType::SubScript);
        }
        if let Some(color) = &format.color {
            run = run.color(color);
        }
        match &format.highlight {
            Some(Highlight::Named(name)) => run = run.highlight(*name),
            Some(Highlight::Shading(fill)) => {
                let shading = Shading::new().shd_type(ShdType::Clear).color("auto").fill(fill);
                run = run.shading(shading);
            }
            None => {}
        }

        let font = format
            .font
            .as_deref()
            .or(format.monospace.then_some(self.config.monospace_font.as_str()));
        if let Some(font) = font {
            run = run.fonts(run_fonts(font));
        }
        if let Some(size) = format.size_pt {
            run = run.size(half_points(size));
        }
        run
    }

    /// Process table
    ///
    /// Cells covered by a row span are written as continuation cells of the
    /// same width, so every row fills the whole grid.
    fn process_table(&mut self, table: &ir::Table) -> Table {
        self.patches.tables.push(table.rtl);

        let columns = table.column_widths.len();
        let grid: Vec<usize> = table.column_widths.iter().map(|w| *w as usize).collect();
        let total: usize = grid.iter().sum();
        let span_width = |start: usize, span: usize| -> usize {
            grid.iter().skip(start).take(span).sum()
        };

        let mut out = Table::new(vec![])
            .style(styles::TABLE)
            .set_grid(grid.clone())
            .width(total, WidthType::Dxa);

        // Remaining rows and width of the row span starting at each column.
        let mut vmerge = vec![(0u32, 1usize); columns];

        for row in &table.rows {
            self.patches.rows.push(row.header);

            let mut cells = Vec::new();
            let mut col_index = 0;
            let mut cell_iter = row.cells.iter();

            while col_index < columns {
                let (remaining, span) = vmerge[col_index];
                if remaining > 0 {
                    vmerge[col_index].0 -= 1;
                    let mut cell = self
                        .empty_cell(span_width(col_index, span))
                        .vertical_merge(VMergeType::Continue);
                    if span > 1 {
                        cell = cell.grid_span(span);
                    }
                    cells.push(cell);
                    col_index += span;
                    continue;
                }

                let Some(cell) = cell_iter.next() else {
                    cells.push(self.empty_cell(span_width(col_index, 1)));
                    col_index += 1;
                    continue;
                };

                let span = (cell.col_span.unwrap_or(1) as usize).min(columns - col_index);
                let mut table_cell = self.build_table_cell(cell, span_width(col_index, span));
                if span > 1 {
                    table_cell = table_cell.grid_span(span);
                }
                if let Some(rows) = cell.row_span.filter(|rows| *rows > 1) {
                    table_cell = table_cell.vertical_merge(VMergeType::Restart);
                    vmerge[col_index] = (rows - 1, span);
                }
                cells.push(table_cell);
                col_index += span;
            }

            if cell_iter.next().is_some() {
                log::debug!("dropping table cells beyond the column grid");
            }
            out = out.add_row(TableRow::new(cells));
        }

        out
    }

    fn build_table_cell(&mut self, cell: &ir::TableCell, width: usize) -> TableCell {
        let mut table_cell = TableCell::new().width(width, WidthType::Dxa);
        if cell.header {
            let fill = Shading::new().shd_type(ShdType::Clear).fill(HEADER_FILL);
            table_cell = table_cell.shading(fill);
        }
        for block in &cell.blocks {
            table_cell = match block {
                Block::Paragraph(para) => table_cell.add_paragraph(self.process_paragraph(para)),
                Block::Table(table) => table_cell.add_table(self.process_table(table)),
            };
        }
        // A cell must end with a paragraph. Adding it here keeps the
        // recorded paragraphs in step with the emitted ones.
        if matches!(cell.blocks.last(), None | Some(Block::Table(_))) {
            table_cell = table_cell.add_paragraph(self.process_paragraph(&ir::Paragraph::empty()));
        }
        table_cell
    }

    /// A cell holding one empty paragraph, which every cell must end with.
    fn empty_cell(&mut self, width: usize) -> TableCell {
        let para = self.process_paragraph(&ir::Paragraph::new(ParagraphKind::Body, Vec::new()));
        TableCell::new()
            .width(width, WidthType::Dxa)
            .add_paragraph(para)
    }
}

fn alignment_type(align: Alignment) -> AlignmentType {
    match align {
        Alignment::Left => AlignmentType::Left,
        Alignment::Center => AlignmentType::Center,
        Alignment::Right => AlignmentType::Right,
        Alignment::Justify => AlignmentType::Both,
        Alignment::Start => AlignmentType::Start,
        Alignment::End => AlignmentType::End,
    }
}

fn is_rtl(inline: &Inline) -> bool {
    match inline {
        Inline::Text(run) | Inline::Link { run, .. } => run.format.rtl,
        Inline::LineBreak(format) => format.rtl,
        Inline::Checkbox { .. } | Inline::Image(_) => false,
    }
}

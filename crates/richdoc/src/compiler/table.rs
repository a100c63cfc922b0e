//! Table geometry: column widths, spans, header flags and direction.

use crate::ir::{Alignment, Block, Inline, Paragraph, Table, TableCell, TableRow};
use crate::model::{Direction, Node, NodeKind};

use super::list::ListScope;
use super::{BlockCompiler, DirContext};

/// Twips per CSS pixel.
const TWIPS_PER_PX: f64 = 15.0;

/// The most grid columns a table can have.
const MAX_COLUMNS: u32 = 63;

impl BlockCompiler<'_> {
    /// Builds a table, or `None` when it has no cells to lay out, together
    /// with the context after its last cell.
    pub(super) fn table(&mut self, node: &Node, ctx: DirContext) -> (Option<Table>, DirContext) {
        let rows: Vec<&Node> = node
            .content
            .iter()
            .filter(|row| row.kind == NodeKind::TableRow)
            .collect();
        let Some(first_row) = rows.first() else {
            return (None, ctx);
        };
        let columns = cells(first_row)
            .map(span_of)
            .fold(0, u32::saturating_add)
            .min(MAX_COLUMNS);
        if columns == 0 {
            log::debug!("omitting table without cells");
            return (None, ctx);
        }

        let column_widths = explicit_widths(node, first_row, columns).unwrap_or_else(|| {
            even_widths(self.config.table_width, columns)
        });

        let header_rows = node
            .attrs
            .get::<u32>("headerRows")
            .unwrap_or(self.config.header_rows);
        let header_columns = node
            .attrs
            .get::<u32>("headerColumns")
            .unwrap_or(self.config.header_columns);

        let first_cell = cells(first_row).next();
        let rtl = first_cell
            .and_then(Node::direction)
            .or_else(|| first_row.direction())
            .or_else(|| ctx.effective())
            == Some(Direction::Rtl);

        let mut seen = ctx;
        let mut out_rows = Vec::with_capacity(rows.len());
        for (row_idx, row) in rows.iter().enumerate() {
            let header_row = (row_idx as u32) < header_rows;
            let row_ctx = seen.enter(row);
            let mut row_seen = row_ctx;

            let mut out_cells = Vec::new();
            let mut column = 0;
            for cell in cells(row) {
                let col_span = span_of(cell);
                let row_span = cell.attrs.get::<u32>("rowspan").unwrap_or(1).max(1);
                let header =
                    cell.kind == NodeKind::TableHeader || header_row || column < header_columns;

                let mut blocks = Vec::new();
                let mut cur = row_seen.enter(cell);
                for child in &cell.content {
                    cur = cur.after(self.block(child, cur, ListScope::default(), &mut blocks));
                }
                row_seen = row_ctx.after(cur);
                if blocks.is_empty() {
                    blocks.push(Block::Paragraph(Paragraph::empty()));
                }
                if rtl && cell.direction().is_none() {
                    for block in &mut blocks {
                        if let Block::Paragraph(para) = block {
                            force_rtl(para);
                        }
                    }
                }

                out_cells.push(TableCell {
                    blocks,
                    col_span: (col_span > 1).then_some(col_span),
                    row_span: (row_span > 1).then_some(row_span),
                    header,
                });
                column = column.saturating_add(col_span);
            }

            out_rows.push(TableRow {
                cells: out_cells,
                header: header_row,
            });
            seen = ctx.after(row_seen);
        }

        let table = Table {
            column_widths,
            rows: out_rows,
            rtl,
        };
        (Some(table), seen)
    }
}

fn cells(row: &Node) -> impl Iterator<Item = &Node> {
    row.content
        .iter()
        .filter(|cell| matches!(cell.kind, NodeKind::TableCell | NodeKind::TableHeader))
}

fn span_of(cell: &Node) -> u32 {
    cell.attrs
        .get::<u32>("colspan")
        .unwrap_or(1)
        .clamp(1, MAX_COLUMNS)
}

/// Reads column widths in pixels from the table, else from the cells of the
/// first row, and converts them to twips. Only a complete set counts.
fn explicit_widths(table: &Node, first_row: &Node, columns: u32) -> Option<Vec<u32>> {
    let complete = |widths: Vec<Option<f64>>| -> Option<Vec<u32>> {
        if widths.len() != columns as usize {
            return None;
        }
        widths
            .into_iter()
            .map(|px| px.filter(|px| *px > 0.0))
            .map(|px| px.map(|px| (px * TWIPS_PER_PX).round() as u32))
            .collect()
    };

    if let Some(widths) = table.attrs.get::<Vec<Option<f64>>>("colWidths").and_then(complete) {
        return Some(widths);
    }

    let mut widths = Vec::new();
    for cell in cells(first_row) {
        if widths.len() >= columns as usize {
            return None;
        }
        let span = span_of(cell) as usize;
        let mut cell_widths = cell
            .attrs
            .get::<Vec<Option<f64>>>("colwidth")
            .unwrap_or_default();
        cell_widths.resize(span, None);
        widths.extend(cell_widths);
    }
    complete(widths)
}

/// Divides the total width evenly; the rounding slack goes to the last
/// column.
fn even_widths(total: u32, columns: u32) -> Vec<u32> {
    let base = total / columns;
    let mut widths = vec![base; columns as usize];
    if let Some(last) = widths.last_mut() {
        *last += total - base * columns;
    }
    widths
}

/// Lays a paragraph out right to left from its start edge.
fn force_rtl(para: &mut Paragraph) {
    para.align = para.align.or(Some(Alignment::Start));
    para.bidi = true;
    for inline in &mut para.inlines {
        match inline {
            Inline::Text(run) | Inline::Link { run, .. } => run.format.rtl = true,
            Inline::LineBreak(format) => format.rtl = true,
            Inline::Checkbox { .. } | Inline::Image(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportConfig;
    use crate::ir::outline;
    use crate::resource::ResolvedImages;

    fn compile(doc: &Node, config: &ExportConfig) -> Vec<Block> {
        let images = ResolvedImages::new();
        BlockCompiler::new(config, &images).compile(doc)
    }

    fn cell(text: &str) -> Node {
        Node::new(NodeKind::TableCell)
            .with_content([Node::new(NodeKind::Paragraph).with_content([Node::text(text)])])
    }

    fn row(cells: impl IntoIterator<Item = Node>) -> Node {
        Node::new(NodeKind::TableRow).with_content(cells)
    }

    fn table(rows: impl IntoIterator<Item = Node>) -> Node {
        Node::new(NodeKind::Table).with_content(rows)
    }

    #[test]
    fn even_widths_sum_to_total() {
        for columns in 1..=13 {
            assert_eq!(even_widths(9000, columns).iter().sum::<u32>(), 9000);
        }
        assert_eq!(even_widths(100, 3), [33, 33, 34]);
    }

    #[test]
    fn spans_and_headers() {
        let doc = table([
            row([
                Node::new(NodeKind::TableHeader)
                    .with_attr("colspan", 2)
                    .with_content([Node::new(NodeKind::Paragraph).with_content([Node::text("h")])]),
                cell("x").with_attr("rowspan", 2),
            ]),
            row([cell("a"), Node::new(NodeKind::TableCell).with_attr("colspan", "1")]),
        ])
        .with_attr("headerColumns", 1);

        let blocks = compile(&doc, &ExportConfig::default());
        insta::assert_snapshot!(outline(&blocks).trim_end(), @r###"
        table cols=[3000,3000,3000]
          row
            cell header colspan=2
              p "h"
            cell rowspan=2
              p "x"
          row
            cell header
              p "a"
            cell
              p ""
        "###);
    }

    #[test]
    fn explicit_widths_convert_from_pixels() {
        let doc = table([row([
            cell("a").with_attr("colwidth", serde_json::json!([100])),
            cell("b").with_attr("colspan", 2).with_attr("colwidth", serde_json::json!([50, 70])),
        ])]);
        let blocks = compile(&doc, &ExportConfig::default());
        assert_eq!(blocks[0].as_table().unwrap().column_widths, [1500, 750, 1050]);

        let partial = table([row([
            cell("a").with_attr("colwidth", serde_json::json!([100])),
            cell("b"),
        ])]);
        let blocks = compile(&partial, &ExportConfig::default());
        assert_eq!(blocks[0].as_table().unwrap().column_widths, [4500, 4500]);

        let from_table = table([row([cell("a"), cell("b")])])
            .with_attr("colWidths", serde_json::json!([10, 20]));
        let blocks = compile(&from_table, &ExportConfig::default());
        assert_eq!(blocks[0].as_table().unwrap().column_widths, [150, 300]);
    }

    #[test]
    fn header_rows_default_from_config() {
        let config = ExportConfig {
            header_rows: 1,
            table_width: 1000,
            ..ExportConfig::default()
        };
        let doc = table([row([cell("a")]), row([cell("b")])]);
        insta::assert_snapshot!(outline(&compile(&doc, &config)).trim_end(), @r###"
        table cols=[1000]
          row header
            cell header
              p "a"
          row
            cell
              p "b"
        "###);
    }

    #[test]
    fn rtl_from_first_cell_forces_start_alignment() {
        let doc = table([row([
            cell("א").with_attr("dir", "rtl"),
            cell("ב"),
            cell("c").with_attr("dir", "ltr"),
        ])]);
        let blocks = compile(&doc, &ExportConfig::default());
        insta::assert_snapshot!(outline(&blocks).trim_end(), @r###"
        table cols=[3000,3000,3000] rtl
          row
            cell
              p align=start bidi "א"{rtl}
            cell
              p align=start bidi "ב"{rtl}
            cell
              p "c"
        "###);
    }

    #[test]
    fn oversized_spans_stay_within_the_grid() {
        let doc = table([row([
            cell("a").with_attr("colspan", 4294967295u32),
            cell("b").with_attr("colspan", 4294967295u32),
        ])]);
        let blocks = compile(&doc, &ExportConfig::default());
        let table = blocks[0].as_table().unwrap();
        assert_eq!(table.column_widths.len(), MAX_COLUMNS as usize);
        assert_eq!(table.column_widths.iter().sum::<u32>(), 9000);
        assert_eq!(table.rows[0].cells[0].col_span, Some(MAX_COLUMNS));
    }

    #[test]
    fn rowless_tables_are_omitted() {
        let blocks = compile(&table([]), &ExportConfig::default());
        insta::assert_snapshot!(outline(&blocks).trim_end(), @r###"p """###);
    }
}

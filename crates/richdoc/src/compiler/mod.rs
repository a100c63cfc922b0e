//! The block compiler: turns the document tree into a flat block sequence.

mod direction;
mod inline;
mod list;
mod table;

pub use direction::DirContext;
pub use inline::compile_inlines;

use crate::config::ExportConfig;
use crate::ir::{
    Alignment, Block, ImageRun, Inline, Paragraph, ParagraphKind, RunFormat, TextRun,
};
use crate::model::{Direction, Node, NodeKind};
use crate::resource::{ResolvedImages, resolve_size};

use list::ListScope;

/// Compiles one document.
///
/// Holds the state scoped to one export call: the list instance counters.
/// Directionality is passed along as a [`DirContext`] value.
pub struct BlockCompiler<'a> {
    config: &'a ExportConfig,
    images: &'a ResolvedImages,
    ordered_lists: u32,
    bullet_lists: u32,
}

impl<'a> BlockCompiler<'a> {
    /// Creates a compiler placing the given pre-fetched images.
    pub fn new(config: &'a ExportConfig, images: &'a ResolvedImages) -> Self {
        Self {
            config,
            images,
            ordered_lists: 0,
            bullet_lists: 0,
        }
    }

    /// Compiles a document into a block sequence, which is never empty.
    pub fn compile(mut self, doc: &Node) -> Vec<Block> {
        let mut out = Vec::new();
        self.block(doc, DirContext::default(), ListScope::default(), &mut out);
        if out.is_empty() {
            out.push(Block::Paragraph(Paragraph::empty()));
        }
        out
    }

    /// Compiles one block-level node and returns the context for its next
    /// sibling.
    fn block(
        &mut self,
        node: &Node,
        ctx: DirContext,
        scope: ListScope,
        out: &mut Vec<Block>,
    ) -> DirContext {
        let inner = ctx.enter(node);
        match &node.kind {
            NodeKind::Paragraph => self.paragraph(node, inner, ParagraphKind::Body, out),
            NodeKind::Heading => {
                let level = node
                    .attrs
                    .get::<u32>("level")
                    .filter(|level| (1..=6).contains(level))
                    .unwrap_or(1);
                self.paragraph(node, inner, ParagraphKind::Heading(level as u8), out);
            }
            NodeKind::BulletList | NodeKind::OrderedList | NodeKind::TaskList => {
                return ctx.after(self.list(node, inner, scope, out));
            }
            NodeKind::Table => {
                let (table, after) = self.table(node, inner);
                if let Some(table) = table {
                    out.push(Block::Table(table));
                }
                return ctx.after(after);
            }
            NodeKind::Blockquote => {
                let mut cur = inner;
                for child in &node.content {
                    cur = if child.kind == NodeKind::Paragraph {
                        let child_ctx = cur.enter(child);
                        self.paragraph(child, child_ctx, ParagraphKind::Quote, out);
                        cur.after(child_ctx)
                    } else {
                        cur.after(self.block(child, cur, scope, out))
                    };
                }
                return ctx.after(cur);
            }
            NodeKind::CodeBlock => out.push(Block::Paragraph(self.code_block(node, inner))),
            NodeKind::HorizontalRule => out.push(Block::Paragraph(Paragraph::new(
                ParagraphKind::ThematicBreak,
                Vec::new(),
            ))),
            NodeKind::HardBreak => out.push(Block::Paragraph(Paragraph::empty())),
            NodeKind::PageBreak => out.push(Block::Paragraph(Paragraph::new(
                ParagraphKind::PageBreak,
                Vec::new(),
            ))),
            NodeKind::Image => {
                if let Some(image) = self.image(node, inner, None) {
                    out.push(Block::Paragraph(image));
                }
            }
            NodeKind::Text => {
                let mut para = Paragraph::new(
                    ParagraphKind::Body,
                    compile_inlines(std::slice::from_ref(node), inner.is_rtl()),
                );
                apply_alignment(&mut para, None, inner.is_rtl());
                out.push(Block::Paragraph(para));
            }
            NodeKind::Doc
            | NodeKind::ListItem
            | NodeKind::TaskItem
            | NodeKind::TableRow
            | NodeKind::TableCell
            | NodeKind::TableHeader
            | NodeKind::Other(_) => {
                if let NodeKind::Other(name) = &node.kind {
                    log::debug!("recursing into unknown node {name}");
                }
                let mut cur = inner;
                for child in &node.content {
                    cur = cur.after(self.block(child, cur, scope, out));
                }
                return ctx.after(cur);
            }
        }
        ctx.after(inner)
    }

    /// Compiles a paragraph-like node.
    ///
    /// Images cannot share a paragraph with flowed text, so image children
    /// split the node into separate sibling blocks in document order.
    fn paragraph(
        &mut self,
        node: &Node,
        ctx: DirContext,
        kind: ParagraphKind,
        out: &mut Vec<Block>,
    ) {
        let rtl = ctx.is_rtl();
        let explicit = alignment_attr(node);

        if !node.content.iter().any(Node::is_image) {
            let mut para = Paragraph::new(kind, compile_inlines(&node.content, rtl));
            apply_alignment(&mut para, explicit, rtl);
            out.push(Block::Paragraph(para));
            return;
        }

        for (is_image, group) in split_images(&node.content) {
            if is_image {
                if let Some(image) = self.image(&group[0], ctx.enter(&group[0]), explicit) {
                    out.push(Block::Paragraph(image));
                }
            } else {
                let mut para = Paragraph::new(kind, compile_inlines(group, rtl));
                apply_alignment(&mut para, explicit, rtl);
                out.push(Block::Paragraph(para));
            }
        }
    }

    /// Compiles a standalone image, or `None` when it could not be fetched.
    ///
    /// Without an alignment of its own or of its paragraph, an image is placed
    /// right when the last direction seen is right to left.
    fn image(
        &self,
        node: &Node,
        ctx: DirContext,
        parent: Option<Alignment>,
    ) -> Option<Paragraph> {
        let src = node.attrs.str("src")?;
        let Some(fetched) = self.images.get(src) else {
            log::debug!("omitting unavailable image");
            return None;
        };

        let (width, height) =
            resolve_size(&node.attrs, fetched.natural, self.config.max_image_width);
        let alt = node
            .attrs
            .str("alt")
            .or_else(|| node.attrs.str("title"))
            .map(Into::into);
        let run = ImageRun {
            data: fetched.data.clone(),
            kind: fetched.kind,
            width,
            height,
            alt,
        };

        let mut para = Paragraph::new(ParagraphKind::Image, vec![Inline::Image(run)]);
        para.align = alignment_attr(node).or(parent).or_else(|| {
            (ctx.fallback() == Some(Direction::Rtl)).then_some(Alignment::Right)
        });
        Some(para)
    }

    /// Joins the text children of a code block into one paragraph, with a
    /// line break between consecutive children and for every hard break.
    fn code_block(&self, node: &Node, ctx: DirContext) -> Paragraph {
        let format = RunFormat {
            monospace: true,
            rtl: ctx.is_rtl(),
            ..Default::default()
        };
        let line_break = || Inline::LineBreak(format.clone());
        let text_run = |text: &str| {
            Inline::Text(TextRun {
                text: text.into(),
                format: format.clone(),
            })
        };

        let mut inlines = Vec::new();
        let mut after_text = false;
        for child in &node.content {
            let text: String = match child.kind {
                NodeKind::HardBreak => {
                    inlines.push(line_break());
                    after_text = false;
                    continue;
                }
                NodeKind::Text => child.text.as_deref().unwrap_or_default().into(),
                _ => child
                    .descendants()
                    .filter_map(|n| n.text.as_deref())
                    .collect(),
            };
            if after_text {
                inlines.push(line_break());
            }
            for (idx, line) in text.split('\n').enumerate() {
                if idx > 0 {
                    inlines.push(line_break());
                }
                if !line.is_empty() {
                    inlines.push(text_run(line));
                }
            }
            after_text = true;
        }
        if inlines.is_empty() {
            inlines.push(text_run(""));
        }

        let mut para = Paragraph::new(ParagraphKind::Code, inlines);
        apply_alignment(&mut para, alignment_attr(node), ctx.is_rtl());
        para
    }
}

/// Reads the explicit alignment of a node.
fn alignment_attr(node: &Node) -> Option<Alignment> {
    ["textAlign", "align"]
        .iter()
        .filter_map(|key| node.attrs.str(key))
        .find_map(Alignment::parse)
}

/// Resolves the alignment of a paragraph: the explicit one, else the start
/// edge when laid out right to left.
fn apply_alignment(para: &mut Paragraph, explicit: Option<Alignment>, rtl: bool) {
    para.align = explicit;
    if rtl {
        para.align = para.align.or(Some(Alignment::Start));
        para.bidi = true;
    }
}

/// Splits inline children into runs of flowed content and single images.
fn split_images(nodes: &[Node]) -> Vec<(bool, &[Node])> {
    let mut groups = Vec::new();
    let mut start = 0;
    for (idx, node) in nodes.iter().enumerate() {
        if node.is_image() {
            if start < idx {
                groups.push((false, &nodes[start..idx]));
            }
            groups.push((true, &nodes[idx..=idx]));
            start = idx + 1;
        }
    }
    if start < nodes.len() {
        groups.push((false, &nodes[start..]));
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::outline;

    fn dump(doc: &Node) -> String {
        let config = ExportConfig::default();
        let images = ResolvedImages::new();
        outline(&BlockCompiler::new(&config, &images).compile(doc))
            .trim_end()
            .to_owned()
    }

    fn para(text: &str) -> Node {
        Node::new(NodeKind::Paragraph).with_content([Node::text(text)])
    }

    #[test]
    fn unknown_containers_keep_their_content() {
        let doc = Node::new(NodeKind::Doc).with_content([
            Node::new(NodeKind::Other("details".into())).with_content([para("inside")]),
            Node::new(NodeKind::HorizontalRule),
            Node::new(NodeKind::PageBreak),
            Node::new(NodeKind::HardBreak),
        ]);
        insta::assert_snapshot!(dump(&doc), @r###"
        p "inside"
        hr
        page-break
        p ""
        "###);
    }

    #[test]
    fn headings_clamp_their_level() {
        let doc = Node::new(NodeKind::Doc).with_content([
            Node::new(NodeKind::Heading)
                .with_attr("level", 3)
                .with_content([Node::text("a")]),
            Node::new(NodeKind::Heading)
                .with_attr("level", 9)
                .with_content([Node::text("b")]),
            Node::new(NodeKind::Heading)
                .with_attr("level", "x")
                .with_attr("textAlign", "center")
                .with_content([Node::text("c")]),
        ]);
        insta::assert_snapshot!(dump(&doc), @r###"
        h3 "a"
        h1 "b"
        h1 align=center "c"
        "###);
    }

    #[test]
    fn blockquote_and_code() {
        let doc = Node::new(NodeKind::Doc).with_content([
            Node::new(NodeKind::Blockquote).with_content([
                para("quoted"),
                Node::new(NodeKind::BulletList).with_content([
                    Node::new(NodeKind::ListItem).with_content([para("item")]),
                ]),
            ]),
            Node::new(NodeKind::CodeBlock).with_content([Node::text("fn main() {\n\n}")]),
            Node::new(NodeKind::CodeBlock),
        ]);
        insta::assert_snapshot!(dump(&doc), @r###"
        quote "quoted"
        p bullet=1@0 "item"
        code "fn main() {"{mono} ⏎ ⏎ "}"{mono}
        code ""{mono}
        "###);
    }

    #[test]
    fn code_children_are_joined_with_line_breaks() {
        let doc = Node::new(NodeKind::Doc).with_content([Node::new(NodeKind::CodeBlock)
            .with_content([
                Node::text("let a = 1;"),
                Node::text("let b = 2;"),
                Node::new(NodeKind::HardBreak),
                Node::text("a + b"),
            ])]);
        insta::assert_snapshot!(dump(&doc), @r###"code "let a = 1;"{mono} ⏎ "let b = 2;"{mono} ⏎ "a + b"{mono}"###);
    }

    #[test]
    fn rtl_inherits_from_the_document() {
        let doc = Node::new(NodeKind::Doc)
            .with_attr("dir", "rtl")
            .with_content([
                para("שלום"),
                para("hello").with_attr("dir", "ltr"),
                para("right").with_attr("textAlign", "right"),
            ]);
        insta::assert_snapshot!(dump(&doc), @r###"
        p align=start bidi "שלום"{rtl}
        p "hello"
        p align=right bidi "right"{rtl}
        "###);
    }
}

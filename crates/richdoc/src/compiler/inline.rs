//! Compiles inline nodes into runs.

use crate::ir::{Inline, RunFormat, TextRun};
use crate::model::{MarkKind, Node, NodeKind};
use crate::style::resolve_marks;

/// Compiles a sequence of inline nodes.
///
/// Never returns an empty sequence: empty input yields one empty run, so that
/// an empty paragraph still occupies a line.
pub fn compile_inlines(nodes: &[Node], rtl: bool) -> Vec<Inline> {
    let mut inlines = Vec::with_capacity(nodes.len());
    for node in nodes {
        match &node.kind {
            NodeKind::Text => {
                if let Some(inline) = text(node, rtl) {
                    inlines.push(inline);
                }
            }
            NodeKind::HardBreak => {
                let mut format = resolve_marks(&node.marks);
                format.rtl = rtl;
                inlines.push(Inline::LineBreak(format));
            }
            kind => log::debug!("skipping inline node {}", String::from(kind.clone())),
        }
    }

    if inlines.is_empty() {
        inlines.push(Inline::Text(TextRun {
            text: "".into(),
            format: RunFormat {
                rtl,
                ..RunFormat::default()
            },
        }));
    }
    inlines
}

fn text(node: &Node, rtl: bool) -> Option<Inline> {
    let text = node.text.as_ref().filter(|text| !text.is_empty())?;
    let mut format = resolve_marks(&node.marks);
    format.rtl = rtl;
    let run = TextRun {
        text: text.clone(),
        format,
    };

    let target = node
        .marks
        .iter()
        .filter(|mark| mark.kind == MarkKind::Link)
        .find_map(|mark| mark.attrs.str("href"));
    Some(match target {
        Some(target) => Inline::Link {
            target: target.trim().into(),
            run,
        },
        None => Inline::Text(run),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Paragraph, ParagraphKind, outline};
    use crate::model::Mark;

    fn dump(inlines: Vec<Inline>) -> String {
        let block = crate::ir::Block::Paragraph(Paragraph::new(ParagraphKind::Body, inlines));
        outline(&[block]).trim_end().to_owned()
    }

    #[test]
    fn unmarked_text_is_plain() {
        let inlines = compile_inlines(&[Node::text("Hi")], false);
        assert_eq!(inlines, vec![Inline::Text(TextRun::plain("Hi"))]);
    }

    #[test]
    fn links_breaks_and_unknown_nodes() {
        let nodes = [
            Node::text("see ").with_mark(Mark::new(MarkKind::Italic)),
            Node::text("docs")
                .with_mark(Mark::new(MarkKind::Bold))
                .with_mark(Mark::new(MarkKind::Link).with_attr("href", "https://x.y/")),
            Node::new(NodeKind::HardBreak),
            Node::new(NodeKind::Other("mention".into())),
            Node::text("bye").with_mark(Mark::new(MarkKind::Link).with_attr("href", "")),
        ];
        insta::assert_snapshot!(dump(compile_inlines(&nodes, false)), @r###"p "see "{i} <https://x.y/>"docs"{b} ⏎ "bye""###);
    }

    #[test]
    fn empty_input_yields_one_empty_run() {
        insta::assert_snapshot!(dump(compile_inlines(&[], true)), @r###"p ""{rtl}"###);
        assert_eq!(compile_inlines(&[Node::text("")], false).len(), 1);
    }
}

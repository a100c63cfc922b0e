//! Bullet, ordered and task lists.

use crate::ir::{Block, Inline, ListMarker, Paragraph};
use crate::model::{Node, NodeKind};

use super::{BlockCompiler, DirContext};

/// The deepest list level the package format can number.
const MAX_LEVEL: u32 = 8;

/// The lists enclosing the node being compiled.
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct ListScope {
    /// The instance of the innermost enclosing ordered list.
    ordered: Option<u32>,
    /// The instance of the innermost enclosing bullet list.
    bullet: Option<u32>,
    /// The level of the innermost enclosing list.
    level: Option<u32>,
}

impl BlockCompiler<'_> {
    /// Compiles a list node and returns the context after it.
    ///
    /// A list nested in a list of the same kind continues its instance one
    /// level deeper; any other list starts a new instance. Lists nested past
    /// the deepest level stay at it.
    pub(super) fn list(
        &mut self,
        node: &Node,
        ctx: DirContext,
        scope: ListScope,
        out: &mut Vec<Block>,
    ) -> DirContext {
        let level = scope.level.map_or(0, |level| (level + 1).min(MAX_LEVEL));
        let mut inner = ListScope {
            level: Some(level),
            ..scope
        };
        let marker = match node.kind {
            NodeKind::OrderedList => {
                let instance = scope.ordered.unwrap_or_else(|| {
                    self.ordered_lists += 1;
                    self.ordered_lists
                });
                inner.ordered = Some(instance);
                ListMarker::Numbered { instance, level }
            }
            NodeKind::BulletList => {
                let instance = scope.bullet.unwrap_or_else(|| {
                    self.bullet_lists += 1;
                    self.bullet_lists
                });
                inner.bullet = Some(instance);
                ListMarker::Bullet { instance, level }
            }
            _ => ListMarker::Task { level },
        };

        let mut cur = ctx;
        for item in &node.content {
            let item_ctx = cur.enter(item);
            let after = self.list_item(item, item_ctx, marker, inner, out);
            cur = cur.after(after);
        }
        cur
    }

    fn list_item(
        &mut self,
        item: &Node,
        ctx: DirContext,
        marker: ListMarker,
        scope: ListScope,
        out: &mut Vec<Block>,
    ) -> DirContext {
        let mut checkbox = (item.kind == NodeKind::TaskItem).then(|| Inline::Checkbox {
            checked: item.attrs.get::<bool>("checked").unwrap_or(false),
        });

        // Content that is not wrapped in an item still belongs to the list.
        let children = match item.kind {
            NodeKind::ListItem | NodeKind::TaskItem => &item.content[..],
            _ => std::slice::from_ref(item),
        };

        if children.is_empty() {
            let mut para = Paragraph::empty();
            mark(&mut para, marker, checkbox.take());
            out.push(Block::Paragraph(para));
            return ctx;
        }

        let mut cur = ctx;
        for child in children {
            cur = match child.kind {
                NodeKind::BulletList | NodeKind::OrderedList | NodeKind::TaskList => {
                    let child_ctx = cur.enter(child);
                    cur.after(self.list(child, child_ctx, scope, out))
                }
                NodeKind::Paragraph | NodeKind::Heading => {
                    let start = out.len();
                    let after = self.block(child, cur, scope, out);
                    for block in &mut out[start..] {
                        if let Block::Paragraph(para) = block {
                            mark(para, marker, checkbox.take());
                        }
                    }
                    after
                }
                _ => self.block(child, cur, scope, out),
            };
        }
        cur
    }
}

fn mark(para: &mut Paragraph, marker: ListMarker, checkbox: Option<Inline>) {
    para.list = Some(marker);
    if let Some(checkbox) = checkbox {
        para.inlines.insert(0, checkbox);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportConfig;
    use crate::ir::outline;
    use crate::resource::ResolvedImages;

    fn dump(doc: &Node) -> String {
        let config = ExportConfig::default();
        let images = ResolvedImages::new();
        outline(&BlockCompiler::new(&config, &images).compile(doc))
            .trim_end()
            .to_owned()
    }

    fn item(text: &str) -> Node {
        Node::new(NodeKind::ListItem)
            .with_content([Node::new(NodeKind::Paragraph).with_content([Node::text(text)])])
    }

    fn list(kind: NodeKind, items: impl IntoIterator<Item = Node>) -> Node {
        Node::new(kind).with_content(items)
    }

    #[test]
    fn sibling_lists_get_separate_instances() {
        let doc = Node::new(NodeKind::Doc).with_content([
            list(NodeKind::BulletList, [item("a"), item("b")]),
            list(NodeKind::BulletList, [item("c")]),
            list(NodeKind::OrderedList, [item("1")]),
            list(NodeKind::OrderedList, [item("2")]),
        ]);
        insta::assert_snapshot!(dump(&doc), @r###"
        p bullet=1@0 "a"
        p bullet=1@0 "b"
        p bullet=2@0 "c"
        p num=1@0 "1"
        p num=2@0 "2"
        "###);
    }

    #[test]
    fn nesting_keeps_the_parent_instance() {
        let nested = item("outer").with_content([
            Node::new(NodeKind::Paragraph).with_content([Node::text("outer")]),
            list(
                NodeKind::OrderedList,
                [item("inner"), item("inner2").with_content([
                    Node::new(NodeKind::Paragraph).with_content([Node::text("inner2")]),
                    list(NodeKind::BulletList, [item("deep")]),
                ])],
            ),
        ]);
        let doc = Node::new(NodeKind::Doc).with_content([
            list(NodeKind::OrderedList, [nested, item("next")]),
            list(NodeKind::OrderedList, [item("again")]),
        ]);
        insta::assert_snapshot!(dump(&doc), @r###"
        p num=1@0 "outer"
        p num=1@1 "inner"
        p num=1@1 "inner2"
        p bullet=1@2 "deep"
        p num=1@0 "next"
        p num=2@0 "again"
        "###);
    }

    #[test]
    fn deep_nesting_stops_at_the_last_level() {
        let mut nested = list(NodeKind::BulletList, [item("10")]);
        for depth in (1..10).rev() {
            let text = depth.to_string();
            nested = list(
                NodeKind::BulletList,
                [item(&text).with_content([
                    Node::new(NodeKind::Paragraph).with_content([Node::text(text.as_str())]),
                    nested,
                ])],
            );
        }
        let doc = Node::new(NodeKind::Doc).with_content([nested]);
        insta::assert_snapshot!(dump(&doc), @r###"
        p bullet=1@0 "1"
        p bullet=1@1 "2"
        p bullet=1@2 "3"
        p bullet=1@3 "4"
        p bullet=1@4 "5"
        p bullet=1@5 "6"
        p bullet=1@6 "7"
        p bullet=1@7 "8"
        p bullet=1@8 "9"
        p bullet=1@8 "10"
        "###);
    }

    #[test]
    fn nested_lists_of_another_kind_take_the_next_instance() {
        let doc = Node::new(NodeKind::Doc).with_content([
            list(
                NodeKind::OrderedList,
                [item("1").with_content([
                    Node::new(NodeKind::Paragraph).with_content([Node::text("1")]),
                    list(NodeKind::BulletList, [item("inner")]),
                ])],
            ),
            list(NodeKind::BulletList, [item("top")]),
        ]);
        insta::assert_snapshot!(dump(&doc), @r###"
        p num=1@0 "1"
        p bullet=1@1 "inner"
        p bullet=2@0 "top"
        "###);
    }

    #[test]
    fn task_items_carry_checkboxes() {
        let task = |checked: bool, content: Vec<Node>| {
            Node::new(NodeKind::TaskItem)
                .with_attr("checked", checked)
                .with_content(content)
        };
        let doc = Node::new(NodeKind::Doc).with_content([list(
            NodeKind::TaskList,
            [
                task(
                    true,
                    vec![
                        Node::new(NodeKind::Paragraph).with_content([Node::text("done")]),
                        Node::new(NodeKind::Paragraph).with_content([Node::text("notes")]),
                    ],
                ),
                task(false, vec![]),
            ],
        )]);
        insta::assert_snapshot!(dump(&doc), @r###"
        p task@0 [x] "done"
        p task@0 "notes"
        p task@0 [ ] ""
        "###);
    }

    #[test]
    fn direction_flows_into_items() {
        let doc = Node::new(NodeKind::Doc).with_content([list(
            NodeKind::BulletList,
            [item("א"), item("b").with_attr("dir", "ltr")],
        )
        .with_attr("dir", "rtl")]);
        insta::assert_snapshot!(dump(&doc), @r###"
        p align=start bidi bullet=1@0 "א"{rtl}
        p bullet=1@0 "b"
        "###);
    }
}

//! The input document tree, as produced by the editing surface.

use ecow::EcoString;
use serde::{Deserialize, Deserializer, Serialize};

use crate::attributes::Attrs;

/// The kind of a document node.
///
/// Editors grow new node kinds faster than exporters; anything unknown is
/// kept as [`NodeKind::Other`] and exported by recursing into its children.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    /// The root node.
    Doc,
    /// A paragraph of inline content.
    Paragraph,
    /// A text leaf.
    Text,
    /// A heading of inline content.
    Heading,
    /// An unordered list.
    BulletList,
    /// An ordered list.
    OrderedList,
    /// A list of checkable items.
    TaskList,
    /// An item of a bullet or ordered list.
    ListItem,
    /// An item of a task list.
    TaskItem,
    /// A table.
    Table,
    /// A row of a table.
    TableRow,
    /// A body cell of a table.
    TableCell,
    /// A header cell of a table.
    TableHeader,
    /// A block quotation.
    Blockquote,
    /// A block of preformatted code.
    CodeBlock,
    /// A thematic break.
    HorizontalRule,
    /// A forced line break.
    HardBreak,
    /// A forced page break.
    PageBreak,
    /// An image, inline or standalone.
    Image,
    /// A node kind this exporter does not know.
    Other(EcoString),
}

impl From<String> for NodeKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "doc" => Self::Doc,
            "paragraph" => Self::Paragraph,
            "text" => Self::Text,
            "heading" => Self::Heading,
            "bulletList" | "bullet_list" => Self::BulletList,
            "orderedList" | "ordered_list" => Self::OrderedList,
            "taskList" | "task_list" => Self::TaskList,
            "listItem" | "list_item" => Self::ListItem,
            "taskItem" | "task_item" => Self::TaskItem,
            "table" => Self::Table,
            "tableRow" | "table_row" => Self::TableRow,
            "tableCell" | "table_cell" => Self::TableCell,
            "tableHeader" | "table_header" => Self::TableHeader,
            "blockquote" => Self::Blockquote,
            "codeBlock" | "code_block" => Self::CodeBlock,
            "horizontalRule" | "horizontal_rule" => Self::HorizontalRule,
            "hardBreak" | "hard_break" => Self::HardBreak,
            "pageBreak" | "page_break" => Self::PageBreak,
            "image" => Self::Image,
            _ => Self::Other(name.into()),
        }
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Doc => "doc",
            NodeKind::Paragraph => "paragraph",
            NodeKind::Text => "text",
            NodeKind::Heading => "heading",
            NodeKind::BulletList => "bulletList",
            NodeKind::OrderedList => "orderedList",
            NodeKind::TaskList => "taskList",
            NodeKind::ListItem => "listItem",
            NodeKind::TaskItem => "taskItem",
            NodeKind::Table => "table",
            NodeKind::TableRow => "tableRow",
            NodeKind::TableCell => "tableCell",
            NodeKind::TableHeader => "tableHeader",
            NodeKind::Blockquote => "blockquote",
            NodeKind::CodeBlock => "codeBlock",
            NodeKind::HorizontalRule => "horizontalRule",
            NodeKind::HardBreak => "hardBreak",
            NodeKind::PageBreak => "pageBreak",
            NodeKind::Image => "image",
            NodeKind::Other(name) => return name.into(),
        }
        .into()
    }
}

/// The kind of a formatting mark.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MarkKind {
    /// Bold weight.
    Bold,
    /// Italic style.
    Italic,
    /// Single underline.
    Underline,
    /// Single strike-through.
    Strike,
    /// Lowered script position.
    Subscript,
    /// Raised script position.
    Superscript,
    /// Inline code, set in a monospace font.
    Code,
    /// The composite style mark: color, background, font family, font size.
    TextStyle,
    /// A highlight color.
    Highlight,
    /// A hyperlink.
    Link,
    /// A mark kind this exporter does not know.
    Other(EcoString),
}

impl From<String> for MarkKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "bold" | "strong" => Self::Bold,
            "italic" | "em" => Self::Italic,
            "underline" => Self::Underline,
            "strike" | "strikethrough" => Self::Strike,
            "subscript" => Self::Subscript,
            "superscript" => Self::Superscript,
            "code" => Self::Code,
            "textStyle" | "text_style" => Self::TextStyle,
            "highlight" => Self::Highlight,
            "link" => Self::Link,
            _ => Self::Other(name.into()),
        }
    }
}

impl From<MarkKind> for String {
    fn from(kind: MarkKind) -> Self {
        match kind {
            MarkKind::Bold => "bold",
            MarkKind::Italic => "italic",
            MarkKind::Underline => "underline",
            MarkKind::Strike => "strike",
            MarkKind::Subscript => "subscript",
            MarkKind::Superscript => "superscript",
            MarkKind::Code => "code",
            MarkKind::TextStyle => "textStyle",
            MarkKind::Highlight => "highlight",
            MarkKind::Link => "link",
            MarkKind::Other(name) => return name.into(),
        }
        .into()
    }
}

/// A formatting annotation attached to a text node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    /// The kind of the mark.
    #[serde(rename = "type")]
    pub kind: MarkKind,
    /// The attributes of the mark.
    #[serde(default, deserialize_with = "nullable")]
    pub attrs: Attrs,
}

impl Mark {
    /// Creates a mark without attributes.
    pub fn new(kind: MarkKind) -> Self {
        Self {
            kind,
            attrs: Attrs::new(),
        }
    }

    /// Sets an attribute of the mark.
    pub fn with_attr(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attrs = self.attrs.with(key, value);
        self
    }
}

/// One element of the document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// The kind of the node.
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// The attributes of the node.
    #[serde(default, deserialize_with = "nullable")]
    pub attrs: Attrs,
    /// The children of a container node.
    #[serde(default, deserialize_with = "nullable")]
    pub content: Vec<Node>,
    /// The text of a text leaf.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<EcoString>,
    /// The marks of a text leaf.
    #[serde(default, deserialize_with = "nullable")]
    pub marks: Vec<Mark>,
}

impl Node {
    /// Creates a node without attributes or children.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            attrs: Attrs::new(),
            content: Vec::new(),
            text: None,
            marks: Vec::new(),
        }
    }

    /// Creates a text leaf.
    pub fn text(text: impl Into<EcoString>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::new(NodeKind::Text)
        }
    }

    /// Sets an attribute of the node.
    pub fn with_attr(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attrs = self.attrs.with(key, value);
        self
    }

    /// Sets the children of the node.
    pub fn with_content(mut self, content: impl IntoIterator<Item = Node>) -> Self {
        self.content = content.into_iter().collect();
        self
    }

    /// Adds a mark to a text leaf.
    pub fn with_mark(mut self, mark: Mark) -> Self {
        self.marks.push(mark);
        self
    }

    /// Parses a document tree from its JSON form.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The explicit writing direction of the node, if any.
    pub fn direction(&self) -> Option<Direction> {
        self.attrs.str("dir").and_then(Direction::parse)
    }

    /// Whether the node is an image.
    pub fn is_image(&self) -> bool {
        self.kind == NodeKind::Image
    }

    /// Iterates over the node and all its descendants in document order.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }
}

/// A pre-order iterator over a subtree.
pub struct Descendants<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.content.iter().rev());
        Some(node)
    }
}

/// A writing direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Left to right.
    Ltr,
    /// Right to left.
    Rtl,
}

impl Direction {
    /// Parses a `dir` attribute value; `auto` and garbage are no direction.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ltr" => Some(Self::Ltr),
            "rtl" => Some(Self::Rtl),
            _ => None,
        }
    }
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tiptap_json() {
        let doc = Node::from_json(
            r#"{"type":"doc","content":[
                {"type":"paragraph","attrs":{"dir":"rtl","textAlign":null},"content":[
                    {"type":"text","text":"Hi","marks":[{"type":"bold"},{"type":"link","attrs":{"href":"https://a.b"}}]}
                ]},
                {"type":"callout","attrs":null,"content":null}
            ]}"#,
        )
        .unwrap();

        assert_eq!(doc.kind, NodeKind::Doc);
        let para = &doc.content[0];
        assert_eq!(para.direction(), Some(Direction::Rtl));
        let text = &para.content[0];
        assert_eq!(text.text.as_deref(), Some("Hi"));
        assert_eq!(text.marks[0].kind, MarkKind::Bold);
        assert_eq!(text.marks[1].attrs.str("href"), Some("https://a.b"));
        assert_eq!(doc.content[1].kind, NodeKind::Other("callout".into()));
        assert!(doc.content[1].content.is_empty());
    }

    #[test]
    fn accepts_snake_case_kinds() {
        let node = Node::from_json(r#"{"type":"bullet_list"}"#).unwrap();
        assert_eq!(node.kind, NodeKind::BulletList);
    }

    #[test]
    fn descendants_are_in_document_order() {
        let doc = Node::new(NodeKind::Doc).with_content([
            Node::new(NodeKind::Paragraph).with_content([Node::text("a"), Node::text("b")]),
            Node::new(NodeKind::Paragraph).with_content([Node::text("c")]),
        ]);
        let texts: Vec<_> = doc.descendants().filter_map(|n| n.text.as_deref()).collect();
        assert_eq!(texts, ["a", "b", "c"]);
    }

    #[test]
    fn direction_ignores_auto() {
        assert_eq!(Direction::parse("RTL"), Some(Direction::Rtl));
        assert_eq!(Direction::parse("auto"), None);
    }
}

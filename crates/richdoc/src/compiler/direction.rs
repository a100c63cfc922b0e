//! Writing direction threaded through block compilation.

use crate::model::{Direction, Node};

/// The directionality of the node being compiled.
///
/// The context is a value: entering a node yields a new context and the
/// caller decides what flows back out to the following siblings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirContext {
    /// The direction inherited from the enclosing nodes.
    inherited: Option<Direction>,
    /// The last explicit direction seen anywhere earlier in the document.
    last_seen: Option<Direction>,
}

impl DirContext {
    /// The context inside `node`.
    pub fn enter(self, node: &Node) -> Self {
        match node.direction() {
            Some(dir) => Self {
                inherited: Some(dir),
                last_seen: Some(dir),
            },
            None => self,
        }
    }

    /// The context for the next sibling after a child compiled in `child`.
    ///
    /// Inheritance stays with the parent, the last seen direction moves on.
    pub fn after(self, child: Self) -> Self {
        Self {
            inherited: self.inherited,
            last_seen: child.last_seen,
        }
    }

    /// The direction of the current node.
    pub fn effective(self) -> Option<Direction> {
        self.inherited
    }

    /// Whether the current node is laid out right to left.
    pub fn is_rtl(self) -> bool {
        self.inherited == Some(Direction::Rtl)
    }

    /// The direction used to place a node that has none of its own: the
    /// inherited one, else the last one seen earlier in the document.
    pub fn fallback(self) -> Option<Direction> {
        self.inherited.or(self.last_seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeKind;

    fn node(dir: Option<&str>) -> Node {
        let node = Node::new(NodeKind::Paragraph);
        match dir {
            Some(dir) => node.with_attr("dir", dir),
            None => node,
        }
    }

    #[test]
    fn inherits_downward() {
        let root = DirContext::default().enter(&node(Some("rtl")));
        let child = root.enter(&node(None));
        assert!(child.is_rtl());
        let overridden = child.enter(&node(Some("ltr")));
        assert_eq!(overridden.effective(), Some(Direction::Ltr));
    }

    #[test]
    fn last_seen_flows_to_siblings_only_as_fallback() {
        let doc = DirContext::default();
        let rtl_para = doc.enter(&node(Some("rtl")));
        let next = doc.after(rtl_para);

        assert_eq!(next.effective(), None);
        assert!(!next.is_rtl());
        assert_eq!(next.enter(&node(None)).fallback(), Some(Direction::Rtl));
    }

    #[test]
    fn auto_is_no_direction() {
        let ctx = DirContext::default().enter(&node(Some("auto")));
        assert_eq!(ctx, DirContext::default());
    }
}

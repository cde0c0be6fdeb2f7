use super::graph::NodeId;
use crate::alignment::Difference;
use std::rc::Rc;

struct Link {
    node: NodeId,
    end: i64,
    /// Differences this node adds beyond the previous end
    diffs: Vec<Difference>,
    prev: Option<Rc<Link>>,
}

/// A chain of overlapping nodes under construction.
///
/// Links are shared between branches, so extending a chain is O(1) and never
/// disturbs the chain it was extended from.
#[derive(Clone)]
pub(crate) struct Chain {
    head: Rc<Link>,
    start: i64,
}

impl Chain {
    pub fn seed(node: NodeId, start: i64, end: i64, diffs: Vec<Difference>) -> Self {
        Chain {
            head: Rc::new(Link {
                node,
                end,
                diffs,
                prev: None,
            }),
            start,
        }
    }

    pub fn extend(&self, node: NodeId, end: i64, diffs: Vec<Difference>) -> Self {
        Chain {
            head: Rc::new(Link {
                node,
                end,
                diffs,
                prev: Some(Rc::clone(&self.head)),
            }),
            start: self.start,
        }
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.head.end
    }

    fn links(&self) -> impl Iterator<Item = &Link> {
        std::iter::successors(Some(self.head.as_ref()), |link| link.prev.as_deref())
    }

    /// Member nodes from the seed onwards
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.links().map(|link| link.node).collect();
        nodes.reverse();
        nodes
    }

    /// All differences in reference order
    pub fn diffs(&self) -> Vec<Difference> {
        let mut chunks: Vec<&[Difference]> =
            self.links().map(|link| link.diffs.as_slice()).collect();
        chunks.reverse();
        chunks.concat()
    }
}

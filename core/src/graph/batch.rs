use std::collections::BTreeMap;
use std::fmt;

use super::node::Node;

pub type Frame = i64;

/// Substitution variables a batch executes with. Ordered so that it can key
/// maps and hash deterministically.
pub type Context = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl BatchId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub node: NodeId,
    pub context: Context,
    /// Ascending, possibly empty.
    pub frames: Vec<Frame>,
    /// Batches that must run before this one, in declaration order.
    pub preceding: Vec<BatchId>,
}

/// Read access to an upstream batch tree.
pub trait BatchSource {
    fn batch(&self, id: BatchId) -> Option<&Batch>;

    fn node(&self, id: NodeId) -> Option<&Node>;
}

/// Arena-backed batch tree.
#[derive(Debug, Clone, Default)]
pub struct BatchTree {
    nodes: Vec<Node>,
    batches: Vec<Batch>,
}

impl BatchTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn add_batch(&mut self, node: NodeId, context: Context, frames: Vec<Frame>) -> BatchId {
        self.batches.push(Batch {
            node,
            context,
            frames,
            preceding: Vec::new(),
        });
        BatchId(self.batches.len() - 1)
    }

    /// Records that `preceding` must run before `batch`. Duplicate edges are
    /// ignored; returns false when `batch` is unknown.
    pub fn add_preceding(&mut self, batch: BatchId, preceding: BatchId) -> bool {
        match self.batches.get_mut(batch.0) {
            Some(b) => {
                if !b.preceding.contains(&preceding) {
                    b.preceding.push(preceding);
                }
                true
            }
            None => false,
        }
    }

    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    pub fn batches_for(&self, node: NodeId) -> impl Iterator<Item = (BatchId, &Batch)> {
        self.batches
            .iter()
            .enumerate()
            .filter(move |(_, b)| b.node == node)
            .map(|(i, b)| (BatchId(i), b))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }
}

impl BatchSource for BatchTree {
    fn batch(&self, id: BatchId) -> Option<&Batch> {
        self.batches.get(id.0)
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }
}

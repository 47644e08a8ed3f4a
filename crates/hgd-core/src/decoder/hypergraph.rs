use std::sync::Arc;

use serde::Serialize;

use crate::ff::CompositeState;
use crate::grammar::Rule;
use crate::sentence::Sentence;
use crate::vocab::WordId;

pub type NodeId = usize;
pub type EdgeId = usize;

/// One rule application.
#[derive(Debug, Clone)]
pub struct HyperEdge {
    /// `None` on the edges that lift a full-span item to the goal node.
    pub rule: Option<Arc<Rule>>,
    /// One node per slot, in slot order.
    pub tails: Vec<NodeId>,
    pub start: usize,
    pub end: usize,
    /// Weighted score of this edge's own features.
    pub transition_score: f64,
    /// `transition_score` plus the scores of the tails' best derivations.
    pub score: f64,
}

/// A chart item: every derivation of `label` over `[start, end)` that ends in `state`.
#[derive(Debug, Clone)]
pub struct Node {
    pub label: WordId,
    pub start: usize,
    pub end: usize,
    pub state: CompositeState,
    /// Incoming edges, in materialisation order.
    pub edges: Vec<EdgeId>,
    pub best_edge: EdgeId,
    pub score: f64,
}

/// Search counters for one sentence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChartStats {
    /// Nodes inserted into a cell.
    pub added: usize,
    /// Edges folded into an existing equivalent node.
    pub merged: usize,
    /// Candidates dropped by the beam, before or after insertion.
    pub pruned: usize,
    /// Cube combinations popped.
    pub pops: usize,
    /// Combinations whose scoring failed.
    pub failed: usize,
}

/// Per-sentence arena of nodes and edges, addressed by index.
///
/// Nodes evicted from a cell stay in the arena but are unreachable from the goal.
#[derive(Debug)]
pub struct Hypergraph {
    sentence: Sentence,
    nodes: Vec<Node>,
    edges: Vec<HyperEdge>,
    goal: Option<NodeId>,
    pub(crate) stats: ChartStats,
}

impl Hypergraph {
    pub(crate) fn new(sentence: Sentence) -> Self {
        Self {
            sentence,
            nodes: Vec::new(),
            edges: Vec::new(),
            goal: None,
            stats: ChartStats::default(),
        }
    }

    pub fn sentence(&self) -> &Sentence {
        &self.sentence
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn edge(&self, id: EdgeId) -> &HyperEdge {
        &self.edges[id]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[HyperEdge] {
        &self.edges
    }

    /// The goal node, absent when no derivation covers the sentence.
    pub fn goal(&self) -> Option<NodeId> {
        self.goal
    }

    pub fn stats(&self) -> ChartStats {
        self.stats
    }

    /// Viterbi score of the whole sentence.
    pub fn goal_score(&self) -> Option<f64> {
        self.goal.map(|g| self.nodes[g].score)
    }

    pub(crate) fn push_edge(&mut self, edge: HyperEdge) -> EdgeId {
        self.edges.push(edge);
        self.edges.len() - 1
    }

    pub(crate) fn push_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub(crate) fn set_goal(&mut self, id: NodeId) {
        self.goal = Some(id);
    }
}

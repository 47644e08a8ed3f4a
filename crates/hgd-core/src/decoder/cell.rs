use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::ff::CompositeState;
use crate::grammar::Rule;
use crate::vocab::WordId;

use super::hypergraph::{ChartStats, HyperEdge, Hypergraph, Node, NodeId};

/// A scored rule application waiting for a cell.
#[derive(Debug)]
pub(crate) struct Candidate {
    pub rule: Arc<Rule>,
    pub tails: Vec<NodeId>,
    pub start: usize,
    pub end: usize,
    pub state: CompositeState,
    pub transition_score: f64,
    pub score: f64,
}

/// Nodes of one label, best first, at most `beam` of them.
#[derive(Debug, Default)]
pub(crate) struct Bin {
    nodes: Vec<NodeId>,
    index: HashMap<CompositeState, NodeId>,
}

impl Bin {
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    fn place(&mut self, hg: &Hypergraph, id: NodeId) {
        let score = hg.node(id).score;
        let pos = self.nodes.partition_point(|&n| hg.node(n).score >= score);
        self.nodes.insert(pos, id);
    }
}

/// All items over one span, by label.
#[derive(Debug, Default)]
pub(crate) struct Cell {
    bins: BTreeMap<WordId, Bin>,
}

impl Cell {
    pub fn bin(&self, label: WordId) -> Option<&Bin> {
        self.bins.get(&label).filter(|b| !b.nodes.is_empty())
    }

    /// Labels with at least one node, ascending.
    pub fn labels(&self) -> impl Iterator<Item = WordId> + '_ {
        self.bins
            .iter()
            .filter(|(_, b)| !b.nodes.is_empty())
            .map(|(&l, _)| l)
    }

    pub fn is_empty(&self) -> bool {
        self.labels().next().is_none()
    }

    /// Add `cand` as an edge of its equivalent node, or as a new node.
    ///
    /// Equal scores keep the existing order: a recombined edge must beat the
    /// best edge strictly, and a new node goes after nodes scoring the same.
    pub fn insert(
        &mut self,
        hg: &mut Hypergraph,
        cand: Candidate,
        beam: usize,
        stats: &mut ChartStats,
    ) -> Option<NodeId> {
        let bin = self.bins.entry(cand.rule.lhs).or_default();

        if let Some(&id) = bin.index.get(&cand.state) {
            let score = cand.score;
            let edge = hg.push_edge(edge_of(&cand));
            let node = hg.node_mut(id);
            node.edges.push(edge);
            stats.merged += 1;
            if score > node.score {
                node.score = score;
                node.best_edge = edge;
                if let Some(pos) = bin.nodes.iter().position(|&n| n == id) {
                    bin.nodes.remove(pos);
                }
                bin.place(hg, id);
            }
            return Some(id);
        }

        if bin.nodes.len() >= beam {
            let worst = bin.nodes.last().map(|&n| hg.node(n).score);
            if worst.is_some_and(|w| cand.score <= w) {
                stats.pruned += 1;
                return None;
            }
        }

        let edge = hg.push_edge(edge_of(&cand));
        let id = hg.push_node(Node {
            label: cand.rule.lhs,
            start: cand.start,
            end: cand.end,
            state: cand.state.clone(),
            edges: vec![edge],
            best_edge: edge,
            score: cand.score,
        });
        bin.place(hg, id);
        bin.index.insert(cand.state, id);
        stats.added += 1;

        if bin.nodes.len() > beam {
            if let Some(evicted) = bin.nodes.pop() {
                bin.index.remove(&hg.node(evicted).state);
                stats.pruned += 1;
                if evicted == id {
                    return None;
                }
            }
        }
        Some(id)
    }
}

fn edge_of(cand: &Candidate) -> HyperEdge {
    HyperEdge {
        rule: Some(Arc::clone(&cand.rule)),
        tails: cand.tails.clone(),
        start: cand.start,
        end: cand.end,
        transition_score: cand.transition_score,
        score: cand.score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ff::DpState;
    use crate::sentence::Sentence;
    use crate::vocab::Vocabulary;

    fn setup() -> (Vocabulary, Hypergraph, Arc<Rule>) {
        let vocab = Vocabulary::new();
        let sentence = Sentence::new(0, "a", &vocab);
        let rule = Arc::new(Rule::parse("[X] ||| a ||| A ||| 0", "pt", &vocab).unwrap());
        (vocab, Hypergraph::new(sentence), rule)
    }

    fn cand(rule: &Arc<Rule>, state: u32, score: f64) -> Candidate {
        Candidate {
            rule: Arc::clone(rule),
            tails: Vec::new(),
            start: 0,
            end: 1,
            state: CompositeState::new(vec![Some(DpState::new(state))]),
            transition_score: score,
            score,
        }
    }

    fn scores(cell: &Cell, hg: &Hypergraph, label: WordId) -> Vec<f64> {
        cell.bin(label)
            .map(|b| b.nodes().iter().map(|&n| hg.node(n).score).collect())
            .unwrap_or_default()
    }

    #[test]
    fn keeps_best_first_within_beam() {
        let (_, mut hg, rule) = setup();
        let mut cell = Cell::default();
        let mut stats = ChartStats::default();
        for (s, score) in [(1, -3.0), (2, -1.0), (3, -2.0), (4, -4.0)] {
            cell.insert(&mut hg, cand(&rule, s, score), 3, &mut stats);
        }
        assert_eq!(scores(&cell, &hg, rule.lhs), vec![-1.0, -2.0, -3.0]);
        assert_eq!(stats.added, 3);
        assert_eq!(stats.pruned, 1);
    }

    #[test]
    fn recombines_equal_states() {
        let (_, mut hg, rule) = setup();
        let mut cell = Cell::default();
        let mut stats = ChartStats::default();
        let a = cell.insert(&mut hg, cand(&rule, 7, -2.0), 5, &mut stats).unwrap();
        let b = cell.insert(&mut hg, cand(&rule, 7, -1.0), 5, &mut stats).unwrap();
        let c = cell.insert(&mut hg, cand(&rule, 7, -5.0), 5, &mut stats).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        let node = hg.node(a);
        assert_eq!(node.edges.len(), 3);
        assert_eq!(node.score, -1.0);
        assert_eq!(node.best_edge, node.edges[1]);
        assert_eq!(stats.merged, 2);
    }

    #[test]
    fn equal_scores_keep_insertion_order() {
        let (_, mut hg, rule) = setup();
        let mut cell = Cell::default();
        let mut stats = ChartStats::default();
        let first = cell.insert(&mut hg, cand(&rule, 1, -1.0), 5, &mut stats).unwrap();
        let second = cell.insert(&mut hg, cand(&rule, 2, -1.0), 5, &mut stats).unwrap();
        assert_eq!(cell.bin(rule.lhs).unwrap().nodes(), &[first, second]);

        let again = cell.insert(&mut hg, cand(&rule, 1, -1.0), 5, &mut stats).unwrap();
        assert_eq!(again, first);
        assert_eq!(hg.node(first).best_edge, hg.node(first).edges[0]);
    }

    #[test]
    fn evicted_node_can_be_rebuilt() {
        let (_, mut hg, rule) = setup();
        let mut cell = Cell::default();
        let mut stats = ChartStats::default();
        cell.insert(&mut hg, cand(&rule, 1, -2.0), 1, &mut stats);
        cell.insert(&mut hg, cand(&rule, 2, -1.0), 1, &mut stats);
        assert_eq!(scores(&cell, &hg, rule.lhs), vec![-1.0]);
        // state 1 is gone from the index, so it returns as a fresh node
        let back = cell.insert(&mut hg, cand(&rule, 1, 0.0), 1, &mut stats).unwrap();
        assert_eq!(hg.node(back).edges.len(), 1);
        assert_eq!(scores(&cell, &hg, rule.lhs), vec![0.0]);
    }
}

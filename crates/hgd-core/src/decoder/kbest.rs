use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use super::hypergraph::{EdgeId, Hypergraph, NodeId};
use super::walker::Derivation;

/// A derivation of one node: an incoming edge and a rank into each tail's list.
#[derive(Debug, Clone)]
struct Entry {
    score: f64,
    edge: EdgeId,
    ranks: Vec<usize>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    /// Higher score first, then the earlier edge, then smaller ranks.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.edge.cmp(&self.edge))
            .then_with(|| other.ranks.cmp(&self.ranks))
    }
}

#[derive(Debug, Default)]
struct NodeList {
    found: Vec<Entry>,
    frontier: BinaryHeap<Entry>,
    seen: HashSet<(EdgeId, Vec<usize>)>,
    /// Whether the successors of `found.last()` are in `frontier` yet.
    expanded: bool,
}

/// Lazy k-best enumeration over a recombined hypergraph.
///
/// Each node keeps its derivations found so far plus a frontier of
/// candidates; asking for the k-th derivation of a node only computes as
/// much of its tails' lists as that needs.
pub struct KBest<'a> {
    hg: &'a Hypergraph,
    lists: HashMap<NodeId, NodeList>,
}

impl<'a> KBest<'a> {
    pub fn new(hg: &'a Hypergraph) -> Self {
        Self {
            hg,
            lists: HashMap::new(),
        }
    }

    /// The `k`-th best derivation of the goal node (0-based) and its score.
    pub fn goal(&mut self, k: usize) -> Option<(Derivation, f64)> {
        let goal = self.hg.goal()?;
        let score = self.score(goal, k)?;
        Some((self.derivation(goal, k)?, score))
    }

    fn init(&mut self, node: NodeId) {
        if self.lists.contains_key(&node) {
            return;
        }
        let hg = self.hg;
        let mut list = NodeList::default();
        for &edge in &hg.node(node).edges {
            let e = hg.edge(edge);
            let ranks = vec![0; e.tails.len()];
            list.seen.insert((edge, ranks.clone()));
            list.frontier.push(Entry {
                score: e.score,
                edge,
                ranks,
            });
        }
        self.lists.insert(node, list);
    }

    /// Score of the `k`-th derivation of `node`.
    fn score(&mut self, node: NodeId, k: usize) -> Option<f64> {
        self.init(node);
        loop {
            let list = self.lists.get(&node)?;
            if let Some(e) = list.found.get(k) {
                return Some(e.score);
            }
            if !list.expanded {
                if let Some(last) = list.found.last().cloned() {
                    self.push_successors(node, &last);
                }
                if let Some(list) = self.lists.get_mut(&node) {
                    list.expanded = true;
                }
            }
            let list = self.lists.get_mut(&node)?;
            let next = list.frontier.pop()?;
            list.found.push(next);
            list.expanded = false;
        }
    }

    fn push_successors(&mut self, node: NodeId, last: &Entry) {
        let hg = self.hg;
        let edge = hg.edge(last.edge);
        for slot in 0..last.ranks.len() {
            let mut ranks = last.ranks.clone();
            ranks[slot] += 1;
            let seen = self
                .lists
                .get(&node)
                .is_some_and(|l| l.seen.contains(&(last.edge, ranks.clone())));
            if seen {
                continue;
            }
            let mut score = edge.transition_score;
            let mut complete = true;
            for (&tail, &r) in edge.tails.iter().zip(&ranks) {
                match self.score(tail, r) {
                    Some(s) => score += s,
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if !complete {
                continue;
            }
            if let Some(list) = self.lists.get_mut(&node) {
                list.seen.insert((last.edge, ranks.clone()));
                list.frontier.push(Entry {
                    score,
                    edge: last.edge,
                    ranks,
                });
            }
        }
    }

    fn derivation(&mut self, node: NodeId, k: usize) -> Option<Derivation> {
        self.score(node, k)?;
        let entry = self.lists.get(&node)?.found.get(k)?.clone();
        let tails = self.hg.edge(entry.edge).tails.clone();
        let mut children = Vec::with_capacity(tails.len());
        for (tail, r) in tails.into_iter().zip(entry.ranks) {
            children.push(self.derivation(tail, r)?);
        }
        Some(Derivation {
            edge: entry.edge,
            children,
        })
    }
}

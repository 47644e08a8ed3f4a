use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use super::hypergraph::{Hypergraph, NodeId};

/// One way of filling a rule's slots over a span: a sorted node list per slot.
pub(crate) type Face = Vec<Vec<NodeId>>;

/// A cell of the cube: a face and one rank into each of its slot lists.
#[derive(Debug)]
struct Corner {
    key: f64,
    face: usize,
    ranks: Vec<usize>,
}

impl PartialEq for Corner {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Corner {}

impl PartialOrd for Corner {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Corner {
    /// Higher key first; on a tie the earlier face, then the
    /// lexicographically smaller rank tuple.
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .total_cmp(&other.key)
            .then_with(|| other.face.cmp(&self.face))
            .then_with(|| other.ranks.cmp(&self.ranks))
    }
}

/// Best-first enumeration of slot-node combinations for one rule over one span.
///
/// Every split of the span between the rule's slots is a face of the cube,
/// and all faces share one heap, so a pop budget bounds the rule's edges over
/// the whole span. A combination is keyed by the sum of its nodes' scores plus
/// the rule's estimate; popping it enqueues every neighbour on the same face
/// that advances one slot by one.
pub(crate) struct Cube<'a> {
    faces: &'a [Face],
    estimate: f64,
    heap: BinaryHeap<Corner>,
    seen: HashSet<(usize, Vec<usize>)>,
}

impl<'a> Cube<'a> {
    /// A face with an empty slot list contributes nothing. A face with no
    /// slots contributes the single empty combination.
    pub fn new(faces: &'a [Face], estimate: f64, hg: &Hypergraph) -> Self {
        let mut cube = Self {
            faces,
            estimate,
            heap: BinaryHeap::new(),
            seen: HashSet::new(),
        };
        for (face, lists) in faces.iter().enumerate() {
            if lists.iter().all(|l| !l.is_empty()) {
                cube.push(face, vec![0; lists.len()], hg);
            }
        }
        cube
    }

    fn push(&mut self, face: usize, ranks: Vec<usize>, hg: &Hypergraph) {
        if !self.seen.insert((face, ranks.clone())) {
            return;
        }
        let key = self.estimate
            + ranks
                .iter()
                .zip(&self.faces[face])
                .map(|(&r, l)| hg.node(l[r]).score)
                .sum::<f64>();
        self.heap.push(Corner { key, face, ranks });
    }

    /// Next combination as tail node ids, best first.
    pub fn pop(&mut self, hg: &Hypergraph) -> Option<Vec<NodeId>> {
        let Corner { face, ranks, .. } = self.heap.pop()?;
        let lists = &self.faces[face];
        for slot in 0..ranks.len() {
            if ranks[slot] + 1 < lists[slot].len() {
                let mut next = ranks.clone();
                next[slot] += 1;
                self.push(face, next, hg);
            }
        }
        Some(ranks.iter().zip(lists).map(|(&r, l)| l[r]).collect())
    }

    /// Combinations enqueued so far, popped or not.
    #[cfg(test)]
    pub fn enqueued(&self) -> usize {
        self.seen.len()
    }
}

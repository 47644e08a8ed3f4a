//! Post-order visitors over one derivation.
//!
//! A [`Derivation`] fixes one incoming edge per node, either the Viterbi edges
//! or a k-best choice. [`walk`] visits every edge after all of its children,
//! children in slot order, so a walker that pushes one result per edge finds
//! the highest slot's result on top of its stack.

use crate::ff::{CompositeState, FeatureError, FeatureRegistry, FeatureVector, SpanContext};
use crate::grammar::{Symbol, TargetSymbol};
use crate::vocab::WordId;

use super::hypergraph::{EdgeId, Hypergraph, NodeId};

#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error("rule of arity {needed} found {available} finished children")]
    StackUnderflow { needed: usize, available: usize },

    #[error("no unfilled slot left for a child")]
    NoUnfilledSlot,

    #[error("slot {0} was referenced but never filled")]
    UnfilledSlot(usize),

    #[error("walk ended with {0} sequences on the stack")]
    UnbalancedStack(usize),

    #[error("{words} output words but {alignments} alignment lists")]
    AlignmentLength { words: usize, alignments: usize },

    #[error("edge {edge} has no tail for slot {slot}")]
    MissingTail { edge: EdgeId, slot: usize },

    #[error(transparent)]
    Feature(#[from] FeatureError),
}

/// One edge per node, as a tree rooted at the goal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivation {
    pub edge: EdgeId,
    pub children: Vec<Derivation>,
}

impl Derivation {
    /// The best-edge derivation of `node`.
    pub fn viterbi(hg: &Hypergraph, node: NodeId) -> Self {
        let edge = hg.node(node).best_edge;
        let children = hg
            .edge(edge)
            .tails
            .iter()
            .map(|&t| Self::viterbi(hg, t))
            .collect();
        Self { edge, children }
    }

    /// Sum of the edges' weighted local scores.
    pub fn score(&self, hg: &Hypergraph) -> f64 {
        hg.edge(self.edge).transition_score
            + self.children.iter().map(|c| c.score(hg)).sum::<f64>()
    }
}

pub trait Walker {
    fn visit(&mut self, hg: &Hypergraph, edge: EdgeId) -> Result<(), WalkError>;
}

pub fn walk<W: Walker + ?Sized>(
    hg: &Hypergraph,
    derivation: &Derivation,
    walker: &mut W,
) -> Result<(), WalkError> {
    for child in &derivation.children {
        walk(hg, child, walker)?;
    }
    walker.visit(hg, derivation.edge)
}

/// Pop one finished child per slot, each into the highest-indexed slot still empty.
fn pop_children<T>(stack: &mut Vec<T>, arity: usize) -> Result<Vec<Option<T>>, WalkError> {
    if stack.len() < arity {
        return Err(WalkError::StackUnderflow {
            needed: arity,
            available: stack.len(),
        });
    }
    let mut filled: Vec<Option<T>> = (0..arity).map(|_| None).collect();
    for _ in 0..arity {
        let slot = filled
            .iter()
            .rposition(Option::is_none)
            .ok_or(WalkError::NoUnfilledSlot)?;
        filled[slot] = stack.pop();
    }
    Ok(filled)
}

fn take_slot<T>(filled: &mut [Option<T>], n: usize) -> Result<T, WalkError> {
    filled
        .get_mut(n)
        .and_then(Option::take)
        .ok_or(WalkError::UnfilledSlot(n))
}

/// Target word sequence of the derivation.
#[derive(Debug, Default)]
pub struct OutputBuilder {
    stack: Vec<Vec<WordId>>,
}

impl OutputBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(mut self) -> Result<Vec<WordId>, WalkError> {
        match self.stack.len() {
            1 => Ok(self.stack.pop().unwrap_or_default()),
            n => Err(WalkError::UnbalancedStack(n)),
        }
    }
}

impl Walker for OutputBuilder {
    fn visit(&mut self, hg: &Hypergraph, edge: EdgeId) -> Result<(), WalkError> {
        let Some(rule) = &hg.edge(edge).rule else {
            return Ok(());
        };
        let mut children = pop_children(&mut self.stack, rule.arity())?;
        let mut out = Vec::with_capacity(rule.target.len());
        for sym in &rule.target {
            match *sym {
                TargetSymbol::Word(w) => out.push(w),
                TargetSymbol::Slot(n) => out.extend(take_slot(&mut children, n)?),
            }
        }
        self.stack.push(out);
        Ok(())
    }
}

/// For every output word, the sorted source positions aligned to it.
#[derive(Debug, Default)]
pub struct AlignmentBuilder {
    stack: Vec<Vec<Vec<usize>>>,
}

impl AlignmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(mut self) -> Result<Vec<Vec<usize>>, WalkError> {
        match self.stack.len() {
            1 => Ok(self.stack.pop().unwrap_or_default()),
            n => Err(WalkError::UnbalancedStack(n)),
        }
    }
}

impl Walker for AlignmentBuilder {
    fn visit(&mut self, hg: &Hypergraph, id: EdgeId) -> Result<(), WalkError> {
        let edge = hg.edge(id);
        let Some(rule) = &edge.rule else {
            return Ok(());
        };

        // sentence position of each source terminal; slots advance by their tail's width
        let mut positions = Vec::with_capacity(rule.source.len());
        let mut pos = edge.start;
        for sym in &rule.source {
            match *sym {
                Symbol::Word(_) => {
                    positions.push(Some(pos));
                    pos += 1;
                }
                Symbol::NonTerminal { index, .. } => {
                    positions.push(None);
                    let tail = edge
                        .tails
                        .get(index)
                        .ok_or(WalkError::MissingTail { edge: id, slot: index })?;
                    pos = hg.node(*tail).end;
                }
            }
        }

        let mut children = pop_children(&mut self.stack, rule.arity())?;
        let mut out = Vec::with_capacity(rule.target.len());
        for (t, sym) in rule.target.iter().enumerate() {
            match *sym {
                TargetSymbol::Word(_) => {
                    let mut sources: Vec<usize> = rule
                        .alignment
                        .iter()
                        .filter(|&&(_, tt)| tt == t)
                        .filter_map(|&(s, _)| positions.get(s).copied().flatten())
                        .collect();
                    sources.sort_unstable();
                    sources.dedup();
                    out.push(sources);
                }
                TargetSymbol::Slot(n) => out.extend(take_slot(&mut children, n)?),
            }
        }
        self.stack.push(out);
        Ok(())
    }
}

/// Unweighted feature totals, recomputed edge by edge from the scoring modules.
pub struct FeatureAccumulator<'a> {
    registry: &'a FeatureRegistry,
    features: FeatureVector,
}

impl<'a> FeatureAccumulator<'a> {
    pub fn new(registry: &'a FeatureRegistry) -> Self {
        Self {
            registry,
            features: FeatureVector::new(),
        }
    }

    pub fn finish(self) -> FeatureVector {
        self.features
    }
}

impl Walker for FeatureAccumulator<'_> {
    fn visit(&mut self, hg: &Hypergraph, id: EdgeId) -> Result<(), WalkError> {
        let edge = hg.edge(id);
        let features = match &edge.rule {
            Some(rule) => {
                let states: Vec<&CompositeState> =
                    edge.tails.iter().map(|&t| &hg.node(t).state).collect();
                let ctx = SpanContext {
                    start: edge.start,
                    end: edge.end,
                    sentence: hg.sentence(),
                };
                self.registry.transition(rule, &states, &ctx)?.1
            }
            None => {
                let tail = *edge
                    .tails
                    .first()
                    .ok_or(WalkError::MissingTail { edge: id, slot: 0 })?;
                self.registry
                    .final_transition(&hg.node(tail).state, hg.sentence())?
            }
        };
        self.features.add_all(&features);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_fill_highest_slot_first() {
        let mut stack = vec!["first", "second", "third"];
        let filled = pop_children(&mut stack, 2).unwrap();
        assert_eq!(filled, vec![Some("second"), Some("third")]);
        assert_eq!(stack, vec!["first"]);
    }

    #[test]
    fn underflow_is_reported() {
        let mut stack = vec![1];
        let err = pop_children(&mut stack, 2).unwrap_err();
        assert!(matches!(
            err,
            WalkError::StackUnderflow {
                needed: 2,
                available: 1
            }
        ));
    }

    #[test]
    fn unbalanced_stack_fails_loudly() {
        let builder = OutputBuilder {
            stack: vec![vec![1], vec![2]],
        };
        assert!(matches!(builder.finish(), Err(WalkError::UnbalancedStack(2))));
        assert!(matches!(
            OutputBuilder::new().finish(),
            Err(WalkError::UnbalancedStack(0))
        ));
    }
}

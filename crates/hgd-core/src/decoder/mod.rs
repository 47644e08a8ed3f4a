//! Chart decoding: builds the hypergraph of a sentence and walks derivations out of it.
//!
//! - [`Chart`] fills a CYK chart span by span with cube pruning and recombination.
//! - [`Hypergraph`] is the per-sentence node/edge arena the chart leaves behind.
//! - [`walker`] linearises one derivation into words, alignments and features.
//! - [`KBest`] enumerates derivations of the goal node best-first.

mod cell;
mod chart;
mod cube;
mod dot_chart;
mod explain;
mod hypergraph;
mod kbest;
pub mod walker;

#[cfg(test)]
mod tests;

pub use chart::Chart;
pub use explain::{ChartExplanation, ExplainStep};
pub use hypergraph::{ChartStats, EdgeId, HyperEdge, Hypergraph, Node, NodeId};
pub use kbest::KBest;
pub use walker::{
    walk, AlignmentBuilder, Derivation, FeatureAccumulator, OutputBuilder, WalkError, Walker,
};

use crate::ff::{FeatureRegistry, Weights};
use crate::grammar::GrammarSet;
use crate::sentence::Sentence;
use crate::settings::SearchSettings;
use crate::vocab::Vocabulary;

/// Parse `sentence` into its hypergraph.
pub fn parse(
    sentence: &Sentence,
    grammars: &GrammarSet,
    registry: &FeatureRegistry,
    weights: &Weights,
    search: &SearchSettings,
    vocab: &Vocabulary,
) -> Hypergraph {
    Chart::new(sentence, grammars, registry, weights, search, vocab).expand()
}

//! Hypergraph chart decoding for synchronous grammars.
//!
//! A sentence is parsed bottom-up into a hypergraph of every derivation the
//! grammars allow, scored by a registry of feature functions and pruned with
//! cube pruning; the best derivations are then walked out into translations.

pub mod decoder;
pub mod ff;
pub mod grammar;
pub mod lm;
pub mod sentence;
pub mod settings;
pub mod translation;
pub mod vocab;

pub(crate) mod testutil;

pub use decoder::{parse, ChartExplanation, ChartStats, Hypergraph};
pub use ff::{FeatureFunction, FeatureRegistry, FeatureVector, Weights};
pub use grammar::{Grammar, GrammarError, GrammarSet, Rule, RuleTable};
pub use sentence::Sentence;
pub use translation::{Assembler, Translation};
pub use vocab::{Vocabulary, WordId};

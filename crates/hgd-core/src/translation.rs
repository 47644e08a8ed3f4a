//! Turns a decoded hypergraph into translation records.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, debug_span};

use crate::decoder::{
    walk, AlignmentBuilder, Derivation, FeatureAccumulator, Hypergraph, KBest, OutputBuilder,
    WalkError,
};
use crate::ff::{FeatureRegistry, FeatureVector};
use crate::sentence::Sentence;
use crate::settings::OutputSettings;
use crate::vocab::{Vocabulary, WordId};

/// k-best derivations examined per requested unique output.
const UNIQUE_SEARCH_FACTOR: usize = 10;

/// The decoder's answer for one sentence.
#[derive(Debug, Clone, Serialize)]
pub struct Translation {
    pub sentence_id: usize,
    pub source: String,
    pub output: String,
    pub tokens: Vec<String>,
    pub score: f64,
    /// Unweighted feature totals of the derivation.
    pub features: FeatureVector,
    /// Source positions aligned to each output token.
    pub alignments: Vec<Vec<usize>>,
    pub extraction_time: Duration,
}

impl Translation {
    /// The record for a sentence with no derivation: the source echoed back, scoring zero.
    pub fn fallback(sentence: &Sentence) -> Self {
        let source = sentence.source().to_string();
        Self {
            sentence_id: sentence.id(),
            tokens: source.split_whitespace().map(str::to_string).collect(),
            output: source.clone(),
            source,
            score: 0.0,
            features: FeatureVector::new(),
            alignments: Vec::new(),
            extraction_time: Duration::ZERO,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Runs the three walkers over a derivation and packs the result.
pub struct Assembler<'a> {
    registry: &'a FeatureRegistry,
    vocab: &'a Vocabulary,
    output: &'a OutputSettings,
}

impl<'a> Assembler<'a> {
    pub fn new(
        registry: &'a FeatureRegistry,
        vocab: &'a Vocabulary,
        output: &'a OutputSettings,
    ) -> Self {
        Self {
            registry,
            vocab,
            output,
        }
    }

    /// The Viterbi translation, or the fallback record when `hg` has no goal.
    pub fn viterbi(
        &self,
        sentence: &Sentence,
        hg: Option<&Hypergraph>,
    ) -> Result<Translation, WalkError> {
        let Some((hg, goal)) = hg.and_then(|hg| hg.goal().map(|g| (hg, g))) else {
            return Ok(Translation::fallback(sentence));
        };
        let _span = debug_span!("extract", sentence = sentence.id()).entered();
        let derivation = Derivation::viterbi(hg, goal);
        self.derivation(hg, &derivation, hg.node(goal).score)
    }

    /// Up to `n` translations, best first. With `unique_nbest`, a derivation
    /// whose output repeats an earlier one is skipped.
    pub fn nbest(
        &self,
        sentence: &Sentence,
        hg: Option<&Hypergraph>,
        n: usize,
    ) -> Result<Vec<Translation>, WalkError> {
        let Some(hg) = hg.filter(|hg| hg.goal().is_some()) else {
            return Ok(vec![Translation::fallback(sentence)]);
        };
        let _span = debug_span!("extract_nbest", sentence = sentence.id(), n).entered();
        let limit = if self.output.unique_nbest {
            n.saturating_mul(UNIQUE_SEARCH_FACTOR)
        } else {
            n
        };
        let mut kbest = KBest::new(hg);
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(n);
        for k in 0..limit {
            if out.len() == n {
                break;
            }
            let Some((derivation, score)) = kbest.goal(k) else {
                break;
            };
            let t = self.derivation(hg, &derivation, score)?;
            if self.output.unique_nbest && !seen.insert(t.output.clone()) {
                continue;
            }
            out.push(t);
        }
        debug!(requested = n, found = out.len());
        Ok(out)
    }

    /// Translation of one fixed derivation carrying `score`.
    pub fn derivation(
        &self,
        hg: &Hypergraph,
        derivation: &Derivation,
        score: f64,
    ) -> Result<Translation, WalkError> {
        let started = Instant::now();

        let mut words = OutputBuilder::new();
        walk(hg, derivation, &mut words)?;
        let mut alignment = AlignmentBuilder::new();
        walk(hg, derivation, &mut alignment)?;
        let mut features = FeatureAccumulator::new(self.registry);
        walk(hg, derivation, &mut features)?;

        let words = words.finish()?;
        let alignments = check_alignment_length(&words, alignment.finish()?)?;

        let mut tokens = Vec::with_capacity(words.len());
        let mut kept = Vec::with_capacity(words.len());
        for (&w, a) in words.iter().zip(alignments) {
            if self.output.strip_markers && self.vocab.is_marker(w) {
                continue;
            }
            tokens.push(self.vocab.word(w).map(|s| s.to_string()).unwrap_or_default());
            kept.push(a);
        }

        let sentence = hg.sentence();
        Ok(Translation {
            sentence_id: sentence.id(),
            source: sentence.source().to_string(),
            output: tokens.join(" "),
            tokens,
            score,
            features: features.finish(),
            alignments: kept,
            extraction_time: started.elapsed(),
        })
    }
}

/// One alignment list per output word, or the walks disagree about the derivation.
fn check_alignment_length(
    words: &[WordId],
    alignments: Vec<Vec<usize>>,
) -> Result<Vec<Vec<usize>>, WalkError> {
    if alignments.len() != words.len() {
        return Err(WalkError::AlignmentLength {
            words: words.len(),
            alignments: alignments.len(),
        });
    }
    Ok(alignments)
}

//! Multi-sentence front end of the chart decoder.
//!
//! [`Decoder`] owns everything that is shared read-only across sentences
//! (vocabulary, grammars, scoring modules, weights, settings) and decodes
//! sentences one at a time or in batches on worker threads. Each sentence
//! gets its own chart and hypergraph.

mod trace_init;
mod worker;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use tracing::debug_span;

pub use hgd_core::decoder::{ChartExplanation, ChartStats, Hypergraph, WalkError};
pub use hgd_core::ff::{FeatureFunction, FeatureRegistry, FeatureVector, Weights};
pub use hgd_core::grammar::{Grammar, GrammarError, GrammarSet, RuleTable};
pub use hgd_core::settings::{settings, Settings};
pub use hgd_core::{Sentence, Translation, Vocabulary};
pub use trace_init::init_tracing;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    Grammar(#[from] GrammarError),

    #[error("sentence {sentence}: {source}")]
    Walk {
        sentence: usize,
        #[source]
        source: WalkError,
    },

    #[error("decode worker stopped before answering sentence {0}")]
    WorkerLost(usize),
}

pub struct Decoder {
    vocab: Arc<Vocabulary>,
    grammars: GrammarSet,
    registry: FeatureRegistry,
    weights: Weights,
    settings: Settings,
}

impl Decoder {
    /// Fails if the grammars' unary rules form a label cycle.
    pub fn new(
        vocab: Arc<Vocabulary>,
        grammars: Vec<Arc<dyn Grammar>>,
        registry: FeatureRegistry,
        weights: Weights,
    ) -> Result<Self, DecodeError> {
        let grammars = GrammarSet::new(grammars, &vocab)?;
        Ok(Self {
            vocab,
            grammars,
            registry,
            weights,
            settings: settings().clone(),
        })
    }

    /// Replace the global settings for this decoder only.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn sentence(&self, id: usize, text: &str) -> Sentence {
        Sentence::new(id, text, &self.vocab)
    }

    pub fn parse(&self, sentence: &Sentence) -> Hypergraph {
        hgd_core::parse(
            sentence,
            &self.grammars,
            &self.registry,
            &self.weights,
            &self.settings.search,
            &self.vocab,
        )
    }

    fn assembler(&self) -> hgd_core::Assembler<'_> {
        hgd_core::Assembler::new(&self.registry, &self.vocab, &self.settings.output)
    }

    /// Best translation. A sentence without a derivation comes back as its own source.
    pub fn decode(&self, sentence: &Sentence) -> Result<Translation, DecodeError> {
        let _span = debug_span!("decode", sentence = sentence.id()).entered();
        let hg = self.parse(sentence);
        self.assembler()
            .viterbi(sentence, Some(&hg))
            .map_err(|source| DecodeError::Walk {
                sentence: sentence.id(),
                source,
            })
    }

    /// Up to `n` translations, best first.
    pub fn decode_nbest(
        &self,
        sentence: &Sentence,
        n: usize,
    ) -> Result<Vec<Translation>, DecodeError> {
        let _span = debug_span!("decode_nbest", sentence = sentence.id(), n).entered();
        let hg = self.parse(sentence);
        self.assembler()
            .nbest(sentence, Some(&hg), n)
            .map_err(|source| DecodeError::Walk {
                sentence: sentence.id(),
                source,
            })
    }

    /// N-best list sized by `output.nbest`.
    pub fn decode_nbest_default(
        &self,
        sentence: &Sentence,
    ) -> Result<Vec<Translation>, DecodeError> {
        self.decode_nbest(sentence, self.settings.output.nbest)
    }

    pub fn explain(&self, sentence: &Sentence) -> ChartExplanation {
        ChartExplanation::new(&self.parse(sentence), &self.vocab)
    }

    /// Decode `sentences` on up to `threads` workers. Results come back in input order.
    pub fn decode_batch(
        self: &Arc<Self>,
        sentences: Vec<Sentence>,
        threads: usize,
    ) -> Vec<Result<Translation, DecodeError>> {
        worker::decode_batch(self, sentences, threads)
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("grammars", &self.grammars)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

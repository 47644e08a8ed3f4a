#![cfg(test)]

use std::sync::Arc;

use crate::decoder::{parse, Hypergraph};
use crate::ff::{FeatureRegistry, RuleFeatures, Weights, WordPenalty};
use crate::grammar::{Grammar, GrammarSet, RuleTable};
use crate::sentence::Sentence;
use crate::settings::{parse_settings_toml, OutputSettings, SearchSettings};
use crate::translation::{Assembler, Translation};
use crate::vocab::Vocabulary;

/// Lexical rules for `a`, `b` plus one binary rule that swaps its children.
pub const SWAP_GRAMMAR: &str = "\
[X] ||| a ||| A ||| -1 ||| 0-0
[X] ||| b ||| B ||| -1 ||| 0-0
[X] ||| [X,1] [X,2] ||| [X,2] [X,1] ||| -0.5
";

/// One-word phrases, plus a two-word phrase that only fits without a span limit.
pub const PHRASES: &str = "\
[X] ||| a ||| A ||| -1 ||| 0-0
[X] ||| b ||| B ||| -1 ||| 0-0
[X] ||| c ||| C ||| -1 ||| 0-0
[X] ||| a b ||| AB ||| 5 ||| 0-0 1-0
";

/// Left-branching monotone glue up to the goal label.
pub const GLUE: &str = "\
[GOAL] ||| [X,1] ||| [X,1] ||| 0
[GOAL] ||| [GOAL,1] [X,2] ||| [GOAL,1] [X,2] ||| 0
";

pub fn search_settings(goal: &str) -> SearchSettings {
    let mut s = parse_settings_toml(crate::settings::default_toml())
        .unwrap()
        .search;
    s.goal_symbol = goal.to_string();
    s
}

pub fn output_settings() -> OutputSettings {
    parse_settings_toml(crate::settings::default_toml())
        .unwrap()
        .output
}

pub fn table(vocab: &Vocabulary, owner: &str, text: &str) -> Arc<dyn Grammar> {
    Arc::new(RuleTable::from_text(owner, text, vocab).unwrap())
}

pub fn basic_registry(vocab: &Vocabulary) -> FeatureRegistry {
    FeatureRegistry::new()
        .with(Arc::new(RuleFeatures))
        .with(Arc::new(WordPenalty::new(vocab)))
}

pub fn basic_weights() -> Weights {
    Weights::new()
        .with("tm_pt_0", 1.0)
        .with("tm_glue_0", 1.0)
        .with("WordPenalty", -0.1)
}

/// Everything one decode needs, with knobs open for tests to adjust.
pub struct Fixture {
    pub vocab: Vocabulary,
    pub grammars: GrammarSet,
    pub registry: FeatureRegistry,
    pub weights: Weights,
    pub search: SearchSettings,
    pub output: OutputSettings,
}

impl Fixture {
    /// A single grammar owned by `pt`.
    pub fn new(grammar: &str, goal: &str) -> Self {
        let vocab = Vocabulary::new();
        let grammars = GrammarSet::new(vec![table(&vocab, "pt", grammar)], &vocab).unwrap();
        Self::from_parts(vocab, grammars, goal)
    }

    /// A phrase table limited to `max_span` plus the glue grammar.
    pub fn phrases_with_glue(phrases: &str, max_span: usize) -> Self {
        let vocab = Vocabulary::new();
        let pt: Arc<dyn Grammar> = Arc::new(
            RuleTable::from_text("pt", phrases, &vocab)
                .unwrap()
                .with_max_span(max_span),
        );
        let glue = table(&vocab, "glue", GLUE);
        let grammars = GrammarSet::new(vec![pt, glue], &vocab).unwrap();
        Self::from_parts(vocab, grammars, "GOAL")
    }

    fn from_parts(vocab: Vocabulary, grammars: GrammarSet, goal: &str) -> Self {
        Self {
            registry: basic_registry(&vocab),
            vocab,
            grammars,
            weights: basic_weights(),
            search: search_settings(goal),
            output: output_settings(),
        }
    }

    pub fn sentence(&self, text: &str) -> Sentence {
        Sentence::new(0, text, &self.vocab)
    }

    pub fn parse(&self, text: &str) -> Hypergraph {
        let sentence = self.sentence(text);
        parse(
            &sentence,
            &self.grammars,
            &self.registry,
            &self.weights,
            &self.search,
            &self.vocab,
        )
    }

    fn assembler(&self) -> Assembler<'_> {
        Assembler::new(&self.registry, &self.vocab, &self.output)
    }

    pub fn translate(&self, text: &str) -> Translation {
        let hg = self.parse(text);
        self.assembler()
            .viterbi(hg.sentence(), Some(&hg))
            .unwrap()
    }

    pub fn nbest(&self, text: &str, n: usize) -> Vec<Translation> {
        let hg = self.parse(text);
        self.assembler()
            .nbest(hg.sentence(), Some(&hg), n)
            .unwrap()
    }
}

/// Relative closeness for accumulated floating-point scores.
pub fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-4 * a.abs().max(b.abs()).max(1.0)
}

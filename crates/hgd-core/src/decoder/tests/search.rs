use std::sync::Arc;

use crate::ff::{
    FeatureError, FeatureFunction, FeatureRegistry, FeatureVector, LanguageModelFf, Transition,
};
use crate::ff::{DpState, SpanContext};
use crate::grammar::{Rule, TargetSymbol};
use crate::lm::{LmError, MemoryLm};
use crate::testutil::{basic_registry, close, Fixture, SWAP_GRAMMAR};
use crate::vocab::{Vocabulary, WordId};

/// Five translations of `a` and of `b`, and a monotone binary rule.
const FANOUT: &str = "\
[X] ||| a ||| A1 ||| -1
[X] ||| a ||| A2 ||| -2
[X] ||| a ||| A3 ||| -3
[X] ||| a ||| A4 ||| -4
[X] ||| a ||| A5 ||| -5
[X] ||| b ||| B1 ||| -1
[X] ||| b ||| B2 ||| -2
[X] ||| b ||| B3 ||| -3
[X] ||| b ||| B4 ||| -4
[X] ||| b ||| B5 ||| -5
[X] ||| [X,1] [X,2] ||| [X,1] [X,2] ||| 0
";

fn with_lm(mut f: Fixture, lm: MemoryLm) -> Fixture {
    let ff = LanguageModelFf::new("lm_0", Arc::new(lm), &f.vocab);
    f.registry = basic_registry(&f.vocab).with(Arc::new(ff));
    f.weights.set("lm_0", 1.0);
    f
}

fn flat_lm() -> MemoryLm {
    MemoryLm::new(2, -10.0)
}

#[test]
fn stateless_items_recombine() {
    let f = Fixture::new(FANOUT, "X");
    let hg = f.parse("a");
    let goal = hg.goal().unwrap();
    assert_eq!(hg.node(goal).edges.len(), 1);

    let top = hg.edge(hg.node(goal).best_edge).tails[0];
    let node = hg.node(top);
    assert_eq!(node.edges.len(), 5);
    assert_eq!(hg.stats().added, 1);
    assert_eq!(hg.stats().merged, 4);
    for &e in &node.edges {
        assert!(node.score >= hg.edge(e).score);
    }
    assert_eq!(f.translate("a").output, "A1");
}

#[test]
fn lm_state_keeps_items_apart() {
    let f = with_lm(Fixture::new(FANOUT, "X"), flat_lm());
    let hg = f.parse("a");
    let goal = hg.goal().unwrap();
    assert_eq!(hg.node(goal).edges.len(), 5);
    assert_eq!(hg.stats().merged, 0);
}

#[test]
fn beam_evicts_beyond_width() {
    let mut f = with_lm(Fixture::new(FANOUT, "X"), flat_lm());
    f.search.beam_width = 2;
    let hg = f.parse("a");
    let goal = hg.goal().unwrap();
    assert_eq!(hg.node(goal).edges.len(), 2);
    assert_eq!(hg.stats().pruned, 3);
}

#[test]
fn pop_limit_bounds_materialized_edges() {
    let mut f = with_lm(Fixture::new(FANOUT, "X"), flat_lm());
    f.search.pop_limit = 3;
    let hg = f.parse("a b");
    let binary = hg
        .edges()
        .iter()
        .filter(|e| e.rule.as_ref().is_some_and(|r| r.arity() == 2))
        .count();
    assert_eq!(binary, 3);
    assert_eq!(hg.stats().pops, 5 + 5 + 3);
    assert_eq!(f.translate("a b").output, "A1 B1");
}

#[test]
fn pop_limit_spans_every_split() {
    let grammar = "\
[X] ||| a ||| A ||| -1
[X] ||| [X,1] [X,2] ||| [X,1] [X,2] ||| 0
";
    let binary_over_full = |f: &Fixture| {
        let hg = f.parse("a a a a");
        let n = hg
            .edges()
            .iter()
            .filter(|e| e.start == 0 && e.end == 4)
            .filter(|e| e.rule.as_ref().is_some_and(|r| r.arity() == 2))
            .count();
        (n, hg.stats().pops)
    };

    let f = Fixture::new(grammar, "X");
    assert_eq!(binary_over_full(&f).0, 3);

    let mut f = Fixture::new(grammar, "X");
    f.search.pop_limit = 1;
    // one pop per span: four words, three, two, one
    assert_eq!(binary_over_full(&f), (1, 4 + 3 + 2 + 1));
    assert_eq!(f.translate("a a a a").output, "A A A A");
}

#[test]
fn lm_picks_the_fluent_order() {
    let grammar = format!("{SWAP_GRAMMAR}[X] ||| [X,1] [X,2] ||| [X,1] [X,2] ||| -0.5\n");
    let vocab_probe = Fixture::new(&grammar, "X");
    let mut lm = flat_lm();
    for (ngram, p) in [("<s> B", -0.1), ("B A", -0.1), ("A </s>", -0.1)] {
        lm.add_words(&vocab_probe.vocab, ngram, p, 0.0);
    }
    let f = with_lm(vocab_probe, lm);

    let hg = f.parse("a b");
    assert_eq!(hg.node(hg.goal().unwrap()).edges.len(), 2);

    let t = f.translate("a b");
    assert_eq!(t.output, "B A");
    assert!((t.features.get("lm_0") - 3.0 * f64::from(-0.1f32)).abs() < 1e-6);
    assert!(close(t.score, f.weights.dot(&t.features)));
}

/// Refuses any rule producing `word`.
struct Refuse(WordId);

impl FeatureFunction for Refuse {
    fn name(&self) -> &str {
        "Refuse"
    }

    fn estimate(&self, _rule: &Rule) -> FeatureVector {
        FeatureVector::new()
    }

    fn transition(
        &self,
        rule: &Rule,
        _tails: &[Option<&DpState>],
        _ctx: &SpanContext<'_>,
    ) -> Result<Transition, FeatureError> {
        if rule.target.contains(&TargetSymbol::Word(self.0)) {
            return Err(LmError::Backend("refused".to_string()).into());
        }
        Ok(Transition::default())
    }
}

fn refusing(vocab: &Vocabulary, word: &str) -> FeatureRegistry {
    basic_registry(vocab).with(Arc::new(Refuse(vocab.id(word))))
}

#[test]
fn failed_transition_skips_only_that_edge() {
    let mut f = Fixture::new("[X] ||| a ||| A ||| -1\n[X] ||| a ||| BAD ||| 0\n", "X");
    f.registry = refusing(&f.vocab, "BAD");
    let hg = f.parse("a");
    assert_eq!(hg.stats().failed, 1);
    assert_eq!(f.translate("a").output, "A");
}

#[test]
fn every_transition_failing_is_a_decode_failure() {
    let mut f = Fixture::new("[X] ||| a ||| BAD ||| 0\n", "X");
    f.registry = refusing(&f.vocab, "BAD");
    let t = f.translate("a");
    assert_eq!(t.output, "a");
    assert_eq!(t.score, 0.0);
}

#[test]
fn unary_chain_reaches_goal() {
    let grammar = "\
[X] ||| a ||| A ||| -1
[S] ||| [X,1] ||| [X,1] ||| -0.25
[GOAL] ||| [S,1] ||| [S,1] ||| -0.25
";
    let f = Fixture::new(grammar, "GOAL");
    let t = f.translate("a");
    assert_eq!(t.output, "A");
    assert_eq!(t.features.get("tm_pt_0"), -1.5);
}

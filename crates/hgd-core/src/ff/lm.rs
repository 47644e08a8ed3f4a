use std::sync::Arc;

use tracing::debug;

use crate::grammar::{Rule, TargetSymbol};
use crate::lm::{LanguageModel, NgramCache};
use crate::sentence::Sentence;
use crate::vocab::{Vocabulary, WordId};

use super::{DpState, FeatureError, FeatureFunction, FeatureVector, SpanContext, Transition};

/// Boundary words of an item's target yield.
///
/// `left` holds the first `order - 1` words, still waiting for context from
/// outside. `right` holds the last `order - 1`, the context this item offers
/// to words that follow it. For a short yield both are the whole yield.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LmState {
    pub left: Vec<WordId>,
    pub right: Vec<WordId>,
}

/// N-gram language model score as feature `name`.
pub struct LanguageModelFf {
    name: String,
    lm: Arc<dyn LanguageModel>,
    cache: Option<Arc<NgramCache>>,
    start: WordId,
    end: WordId,
}

impl LanguageModelFf {
    pub fn new(name: &str, lm: Arc<dyn LanguageModel>, vocab: &Vocabulary) -> Self {
        Self {
            name: name.to_string(),
            lm,
            cache: None,
            start: vocab.start_marker(),
            end: vocab.end_marker(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<NgramCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn context_len(&self) -> usize {
        self.lm.order().saturating_sub(1)
    }

    fn score(&self, ngram: &[WordId]) -> Result<f64, FeatureError> {
        let p = match &self.cache {
            Some(cache) => cache.logprob(self.lm.as_ref(), ngram)?,
            None => self.lm.logprob(ngram)?,
        };
        Ok(f64::from(p))
    }

    fn feature(&self, logprob: f64) -> FeatureVector {
        let mut fv = FeatureVector::new();
        if logprob != 0.0 {
            fv.add(&self.name, logprob);
        }
        fv
    }

    fn own_state<'a>(
        &self,
        tails: &[Option<&'a DpState>],
        n: usize,
    ) -> Result<&'a LmState, FeatureError> {
        let state = tails
            .get(n)
            .copied()
            .flatten()
            .ok_or_else(|| FeatureError::MissingState {
                module: self.name.clone(),
                tail: n,
            })?;
        state
            .downcast_ref::<LmState>()
            .ok_or_else(|| FeatureError::ForeignState {
                module: self.name.clone(),
                tail: n,
            })
    }
}

/// Left-to-right scorer over one item's yield.
struct Scan<'a> {
    ff: &'a LanguageModelFf,
    n1: usize,
    left: Vec<WordId>,
    right: Vec<WordId>,
    seen: usize,
    ngram: Vec<WordId>,
    logprob: f64,
}

impl<'a> Scan<'a> {
    fn new(ff: &'a LanguageModelFf) -> Self {
        Self {
            ff,
            n1: ff.context_len(),
            left: Vec::new(),
            right: Vec::new(),
            seen: 0,
            ngram: Vec::new(),
            logprob: 0.0,
        }
    }

    fn push(&mut self, w: WordId) -> Result<(), FeatureError> {
        if self.seen < self.n1 {
            self.left.push(w);
        } else if w != self.ff.start {
            self.ngram.clear();
            self.ngram.extend_from_slice(&self.right);
            self.ngram.push(w);
            self.logprob += self.ff.score(&self.ngram)?;
        }
        self.remember(w);
        self.seen += 1;
        Ok(())
    }

    fn remember(&mut self, w: WordId) {
        self.right.push(w);
        if self.right.len() > self.n1 {
            self.right.remove(0);
        }
    }

    fn splice(&mut self, child: &LmState) -> Result<(), FeatureError> {
        for &w in &child.left {
            self.push(w)?;
        }
        if child.left.len() >= self.n1 {
            self.right.clone_from(&child.right);
        }
        Ok(())
    }

    fn finish(self) -> (LmState, f64) {
        (
            LmState {
                left: self.left,
                right: self.right,
            },
            self.logprob,
        )
    }
}

impl FeatureFunction for LanguageModelFf {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_stateful(&self) -> bool {
        true
    }

    /// Scores each run of target terminals with the context available
    /// inside the run.
    fn estimate(&self, rule: &Rule) -> FeatureVector {
        let n1 = self.context_len();
        let mut total = 0.0;
        let mut run: Vec<WordId> = Vec::new();
        let mut flush = |run: &mut Vec<WordId>| {
            for i in 0..run.len() {
                if run[i] == self.start {
                    continue;
                }
                let from = i.saturating_sub(n1);
                match self.score(&run[from..=i]) {
                    Ok(p) => total += p,
                    Err(e) => debug!(lm = %self.name, error = %e, "estimate lookup failed"),
                }
            }
            run.clear();
        };
        for sym in &rule.target {
            match *sym {
                TargetSymbol::Word(w) => run.push(w),
                TargetSymbol::Slot(_) => flush(&mut run),
            }
        }
        flush(&mut run);
        self.feature(total)
    }

    fn transition(
        &self,
        rule: &Rule,
        tails: &[Option<&DpState>],
        _ctx: &SpanContext<'_>,
    ) -> Result<Transition, FeatureError> {
        let mut scan = Scan::new(self);
        for sym in &rule.target {
            match *sym {
                TargetSymbol::Word(w) => scan.push(w)?,
                TargetSymbol::Slot(n) => scan.splice(self.own_state(tails, n)?)?,
            }
        }
        let (state, logprob) = scan.finish();
        Ok(Transition {
            state: Some(DpState::new(state)),
            features: self.feature(logprob),
        })
    }

    /// Scores the deferred left words against `<s>` and appends `</s>`,
    /// unless the yield already carries its own markers.
    fn final_transition(
        &self,
        state: Option<&DpState>,
        _sentence: &Sentence,
    ) -> Result<FeatureVector, FeatureError> {
        let Some(state) = state.and_then(|s| s.downcast_ref::<LmState>()) else {
            return Err(FeatureError::MissingState {
                module: self.name.clone(),
                tail: 0,
            });
        };
        let n1 = self.context_len();
        let mut logprob = 0.0;
        let mut context: Vec<WordId> = Vec::new();
        if state.left.first() != Some(&self.start) {
            context.push(self.start);
        }
        let mut ngram = Vec::new();
        for &w in &state.left {
            if w != self.start {
                ngram.clear();
                ngram.extend_from_slice(&context[context.len().saturating_sub(n1)..]);
                ngram.push(w);
                logprob += self.score(&ngram)?;
            }
            context.push(w);
        }
        if state.right.last() != Some(&self.end) && state.left.last() != Some(&self.end) {
            let tail = if state.left.len() >= n1 {
                &state.right
            } else {
                &context
            };
            ngram.clear();
            ngram.extend_from_slice(&tail[tail.len().saturating_sub(n1)..]);
            ngram.push(self.end);
            logprob += self.score(&ngram)?;
        }
        Ok(self.feature(logprob))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ff::FeatureRegistry;
    use crate::lm::MemoryLm;

    const EPS: f64 = 1e-6;

    struct Fixture {
        vocab: Vocabulary,
        ff: Arc<LanguageModelFf>,
    }

    /// Bigram model where every seen bigram has its own distinct score.
    fn fixture() -> Fixture {
        let vocab = Vocabulary::new();
        let mut lm = MemoryLm::new(2, -10.0);
        for (i, w) in ["<s>", "</s>", "a", "b", "c"].iter().enumerate() {
            lm.add_words(&vocab, w, -1.0 - i as f32, -0.5);
        }
        lm.add_words(&vocab, "<s> a", -0.1, 0.0);
        lm.add_words(&vocab, "a b", -0.2, 0.0);
        lm.add_words(&vocab, "b c", -0.3, 0.0);
        lm.add_words(&vocab, "c </s>", -0.4, 0.0);
        let ff = Arc::new(LanguageModelFf::new("lm_0", Arc::new(lm), &vocab));
        Fixture { vocab, ff }
    }

    fn full_sentence_score(f: &Fixture, words: &str) -> f64 {
        let ids: Vec<WordId> = std::iter::once(f.vocab.start_marker())
            .chain(words.split_whitespace().map(|w| f.vocab.id(w)))
            .chain(std::iter::once(f.vocab.end_marker()))
            .collect();
        let mut total = 0.0;
        for i in 1..ids.len() {
            total += f.ff.score(&ids[i - 1..=i]).unwrap();
        }
        total
    }

    #[test]
    fn split_derivation_matches_flat_scoring() {
        let f = fixture();
        let sentence = Sentence::new(0, "x y", &f.vocab);
        let ctx = SpanContext {
            start: 0,
            end: 2,
            sentence: &sentence,
        };
        let lexical = Rule::parse("[X] ||| x ||| a b ||| 0", "pt", &f.vocab).unwrap();
        let glue = Rule::parse("[X] ||| [X,1] y ||| [X,1] c ||| 0", "pt", &f.vocab).unwrap();

        let reg = FeatureRegistry::new().with(f.ff.clone());
        let (child, child_fv) = reg.transition(&lexical, &[], &ctx).unwrap();
        let (parent, parent_fv) = reg.transition(&glue, &[&child], &ctx).unwrap();
        let final_fv = reg.final_transition(&parent, &sentence).unwrap();

        let total = child_fv.get("lm_0") + parent_fv.get("lm_0") + final_fv.get("lm_0");
        assert!((total - full_sentence_score(&f, "a b c")).abs() < EPS);
    }

    #[test]
    fn state_keeps_boundary_words() {
        let f = fixture();
        let sentence = Sentence::new(0, "x", &f.vocab);
        let ctx = SpanContext {
            start: 0,
            end: 1,
            sentence: &sentence,
        };
        let rule = Rule::parse("[X] ||| x ||| a b c ||| 0", "pt", &f.vocab).unwrap();
        let t = f.ff.transition(&rule, &[], &ctx).unwrap();
        let state = t.state.unwrap();
        let state = state.downcast_ref::<LmState>().unwrap();
        assert_eq!(state.left, vec![f.vocab.id("a")]);
        assert_eq!(state.right, vec![f.vocab.id("c")]);
    }

    #[test]
    fn markers_in_yield_are_not_rescored() {
        let f = fixture();
        let sentence = Sentence::new(0, "x", &f.vocab);
        let ctx = SpanContext {
            start: 0,
            end: 1,
            sentence: &sentence,
        };
        let rule = Rule::parse("[X] ||| x ||| <s> a b c </s> ||| 0", "pt", &f.vocab).unwrap();
        let reg = FeatureRegistry::new().with(f.ff.clone());
        let (state, fv) = reg.transition(&rule, &[], &ctx).unwrap();
        let final_fv = reg.final_transition(&state, &sentence).unwrap();
        let total = fv.get("lm_0") + final_fv.get("lm_0");
        assert!((total - full_sentence_score(&f, "a b c")).abs() < EPS);
    }

    #[test]
    fn missing_tail_state_is_an_error() {
        let f = fixture();
        let sentence = Sentence::new(0, "y", &f.vocab);
        let ctx = SpanContext {
            start: 0,
            end: 1,
            sentence: &sentence,
        };
        let glue = Rule::parse("[X] ||| [X,1] y ||| [X,1] c ||| 0", "pt", &f.vocab).unwrap();
        let err = f.ff.transition(&glue, &[None], &ctx).unwrap_err();
        assert!(matches!(err, FeatureError::MissingState { tail: 0, .. }));
    }

    #[test]
    fn estimate_scores_terminal_runs() {
        let f = fixture();
        let rule = Rule::parse("[X] ||| x [X,1] ||| a b [X,1] ||| 0", "pt", &f.vocab).unwrap();
        let fv = f.ff.estimate(&rule);
        let a = f.ff.score(&[f.vocab.id("a")]).unwrap();
        let ab = f.ff.score(&[f.vocab.id("a"), f.vocab.id("b")]).unwrap();
        assert!((fv.get("lm_0") - (a + ab)).abs() < EPS);
    }
}

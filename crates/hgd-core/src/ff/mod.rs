//! Scoring modules ("feature functions") and the registry that runs them.
//!
//! A module contributes named feature values to every hyperedge the chart
//! builds. Stateless modules look only at the rule. Stateful modules also
//! see their tails' [`DpState`]s and return a new one; two items are only
//! interchangeable when every stateful module's state agrees.

mod builtin;
mod lm;
mod state;
mod vector;

use std::sync::Arc;

use crate::grammar::Rule;
use crate::lm::LmError;
use crate::sentence::Sentence;

pub use builtin::{OovPenalty, RuleFeatures, WordPenalty, OOV_PENALTY, WORD_PENALTY};
pub use lm::{LanguageModelFf, LmState};
pub use state::{CompositeState, DpState, StateValue};
pub use vector::{FeatureVector, Weights, WeightsError};

#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("{module}: tail {tail} carries no state")]
    MissingState { module: String, tail: usize },

    #[error("{module}: tail {tail} carries a state of another module")]
    ForeignState { module: String, tail: usize },

    #[error(transparent)]
    Lm(#[from] LmError),
}

/// Where an edge sits in the input.
#[derive(Debug, Clone, Copy)]
pub struct SpanContext<'a> {
    pub start: usize,
    pub end: usize,
    pub sentence: &'a Sentence,
}

/// Result of applying one module to one hyperedge.
#[derive(Debug, Clone, Default)]
pub struct Transition {
    pub state: Option<DpState>,
    pub features: FeatureVector,
}

impl Transition {
    pub fn stateless(features: FeatureVector) -> Self {
        Self {
            state: None,
            features,
        }
    }
}

pub trait FeatureFunction: Send + Sync {
    fn name(&self) -> &str;

    fn is_stateful(&self) -> bool {
        false
    }

    /// Tail-independent features of `rule`, used to order rules and cube
    /// corners before any tail is fixed.
    fn estimate(&self, rule: &Rule) -> FeatureVector;

    /// Features of applying `rule` over tails whose states (for this module)
    /// are `tails`, in slot order.
    fn transition(
        &self,
        rule: &Rule,
        tails: &[Option<&DpState>],
        ctx: &SpanContext<'_>,
    ) -> Result<Transition, FeatureError> {
        let _ = (tails, ctx);
        Ok(Transition::stateless(self.estimate(rule)))
    }

    /// Features added when a complete derivation becomes the goal item.
    fn final_transition(
        &self,
        state: Option<&DpState>,
        sentence: &Sentence,
    ) -> Result<FeatureVector, FeatureError> {
        let _ = (state, sentence);
        Ok(FeatureVector::new())
    }
}

/// Ordered set of modules. Stateful modules get consecutive slots in every
/// item's [`CompositeState`].
#[derive(Clone, Default)]
pub struct FeatureRegistry {
    modules: Vec<Arc<dyn FeatureFunction>>,
    /// `slots[m]` is module `m`'s index in the composite state.
    slots: Vec<Option<usize>>,
    stateful: usize,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, module: Arc<dyn FeatureFunction>) -> Self {
        self.push(module);
        self
    }

    pub fn push(&mut self, module: Arc<dyn FeatureFunction>) {
        let slot = module.is_stateful().then(|| {
            self.stateful += 1;
            self.stateful - 1
        });
        self.slots.push(slot);
        self.modules.push(module);
    }

    pub fn modules(&self) -> &[Arc<dyn FeatureFunction>] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn stateful_count(&self) -> usize {
        self.stateful
    }

    /// Sum of all modules' estimates for `rule`.
    pub fn estimate(&self, rule: &Rule) -> FeatureVector {
        let mut total = FeatureVector::new();
        for module in &self.modules {
            total.add_all(&module.estimate(rule));
        }
        total
    }

    /// Run every module over one edge. Returns the edge's composite state and
    /// its local (unweighted) features.
    pub fn transition(
        &self,
        rule: &Rule,
        tails: &[&CompositeState],
        ctx: &SpanContext<'_>,
    ) -> Result<(CompositeState, FeatureVector), FeatureError> {
        let mut states = Vec::with_capacity(self.stateful);
        let mut features = FeatureVector::new();
        let mut tail_states: Vec<Option<&DpState>> = Vec::with_capacity(tails.len());
        for (module, slot) in self.modules.iter().zip(&self.slots) {
            tail_states.clear();
            if let Some(slot) = *slot {
                tail_states.extend(tails.iter().map(|t| t.slot(slot)));
            } else {
                tail_states.extend(tails.iter().map(|_| None));
            }
            let t = module.transition(rule, &tail_states, ctx)?;
            if slot.is_some() {
                states.push(t.state);
            }
            features.add_all(&t.features);
        }
        Ok((CompositeState::new(states), features))
    }

    /// Features contributed when a full-span item is promoted to the goal.
    pub fn final_transition(
        &self,
        state: &CompositeState,
        sentence: &Sentence,
    ) -> Result<FeatureVector, FeatureError> {
        let mut features = FeatureVector::new();
        for (module, slot) in self.modules.iter().zip(&self.slots) {
            let own = slot.and_then(|s| state.slot(s));
            features.add_all(&module.final_transition(own, sentence)?);
        }
        Ok(features)
    }
}

impl std::fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.modules.iter().map(|m| m.name()))
            .finish()
    }
}

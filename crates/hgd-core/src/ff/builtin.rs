use crate::grammar::{Rule, TargetSymbol};
use crate::vocab::{Vocabulary, WordId};

use super::{FeatureFunction, FeatureVector};

/// Passes each rule's own feature values through.
#[derive(Debug, Default)]
pub struct RuleFeatures;

impl FeatureFunction for RuleFeatures {
    fn name(&self) -> &str {
        "RuleFeatures"
    }

    fn estimate(&self, rule: &Rule) -> FeatureVector {
        rule.features.clone()
    }
}

/// `-1/ln(10)` per target word, so the weight reads in log10 units.
/// Sentence markers are not counted; they never reach the output.
#[derive(Debug)]
pub struct WordPenalty {
    markers: [WordId; 2],
}

impl WordPenalty {
    pub fn new(vocab: &Vocabulary) -> Self {
        Self {
            markers: [vocab.start_marker(), vocab.end_marker()],
        }
    }
}

pub const WORD_PENALTY: &str = "WordPenalty";

impl FeatureFunction for WordPenalty {
    fn name(&self) -> &str {
        WORD_PENALTY
    }

    fn estimate(&self, rule: &Rule) -> FeatureVector {
        let mut fv = FeatureVector::new();
        let n = rule
            .target
            .iter()
            .filter(|t| matches!(t, TargetSymbol::Word(w) if !self.markers.contains(w)))
            .count();
        if n > 0 {
            fv.add(WORD_PENALTY, -(n as f64) / std::f64::consts::LN_10);
        }
        fv
    }
}

/// Fires once per pass-through rule.
#[derive(Debug, Default)]
pub struct OovPenalty;

pub const OOV_PENALTY: &str = "OOVPenalty";

impl FeatureFunction for OovPenalty {
    fn name(&self) -> &str {
        OOV_PENALTY
    }

    fn estimate(&self, rule: &Rule) -> FeatureVector {
        let mut fv = FeatureVector::new();
        if rule.oov {
            fv.add(OOV_PENALTY, 1.0);
        }
        fv
    }
}

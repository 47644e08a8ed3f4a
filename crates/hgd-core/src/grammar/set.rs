use std::sync::Arc;

use crate::vocab::Vocabulary;

use super::table::order_unary;
use super::{Grammar, GrammarError, Rule};

/// A unary rule tagged with the grammar it came from.
#[derive(Debug, Clone)]
pub struct UnaryRule {
    pub grammar: usize,
    pub rule: Arc<Rule>,
}

impl AsRef<Rule> for UnaryRule {
    fn as_ref(&self) -> &Rule {
        &self.rule
    }
}

/// The ordered grammars of one decoder, with the unary rules of all of them
/// merged into a single producer-before-consumer order.
#[derive(Clone)]
pub struct GrammarSet {
    grammars: Vec<Arc<dyn Grammar>>,
    unary: Vec<UnaryRule>,
}

impl GrammarSet {
    /// Fails if the unary rules of all grammars together form a label cycle.
    pub fn new(grammars: Vec<Arc<dyn Grammar>>, vocab: &Vocabulary) -> Result<Self, GrammarError> {
        let mut unary = Vec::new();
        for (n, g) in grammars.iter().enumerate() {
            unary.extend(g.unary_rules().iter().map(|rule| UnaryRule {
                grammar: n,
                rule: Arc::clone(rule),
            }));
        }
        let unary = order_unary(unary, vocab)?;
        Ok(Self { grammars, unary })
    }

    pub fn grammars(&self) -> &[Arc<dyn Grammar>] {
        &self.grammars
    }

    pub fn unary_rules(&self) -> &[UnaryRule] {
        &self.unary
    }

    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }

    /// Whether any grammar can start a rule with `word`.
    pub fn covers_word(&self, word: crate::vocab::WordId) -> bool {
        self.grammars.iter().any(|g| g.covers_word(word))
    }
}

impl std::fmt::Debug for GrammarSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrammarSet")
            .field("grammars", &self.grammars.iter().map(|g| g.owner()).collect::<Vec<_>>())
            .field("unary", &self.unary.len())
            .finish()
    }
}

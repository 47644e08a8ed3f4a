//! Synchronous grammar rules and the rule-lookup contract the chart consumes.
//!
//! Grammars are read through a trie over source sides: the chart walks
//! `step(node, key)` one source symbol at a time and asks `rules_matching`
//! for the rules whose whole source side the node spells.

mod rule;
mod set;
mod table;

use std::sync::Arc;

use crate::vocab::WordId;

pub use rule::{Rule, Symbol, TargetSymbol};
pub use set::{GrammarSet, UnaryRule};
pub use table::RuleTable;

/// Index of a node in a grammar's source-side trie.
pub type TrieId = usize;

/// One step along a source side: a terminal word or a nonterminal label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrieKey {
    Word(WordId),
    Label(WordId),
}

#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("unary rules form a cycle through label {0}")]
    UnaryCycle(String),
}

pub trait Grammar: Send + Sync {
    fn root(&self) -> TrieId;

    /// Trie node reached from `node` by matching `key`, if any rule continues that way.
    fn step(&self, node: TrieId, key: TrieKey) -> Option<TrieId>;

    /// Rules whose complete source side is the pattern spelled by `node`.
    fn rules_matching(&self, node: TrieId) -> &[Arc<Rule>];

    /// Unary rules (`[A] ||| [B,1] ||| [B,1]`), ordered so that every rule
    /// producing a label precedes every rule consuming it.
    fn unary_rules(&self) -> &[Arc<Rule>];

    /// Widest span this grammar may cover; `None` means unbounded.
    fn max_span(&self) -> Option<usize> {
        None
    }

    fn owner(&self) -> &str;

    /// Whether some rule's source side starts with `word`.
    fn covers_word(&self, word: WordId) -> bool {
        self.step(self.root(), TrieKey::Word(word)).is_some()
    }
}

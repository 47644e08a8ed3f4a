use std::fmt::Write as _;
use std::sync::Arc;

use crate::ff::FeatureVector;
use crate::vocab::{Vocabulary, WordId};

use super::{GrammarError, TrieKey};

/// A source-side symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    Word(WordId),
    /// Slot `index` (0-based, in source order) expecting a node labelled `label`.
    NonTerminal { label: WordId, index: usize },
}

impl Symbol {
    pub fn key(&self) -> TrieKey {
        match *self {
            Symbol::Word(w) => TrieKey::Word(w),
            Symbol::NonTerminal { label, .. } => TrieKey::Label(label),
        }
    }
}

/// A target-side symbol: a word, or a back-reference to source slot `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetSymbol {
    Word(WordId),
    Slot(usize),
}

/// A synchronous rule `lhs → source / target` with its features and word alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub lhs: WordId,
    pub source: Vec<Symbol>,
    pub target: Vec<TargetSymbol>,
    pub features: FeatureVector,
    /// Alignment points `(source position, target position)`, rule-local.
    pub alignment: Vec<(usize, usize)>,
    pub owner: Arc<str>,
    /// Pass-through rule for a word no grammar covers.
    pub oov: bool,
    arity: usize,
}

impl Rule {
    /// Build a rule, checking that slots are numbered in source order and
    /// that the target references every slot exactly once.
    pub fn new(
        lhs: WordId,
        source: Vec<Symbol>,
        target: Vec<TargetSymbol>,
        features: FeatureVector,
        alignment: Vec<(usize, usize)>,
        owner: &str,
    ) -> Result<Self, GrammarError> {
        let mut arity = 0;
        for sym in &source {
            if let Symbol::NonTerminal { index, .. } = *sym {
                if index != arity {
                    return Err(GrammarError::InvalidRule(format!(
                        "source slot {} appears where slot {} was expected",
                        index + 1,
                        arity + 1
                    )));
                }
                arity += 1;
            }
        }
        if source.is_empty() {
            return Err(GrammarError::InvalidRule("empty source side".to_string()));
        }

        let mut seen = vec![false; arity];
        for sym in &target {
            if let TargetSymbol::Slot(n) = *sym {
                match seen.get_mut(n) {
                    Some(s) if !*s => *s = true,
                    Some(_) => {
                        return Err(GrammarError::InvalidRule(format!(
                            "target references slot {} twice",
                            n + 1
                        )))
                    }
                    None => {
                        return Err(GrammarError::InvalidRule(format!(
                            "target references slot {} but the rule has arity {arity}",
                            n + 1
                        )))
                    }
                }
            }
        }
        if let Some(n) = seen.iter().position(|s| !s) {
            return Err(GrammarError::InvalidRule(format!(
                "slot {} is not used on the target side",
                n + 1
            )));
        }

        for &(s, t) in &alignment {
            if s >= source.len() || t >= target.len() {
                return Err(GrammarError::InvalidRule(format!(
                    "alignment point {s}-{t} out of range"
                )));
            }
        }

        Ok(Self {
            lhs,
            source,
            target,
            features,
            alignment,
            owner: Arc::from(owner),
            oov: false,
            arity,
        })
    }

    /// Pass-through rule `[label] → word / output` for an uncovered source word.
    pub fn oov(label: WordId, word: WordId, output: WordId, owner: &str) -> Self {
        Self {
            lhs: label,
            source: vec![Symbol::Word(word)],
            target: vec![TargetSymbol::Word(output)],
            features: FeatureVector::new(),
            alignment: vec![(0, 0)],
            owner: Arc::from(owner),
            oov: true,
            arity: 0,
        }
    }

    /// Parse one line of the pipe-delimited rule format:
    ///
    /// ```text
    /// [X] ||| [X,1] de [X,2] ||| [X,2] of [X,1] ||| 0.5 -1.2 glue=1 ||| 1-1
    /// ```
    ///
    /// Bare feature values are dense and named `tm_<owner>_<i>`; `name=value`
    /// pairs keep their name. The alignment field is optional.
    pub fn parse(line: &str, owner: &str, vocab: &Vocabulary) -> Result<Self, GrammarError> {
        let fields: Vec<&str> = line.split("|||").map(str::trim).collect();
        if fields.len() < 4 || fields.len() > 5 {
            return Err(GrammarError::InvalidRule(format!(
                "expected 4 or 5 '|||'-separated fields, got {}",
                fields.len()
            )));
        }

        let lhs = parse_label(fields[0])
            .ok_or_else(|| GrammarError::InvalidRule(format!("bad left-hand side '{}'", fields[0])))?;
        let lhs = vocab.id(lhs);

        let mut source = Vec::new();
        for tok in fields[1].split_whitespace() {
            match parse_slot(tok)? {
                Some((Some(label), n)) => source.push(Symbol::NonTerminal {
                    label: vocab.id(label),
                    index: n,
                }),
                Some((None, _)) => {
                    return Err(GrammarError::InvalidRule(format!(
                        "source slot '{tok}' needs a label"
                    )))
                }
                None => source.push(Symbol::Word(vocab.id(tok))),
            }
        }

        let mut target = Vec::new();
        for tok in fields[2].split_whitespace() {
            match parse_slot(tok)? {
                Some((_, n)) => target.push(TargetSymbol::Slot(n)),
                None => target.push(TargetSymbol::Word(vocab.id(tok))),
            }
        }

        let mut features = FeatureVector::new();
        let mut dense = 0;
        for tok in fields[3].split_whitespace() {
            match tok.split_once('=') {
                Some((name, value)) => {
                    let v: f64 = value.parse().map_err(|e| {
                        GrammarError::InvalidRule(format!("feature '{tok}': {e}"))
                    })?;
                    features.add(name, v);
                }
                None => {
                    let v: f64 = tok.parse().map_err(|e| {
                        GrammarError::InvalidRule(format!("feature '{tok}': {e}"))
                    })?;
                    features.add(&format!("tm_{owner}_{dense}"), v);
                    dense += 1;
                }
            }
        }

        let mut alignment = Vec::new();
        if let Some(field) = fields.get(4) {
            for point in field.split_whitespace() {
                let (s, t) = point.split_once('-').ok_or_else(|| {
                    GrammarError::InvalidRule(format!("bad alignment point '{point}'"))
                })?;
                let s: usize = s
                    .parse()
                    .map_err(|e| GrammarError::InvalidRule(format!("alignment '{point}': {e}")))?;
                let t: usize = t
                    .parse()
                    .map_err(|e| GrammarError::InvalidRule(format!("alignment '{point}': {e}")))?;
                alignment.push((s, t));
            }
        }

        Self::new(lhs, source, target, features, alignment, owner)
    }

    /// Number of nonterminal slots.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// A rule whose whole source side is one nonterminal.
    pub fn is_unary(&self) -> bool {
        self.source.len() == 1 && matches!(self.source[0], Symbol::NonTerminal { .. })
    }

    /// Number of terminal words on the target side.
    pub fn target_word_count(&self) -> usize {
        self.target
            .iter()
            .filter(|t| matches!(t, TargetSymbol::Word(_)))
            .count()
    }

    /// Label expected by slot `n`.
    pub fn slot_label(&self, n: usize) -> Option<WordId> {
        self.source.iter().find_map(|s| match *s {
            Symbol::NonTerminal { label, index } if index == n => Some(label),
            _ => None,
        })
    }

    /// Render back to the rule text format (without features).
    pub fn display(&self, vocab: &Vocabulary) -> String {
        let word = |id: WordId| vocab.word(id).map(|w| w.to_string()).unwrap_or_default();
        let mut out = format!("[{}] |||", word(self.lhs));
        for sym in &self.source {
            match *sym {
                Symbol::Word(w) => {
                    let _ = write!(out, " {}", word(w));
                }
                Symbol::NonTerminal { label, index } => {
                    let _ = write!(out, " [{},{}]", word(label), index + 1);
                }
            }
        }
        out.push_str(" |||");
        for sym in &self.target {
            match *sym {
                TargetSymbol::Word(w) => {
                    let _ = write!(out, " {}", word(w));
                }
                TargetSymbol::Slot(n) => {
                    let label = self.slot_label(n).map(word).unwrap_or_default();
                    let _ = write!(out, " [{},{}]", label, n + 1);
                }
            }
        }
        out
    }
}

/// `[X]` → `X`.
fn parse_label(tok: &str) -> Option<&str> {
    let inner = tok.strip_prefix('[')?.strip_suffix(']')?;
    (!inner.is_empty() && !inner.contains(',')).then_some(inner)
}

/// `[X,2]` → `(Some("X"), 1)`, `[2]` → `(None, 1)`, a plain word → `None`.
fn parse_slot(tok: &str) -> Result<Option<(Option<&str>, usize)>, GrammarError> {
    let Some(inner) = tok.strip_prefix('[').and_then(|t| t.strip_suffix(']')) else {
        return Ok(None);
    };
    let (label, n) = match inner.split_once(',') {
        Some((label, n)) => (Some(label), n),
        None => (None, inner),
    };
    let n: usize = n
        .parse()
        .map_err(|_| GrammarError::InvalidRule(format!("bad slot '{tok}'")))?;
    if n == 0 {
        return Err(GrammarError::InvalidRule(format!(
            "slot indices start at 1: '{tok}'"
        )));
    }
    Ok(Some((label, n - 1)))
}

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::vocab::{Vocabulary, WordId};

use super::{Grammar, GrammarError, Rule, Symbol, TrieId, TrieKey};

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<TrieKey, TrieId>,
    rules: Vec<Arc<Rule>>,
}

/// In-memory grammar: a trie over source sides.
#[derive(Debug)]
pub struct RuleTable {
    owner: Arc<str>,
    nodes: Vec<TrieNode>,
    unary: Vec<Arc<Rule>>,
    max_span: Option<usize>,
    rule_count: usize,
}

impl RuleTable {
    /// Build from rules. Fails if the unary rules form a label cycle.
    pub fn from_rules(
        owner: &str,
        rules: impl IntoIterator<Item = Rule>,
        vocab: &Vocabulary,
    ) -> Result<Self, GrammarError> {
        let mut table = Self {
            owner: Arc::from(owner),
            nodes: vec![TrieNode::default()],
            unary: Vec::new(),
            max_span: None,
            rule_count: 0,
        };
        let mut unary = Vec::new();
        for rule in rules {
            let rule = Arc::new(rule);
            if rule.is_unary() {
                unary.push(Arc::clone(&rule));
            }
            table.insert(rule);
        }
        table.unary = order_unary(unary, vocab)?;
        debug!(owner, rules = table.rule_count, unary = table.unary.len());
        Ok(table)
    }

    /// Parse a rule file: one rule per line, blank lines and `#` comments skipped.
    pub fn from_text(owner: &str, text: &str, vocab: &Vocabulary) -> Result<Self, GrammarError> {
        let mut rules = Vec::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let rule = Rule::parse(line, owner, vocab).map_err(|e| GrammarError::Parse {
                line: n + 1,
                reason: match e {
                    GrammarError::InvalidRule(reason) => reason,
                    other => other.to_string(),
                },
            })?;
            rules.push(rule);
        }
        Self::from_rules(owner, rules, vocab)
    }

    /// Limit the spans this grammar may cover.
    pub fn with_max_span(mut self, max_span: usize) -> Self {
        self.max_span = Some(max_span);
        self
    }

    pub fn len(&self) -> usize {
        self.rule_count
    }

    pub fn is_empty(&self) -> bool {
        self.rule_count == 0
    }

    fn insert(&mut self, rule: Arc<Rule>) {
        let mut node = 0;
        for sym in &rule.source {
            let key = sym.key();
            node = match self.nodes[node].children.get(&key) {
                Some(&child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(TrieNode::default());
                    self.nodes[node].children.insert(key, child);
                    child
                }
            };
        }
        self.nodes[node].rules.push(rule);
        self.rule_count += 1;
    }
}

impl Grammar for RuleTable {
    fn root(&self) -> TrieId {
        0
    }

    fn step(&self, node: TrieId, key: TrieKey) -> Option<TrieId> {
        self.nodes.get(node)?.children.get(&key).copied()
    }

    fn rules_matching(&self, node: TrieId) -> &[Arc<Rule>] {
        self.nodes.get(node).map(|n| n.rules.as_slice()).unwrap_or(&[])
    }

    fn unary_rules(&self) -> &[Arc<Rule>] {
        &self.unary
    }

    fn max_span(&self) -> Option<usize> {
        self.max_span
    }

    fn owner(&self) -> &str {
        &self.owner
    }
}

pub(super) fn unary_source(rule: &Rule) -> WordId {
    match rule.source[0] {
        Symbol::NonTerminal { label, .. } => label,
        Symbol::Word(w) => w,
    }
}

/// Sort unary rules by the topological rank of their source label
/// (Kahn's algorithm over label → lhs edges, smallest label id first).
/// The sort is stable, so rules sharing a source label keep their order.
pub(super) fn order_unary<T: AsRef<Rule>>(
    rules: Vec<T>,
    vocab: &Vocabulary,
) -> Result<Vec<T>, GrammarError> {
    let mut out_edges: BTreeMap<WordId, BTreeSet<WordId>> = BTreeMap::new();
    let mut in_degree: BTreeMap<WordId, usize> = BTreeMap::new();
    for rule in &rules {
        let rule = rule.as_ref();
        let from = unary_source(rule);
        in_degree.entry(from).or_insert(0);
        in_degree.entry(rule.lhs).or_insert(0);
        if out_edges.entry(from).or_default().insert(rule.lhs) {
            *in_degree.entry(rule.lhs).or_insert(0) += 1;
        }
    }

    let mut ready: BTreeSet<WordId> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&l, _)| l)
        .collect();
    let mut rank: HashMap<WordId, usize> = HashMap::new();
    while let Some(label) = ready.pop_first() {
        rank.insert(label, rank.len());
        if let Some(next) = out_edges.get(&label) {
            for &to in next {
                if let Some(d) = in_degree.get_mut(&to) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(to);
                    }
                }
            }
        }
    }

    if let Some((&label, _)) = in_degree.iter().find(|(l, _)| !rank.contains_key(*l)) {
        let name = vocab.word(label).map(|w| w.to_string()).unwrap_or_default();
        return Err(GrammarError::UnaryCycle(name));
    }

    let mut rules = rules;
    rules.sort_by_key(|r| {
        rank.get(&unary_source(r.as_ref()))
            .copied()
            .unwrap_or(usize::MAX)
    });
    Ok(rules)
}

use crate::grammar::{Grammar, TrieId, TrieKey};
use crate::vocab::WordId;

use super::cell::Cell;

/// A nonterminal already matched by a dot item: the label and the span it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotSpan {
    pub start: usize,
    pub end: usize,
    pub label: WordId,
}

/// A partial match: the trie node reached so far over `[i, j)` and the
/// nonterminals consumed on the way, in source order.
#[derive(Debug, Clone)]
pub(crate) struct DotItem {
    pub trie: TrieId,
    pub slots: Vec<SlotSpan>,
}

/// Partial rule matches of one grammar, per span.
#[derive(Debug)]
pub(crate) struct DotChart {
    len: usize,
    max_span: Option<usize>,
    items: Vec<Vec<DotItem>>,
}

impl DotChart {
    pub fn new(grammar: &dyn Grammar, len: usize) -> Self {
        let mut items = vec![Vec::new(); (len + 1) * (len + 1)];
        for i in 0..=len {
            items[i * (len + 1) + i].push(DotItem {
                trie: grammar.root(),
                slots: Vec::new(),
            });
        }
        Self {
            len,
            max_span: grammar.max_span(),
            items,
        }
    }

    fn idx(&self, i: usize, j: usize) -> usize {
        i * (self.len + 1) + j
    }

    pub fn allows(&self, width: usize) -> bool {
        self.max_span.map_or(true, |m| width <= m)
    }

    pub fn items(&self, i: usize, j: usize) -> &[DotItem] {
        &self.items[self.idx(i, j)]
    }

    /// Extend items ending before `j` into `[i, j)`: by the word at `j - 1`
    /// from items over `[i, j - 1)`, and by any label of a finished cell
    /// `[k, j)` from items over `[i, k)` with `i < k`.
    ///
    /// `cells` is laid out like the dot chart, `cells[i * (len + 1) + j]`.
    pub fn expand(
        &mut self,
        grammar: &dyn Grammar,
        words: &[WordId],
        cells: &[Cell],
        i: usize,
        j: usize,
    ) {
        if !self.allows(j - i) {
            return;
        }
        let mut grown = Vec::new();
        for k in i..j {
            for item in self.items(i, k) {
                if k + 1 == j {
                    if let Some(trie) = grammar.step(item.trie, TrieKey::Word(words[k])) {
                        grown.push(DotItem {
                            trie,
                            slots: item.slots.clone(),
                        });
                    }
                }
                if k > i {
                    let Some(cell) = cells.get(self.idx(k, j)) else {
                        continue;
                    };
                    for label in cell.labels() {
                        if let Some(trie) = grammar.step(item.trie, TrieKey::Label(label)) {
                            let mut slots = item.slots.clone();
                            slots.push(SlotSpan {
                                start: k,
                                end: j,
                                label,
                            });
                            grown.push(DotItem { trie, slots });
                        }
                    }
                }
            }
        }
        let idx = self.idx(i, j);
        self.items[idx].extend(grown);
    }

    /// Start items whose pattern opens with a nonterminal covering the finished cell `[i, j)`.
    pub fn start(&mut self, grammar: &dyn Grammar, cell: &Cell, i: usize, j: usize) {
        if !self.allows(j - i) {
            return;
        }
        let root = grammar.root();
        let started: Vec<DotItem> = cell
            .labels()
            .filter_map(|label| {
                grammar.step(root, TrieKey::Label(label)).map(|trie| DotItem {
                    trie,
                    slots: vec![SlotSpan {
                        start: i,
                        end: j,
                        label,
                    }],
                })
            })
            .collect();
        let idx = self.idx(i, j);
        self.items[idx].extend(started);
    }
}

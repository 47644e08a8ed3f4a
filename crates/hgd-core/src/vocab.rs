//! Word and label interning.
//!
//! Terminal words and nonterminal labels share one id space. Labels are
//! interned by their bare name (`X`, not `[X]`).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub type WordId = u32;

pub const START_MARKER: &str = "<s>";
pub const END_MARKER: &str = "</s>";

/// Thread-safe string interner.
///
/// Lookups take a read lock; only unseen strings take the write lock.
#[derive(Debug, Default)]
pub struct Vocabulary {
    inner: RwLock<Interner>,
}

#[derive(Debug, Default)]
struct Interner {
    ids: HashMap<Arc<str>, WordId>,
    words: Vec<Arc<str>>,
}

impl Vocabulary {
    pub fn new() -> Self {
        let vocab = Self::default();
        vocab.id(START_MARKER);
        vocab.id(END_MARKER);
        vocab
    }

    /// Id of `word`, interning it on first sight.
    pub fn id(&self, word: &str) -> WordId {
        if let Some(id) = self.get(word) {
            return id;
        }
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(&id) = inner.ids.get(word) {
            return id;
        }
        let id = inner.words.len() as WordId;
        let key: Arc<str> = Arc::from(word);
        inner.words.push(Arc::clone(&key));
        inner.ids.insert(key, id);
        id
    }

    /// Id of `word` if it was interned before.
    pub fn get(&self, word: &str) -> Option<WordId> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.ids.get(word).copied()
    }

    pub fn word(&self, id: WordId) -> Option<Arc<str>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.words.get(id as usize).cloned()
    }

    /// Space-joined surface form of `ids`. Unknown ids render as `<unk:N>`.
    pub fn words(&self, ids: &[WordId]) -> String {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut out = String::new();
        for (i, &id) in ids.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            match inner.words.get(id as usize) {
                Some(w) => out.push_str(w),
                None => out.push_str(&format!("<unk:{id}>")),
            }
        }
        out
    }

    pub fn start_marker(&self) -> WordId {
        self.id(START_MARKER)
    }

    pub fn end_marker(&self) -> WordId {
        self.id(END_MARKER)
    }

    pub fn is_marker(&self, id: WordId) -> bool {
        id == self.start_marker() || id == self.end_marker()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

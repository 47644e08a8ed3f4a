use std::sync::Arc;

use crate::vocab::{Vocabulary, WordId};

/// An input sentence: immutable token ids plus the text they came from.
#[derive(Debug, Clone)]
pub struct Sentence {
    id: usize,
    source: Arc<str>,
    words: Arc<[WordId]>,
}

impl Sentence {
    /// Whitespace-tokenize `source` and intern its words.
    pub fn new(id: usize, source: &str, vocab: &Vocabulary) -> Self {
        let words: Vec<WordId> = source.split_whitespace().map(|w| vocab.id(w)).collect();
        Self {
            id,
            source: Arc::from(source.trim()),
            words: words.into(),
        }
    }

    pub fn from_ids(id: usize, source: &str, words: Vec<WordId>) -> Self {
        Self {
            id,
            source: Arc::from(source),
            words: words.into(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// The source text, trimmed.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn words(&self) -> &[WordId] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_on_whitespace() {
        let vocab = Vocabulary::new();
        let s = Sentence::new(3, "  a  b\tc ", &vocab);
        assert_eq!(s.id(), 3);
        assert_eq!(s.len(), 3);
        assert_eq!(s.source(), "a  b\tc");
        assert_eq!(vocab.words(s.words()), "a b c");
    }

    #[test]
    fn empty_sentence() {
        let vocab = Vocabulary::new();
        let s = Sentence::new(0, "", &vocab);
        assert!(s.is_empty());
        assert_eq!(s.source(), "");
    }
}

use std::collections::HashMap;

use crate::settings::LmSettings;
use crate::vocab::{Vocabulary, WordId};

use super::{LanguageModel, LmError};

#[derive(Debug, Clone, Copy)]
struct Entry {
    logprob: f32,
    backoff: f32,
}

/// Backoff n-gram table held in memory.
///
/// Unseen n-grams back off to shorter histories; an unseen unigram scores
/// `unknown_logprob`.
#[derive(Debug, Clone)]
pub struct MemoryLm {
    order: usize,
    unknown_logprob: f32,
    entries: HashMap<Vec<WordId>, Entry>,
}

impl MemoryLm {
    pub fn new(order: usize, unknown_logprob: f32) -> Self {
        Self {
            order: order.max(1),
            unknown_logprob,
            entries: HashMap::new(),
        }
    }

    /// An empty table whose unseen unigrams score `settings.unknown_logprob`.
    pub fn from_settings(order: usize, settings: &LmSettings) -> Self {
        Self::new(order, settings.unknown_logprob)
    }

    pub fn add(&mut self, ngram: &[WordId], logprob: f32, backoff: f32) {
        self.entries
            .insert(ngram.to_vec(), Entry { logprob, backoff });
    }

    /// Convenience for whitespace-separated n-grams.
    pub fn add_words(&mut self, vocab: &Vocabulary, ngram: &str, logprob: f32, backoff: f32) {
        let ids: Vec<WordId> = ngram.split_whitespace().map(|w| vocab.id(w)).collect();
        self.add(&ids, logprob, backoff);
    }

    fn lookup(&self, ngram: &[WordId]) -> f32 {
        if let Some(e) = self.entries.get(ngram) {
            return e.logprob;
        }
        if ngram.len() == 1 {
            return self.unknown_logprob;
        }
        let history = &ngram[..ngram.len() - 1];
        let backoff = self.entries.get(history).map(|e| e.backoff).unwrap_or(0.0);
        backoff + self.lookup(&ngram[1..])
    }
}

impl LanguageModel for MemoryLm {
    fn order(&self) -> usize {
        self.order
    }

    fn logprob(&self, ngram: &[WordId]) -> Result<f32, LmError> {
        if ngram.is_empty() {
            return Err(LmError::EmptyNgram);
        }
        if ngram.len() > self.order {
            return Err(LmError::TooLong {
                len: ngram.len(),
                order: self.order,
            });
        }
        Ok(self.lookup(ngram))
    }
}

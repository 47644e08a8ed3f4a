use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::vocab::WordId;

use super::{LanguageModel, LmError};

/// Shared memo of n-gram scores, keyed by the n-gram's word ids.
///
/// Concurrent inserts of the same key keep the first value.
#[derive(Debug, Default)]
pub struct NgramCache {
    entries: RwLock<HashMap<Box<[WordId]>, f32>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl NgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ngram: &[WordId]) -> Option<f32> {
        let found = self
            .entries
            .read()
            .ok()
            .and_then(|entries| entries.get(ngram).copied());
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Returns the cached value, which is `value` unless another thread got there first.
    pub fn insert(&self, ngram: &[WordId], value: f32) -> f32 {
        match self.entries.write() {
            Ok(mut entries) => *entries.entry(ngram.into()).or_insert(value),
            Err(_) => value,
        }
    }

    /// Cached lookup against `lm`.
    pub fn logprob(&self, lm: &dyn LanguageModel, ngram: &[WordId]) -> Result<f32, LmError> {
        if let Some(v) = self.get(ngram) {
            return Ok(v);
        }
        let v = lm.logprob(ngram)?;
        Ok(self.insert(ngram, v))
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

//! N-gram language model backends.
//!
//! The decoder only needs conditional log-probabilities. File formats and
//! storage stay behind [`LanguageModel`]; [`MemoryLm`] is the in-process
//! backoff table used by tests and small setups, and [`NgramCache`] memoizes
//! lookups for any backend across worker threads.

mod cache;
mod memory;

pub use cache::NgramCache;
pub use memory::MemoryLm;

use crate::vocab::WordId;

#[derive(Debug, thiserror::Error)]
pub enum LmError {
    #[error("empty n-gram")]
    EmptyNgram,

    #[error("n-gram of length {len} exceeds model order {order}")]
    TooLong { len: usize, order: usize },

    #[error("language model backend: {0}")]
    Backend(String),
}

pub trait LanguageModel: Send + Sync {
    fn order(&self) -> usize;

    /// Log10 probability of the last word of `ngram` given the words before it.
    fn logprob(&self, ngram: &[WordId]) -> Result<f32, LmError>;
}

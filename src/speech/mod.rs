//! Incremental reply synthesis
//!
//! Splits the generation delta stream into sentence-sized units, fans each
//! unit out to the synthesis adapter the moment it is formed, and recombines
//! the results in strict index order before delivery.

mod scheduler;
mod segmenter;

pub use scheduler::{OrderingBuffer, run_scheduler};
pub use segmenter::SentenceSegmenter;

/// One sentence-sized fragment of an assistant reply
#[derive(Debug, Clone)]
pub struct SynthesisUnit {
    /// Ordering index within the current assistant turn
    pub index: usize,
    /// Fragment text
    pub text: String,
    /// Synthesized PCM, absent until synthesis completes (or failed)
    pub audio: Option<Vec<u8>>,
}

impl SynthesisUnit {
    /// A unit that has not been synthesized yet
    #[must_use]
    pub const fn pending(index: usize, text: String) -> Self {
        Self {
            index,
            text,
            audio: None,
        }
    }
}

//! Summarization Module
//!
//! The coordinator and the workers only see the `Summarizer` trait. The
//! bundled implementation is an extractive TextRank ranker; any deterministic
//! implementation can be plugged into `TaskDistributor` or `SlaveNode`.

pub mod sentences;
pub mod textrank;

pub use textrank::TextRankSummarizer;

/// Reduces `text` to roughly `ratio` of its sentences.
///
/// Implementations must be deterministic and must tolerate empty input by
/// returning it unchanged.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, text: &str, ratio: f32) -> String;
}

//! Boundary to whatever produces short text summaries.
//!
//! Used by the background pool to resolve paste descriptions after the
//! paste fragment has already been pushed.

use crate::errors::EngineError;

/// Produces a short description of a text, within a word budget.
pub trait Summarizer: Send + Sync {
    /// Summarize `text` in at most `word_budget` words.
    fn summarize(&self, text: &str, word_budget: usize) -> Result<String, EngineError>;
}

/// Fallback summarizer: the first `word_budget` words of the text.
#[derive(Debug, Default)]
pub struct TruncatingSummarizer;

impl Summarizer for TruncatingSummarizer {
    fn summarize(&self, text: &str, word_budget: usize) -> Result<String, EngineError> {
        let words: Vec<&str> = text.split_whitespace().take(word_budget + 1).collect();
        if words.len() > word_budget {
            Ok(format!("{}...", words[..word_budget].join(" ")))
        } else {
            Ok(words.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_passes_through() {
        let summary = TruncatingSummarizer.summarize("two words", 5).unwrap();
        assert_eq!(summary, "two words");
    }

    #[test]
    fn long_text_is_truncated() {
        let summary = TruncatingSummarizer
            .summarize("one two three four five six", 3)
            .unwrap();
        assert_eq!(summary, "one two three...");
    }
}

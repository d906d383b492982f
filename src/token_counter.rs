//! C1 TokenCounter (spec §4.1): deterministic token counts consistent
//! with the target model family's tokenizer.

use tiktoken_rs::CoreBPE;

/// Character-per-token ratio used by the heuristic fallback (spec §4.1).
const FALLBACK_CHARS_PER_TOKEN: usize = 4;

pub struct TokenCounter {
    encoder: Option<CoreBPE>,
}

impl TokenCounter {
    /// Builds a counter for the default model family
    /// (`cl100k_base`-compatible). Falls back to the heuristic counter
    /// if the encoder cannot be constructed.
    pub fn new() -> Self {
        Self {
            encoder: tiktoken_rs::cl100k_base().ok(),
        }
    }

    /// True when the fallback heuristic is in effect rather than the real tokenizer.
    pub fn is_fallback(&self) -> bool {
        self.encoder.is_none()
    }

    /// Counts tokens for `text`. Never used for correctness-critical
    /// limits while `is_fallback()` is true; callers in the Chunker
    /// must add the extra 20% safety margin in that case.
    pub fn count(&self, text: &str) -> usize {
        match &self.encoder {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => Self::fallback_count(text),
        }
    }

    fn fallback_count(text: &str) -> usize {
        let len = text.chars().count();
        (len + FALLBACK_CHARS_PER_TOKEN - 1) / FALLBACK_CHARS_PER_TOKEN
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_counts_zero() {
        let counter = TokenCounter::new();
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn fallback_ceil_division() {
        assert_eq!(TokenCounter::fallback_count("abcd"), 1);
        assert_eq!(TokenCounter::fallback_count("abcde"), 2);
        assert_eq!(TokenCounter::fallback_count(""), 0);
    }

    #[test]
    fn longer_text_has_more_tokens() {
        let counter = TokenCounter::new();
        let short = "hello world";
        let long = "hello world ".repeat(50);
        assert!(counter.count(&long) > counter.count(short));
    }
}

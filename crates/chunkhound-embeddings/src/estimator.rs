//! Heuristic token estimation for batch sizing
//!
//! The estimator trades accuracy for speed: an exact tokenizer per provider
//! would pin us to model internals, and the batcher's redistribution loop
//! already absorbs undercounting. Character classes are weighted the way
//! code tokenizes in practice.

/// Fixed per-item overhead added when sizing a batch (separators, special
/// tokens the provider wraps around each input)
pub const OVERHEAD_PER_ITEM: usize = 8;

/// Fast heuristic token counter
///
/// Roughly four word characters per token, with punctuation and unusual
/// characters counted close to one token each.
#[derive(Debug, Clone, Copy)]
pub struct TokenEstimator {
    chars_per_token: f64,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: 4.0,
        }
    }
}

impl TokenEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimate the token count of one text; may undercount
    pub fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let mut word_chars = 0usize;
        let mut whitespace = 0usize;
        let mut punctuation = 0usize;
        let mut other = 0usize;

        for ch in text.chars() {
            if ch.is_alphanumeric() {
                word_chars += 1;
            } else if ch.is_whitespace() {
                whitespace += 1;
            } else if ch.is_ascii_punctuation() {
                punctuation += 1;
            } else {
                other += 1;
            }
        }

        let estimated = (word_chars as f64 / self.chars_per_token)
            + (punctuation as f64 * 0.8)
            + (other as f64 * 0.9)
            + (whitespace as f64 * 0.1);

        estimated.ceil() as usize
    }

    /// Estimate the total for a batch including per-item overhead
    pub fn estimate_batch(&self, texts: &[&str]) -> usize {
        texts
            .iter()
            .map(|t| self.estimate(t) + OVERHEAD_PER_ITEM)
            .sum()
    }

    /// Byte offset that approximately splits `text` at `target_tokens`
    ///
    /// Walks characters accumulating the same per-character weights as
    /// `estimate`, preferring to land on a whitespace boundary.
    pub fn split_point(&self, text: &str, target_tokens: usize) -> usize {
        let mut weight = 0.0;
        let target = target_tokens as f64;
        let mut cut = text.len();

        for (idx, ch) in text.char_indices() {
            weight += if ch.is_alphanumeric() {
                1.0 / self.chars_per_token
            } else if ch.is_whitespace() {
                0.1
            } else if ch.is_ascii_punctuation() {
                0.8
            } else {
                0.9
            };
            if weight >= target {
                cut = idx + ch.len_utf8();
                break;
            }
        }

        // Back up to the nearest whitespace so splits don't bisect tokens
        if cut < text.len()
            && let Some(ws) = text[..cut].rfind(char::is_whitespace)
            && ws > cut / 2
        {
            return ws + 1;
        }
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero_tokens() {
        assert_eq!(TokenEstimator::new().estimate(""), 0);
    }

    #[test]
    fn estimate_scales_with_length() {
        let estimator = TokenEstimator::new();
        let short = estimator.estimate("fn main() {}");
        let long = estimator.estimate(&"fn main() {}".repeat(50));
        assert!(long > short * 20);
    }

    #[test]
    fn punctuation_increases_count() {
        let estimator = TokenEstimator::new();
        let plain = estimator.estimate("hello world again today");
        let punctuated = estimator.estimate("hello, world! again? today;");
        assert!(punctuated > plain);
    }

    #[test]
    fn batch_estimate_includes_overhead() {
        let estimator = TokenEstimator::new();
        let texts = ["abc", "def"];
        let sum: usize = texts.iter().map(|t| estimator.estimate(t)).sum();
        assert_eq!(estimator.estimate_batch(&texts), sum + 2 * OVERHEAD_PER_ITEM);
    }

    #[test]
    fn split_point_is_a_char_boundary() {
        let estimator = TokenEstimator::new();
        let text = "héllo wörld ".repeat(100);
        let cut = estimator.split_point(&text, 10);
        assert!(text.is_char_boundary(cut));
        assert!(cut > 0 && cut < text.len());
    }

    #[test]
    fn split_point_prefers_whitespace() {
        let estimator = TokenEstimator::new();
        let text = "alpha beta gamma delta epsilon zeta eta theta".repeat(4);
        let cut = estimator.split_point(&text, 6);
        assert!(text[..cut].ends_with(' '));
    }
}

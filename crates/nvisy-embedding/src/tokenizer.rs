//! Token counting.

/// Counts tokens of a text for rate limiting and cost accounting.
pub trait Tokenizer: Send + Sync {
    /// Returns the token count of `text`.
    fn count_tokens(&self, text: &str) -> u64;

    /// Returns the token count of every text combined.
    fn count_all(&self, texts: &[String]) -> u64 {
        texts.iter().map(|text| self.count_tokens(text)).sum()
    }
}

/// Approximates one token per four characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproximateTokenizer;

impl Tokenizer for ApproximateTokenizer {
    fn count_tokens(&self, text: &str) -> u64 {
        (text.chars().count() as u64).div_ceil(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approximate_count() {
        let tokenizer = ApproximateTokenizer;
        assert_eq!(tokenizer.count_tokens(""), 0);
        assert_eq!(tokenizer.count_tokens("abc"), 1);
        assert_eq!(tokenizer.count_tokens("hello world"), 3);
        assert_eq!(
            tokenizer.count_all(&["abcd".to_owned(), "abcde".to_owned()]),
            3
        );
    }
}

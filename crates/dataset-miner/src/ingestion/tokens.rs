//! Token estimation shared by the chunker and cost accounting

use once_cell::sync::Lazy;
use tiktoken_rs::CoreBPE;

static TOKENIZER: Lazy<CoreBPE> = Lazy::new(|| {
    tiktoken_rs::cl100k_base().expect("Failed to initialize cl100k_base tokenizer")
});

/// Estimate the token count of `text` with the cl100k_base encoding
pub fn count_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    TOKENIZER.encode_with_special_tokens(text).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_tokens() {
        assert_eq!(count_tokens(""), 0);
        assert_eq!(count_tokens("hello"), 1);
        assert!(count_tokens("The quick brown fox jumps over the lazy dog.") >= 9);
    }

    #[test]
    fn test_special_tokens_do_not_panic() {
        assert!(count_tokens("<|endoftext|> trailing") > 0);
    }
}

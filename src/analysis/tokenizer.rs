use crate::analysis::token::Token;
use unicode_segmentation::UnicodeSegmentation;

pub trait Tokenizer: Send + Sync {
    /// Split `text` into an ordered sequence of raw tokens on non-word
    /// character boundaries. Case folding and rejection happen later, in
    /// `Analyzer::process_token`.
    fn tokenize(&self, text: &str) -> Vec<Token>;

    fn name(&self) -> &str;
}

/// Unicode-category non-word tokenizer (spec §9's normative choice).
#[derive(Clone, Default)]
pub struct StandardTokenizer;

impl Tokenizer for StandardTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut position = 0u32;

        for word in text.unicode_words() {
            tokens.push(Token::new(word.to_string(), position));
            position += 1;
        }

        tokens
    }

    fn name(&self) -> &str {
        "standard"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_non_word_characters() {
        let tokenizer = StandardTokenizer;
        let tokens = tokenizer.tokenize("the quick-brown fox, jumps!");
        let words: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, vec!["the", "quick", "brown", "fox", "jumps"]);
    }

    #[test]
    fn positions_are_zero_based_and_sequential() {
        let tokenizer = StandardTokenizer;
        let tokens = tokenizer.tokenize("a b c");
        let positions: Vec<u32> = tokens.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }
}

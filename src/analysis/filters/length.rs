use crate::analysis::filter::TokenFilter;
use crate::analysis::token::Token;

/// Rejects tokens longer than `max_length` (spec: 25).
pub struct MaxLengthFilter {
    pub max_length: usize,
}

impl TokenFilter for MaxLengthFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens
            .into_iter()
            .filter(|token| token.text.len() <= self.max_length)
            .collect()
    }

    fn name(&self) -> &str {
        "max_length"
    }
}

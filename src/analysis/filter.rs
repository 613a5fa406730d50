use crate::analysis::token::Token;

/// A stage in the analysis pipeline. Filters run in sequence over the full
/// token list produced by the tokenizer (case folding, then rejection, then
/// stemming), mirroring the order `Analyzer::process_token` in the original
/// implementation applies them to a single token.
pub trait TokenFilter: Send + Sync {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token>;

    fn name(&self) -> &str;
}

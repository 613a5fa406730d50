use crate::analysis::filter::TokenFilter;
use crate::analysis::filters::length::MaxLengthFilter;
use crate::analysis::filters::lowercase::LowercaseFilter;
use crate::analysis::filters::stemmer::StemmerFilter;
use crate::analysis::filters::stopword::StopWordFilter;
use crate::analysis::token::Token;
use crate::analysis::tokenizer::{StandardTokenizer, Tokenizer};
use crate::core::types::Document;
use rust_stemmers::Algorithm;

/// Text analysis pipeline shared by indexing and querying (spec §4.1).
///
/// Determinism requirement: identical text must yield identical term and
/// position sequences across processes, so every stage here is a pure
/// function of its input.
pub struct Analyzer {
    tokenizer: Box<dyn Tokenizer>,
    lowercase: LowercaseFilter,
    length: MaxLengthFilter,
    stop_words: StopWordFilter,
    stemmer: Option<StemmerFilter>,
}

/// A processed term, paired with the position it occupies in the surviving
/// term stream and the earliest raw (pre-analysis) form it came from.
#[derive(Debug, Clone)]
pub struct AnalyzedTerm {
    pub term: String,
    pub raw: String,
    pub position: u32,
}

impl Analyzer {
    pub fn new(stop_words: &[String], stem: bool, max_term_length: usize) -> Self {
        Analyzer {
            tokenizer: Box::new(StandardTokenizer),
            lowercase: LowercaseFilter,
            length: MaxLengthFilter {
                max_length: max_term_length,
            },
            stop_words: StopWordFilter::new(stop_words),
            stemmer: if stem {
                Some(StemmerFilter::new(Algorithm::English))
            } else {
                None
            },
        }
    }

    pub fn tokenize(&self, text: &str) -> Vec<Token> {
        self.tokenizer.tokenize(text)
    }

    /// Case-fold a single raw token, reject it (stop word or too long), then
    /// stem it if enabled. Returns `None` for a rejected token.
    ///
    /// Order matters: case is folded *before* the stop-word check, matching
    /// `original_source/api/search/analyzer.py`'s `case_folder` running
    /// before `filter_stop`.
    pub fn process_token(&self, raw: &str) -> Option<String> {
        let token = Token::new(raw.to_string(), 0);
        let folded = self.lowercase.filter(vec![token]);
        let kept = self.length.filter(folded);
        let mut kept = self.stop_words.filter(kept);
        if let Some(stemmer) = &self.stemmer {
            kept = stemmer.filter(kept);
        }
        kept.into_iter().next().map(|t| t.text)
    }

    /// Tokenize then process, dropping rejected tokens. Positions are
    /// re-numbered over the surviving term stream (spec §4.4: "positions
    /// assigned by consuming the term stream in order"), not the raw token
    /// stream.
    pub fn process(&self, text: &str) -> Vec<AnalyzedTerm> {
        let raw_tokens = self.tokenize(text);
        let mut out = Vec::with_capacity(raw_tokens.len());
        let mut position = 0u32;
        for token in raw_tokens {
            if let Some(term) = self.process_token(&token.text) {
                out.push(AnalyzedTerm {
                    term,
                    raw: token.text,
                    position,
                });
                position += 1;
            }
        }
        out
    }

    /// Stringify all string-valued fields (list-valued fields joined by
    /// spaces) and analyze the concatenation (spec §4.1).
    pub fn process_document(&self, doc: &Document) -> Vec<AnalyzedTerm> {
        self.process(&doc.concatenated_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> Analyzer {
        Analyzer::new(&["the".to_string(), "a".to_string()], true, 25)
    }

    #[test]
    fn folds_case_before_stopword_check() {
        let a = analyzer();
        assert_eq!(a.process_token("THE"), None);
    }

    #[test]
    fn rejects_overlong_tokens() {
        let a = Analyzer::new(&[], false, 3);
        assert_eq!(a.process_token("abcd"), None);
        assert_eq!(a.process_token("abc"), Some("abc".to_string()));
    }

    #[test]
    fn stems_when_enabled() {
        let a = analyzer();
        assert_eq!(a.process_token("foxes"), Some("fox".to_string()));
    }

    #[test]
    fn deterministic_across_calls() {
        let a = analyzer();
        let text = "The quick brown fox jumps over a lazy dog";
        let first: Vec<String> = a.process(text).into_iter().map(|t| t.term).collect();
        let second: Vec<String> = a.process(text).into_iter().map(|t| t.term).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn drops_stop_words_from_position_stream() {
        let a = analyzer();
        let terms = a.process("the quick brown fox");
        assert_eq!(terms.len(), 3);
        assert_eq!(terms[0].position, 0);
        assert_eq!(terms[0].term, "quick");
    }
}

use std::collections::HashMap;

use crate::analysis::analyzer::Analyzer;
use crate::core::error::Result;
use crate::index::posting::Posting;
use crate::index::segment::Segment;

const MIN_DOC_FREQUENCY: usize = 1;

fn valid_term(term: &str) -> bool {
    !term.contains(':') && !term.is_empty() && term.chars().all(|c| c.is_alphabetic())
}

/// Two-class mutual information `I(X;Y)` between "term is one of the
/// sampled top-K postings" and "document is one of the sampled top-K
/// postings' documents" (spec §4.8). `n01` is always 0: every sampled
/// document does contain the term.
fn compute_mi(n00: f64, n10: f64, n01: f64, n11: f64) -> f64 {
    let n = n00 + n10 + n01 + n11;
    if n <= 0.0 {
        return 0.0;
    }
    let n1_ = n11 + n10;
    let n_1 = n11 + n01;
    let n0_ = n01 + n00;
    let n_0 = n10 + n00;
    let mut mi = 0.0;
    if n11 > 0.0 && n1_ > 0.0 && n_1 > 0.0 {
        mi += (n11 / n) * ((n * n11) / (n1_ * n_1)).log2();
    }
    if n01 > 0.0 && n0_ > 0.0 && n_1 > 0.0 {
        mi += (n01 / n) * ((n * n01) / (n0_ * n_1)).log2();
    }
    if n10 > 0.0 && n1_ > 0.0 && n_0 > 0.0 {
        mi += (n10 / n) * ((n * n10) / (n1_ * n_0)).log2();
    }
    if n00 > 0.0 && n0_ > 0.0 && n_0 > 0.0 {
        mi += (n00 / n) * ((n * n00) / (n0_ * n_0)).log2();
    }
    mi
}

/// Mutual-information-based related-term map, built from flushed segments
/// (spec §4.8): for every valid term with more than one document, keeps the
/// top-K postings by in-document frequency and, per document, the top-M
/// scoring terms drawn from all terms that sampled it.
pub struct TermExpander {
    max_docs_per_term: usize,
    max_terms_per_doc: usize,
    term_postings: HashMap<String, Vec<Posting>>,
    doc_terms: HashMap<u64, Vec<(String, f64)>>,
}

impl TermExpander {
    pub fn new(max_docs_per_term: usize, max_terms_per_doc: usize) -> Self {
        TermExpander {
            max_docs_per_term,
            max_terms_per_doc,
            term_postings: HashMap::new(),
            doc_terms: HashMap::new(),
        }
    }

    pub fn add_segment(&mut self, segment: &Segment) -> Result<()> {
        let num_docs = segment.number_of_documents();
        for (term, term_posting) in segment.iter_terms()? {
            let doc_frequency = term_posting.doc_frequency();
            if !valid_term(&term) || doc_frequency <= MIN_DOC_FREQUENCY {
                continue;
            }

            let mut top_postings = term_posting.postings;
            top_postings.sort_by(|a, b| b.frequency().cmp(&a.frequency()));
            top_postings.truncate(self.max_docs_per_term);

            let n11 = top_postings.len() as f64;
            let n10 = (doc_frequency as f64 - n11).max(0.0);
            let n00 = (num_docs as f64 - doc_frequency as f64).max(0.0);
            let score = compute_mi(n00, n10, 0.0, n11);

            for posting in &top_postings {
                let entry = self.doc_terms.entry(posting.doc_id.value()).or_default();
                entry.push((term.clone(), score));
                entry.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
                entry.truncate(self.max_terms_per_doc);
            }
            self.term_postings.insert(term, top_postings);
        }
        Ok(())
    }

    /// Analyzes `query`, collects the related terms of every document
    /// sampled by each query token, dedupes by term (last occurrence wins,
    /// matching the dict-based dedup of the original implementation), and
    /// returns the top `num_expansions` by score.
    pub fn expand_query(
        &self,
        analyzer: &Analyzer,
        query: &str,
        num_expansions: usize,
    ) -> Vec<(String, f64)> {
        let tokens = analyzer.process(query);
        let mut deduped: HashMap<String, f64> = HashMap::new();

        for token in tokens {
            let Some(postings) = self.term_postings.get(&token.term) else {
                continue;
            };
            for posting in postings {
                if let Some(terms) = self.doc_terms.get(&posting.doc_id.value()) {
                    for (term, score) in terms {
                        deduped.insert(term.clone(), *score);
                    }
                }
            }
        }

        let mut result: Vec<(String, f64)> = deduped.into_iter().collect();
        result.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        result.truncate(num_expansions);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DocId;
    use tempfile::tempdir;

    fn build_segment() -> Segment {
        let dir = tempdir().unwrap();
        let mut segment = Segment::new("seg-1", dir.path().to_path_buf(), vec![], 2000);
        for (doc, words) in [
            (1u64, vec!["neural", "network", "training"]),
            (2, vec!["neural", "network", "inference"]),
            (3, vec!["gradient", "descent", "optimizer"]),
        ] {
            let terms: Vec<(String, String)> =
                words.into_iter().map(|w| (w.to_string(), w.to_string())).collect();
            segment
                .add_document(DocId(doc), &terms, std::collections::HashMap::new())
                .unwrap();
        }
        segment.flush().unwrap();
        segment
    }

    #[test]
    fn terms_appearing_once_are_skipped() {
        let segment = build_segment();
        let mut expander = TermExpander::new(1000, 5);
        expander.add_segment(&segment).unwrap();
        assert!(!expander.term_postings.contains_key("training"));
        assert!(expander.term_postings.contains_key("neural"));
    }

    #[test]
    fn expand_query_finds_related_terms() {
        let segment = build_segment();
        let mut expander = TermExpander::new(1000, 5);
        expander.add_segment(&segment).unwrap();

        let analyzer = Analyzer::new(&[], false, 25);
        let expansions = expander.expand_query(&analyzer, "neural", 3);
        let terms: Vec<&str> = expansions.iter().map(|(t, _)| t.as_str()).collect();
        assert!(terms.contains(&"network"));
    }
}

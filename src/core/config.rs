use std::path::PathBuf;

/// Runtime configuration for an `Index`, its `Analyzer`, and its
/// `Suggester`/`TermExpander` rebuild passes.
#[derive(Debug, Clone)]
pub struct Config {
    pub storage_path: PathBuf,

    /// Segment roll-over threshold (spec: default 2000).
    pub max_docs_per_segment: usize,

    pub enable_stemming: bool,
    pub max_term_length: usize,
    pub stop_words: Vec<String>,

    /// Fields stored in per-segment doc-value stores and eligible for
    /// faceting (spec §4.4, §6's `subject` field).
    pub doc_value_fields: Vec<String>,

    pub default_max_results: usize,
    pub default_num_facet_values: usize,

    pub suggester_max_results: usize,

    pub expander_max_docs_per_term: usize,
    pub expander_max_terms_per_doc: usize,
    pub expander_num_expansions: usize,

    pub ann_capacity: usize,
    pub ann_dimensions: usize,
    pub ann_max_distance: f32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: PathBuf::from("./data"),
            max_docs_per_segment: 2000,

            enable_stemming: true,
            max_term_length: 25,
            stop_words: default_stop_words(),
            doc_value_fields: vec!["subject".to_string()],

            default_max_results: 10,
            default_num_facet_values: 10,

            suggester_max_results: 5,

            expander_max_docs_per_term: 1000,
            expander_max_terms_per_doc: 5,
            expander_num_expansions: 3,

            ann_capacity: 500_000,
            ann_dimensions: 768,
            ann_max_distance: 0.8,
        }
    }
}

fn default_stop_words() -> Vec<String> {
    [
        "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is",
        "it", "its", "of", "on", "that", "the", "to", "was", "will", "with",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

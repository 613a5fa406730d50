use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::types::FieldValue;

fn default_true() -> bool {
    true
}

fn default_max_results() -> usize {
    10
}

/// A single `{field, num_values}` facet request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacetRequest {
    pub field: String,
    pub num_values: usize,
}

/// A single `{field, value}` filter clause, AND-joined onto the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterClause {
    pub field: String,
    pub value: String,
}

/// Query request shape, as decoded at the external boundary (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_true")]
    pub score: bool,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub facets: Vec<FacetRequest>,
    #[serde(default)]
    pub filters: Vec<FilterClause>,
    #[serde(default)]
    pub vector_score: f64,
}

impl Default for QueryRequest {
    fn default() -> Self {
        QueryRequest {
            query: String::new(),
            max_results: default_max_results(),
            offset: 0,
            score: true,
            fields: Vec::new(),
            facets: Vec::new(),
            filters: Vec::new(),
            vector_score: 0.0,
        }
    }
}

/// A single search hit in a `QueryResponse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitResponse {
    pub id: String,
    pub score: f64,
    pub fields: HashMap<String, FieldValue>,
}

/// Response shape returned by `Index::search` after resolving internal ids
/// and projecting the requested field subset (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub hits: Vec<HitResponse>,
    pub total_hits: usize,
    pub facets: HashMap<String, HashMap<String, usize>>,
    pub time_elapsed: f64,
    pub request_id: String,
}

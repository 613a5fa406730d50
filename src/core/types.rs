use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Internal document id. `0` is reserved as the "no document" sentinel used
/// to represent a stop-word-only term lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u64);

impl DocId {
    pub const NONE: DocId = DocId(0);

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for DocId {
    fn from(id: u64) -> Self {
        DocId(id)
    }
}

/// A field's value as presented at ingest: either a single string or a list
/// of strings (joined with spaces for analysis, kept as a list for facets).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Concatenation used for text analysis.
    pub fn as_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::List(values) => values.join(" "),
        }
    }

    /// Raw values used for doc-value/facet storage.
    pub fn as_values(&self) -> Vec<String> {
        match self {
            FieldValue::Text(s) => vec![s.clone()],
            FieldValue::List(values) => values.clone(),
        }
    }
}

/// Document as submitted to the index. `external_id` is caller-provided and
/// must be unique; `vector` is optional dense embedding handed to the ANN
/// collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub external_id: String,
    pub fields: HashMap<String, FieldValue>,
    #[serde(default)]
    pub vector: Vec<f32>,
}

impl Document {
    pub fn new(external_id: impl Into<String>) -> Self {
        Document {
            external_id: external_id.into(),
            fields: HashMap::new(),
            vector: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Concatenation of all string-valued fields, used for text analysis
    /// (spec §4.1 `process_document`). Field iteration order is arbitrary;
    /// only tokenization of the combined text matters.
    pub fn concatenated_text(&self) -> String {
        self.fields
            .values()
            .map(|v| v.as_text())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A single search hit, resolved back to the caller's external id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    pub id: String,
    pub score: f64,
    pub fields: HashMap<String, FieldValue>,
}

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ann::{AnnCollaborator, HnswAnn};
use crate::analysis::analyzer::Analyzer;
use crate::concurrency::WriterPreferringLock;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::types::{Document, FieldValue, Hit};
use crate::index::posting::TermPosting;
use crate::index::segment::Segment;
use crate::query::executor::{self, ExecuteOptions, IndexContext};
use crate::query::parse_query;
use crate::request::{HitResponse, QueryRequest, QueryResponse};
use crate::search::{Suggester, TermExpander};
use crate::storage::DocumentStore;
use parking_lot::RwLock;

use crate::core::types::DocId;

const METADATA_FILE: &str = "index.idb";
const ANN_FILE: &str = "index.hnsw";

/// Mutable bookkeeping the Index write-lock guards: the external/internal id
/// bimap and the next internal id to assign (spec §3, §5).
struct IndexState {
    external_to_internal: HashMap<String, DocId>,
    internal_to_external: HashMap<DocId, String>,
    current_doc_id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SegmentMetadata {
    id: String,
    min_doc_id: Option<u64>,
    max_doc_id: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexMetadata {
    segments: Vec<SegmentMetadata>,
    external_to_internal: HashMap<String, u64>,
    current_doc_id: u64,
    doc_value_fields: Vec<String>,
}

/// A single ingested document's indexing outcome, reported per-line for
/// bulk ingest (spec §6, §7: "external-id collisions in bulk ingest are
/// converted to per-document failure strings rather than raising").
pub enum IngestOutcome {
    Indexed(DocId),
    Failed(String, Error),
}

/// Top-level orchestrator owning the segment chain, id bimap, document
/// store, and collaborators (spec §4.5). Segments are oldest-first and
/// cover disjoint, adjacent internal-id ranges.
pub struct Index {
    storage_path: PathBuf,
    config: Config,
    analyzer: Analyzer,
    doc_store: DocumentStore,
    ann: Option<Box<dyn AnnCollaborator>>,

    state: WriterPreferringLock<IndexState>,
    segments: WriterPreferringLock<Vec<Segment>>,
    merge_lock: WriterPreferringLock<()>,

    suggester: RwLock<Suggester>,
    expander: RwLock<TermExpander>,
}

impl Index {
    pub fn open(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.storage_path)?;
        let doc_store = DocumentStore::open(config.storage_path.join("docs.db"))?;
        let analyzer = Analyzer::new(&config.stop_words, config.enable_stemming, config.max_term_length);
        let ann: Option<Box<dyn AnnCollaborator>> =
            Some(Box::new(HnswAnn::new(config.ann_capacity, config.ann_dimensions)));

        let mut index = Index {
            storage_path: config.storage_path.clone(),
            ann,
            state: WriterPreferringLock::new(IndexState {
                external_to_internal: HashMap::new(),
                internal_to_external: HashMap::new(),
                current_doc_id: 1,
            }),
            segments: WriterPreferringLock::new(Vec::new()),
            merge_lock: WriterPreferringLock::new(()),
            suggester: RwLock::new(Suggester::new()),
            expander: RwLock::new(TermExpander::new(
                config.expander_max_docs_per_term,
                config.expander_max_terms_per_doc,
            )),
            doc_store,
            analyzer,
            config,
        };

        if index.metadata_path().exists() {
            index.load()?;
        }
        Ok(index)
    }

    fn metadata_path(&self) -> PathBuf {
        self.storage_path.join(METADATA_FILE)
    }

    fn ann_path(&self) -> PathBuf {
        self.storage_path.join(ANN_FILE)
    }

    fn new_segment_id() -> String {
        let unix_ms = Utc::now().timestamp_millis();
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}_{}", unix_ms, &suffix[..4])
    }

    /// Analyzes `doc`'s concatenated text, dropping tokens the analyzer
    /// rejects (stop words, overlong tokens) entirely (spec §4.1).
    fn analyze_for_indexing(&self, doc: &Document) -> Vec<(String, String)> {
        let text = doc.concatenated_text();
        let mut terms = Vec::new();
        for token in self.analyzer.tokenize(&text) {
            if let Some(term) = self.analyzer.process_token(&token.text) {
                terms.push((term, token.text));
            }
        }
        terms
    }

    fn collect_doc_values(&self, doc: &Document) -> HashMap<String, Vec<String>> {
        self.config
            .doc_value_fields
            .iter()
            .filter_map(|field| doc.fields.get(field).map(|v| (field.clone(), v.as_values())))
            .collect()
    }

    /// Returns the index of the segment documents should currently be
    /// appended to, creating one if needed (spec §4.5): no segments exist,
    /// the last is flushed, or the last lacks capacity.
    fn writable_segment_index(&self, segments: &mut Vec<Segment>) -> Result<usize> {
        if let Some(last) = segments.last() {
            if !last.is_flushed() && last.has_buffer_capacity() {
                return Ok(segments.len() - 1);
            }
            if !last.is_flushed() {
                segments.last_mut().unwrap().flush()?;
            }
        }
        let id = Self::new_segment_id();
        segments.push(Segment::new(
            id,
            &self.storage_path,
            self.config.doc_value_fields.clone(),
            self.config.max_docs_per_segment,
        ));
        Ok(segments.len() - 1)
    }

    /// Indexes a single document (spec §4.5, §5). The id bimap is guarded by
    /// the Index write-lock for the whole call, but the segment buffer write
    /// itself only needs the segment-update read-lock plus that segment's own
    /// indexing-lock, so it never excludes concurrent searches. Fails without
    /// mutating state on a duplicate external id.
    pub fn add_document(&self, doc: Document) -> Result<DocId> {
        let mut state = self.state.write();
        if state.external_to_internal.contains_key(&doc.external_id) {
            return Err(Error::index(format!(
                "duplicate external id: {}",
                doc.external_id
            )));
        }

        let doc_id = DocId(state.current_doc_id);
        let terms = self.analyze_for_indexing(&doc);
        let doc_values = self.collect_doc_values(&doc);

        let segments = self.segments.read();
        let has_room = segments
            .last()
            .is_some_and(|last| !last.is_flushed() && last.has_buffer_capacity());
        if has_room {
            segments
                .last()
                .unwrap()
                .add_document(doc_id, &terms, doc_values)?;
        } else {
            drop(segments);
            let mut segments = self.segments.write();
            let idx = self.writable_segment_index(&mut segments)?;
            segments[idx].add_document(doc_id, &terms, doc_values)?;
        }

        self.doc_store.put(&doc)?;

        if !doc.vector.is_empty() {
            if let Some(ann) = &self.ann {
                ann.add_items(&[doc.vector.clone()], &[doc_id.value()])?;
            }
        }

        state.current_doc_id += 1;
        state
            .external_to_internal
            .insert(doc.external_id.clone(), doc_id);
        state.internal_to_external.insert(doc_id, doc.external_id);
        Ok(doc_id)
    }

    /// Indexes every document, reporting per-document failures instead of
    /// aborting the batch (spec §6, §7).
    pub fn add_documents(&self, docs: Vec<Document>) -> Vec<IngestOutcome> {
        docs.into_iter()
            .map(|doc| {
                let external_id = doc.external_id.clone();
                match self.add_document(doc) {
                    Ok(id) => IngestOutcome::Indexed(id),
                    Err(err) => IngestOutcome::Failed(external_id, err),
                }
            })
            .collect()
    }

    /// Flushes the last segment if unflushed, syncs the document store,
    /// snapshots metadata, and persists the ANN collaborator.
    pub fn save(&self) -> Result<()> {
        let state = self.state.write();
        {
            let mut segments = self.segments.write();
            if let Some(last) = segments.last_mut() {
                if !last.is_flushed() {
                    last.flush()?;
                }
            }
        }
        self.doc_store.sync()?;

        let segments = self.segments.read();
        let metadata = IndexMetadata {
            segments: segments
                .iter()
                .map(|s| SegmentMetadata {
                    id: s.segment_id.clone(),
                    min_doc_id: s.min_doc_id().map(|d| d.value()),
                    max_doc_id: s.max_doc_id().map(|d| d.value()),
                })
                .collect(),
            external_to_internal: state
                .external_to_internal
                .iter()
                .map(|(k, v)| (k.clone(), v.value()))
                .collect(),
            current_doc_id: state.current_doc_id,
            doc_value_fields: self.config.doc_value_fields.clone(),
        };
        let encoded = bincode::serialize(&metadata)?;
        std::fs::write(self.metadata_path(), encoded)?;

        if let Some(ann) = &self.ann {
            std::fs::create_dir_all(self.ann_path())?;
            ann.persist(&self.ann_path())?;
        }
        println!(
            "index saved: {} segments, {} documents",
            metadata.segments.len(),
            metadata.current_doc_id.saturating_sub(1)
        );
        Ok(())
    }

    /// Inverse of `save`: reopens segment stores lazily by reconstructing
    /// empty `Segment` shells over the files already on disk.
    pub fn load(&mut self) -> Result<()> {
        let bytes = std::fs::read(self.metadata_path())?;
        let metadata: IndexMetadata = bincode::deserialize(&bytes)?;

        let mut segments = Vec::with_capacity(metadata.segments.len());
        for meta in metadata.segments {
            segments.push(Segment::open_flushed(
                meta.id,
                &self.storage_path,
                metadata.doc_value_fields.clone(),
                self.config.max_docs_per_segment,
                meta.min_doc_id.map(DocId),
                meta.max_doc_id.map(DocId),
            ));
        }
        *self.segments.write() = segments;

        let mut state = self.state.write();
        state.external_to_internal = metadata
            .external_to_internal
            .iter()
            .map(|(k, v)| (k.clone(), DocId(*v)))
            .collect();
        state.internal_to_external = metadata
            .external_to_internal
            .into_iter()
            .map(|(k, v)| (DocId(v), k))
            .collect();
        state.current_doc_id = metadata.current_doc_id;
        drop(state);

        if self.ann_path().exists() {
            if let Some(ann) = &self.ann {
                ann.restore(&self.ann_path())?;
            }
        }
        println!("index loaded from {}", self.storage_path.display());
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.save()
    }

    /// Parses and evaluates `query`, resolving internal ids back to
    /// external ids and projecting the requested field subset.
    pub fn search(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let node = parse_query(&request.query)?;
        let options = ExecuteOptions {
            filters: request.filters.clone(),
            score: request.score,
            max_results: request.max_results,
            offset: request.offset,
            facets: request.facets.clone(),
            query_vector: None,
            max_distance: self.config.ann_max_distance,
        };
        let result = executor::execute(self, &node, &options)?;

        let state = self.state.read();
        let mut hits = Vec::with_capacity(result.hits.len());
        for (doc_id, score) in result.hits {
            let Some(external_id) = state.internal_to_external.get(&doc_id) else {
                continue;
            };
            let doc = self.doc_store.get(external_id)?;
            let fields = match doc {
                Some(doc) => project_fields(&doc.fields, &request.fields),
                None => HashMap::new(),
            };
            hits.push(HitResponse {
                id: external_id.clone(),
                score,
                fields,
            });
        }

        Ok(QueryResponse {
            hits,
            total_hits: result.total,
            facets: result.facets,
            time_elapsed: 0.0,
            request_id: Uuid::new_v4().to_string(),
        })
    }

    /// Resolves a hit back to a full `Hit` (external id, score, all
    /// fields), used by callers that bypass the `QueryRequest`/`QueryResponse`
    /// wire shape.
    pub fn resolve_hit(&self, doc_id: DocId, score: f64) -> Result<Option<Hit>> {
        let state = self.state.read();
        let Some(external_id) = state.internal_to_external.get(&doc_id).cloned() else {
            return Ok(None);
        };
        drop(state);
        Ok(self.doc_store.get(&external_id)?.map(|doc| Hit {
            id: external_id,
            score,
            fields: doc.fields,
        }))
    }

    fn get_term_with(&self, term: &str, with_positions: bool) -> Result<TermPosting> {
        let segments = self.segments.read();
        let mut combined: Option<TermPosting> = None;
        for segment in segments.iter() {
            if let Some(tp) = segment.get_term(term, with_positions)? {
                combined = Some(match combined {
                    None => tp,
                    Some(mut acc) => {
                        acc.add_term_info(&tp, true);
                        acc
                    }
                });
            }
        }
        Ok(combined.unwrap_or_else(|| TermPosting::new(term)))
    }

    /// Finds the unique segment whose doc-id range contains `doc_id` and
    /// returns its doc-values for `field` (spec §4.5).
    fn get_doc_values_for(&self, field: &str, doc_id: DocId) -> Result<Vec<String>> {
        let segments = self.segments.read();
        for segment in segments.iter() {
            if segment.contains_doc(doc_id) {
                return segment.get_doc_values(field, doc_id);
            }
        }
        Ok(Vec::new())
    }

    /// Merges the adjacent flushed-segment pair with the smallest combined
    /// document count into one (spec §4.5). No-op if fewer than two
    /// adjacent flushed segments exist.
    pub fn optimize(&self) -> Result<()> {
        let _merge_guard = self.merge_lock.write();

        let merge_target = {
            let segments = self.segments.read();
            let mut best: Option<(usize, usize)> = None;
            for i in 0..segments.len().saturating_sub(1) {
                let (left, right) = (&segments[i], &segments[i + 1]);
                if !left.is_flushed() || !right.is_flushed() {
                    continue;
                }
                let combined = left.number_of_documents() + right.number_of_documents();
                if best.map(|(_, best_combined)| combined < best_combined).unwrap_or(true) {
                    best = Some((i, combined));
                }
            }
            best.map(|(i, _)| i)
        };

        let Some(i) = merge_target else {
            return Ok(());
        };

        let new_id = Self::new_segment_id();
        let merged = {
            let segments = self.segments.read();
            Segment::merge(&segments[i], &segments[i + 1], new_id, &self.storage_path)?
        };

        {
            let mut segments = self.segments.write();
            let left = segments.remove(i);
            let right = segments.remove(i);
            segments.insert(i, merged);
            left.delete()?;
            right.delete()?;
        }
        println!("optimize: merged segments at index {} and {}", i, i + 1);
        Ok(())
    }

    /// Saves, then rebuilds the Suggester from every segment.
    pub fn update_suggester(&self) -> Result<()> {
        self.save()?;
        let segments = self.segments.read();
        let mut suggester = Suggester::new();
        for (i, segment) in segments.iter().enumerate() {
            suggester.add_segment(segment, i == 0)?;
        }
        suggester.build()?;
        *self.suggester.write() = suggester;
        println!("suggester rebuilt from {} segments", segments.len());
        Ok(())
    }

    /// Saves, then rebuilds the TermExpander from every segment.
    pub fn update_expansions(&self) -> Result<()> {
        self.save()?;
        let segments = self.segments.read();
        let mut expander = TermExpander::new(
            self.config.expander_max_docs_per_term,
            self.config.expander_max_terms_per_doc,
        );
        for segment in segments.iter() {
            expander.add_segment(segment)?;
        }
        *self.expander.write() = expander;
        println!("term expander rebuilt from {} segments", segments.len());
        Ok(())
    }

    /// Number of segments currently in the chain, flushed or not.
    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    pub fn suggest(&self, query_text: &str, max_results: Option<usize>) -> Vec<String> {
        self.suggester.read().suggest(query_text, max_results)
    }

    pub fn expand_query(&self, query: &str) -> Vec<(String, f64)> {
        self.expander
            .read()
            .expand_query(&self.analyzer, query, self.config.expander_num_expansions)
    }
}

fn project_fields(
    fields: &HashMap<String, FieldValue>,
    requested: &[String],
) -> HashMap<String, FieldValue> {
    if requested.is_empty() {
        return fields.clone();
    }
    requested
        .iter()
        .filter_map(|name| fields.get(name).map(|v| (name.clone(), v.clone())))
        .collect()
}

impl IndexContext for Index {
    fn get_term(&self, term: &str, with_positions: bool) -> Result<TermPosting> {
        self.get_term_with(term, with_positions)
    }

    fn document_count(&self) -> usize {
        self.state.read().current_doc_id.saturating_sub(1) as usize
    }

    fn next_doc_id(&self) -> u64 {
        self.state.read().current_doc_id
    }

    fn get_doc_values(&self, field: &str, doc_id: DocId) -> Result<Vec<String>> {
        self.get_doc_values_for(field, doc_id)
    }

    fn process_token(&self, raw: &str) -> Option<String> {
        self.analyzer.process_token(raw)
    }

    fn ann(&self) -> Option<&dyn AnnCollaborator> {
        self.ann.as_deref()
    }
}

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::core::error::{Error, Result};
use crate::core::types::DocId;
use crate::index::posting::TermPosting;
use crate::storage::store::Store;

/// An immutable-once-flushed horizontal partition of the index, covering a
/// contiguous range of internal doc-ids (spec §3, §4.4).
///
/// Before flush, terms accumulate in `buffer`. `flush` drains the buffer in
/// sorted term order into the positions and postings-only stores, after
/// which the segment is append-only from the stores' point of view.
pub struct Segment {
    pub segment_id: String,
    storage_path: PathBuf,
    doc_value_fields: Vec<String>,
    max_docs: usize,

    min_doc_id: RwLock<Option<DocId>>,
    max_doc_id: RwLock<Option<DocId>>,

    buffer: RwLock<Option<BTreeMap<String, TermPosting>>>,
    doc_value_buffer: RwLock<Vec<(DocId, HashMap<String, Vec<String>>)>>,

    positions_store: RwLock<Option<Store>>,
    postings_only_store: RwLock<Option<Store>>,
    doc_value_stores: RwLock<HashMap<String, Store>>,

    indexing_lock: RwLock<()>,
    flush_lock: RwLock<()>,
}

impl Segment {
    pub fn new(
        segment_id: impl Into<String>,
        storage_path: impl AsRef<Path>,
        doc_value_fields: Vec<String>,
        max_docs: usize,
    ) -> Self {
        Segment {
            segment_id: segment_id.into(),
            storage_path: storage_path.as_ref().to_path_buf(),
            doc_value_fields,
            max_docs,
            min_doc_id: RwLock::new(None),
            max_doc_id: RwLock::new(None),
            buffer: RwLock::new(Some(BTreeMap::new())),
            doc_value_buffer: RwLock::new(Vec::new()),
            positions_store: RwLock::new(None),
            postings_only_store: RwLock::new(None),
            doc_value_stores: RwLock::new(HashMap::new()),
            indexing_lock: RwLock::new(()),
            flush_lock: RwLock::new(()),
        }
    }

    /// Reconstructs a shell over an already-flushed segment's files on
    /// disk (spec §4.5 `Index.load`): stores are reopened lazily on first
    /// lookup, same as a freshly-flushed segment.
    pub fn open_flushed(
        segment_id: impl Into<String>,
        storage_path: impl AsRef<Path>,
        doc_value_fields: Vec<String>,
        max_docs: usize,
        min_doc_id: Option<DocId>,
        max_doc_id: Option<DocId>,
    ) -> Self {
        let segment = Segment::new(segment_id, storage_path, doc_value_fields, max_docs);
        *segment.min_doc_id.write() = min_doc_id;
        *segment.max_doc_id.write() = max_doc_id;
        *segment.buffer.write() = None;
        segment
    }

    fn positions_path(&self) -> PathBuf {
        self.storage_path.join(format!("{}.pos", self.segment_id))
    }

    fn postings_only_path(&self) -> PathBuf {
        self.storage_path.join(format!("{}.pot", self.segment_id))
    }

    fn doc_value_path(&self, field: &str) -> PathBuf {
        self.storage_path
            .join(format!("{}-{}.dv", self.segment_id, field))
    }

    pub fn is_flushed(&self) -> bool {
        self.buffer.read().is_none()
    }

    pub fn has_buffer_capacity(&self) -> bool {
        self.number_of_documents() < self.max_docs
    }

    pub fn min_doc_id(&self) -> Option<DocId> {
        *self.min_doc_id.read()
    }

    pub fn max_doc_id(&self) -> Option<DocId> {
        *self.max_doc_id.read()
    }

    pub fn number_of_documents(&self) -> usize {
        match (self.min_doc_id(), self.max_doc_id()) {
            (Some(min), Some(max)) => (max.value() - min.value() + 1) as usize,
            _ => 0,
        }
    }

    pub fn contains_doc(&self, doc_id: DocId) -> bool {
        match (self.min_doc_id(), self.max_doc_id()) {
            (Some(min), Some(max)) => doc_id >= min && doc_id <= max,
            _ => false,
        }
    }

    /// Appends a single document's (term, raw_token) stream to the buffer,
    /// guarded only by this segment's own indexing-lock (spec §4.4, §5) so a
    /// reader holding the Index's segment-update read-lock can still look up
    /// other segments' terms concurrently with this write. Positions start at
    /// 0 for each document because each `Posting` keeps its own position
    /// stream (spec §4.4).
    pub fn add_document(
        &self,
        doc_id: DocId,
        terms: &[(String, String)],
        doc_values: HashMap<String, Vec<String>>,
    ) -> Result<()> {
        let _guard = self.indexing_lock.write();
        let mut buffer = self.buffer.write();
        let buffer = buffer
            .as_mut()
            .ok_or_else(|| Error::index("cannot add document to a flushed segment"))?;

        let mut position = 0u32;
        for (term, raw) in terms {
            let entry = buffer
                .entry(term.clone())
                .or_insert_with(|| TermPosting::new(raw.clone()));
            entry.add_position(doc_id, position);
            position += 1;
        }
        drop(buffer);

        self.doc_value_buffer.write().push((doc_id, doc_values));

        let mut min_doc_id = self.min_doc_id.write();
        *min_doc_id = Some(min_doc_id.map_or(doc_id, |m| m.min(doc_id)));
        drop(min_doc_id);
        let mut max_doc_id = self.max_doc_id.write();
        *max_doc_id = Some(max_doc_id.map_or(doc_id, |m| m.max(doc_id)));
        Ok(())
    }

    /// Looks up a term's posting information. Reads the live buffer before
    /// flush; after flush, reads from the on-disk stores.
    pub fn get_term(
        &self,
        term: &str,
        with_positions: bool,
    ) -> Result<Option<TermPosting>> {
        let _flush_guard = self.flush_lock.read();
        let buffer = self.buffer.read();
        if let Some(buffer) = buffer.as_ref() {
            return Ok(buffer.get(term).cloned());
        }
        drop(buffer);

        if with_positions {
            let mut store = self.positions_store.write();
            let store = self.ensure_positions_store(&mut store)?;
            match store.get(term)? {
                Some(data) => Ok(Some(TermPosting::from_store_format(&data)?)),
                None => Ok(None),
            }
        } else {
            let mut store = self.postings_only_store.write();
            let store = self.ensure_postings_only_store(&mut store)?;
            match store.get(term)? {
                Some(data) => Ok(Some(TermPosting::from_store_format(&data)?)),
                None => Ok(None),
            }
        }
    }

    pub fn get_doc_values(&self, field: &str, doc_id: DocId) -> Result<Vec<String>> {
        if !self.contains_doc(doc_id) || !self.doc_value_fields.iter().any(|f| f == field) {
            return Ok(Vec::new());
        }

        {
            let buffer = self.doc_value_buffer.read();
            if let Some((_, values)) = buffer.iter().find(|(id, _)| *id == doc_id) {
                return Ok(values.get(field).cloned().unwrap_or_default());
            }
        }

        let mut stores = self.doc_value_stores.write();
        if !stores.contains_key(field) {
            let store = Store::open(self.doc_value_path(field))?;
            stores.insert(field.to_string(), store);
        }
        let store = stores.get_mut(field).unwrap();
        match store.get(&doc_id.value().to_string())? {
            Some(data) => Ok(serde_json::from_str(&data)?),
            None => Ok(Vec::new()),
        }
    }

    fn ensure_positions_store<'a>(
        &self,
        guard: &'a mut Option<Store>,
    ) -> Result<&'a mut Store> {
        if guard.is_none() {
            *guard = Some(Store::open(self.positions_path())?);
        }
        Ok(guard.as_mut().unwrap())
    }

    fn ensure_postings_only_store<'a>(
        &self,
        guard: &'a mut Option<Store>,
    ) -> Result<&'a mut Store> {
        if guard.is_none() {
            *guard = Some(Store::open(self.postings_only_path())?);
        }
        Ok(guard.as_mut().unwrap())
    }

    /// Drains the buffer in sorted term order into both on-disk stores, then
    /// marks the segment flushed. On failure, both stores are reset to empty
    /// so no partial segment is ever observable (spec §4.4, §7).
    pub fn flush(&mut self) -> Result<()> {
        let _flush_guard = self.flush_lock.write();

        let terms: Vec<(String, TermPosting)> = {
            let mut buffer = self.buffer.write();
            match buffer.take() {
                Some(map) => map.into_iter().collect(),
                None => return Ok(()),
            }
        };

        let term_count = terms.len();
        let result = self.write_stores(&terms);
        if result.is_err() {
            self.reset_stores()?;
            let mut buffer = self.buffer.write();
            *buffer = Some(terms.into_iter().collect());
            return result;
        }

        self.flush_doc_values()?;
        println!(
            "segment {}: flushed {} terms",
            self.segment_id, term_count
        );
        Ok(())
    }

    fn write_stores(&self, terms: &[(String, TermPosting)]) -> Result<()> {
        let mut positions_store = Store::open(self.positions_path())?;
        let mut postings_only_store = Store::open(self.postings_only_path())?;

        for (term, posting) in terms {
            positions_store.set(term, &posting.to_store_format(true))?;
            postings_only_store.set(term, &posting.to_store_format(false))?;
        }

        *self.positions_store.write() = Some(positions_store);
        *self.postings_only_store.write() = Some(postings_only_store);
        Ok(())
    }

    fn flush_doc_values(&self) -> Result<()> {
        let entries: Vec<(DocId, HashMap<String, Vec<String>>)> =
            self.doc_value_buffer.write().drain(..).collect();

        for field in self.doc_value_fields.clone() {
            let mut store = Store::open(self.doc_value_path(&field))?;
            for (doc_id, values) in &entries {
                if let Some(field_values) = values.get(&field) {
                    let encoded = serde_json::to_string(field_values)?;
                    store.set(&doc_id.value().to_string(), &encoded)?;
                }
            }
            self.doc_value_stores.write().insert(field, store);
        }
        Ok(())
    }

    fn reset_stores(&self) -> Result<()> {
        if let Some(store) = self.positions_store.write().as_mut() {
            store.clear()?;
        }
        if let Some(store) = self.postings_only_store.write().as_mut() {
            store.clear()?;
        }
        Ok(())
    }

    /// Every term present in this segment (buffer or flushed store),
    /// consumed by the Suggester and TermExpander.
    pub fn iter_terms(&self) -> Result<Vec<(String, TermPosting)>> {
        let buffer = self.buffer.read();
        if let Some(buffer) = buffer.as_ref() {
            return Ok(buffer.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
        }
        drop(buffer);

        let mut store = self.postings_only_store.write();
        let store = self.ensure_postings_only_store(&mut store)?;
        store
            .iterate()?
            .into_iter()
            .map(|(term, data)| Ok((term, TermPosting::from_store_format(&data)?)))
            .collect()
    }

    /// Merges two adjacent flushed segments into a new one covering their
    /// combined doc-id range (spec §4.4). Positions and postings-only
    /// stores are merged by a linear two-pointer walk over the sorted term
    /// streams, combining same-term `TermPosting`s via `add_term_info`.
    pub fn merge(
        left: &Segment,
        right: &Segment,
        new_segment_id: impl Into<String>,
        storage_path: impl AsRef<Path>,
    ) -> Result<Segment> {
        if !left.is_flushed() || !right.is_flushed() {
            return Err(Error::merge("both segments must be flushed before merging"));
        }
        if left.max_doc_id().unwrap_or(DocId::NONE) >= right.min_doc_id().unwrap_or(DocId::NONE) {
            return Err(Error::merge(
                "left segment's doc-ids must precede right segment's",
            ));
        }

        let mut left_terms = left.iter_terms()?;
        let mut right_terms = right.iter_terms()?;
        left_terms.sort_by(|a, b| a.0.cmp(&b.0));
        right_terms.sort_by(|a, b| a.0.cmp(&b.0));

        let mut merged = BTreeMap::new();
        let (mut i, mut j) = (0, 0);
        while i < left_terms.len() || j < right_terms.len() {
            match (left_terms.get(i), right_terms.get(j)) {
                (Some((lt, lp)), Some((rt, rp))) => {
                    if lt < rt {
                        merged.insert(lt.clone(), lp.clone());
                        i += 1;
                    } else if rt < lt {
                        merged.insert(rt.clone(), rp.clone());
                        j += 1;
                    } else {
                        let mut combined = lp.clone();
                        combined.add_term_info(rp, true);
                        merged.insert(lt.clone(), combined);
                        i += 1;
                        j += 1;
                    }
                }
                (Some((lt, lp)), None) => {
                    merged.insert(lt.clone(), lp.clone());
                    i += 1;
                }
                (None, Some((rt, rp))) => {
                    merged.insert(rt.clone(), rp.clone());
                    j += 1;
                }
                (None, None) => unreachable!(),
            }
        }

        let mut doc_value_fields = left.doc_value_fields.clone();
        for field in &right.doc_value_fields {
            if !doc_value_fields.contains(field) {
                doc_value_fields.push(field.clone());
            }
        }

        let mut new_segment = Segment::new(
            new_segment_id,
            storage_path,
            doc_value_fields.clone(),
            left.max_docs,
        );
        *new_segment.min_doc_id.write() = left.min_doc_id();
        *new_segment.max_doc_id.write() = right.max_doc_id();

        let terms: Vec<(String, TermPosting)> = merged.into_iter().collect();
        new_segment.write_stores(&terms)?;
        *new_segment.buffer.write() = None;

        for field in &doc_value_fields {
            let mut merged_store = Store::open(new_segment.doc_value_path(field))?;
            for segment in [left, right] {
                if !segment.doc_value_fields.iter().any(|f| f == field) {
                    continue;
                }
                let mut store = Store::open(segment.doc_value_path(field))?;
                for (key, value) in store.iterate()? {
                    merged_store.set(&key, &value)?;
                }
            }
            new_segment.doc_value_stores.write().insert(field.clone(), merged_store);
        }

        println!(
            "merged segments {} and {} into {}",
            left.segment_id, right.segment_id, new_segment.segment_id
        );
        Ok(new_segment)
    }

    /// Closes and removes all files backing this segment.
    pub fn delete(self) -> Result<()> {
        let _ = std::fs::remove_file(self.positions_path());
        let _ = std::fs::remove_file(self.postings_only_path());
        for field in &self.doc_value_fields {
            let _ = std::fs::remove_file(self.doc_value_path(field));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn terms(words: &[&str]) -> Vec<(String, String)> {
        words
            .iter()
            .map(|w| (w.to_string(), w.to_string()))
            .collect()
    }

    #[test]
    fn buffer_lookup_matches_flushed_lookup() {
        let dir = tempdir().unwrap();
        let mut segment = Segment::new("seg-1", dir.path(), vec![], 2000);
        segment
            .add_document(DocId(1), &terms(&["quick", "fox"]), HashMap::new())
            .unwrap();
        segment
            .add_document(DocId(2), &terms(&["quick", "dog"]), HashMap::new())
            .unwrap();

        let before_flush = segment.get_term("quick", false).unwrap().unwrap();
        segment.flush().unwrap();
        assert!(segment.is_flushed());
        let after_flush = segment.get_term("quick", false).unwrap().unwrap();

        assert_eq!(before_flush.doc_frequency(), after_flush.doc_frequency());
        assert_eq!(before_flush.collection_frequency, after_flush.collection_frequency);
    }

    #[test]
    fn flushed_positions_and_postings_only_agree_on_frequency() {
        let dir = tempdir().unwrap();
        let mut segment = Segment::new("seg-1", dir.path(), vec![], 2000);
        segment
            .add_document(DocId(1), &terms(&["a", "b", "a"]), HashMap::new())
            .unwrap();
        segment.flush().unwrap();

        let with_positions = segment.get_term("a", true).unwrap().unwrap();
        let without_positions = segment.get_term("a", false).unwrap().unwrap();
        let pairs_with: Vec<(u64, usize)> = with_positions
            .postings
            .iter()
            .map(|p| (p.doc_id.value(), p.frequency()))
            .collect();
        let pairs_without: Vec<(u64, usize)> = without_positions
            .postings
            .iter()
            .map(|p| (p.doc_id.value(), p.frequency()))
            .collect();
        assert_eq!(pairs_with, pairs_without);
    }

    #[test]
    fn cannot_add_after_flush() {
        let dir = tempdir().unwrap();
        let mut segment = Segment::new("seg-1", dir.path(), vec![], 2000);
        segment
            .add_document(DocId(1), &terms(&["a"]), HashMap::new())
            .unwrap();
        segment.flush().unwrap();
        let result = segment.add_document(DocId(2), &terms(&["b"]), HashMap::new());
        assert!(result.is_err());
    }

    #[test]
    fn merge_combines_doc_ranges_and_postings() {
        let dir = tempdir().unwrap();
        let mut left = Segment::new("seg-1", dir.path(), vec![], 2000);
        left.add_document(DocId(1), &terms(&["quick", "fox"]), HashMap::new())
            .unwrap();
        left.flush().unwrap();

        let mut right = Segment::new("seg-2", dir.path(), vec![], 2000);
        right
            .add_document(DocId(2), &terms(&["quick", "dog"]), HashMap::new())
            .unwrap();
        right.flush().unwrap();

        let merged = Segment::merge(&left, &right, "seg-3", dir.path()).unwrap();
        assert_eq!(merged.min_doc_id(), Some(DocId(1)));
        assert_eq!(merged.max_doc_id(), Some(DocId(2)));
        let quick = merged.get_term("quick", false).unwrap().unwrap();
        assert_eq!(quick.doc_frequency(), 2);
    }
}

use crate::core::error::{Error, Result};
use crate::core::types::DocId;
use crate::index::skiplist::build_skips;

/// Per-term-per-document record: an ordered list of token positions plus
/// skip pointers over that list (spec §3).
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub doc_id: DocId,
    pub positions: Vec<u32>,
    pub skips: Vec<(u32, usize)>,
}

impl Posting {
    pub fn new(doc_id: DocId) -> Self {
        Posting {
            doc_id,
            positions: Vec::new(),
            skips: Vec::new(),
        }
    }

    pub fn add_position(&mut self, position: u32) {
        self.positions.push(position);
        self.skips = build_skips(&self.positions);
    }

    pub fn frequency(&self) -> usize {
        self.positions.len()
    }

    /// `doc_id;frequency;p1:p2:…:pn;s1pos-s1idx:s2pos-s2idx:…`. When
    /// `with_positions` is false (postings-only store), the position and
    /// skip fields are left empty.
    pub fn to_store_format(&self, with_positions: bool) -> String {
        if with_positions {
            let positions = self
                .positions
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(":");
            let skips = self
                .skips
                .iter()
                .map(|(pos, idx)| format!("{}-{}", pos, idx))
                .collect::<Vec<_>>()
                .join(":");
            format!(
                "{};{};{};{}",
                self.doc_id.value(),
                self.frequency(),
                positions,
                skips
            )
        } else {
            format!("{};{};;", self.doc_id.value(), self.frequency())
        }
    }

    pub fn from_store_format(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split(';').collect();
        if fields.len() != 4 {
            return Err(Error::store(format!("malformed posting record: {}", line)));
        }
        let doc_id: u64 = fields[0]
            .parse()
            .map_err(|_| Error::store(format!("invalid doc_id in posting: {}", line)))?;
        let positions: Vec<u32> = if fields[2].is_empty() {
            Vec::new()
        } else {
            fields[2]
                .split(':')
                .map(|p| p.parse::<u32>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| Error::store(format!("invalid positions in posting: {}", line)))?
        };
        let skips = if fields[3].is_empty() {
            build_skips(&positions)
        } else {
            parse_skips(fields[3])?
        };
        Ok(Posting {
            doc_id: DocId(doc_id),
            positions,
            skips,
        })
    }
}

fn parse_skips<T>(field: &str) -> Result<Vec<(T, usize)>>
where
    T: std::str::FromStr + Copy,
{
    field
        .split(':')
        .map(|entry| {
            let (pos, idx) = entry
                .split_once('-')
                .ok_or_else(|| Error::store(format!("invalid skip entry: {}", entry)))?;
            let pos = pos
                .parse::<T>()
                .map_err(|_| Error::store(format!("invalid skip position: {}", entry)))?;
            let idx = idx
                .parse::<usize>()
                .map_err(|_| Error::store(format!("invalid skip index: {}", entry)))?;
            Ok((pos, idx))
        })
        .collect()
}

/// A `Posting` combined with a relevance score (spec §4.6's term evaluator).
#[derive(Debug, Clone)]
pub struct ScoredPosting {
    pub posting: Posting,
    pub score: f64,
}

impl ScoredPosting {
    pub fn new(posting: Posting, score: f64) -> Self {
        ScoredPosting { posting, score }
    }

    pub fn doc_id(&self) -> DocId {
        self.posting.doc_id
    }
}

/// All information the index holds about a single term: its collection
/// frequency, the earliest unanalyzed form it was observed as, and its
/// ordered-by-doc-id postings list with doc-level skips.
#[derive(Debug, Clone)]
pub struct TermPosting {
    pub collection_frequency: u64,
    pub first_occurrence: String,
    pub postings: Vec<Posting>,
    pub doc_skips: Vec<(u64, usize)>,
}

impl TermPosting {
    pub fn new(first_occurrence: impl Into<String>) -> Self {
        TermPosting {
            collection_frequency: 0,
            first_occurrence: first_occurrence.into(),
            postings: Vec::new(),
            doc_skips: Vec::new(),
        }
    }

    /// Appends a position for `doc_id`; a new `Posting` is started whenever
    /// `doc_id` differs from the last one (single-threaded, one-doc-at-a-time
    /// construction is assumed, as in the original indexer).
    pub fn add_position(&mut self, doc_id: DocId, position: u32) {
        if self.postings.last().map(|p| p.doc_id) != Some(doc_id) {
            self.postings.push(Posting::new(doc_id));
        }
        self.postings.last_mut().unwrap().add_position(position);
        self.collection_frequency += 1;
        self.rebuild_doc_skips();
    }

    fn rebuild_doc_skips(&mut self) {
        let doc_ids: Vec<u64> = self.postings.iter().map(|p| p.doc_id.value()).collect();
        self.doc_skips = build_skips(&doc_ids);
    }

    pub fn doc_frequency(&self) -> usize {
        self.postings.len()
    }

    pub fn first_posting(&self) -> Option<&Posting> {
        self.postings.first()
    }

    /// Merge another TermPosting's postings into this one. Callers guarantee
    /// `self`'s doc-ids all precede `other`'s when merging across segments
    /// (spec §4.2); right-side doc-skip indices are shifted by the pre-merge
    /// left length when `reshift_skips` is set.
    pub fn add_term_info(&mut self, other: &TermPosting, reshift_skips: bool) {
        let left_len = self.postings.len();
        self.collection_frequency += other.collection_frequency;
        self.postings.extend(other.postings.iter().cloned());
        if reshift_skips {
            self.doc_skips = build_skips(
                &self
                    .postings
                    .iter()
                    .map(|p| p.doc_id.value())
                    .collect::<Vec<_>>(),
            );
        } else {
            self.doc_skips.extend(
                other
                    .doc_skips
                    .iter()
                    .map(|(pos, idx)| (*pos, idx + left_len)),
            );
        }
    }

    /// `first_occurrence|collection_frequency|doc_skips|posting|posting|…`
    pub fn to_store_format(&self, with_positions: bool) -> String {
        let doc_skips = self
            .doc_skips
            .iter()
            .map(|(pos, idx)| format!("{}-{}", pos, idx))
            .collect::<Vec<_>>()
            .join(":");
        let mut parts = vec![
            self.first_occurrence.clone(),
            self.collection_frequency.to_string(),
            doc_skips,
        ];
        parts.extend(self.postings.iter().map(|p| p.to_store_format(with_positions)));
        parts.join("|")
    }

    pub fn from_store_format(data: &str) -> Result<Self> {
        let mut parts = data.split('|');
        let first_occurrence = parts
            .next()
            .ok_or_else(|| Error::store("missing first_occurrence field"))?
            .to_string();
        let collection_frequency: u64 = parts
            .next()
            .ok_or_else(|| Error::store("missing collection_frequency field"))?
            .parse()
            .map_err(|_| Error::store("invalid collection_frequency field"))?;
        let doc_skips_field = parts
            .next()
            .ok_or_else(|| Error::store("missing doc_skips field"))?;
        let postings = parts
            .map(Posting::from_store_format)
            .collect::<Result<Vec<_>>>()?;
        let doc_skips = if doc_skips_field.is_empty() {
            build_skips(&postings.iter().map(|p| p.doc_id.value()).collect::<Vec<_>>())
        } else {
            parse_skips(doc_skips_field)?
        };
        Ok(TermPosting {
            collection_frequency,
            first_occurrence,
            postings,
            doc_skips,
        })
    }
}

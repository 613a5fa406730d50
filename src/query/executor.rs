use std::collections::HashMap;

use crate::ann::AnnCollaborator;
use crate::core::error::Result;
use crate::core::types::DocId;
use crate::index::posting::{Posting, ScoredPosting, TermPosting};
use crate::query::ast::QueryNode;
use crate::request::{FacetRequest, FilterClause};

/// Everything the evaluator needs from the owning `Index`, kept as a trait
/// so the query module does not depend on `index::engine` directly.
pub trait IndexContext {
    fn get_term(&self, term: &str, with_positions: bool) -> Result<TermPosting>;
    fn document_count(&self) -> usize;
    /// Next internal id to be assigned; valid assigned ids are `1..next_doc_id`.
    fn next_doc_id(&self) -> u64;
    fn get_doc_values(&self, field: &str, doc_id: DocId) -> Result<Vec<String>>;
    fn process_token(&self, raw: &str) -> Option<String>;
    fn ann(&self) -> Option<&dyn AnnCollaborator>;
}

#[derive(Debug, Clone)]
struct Evaluated {
    postings: Vec<ScoredPosting>,
    doc_skips: Vec<(u64, usize)>,
    is_stop_word: bool,
}

impl Evaluated {
    fn stop_word() -> Self {
        Evaluated {
            postings: Vec::new(),
            doc_skips: Vec::new(),
            is_stop_word: true,
        }
    }

    fn from_postings(mut postings: Vec<ScoredPosting>) -> Self {
        postings.sort_by_key(|p| p.doc_id().value());
        let doc_ids: Vec<u64> = postings.iter().map(|p| p.doc_id().value()).collect();
        let doc_skips = crate::index::skiplist::build_skips(&doc_ids);
        Evaluated {
            postings,
            doc_skips,
            is_stop_word: false,
        }
    }
}

/// Advances `i` past entries whose doc-id is `< target`, jumping via any
/// skip checkpoint whose recorded doc-id is `<= target` (spec §4.6's `and`
/// evaluator).
fn advance(postings: &[ScoredPosting], skips: &[(u64, usize)], skip_cursor: &mut usize, mut i: usize, target: u64) -> usize {
    while i < postings.len() && postings[i].doc_id().value() < target {
        let mut jumped = false;
        while *skip_cursor < skips.len() {
            let (skip_doc, skip_idx) = skips[*skip_cursor];
            if skip_idx <= i {
                *skip_cursor += 1;
                continue;
            }
            if skip_doc <= target {
                i = skip_idx;
                *skip_cursor += 1;
                jumped = true;
            }
            break;
        }
        if !jumped {
            i += 1;
        }
    }
    i
}

/// Two-pointer intersection driven by both sides' doc-level skips.
/// `verify` decides whether a doc-id match survives and, if so, produces the
/// `Posting` carried forward (used by phrase/proximity to thread matched
/// positions into further joins; `None` discards the candidate).
fn intersect(
    left: &Evaluated,
    right: &Evaluated,
    verify: impl Fn(&Posting, &Posting) -> Option<Posting>,
    score: bool,
) -> Evaluated {
    if left.is_stop_word || right.is_stop_word {
        return union(left, right, score);
    }

    let mut i = 0;
    let mut j = 0;
    let mut skip_i = 0;
    let mut skip_j = 0;
    let mut out = Vec::new();

    while i < left.postings.len() && j < right.postings.len() {
        let ld = left.postings[i].doc_id().value();
        let rd = right.postings[j].doc_id().value();
        if ld < rd {
            i = advance(&left.postings, &left.doc_skips, &mut skip_i, i, rd);
        } else if rd < ld {
            j = advance(&right.postings, &right.doc_skips, &mut skip_j, j, ld);
        } else {
            if let Some(posting) = verify(&left.postings[i].posting, &right.postings[j].posting) {
                let combined_score = if score {
                    left.postings[i].score + right.postings[j].score
                } else {
                    0.0
                };
                out.push(ScoredPosting::new(posting, combined_score));
            }
            i += 1;
            j += 1;
        }
    }

    Evaluated::from_postings(out)
}

fn always_match(left: &Posting, _right: &Posting) -> Option<Posting> {
    Some(left.clone())
}

fn phrase_match(left: &Posting, right: &Posting) -> Option<Posting> {
    let matched: Vec<u32> = right
        .positions
        .iter()
        .copied()
        .filter(|r| left.positions.iter().any(|l| l + 1 == *r))
        .collect();
    if matched.is_empty() {
        return None;
    }
    let mut posting = Posting::new(right.doc_id);
    for p in matched {
        posting.add_position(p);
    }
    Some(posting)
}

fn proximity_match(distance: u32) -> impl Fn(&Posting, &Posting) -> Option<Posting> {
    move |left, right| {
        let matched: Vec<u32> = right
            .positions
            .iter()
            .copied()
            .filter(|r| {
                left.positions
                    .iter()
                    .any(|l| (*l as i64 - *r as i64).unsigned_abs() <= distance as u64)
            })
            .collect();
        if matched.is_empty() {
            return None;
        }
        let mut posting = Posting::new(right.doc_id);
        for p in matched {
            posting.add_position(p);
        }
        Some(posting)
    }
}

/// Heap-merge (sorted-list merge) of two posting lists; duplicates sum
/// scores.
fn union(left: &Evaluated, right: &Evaluated, score: bool) -> Evaluated {
    let mut i = 0;
    let mut j = 0;
    let mut out = Vec::new();

    while i < left.postings.len() && j < right.postings.len() {
        let ld = left.postings[i].doc_id().value();
        let rd = right.postings[j].doc_id().value();
        if ld < rd {
            out.push(left.postings[i].clone());
            i += 1;
        } else if rd < ld {
            out.push(right.postings[j].clone());
            j += 1;
        } else {
            let combined_score = if score {
                left.postings[i].score + right.postings[j].score
            } else {
                0.0
            };
            out.push(ScoredPosting::new(left.postings[i].posting.clone(), combined_score));
            i += 1;
            j += 1;
        }
    }
    out.extend(left.postings[i..].iter().cloned());
    out.extend(right.postings[j..].iter().cloned());
    Evaluated::from_postings(out)
}

fn negate(ctx: &dyn IndexContext, inner: &Evaluated) -> Evaluated {
    let exclude: std::collections::HashSet<u64> = if inner.is_stop_word {
        std::collections::HashSet::new()
    } else {
        inner.postings.iter().map(|p| p.doc_id().value()).collect()
    };
    let mut out = Vec::new();
    let mut id = 1u64;
    while id < ctx.next_doc_id() {
        if !exclude.contains(&id) {
            out.push(ScoredPosting::new(Posting::new(DocId(id)), 1.0));
        }
        id += 1;
    }
    Evaluated::from_postings(out)
}

fn term_posting_to_evaluated(tp: TermPosting, score: bool, document_count: usize) -> Evaluated {
    let df = tp.doc_frequency();
    if df == 0 {
        return Evaluated::from_postings(Vec::new());
    }
    let postings = tp
        .postings
        .into_iter()
        .map(|p| {
            let s = if score {
                let frequency = p.frequency().max(1) as f64;
                (1.0 + frequency.log10()) * (document_count as f64 / df as f64).log10()
            } else {
                0.0
            };
            ScoredPosting::new(p, s)
        })
        .collect();
    Evaluated::from_postings(postings)
}

fn eval_term(
    ctx: &dyn IndexContext,
    raw: &str,
    with_positions: bool,
    score: bool,
) -> Result<Evaluated> {
    if raw.contains(':') {
        let tp = ctx.get_term(raw, with_positions)?;
        return Ok(term_posting_to_evaluated(tp, score, ctx.document_count()));
    }
    match ctx.process_token(raw) {
        None => Ok(Evaluated::stop_word()),
        Some(processed) => {
            let tp = ctx.get_term(&processed, with_positions)?;
            Ok(term_posting_to_evaluated(tp, score, ctx.document_count()))
        }
    }
}

fn eval_phrase(ctx: &dyn IndexContext, words: &[String], score: bool) -> Result<Evaluated> {
    if words.is_empty() {
        return Ok(Evaluated::from_postings(Vec::new()));
    }
    if words.len() == 1 {
        return eval_term(ctx, &words[0], false, score);
    }
    let mut acc = eval_term(ctx, &words[0], true, score)?;
    for word in &words[1..] {
        let next = eval_term(ctx, word, true, score)?;
        acc = intersect(&acc, &next, phrase_match, score);
    }
    Ok(acc)
}

fn eval_natural(
    ctx: &dyn IndexContext,
    words: &[String],
    filters: &Evaluated,
    has_filters: bool,
    query_vector: Option<&[f32]>,
    max_distance: f32,
    score: bool,
) -> Result<Evaluated> {
    if let (Some(ann), Some(vector)) = (ctx.ann(), query_vector) {
        let neighbours = ann.knn_query(vector, words.len().max(10) * 4)?;
        let postings: Vec<ScoredPosting> = neighbours
            .into_iter()
            .filter(|(_, distance)| *distance <= max_distance)
            .map(|(label, distance)| {
                ScoredPosting::new(Posting::new(DocId(label)), 1.0 - distance as f64)
            })
            .collect();
        let evaluated = Evaluated::from_postings(postings);
        if has_filters {
            return Ok(intersect(&evaluated, filters, always_match, score));
        }
        return Ok(evaluated);
    }

    // fall back to a scored OR across the bare terms.
    let mut acc: Option<Evaluated> = None;
    for word in words {
        let term_eval = eval_term(ctx, word, false, score)?;
        acc = Some(match acc {
            Some(existing) => union(&existing, &term_eval, score),
            None => term_eval,
        });
    }
    let evaluated = acc.unwrap_or_else(|| Evaluated::from_postings(Vec::new()));
    if has_filters {
        Ok(intersect(&evaluated, filters, always_match, score))
    } else {
        Ok(evaluated)
    }
}

fn eval_node(
    ctx: &dyn IndexContext,
    node: &QueryNode,
    with_positions: bool,
    score: bool,
) -> Result<Evaluated> {
    match node {
        QueryNode::Term(raw) => eval_term(ctx, raw, with_positions, score),
        QueryNode::Phrase(words) => eval_phrase(ctx, words, score),
        QueryNode::Proximity(distance, a, b) => {
            let left = eval_term(ctx, a, true, score)?;
            let right = eval_term(ctx, b, true, score)?;
            Ok(intersect(&left, &right, proximity_match(*distance), score))
        }
        QueryNode::And(left, right) => {
            let l = eval_node(ctx, left, with_positions, score)?;
            let r = eval_node(ctx, right, with_positions, score)?;
            Ok(intersect(&l, &r, always_match, score))
        }
        QueryNode::Or(left, right) => {
            let l = eval_node(ctx, left, with_positions, score)?;
            let r = eval_node(ctx, right, with_positions, score)?;
            Ok(union(&l, &r, score))
        }
        QueryNode::Not(inner) => {
            let evaluated = eval_node(ctx, inner, with_positions, score)?;
            Ok(negate(ctx, &evaluated))
        }
        QueryNode::Natural(words) => {
            eval_natural(ctx, words, &Evaluated::from_postings(Vec::new()), false, None, 0.8, score)
        }
    }
}

fn filters_to_node(filters: &[FilterClause]) -> Option<QueryNode> {
    let mut iter = filters
        .iter()
        .map(|f| QueryNode::Term(format!("{}:{}", f.field, f.value)));
    let first = iter.next()?;
    Some(iter.fold(first, QueryNode::and))
}

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub filters: Vec<FilterClause>,
    pub score: bool,
    pub max_results: usize,
    pub offset: usize,
    pub facets: Vec<FacetRequest>,
    pub query_vector: Option<Vec<f32>>,
    pub max_distance: f32,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        ExecuteOptions {
            filters: Vec::new(),
            score: true,
            max_results: 10,
            offset: 0,
            facets: Vec::new(),
            query_vector: None,
            max_distance: 0.8,
        }
    }
}

#[derive(Debug)]
pub struct ExecuteResult {
    pub hits: Vec<(DocId, f64)>,
    pub facets: HashMap<String, HashMap<String, usize>>,
    pub total: usize,
}

/// Evaluate a parsed query tree to a paged, faceted result set
/// (spec §4.6 `execute`).
pub fn execute(
    ctx: &dyn IndexContext,
    query: &QueryNode,
    options: &ExecuteOptions,
) -> Result<ExecuteResult> {
    let filter_node = filters_to_node(&options.filters);
    let has_filters = filter_node.is_some();

    let evaluated = match query {
        QueryNode::Natural(words) => {
            let filters_evaluated = match &filter_node {
                Some(node) => eval_node(ctx, node, false, options.score)?,
                None => Evaluated::from_postings(Vec::new()),
            };
            eval_natural(
                ctx,
                words,
                &filters_evaluated,
                has_filters,
                options.query_vector.as_deref(),
                options.max_distance,
                options.score,
            )?
        }
        other => {
            let node = match filter_node {
                Some(f) => QueryNode::and(other.clone(), f),
                None => other.clone(),
            };
            eval_node(ctx, &node, false, options.score)?
        }
    };

    let total = evaluated.postings.len();

    let facets = compute_facets(ctx, &evaluated, &options.facets)?;

    let mut postings = evaluated.postings;
    let hits: Vec<(DocId, f64)> = if options.score {
        postings.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        postings.truncate(options.max_results + options.offset);
        postings
            .into_iter()
            .skip(options.offset)
            .map(|p| (p.doc_id(), p.score))
            .collect()
    } else {
        postings.sort_by_key(|p| p.doc_id().value());
        postings.truncate(options.max_results + options.offset);
        postings
            .into_iter()
            .skip(options.offset)
            .map(|p| (p.doc_id(), 1.0))
            .collect()
    };

    Ok(ExecuteResult { hits, facets, total })
}

fn compute_facets(
    ctx: &dyn IndexContext,
    evaluated: &Evaluated,
    requests: &[FacetRequest],
) -> Result<HashMap<String, HashMap<String, usize>>> {
    let mut facets = HashMap::new();
    for request in requests {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for posting in &evaluated.postings {
            for value in ctx.get_doc_values(&request.field, posting.doc_id())? {
                *counts.entry(value).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(request.num_values);
        facets.insert(request.field.clone(), ranked.into_iter().collect());
    }
    Ok(facets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap as Map;

    struct FakeIndex {
        terms: Map<String, TermPosting>,
        doc_count: usize,
        stop_words: Vec<String>,
        doc_values: Map<(String, u64), Vec<String>>,
        calls: RefCell<usize>,
    }

    impl IndexContext for FakeIndex {
        fn get_term(&self, term: &str, _with_positions: bool) -> Result<TermPosting> {
            *self.calls.borrow_mut() += 1;
            Ok(self
                .terms
                .get(term)
                .cloned()
                .unwrap_or_else(|| TermPosting::new(term)))
        }

        fn document_count(&self) -> usize {
            self.doc_count
        }

        fn next_doc_id(&self) -> u64 {
            self.doc_count as u64 + 1
        }

        fn get_doc_values(&self, field: &str, doc_id: DocId) -> Result<Vec<String>> {
            Ok(self
                .doc_values
                .get(&(field.to_string(), doc_id.value()))
                .cloned()
                .unwrap_or_default())
        }

        fn process_token(&self, raw: &str) -> Option<String> {
            let lower = raw.to_lowercase();
            if self.stop_words.contains(&lower) {
                None
            } else {
                Some(lower)
            }
        }

        fn ann(&self) -> Option<&dyn AnnCollaborator> {
            None
        }
    }

    fn term_posting(word: &str, docs: &[(u64, &[u32])]) -> TermPosting {
        let mut tp = TermPosting::new(word);
        for (doc, positions) in docs {
            for p in *positions {
                tp.add_position(DocId(*doc), *p);
            }
        }
        tp
    }

    fn fixture() -> FakeIndex {
        let mut terms = Map::new();
        terms.insert(
            "quick".to_string(),
            term_posting("quick", &[(1, &[0]), (2, &[0])]),
        );
        terms.insert("brown".to_string(), term_posting("brown", &[(1, &[1])]));
        terms.insert("dogs".to_string(), term_posting("dogs", &[(3, &[1])]));
        terms.insert("lazy".to_string(), term_posting("lazy", &[(3, &[0])]));
        FakeIndex {
            terms,
            doc_count: 3,
            stop_words: vec!["the".to_string()],
            doc_values: Map::new(),
            calls: RefCell::new(0),
        }
    }

    #[test]
    fn and_intersects_two_terms() {
        let ctx = fixture();
        let result = execute(
            &ctx,
            &QueryNode::and(QueryNode::Term("quick".into()), QueryNode::Term("brown".into())),
            &ExecuteOptions::default(),
        )
        .unwrap();
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].0, DocId(1));
    }

    #[test]
    fn phrase_requires_adjacency() {
        let ctx = fixture();
        let phrase = QueryNode::Phrase(vec!["quick".into(), "brown".into()]);
        let result = execute(&ctx, &phrase, &ExecuteOptions::default()).unwrap();
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].0, DocId(1));
    }

    #[test]
    fn proximity_rejects_different_documents() {
        let ctx = fixture();
        let node = QueryNode::Proximity(2, "quick".into(), "dogs".into());
        let result = execute(&ctx, &node, &ExecuteOptions::default()).unwrap();
        assert_eq!(result.hits.len(), 0);
    }

    #[test]
    fn not_excludes_matching_docs() {
        let ctx = fixture();
        let node = QueryNode::and(
            QueryNode::Term("quick".into()),
            QueryNode::not(QueryNode::Term("brown".into())),
        );
        let result = execute(&ctx, &node, &ExecuteOptions::default()).unwrap();
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].0, DocId(2));
    }

    #[test]
    fn stop_word_and_degenerates_to_or() {
        let ctx = fixture();
        let node = QueryNode::and(QueryNode::Term("quick".into()), QueryNode::Term("the".into()));
        let result = execute(&ctx, &node, &ExecuteOptions::default()).unwrap();
        assert_eq!(result.hits.len(), 2);
    }

    #[test]
    fn empty_index_returns_zero_hits() {
        let ctx = FakeIndex {
            terms: Map::new(),
            doc_count: 0,
            stop_words: vec![],
            doc_values: Map::new(),
            calls: RefCell::new(0),
        };
        let result = execute(&ctx, &QueryNode::Term("anything".into()), &ExecuteOptions::default()).unwrap();
        assert_eq!(result.hits.len(), 0);
        assert_eq!(result.total, 0);
    }

    #[test]
    fn offset_past_total_hits_is_an_empty_page_unscored() {
        let ctx = fixture();
        let options = ExecuteOptions {
            score: false,
            offset: 2,
            ..ExecuteOptions::default()
        };
        let result = execute(&ctx, &QueryNode::Term("quick".into()), &options).unwrap();
        assert_eq!(result.total, 2);
        assert!(result.hits.is_empty());
    }
}

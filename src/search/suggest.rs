use std::collections::BTreeMap;

use fst::{IntoStreamer, Map, MapBuilder, Streamer};

use crate::core::error::Result;
use crate::index::segment::Segment;

/// `term -> (aggregate_frequency, representative_raw_token)`.
type Entries = BTreeMap<String, (u64, String)>;

fn valid_term(term: &str) -> bool {
    !term.contains(':') && !term.is_empty() && term.chars().all(|c| c.is_alphabetic())
}

/// Prefix trie over valid (colon-free, all-alphabetic) indexed terms, used
/// for query-completion suggestions (spec §4.7). Rebuilt fresh from its
/// accumulated entries each time `build()` is called, since `fst::Map` is
/// immutable once constructed.
pub struct Suggester {
    entries: Entries,
    fst: Option<Map<Vec<u8>>>,
}

impl Default for Suggester {
    fn default() -> Self {
        Self::new()
    }
}

impl Suggester {
    pub fn new() -> Self {
        Suggester {
            entries: BTreeMap::new(),
            fst: None,
        }
    }

    /// Folds a flushed segment's terms into the accumulated entries. When
    /// `reset_count` is set (the first segment of a rebuild), a term's
    /// frequency is overwritten rather than accumulated.
    pub fn add_segment(&mut self, segment: &Segment, reset_count: bool) -> Result<()> {
        for (term, posting) in segment.iter_terms()? {
            if !valid_term(&term) {
                continue;
            }
            self.add_term(&term, posting.collection_frequency, &posting.first_occurrence, reset_count);
        }
        Ok(())
    }

    fn add_term(&mut self, term: &str, count: u64, occurrence: &str, reset_count: bool) {
        if self.entries.contains_key(term) && !reset_count {
            let entry = self.entries.get_mut(term).unwrap();
            entry.0 += count;
        } else if !occurrence.is_empty() {
            self.entries.insert(term.to_string(), (count, occurrence.to_string()));
        }
    }

    /// Rebuilds the FST from the current entries. Must be called after
    /// `add_segment` calls and before `suggest` observes the update.
    pub fn build(&mut self) -> Result<()> {
        let mut builder = MapBuilder::memory();
        for (term, (freq, _)) in &self.entries {
            builder.insert(term.as_bytes(), *freq)?;
        }
        self.fst = Some(builder.into_map());
        Ok(())
    }

    /// Lowercases and splits on non-word characters; the last token is the
    /// search prefix, earlier tokens are held fixed and prepended to every
    /// result. The unsearched (completed) portion of each match is wrapped
    /// in `**…**` to mark it for highlighting.
    pub fn suggest(&self, query_text: &str, max_results: Option<usize>) -> Vec<String> {
        let fst = match &self.fst {
            Some(fst) => fst,
            None => return Vec::new(),
        };

        let lowered = query_text.to_lowercase();
        let words: Vec<&str> = lowered.split(|c: char| !c.is_alphanumeric() && c != '_').filter(|w| !w.is_empty()).collect();
        if words.is_empty() {
            return Vec::new();
        }
        let (fixed, search_word) = words.split_at(words.len() - 1);
        let search_word = search_word[0];
        let max_results = max_results.unwrap_or_else(|| 3.max(search_word.len()));

        let mut matches: Vec<(String, u64)> = Vec::new();
        let mut stream = fst.range().ge(search_word.as_bytes()).into_stream();
        while let Some((term_bytes, freq)) = stream.next() {
            if !term_bytes.starts_with(search_word.as_bytes()) {
                break;
            }
            if let Ok(term) = std::str::from_utf8(term_bytes) {
                matches.push((term.to_string(), freq));
            }
        }
        matches.sort_by(|a, b| b.1.cmp(&a.1));
        matches.truncate(max_results);

        let prefix = if fixed.is_empty() {
            String::new()
        } else {
            format!("{} ", fixed.join(" "))
        };

        matches
            .into_iter()
            .map(|(term, _)| {
                let representative = self
                    .entries
                    .get(&term)
                    .map(|(_, raw)| raw.to_lowercase())
                    .unwrap_or(term.clone());
                let completion = representative
                    .strip_prefix(search_word)
                    .unwrap_or(&representative);
                format!("{}{}**{}**", prefix, search_word, completion)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DocId;
    use tempfile::tempdir;

    fn segment_with_terms(words: &[&str]) -> Segment {
        let dir = tempdir().unwrap();
        let mut segment = Segment::new("seg-1", dir.path().to_path_buf(), vec![], 2000);
        let terms: Vec<(String, String)> = words.iter().map(|w| (w.to_string(), w.to_string())).collect();
        segment.add_document(DocId(1), &terms, std::collections::HashMap::new()).unwrap();
        segment.flush().unwrap();
        segment
    }

    #[test]
    fn suggests_by_descending_frequency() {
        let segment = segment_with_terms(&["quick", "quicksand", "quick", "quixotic"]);
        let mut suggester = Suggester::new();
        suggester.add_segment(&segment, false).unwrap();
        suggester.build().unwrap();

        let suggestions = suggester.suggest("qui", Some(5));
        assert!(!suggestions.is_empty());
        assert!(suggestions[0].contains("quick"));
    }

    #[test]
    fn skips_faceted_and_non_alphabetic_terms() {
        assert!(!valid_term("subject:cs"));
        assert!(!valid_term("abc123"));
        assert!(valid_term("abc"));
    }

    #[test]
    fn fixed_prefix_carried_through() {
        let segment = segment_with_terms(&["rust"]);
        let mut suggester = Suggester::new();
        suggester.add_segment(&segment, false).unwrap();
        suggester.build().unwrap();

        let suggestions = suggester.suggest("learning ru", None);
        assert!(suggestions[0].starts_with("learning "));
    }
}

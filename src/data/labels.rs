// ============================================================
// Layer 4 — Label Map
// ============================================================
// Assigns a class index to every billing code seen in the
// training split.
//
// Codes are sorted before indexing so the same training file
// always produces the same mapping, and the mapping saved next
// to a checkpoint can be trusted when the run is reloaded.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::domain::note::ClinicalNote;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct LabelMap {
    codes: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelMap {
    /// Collect every distinct code in `notes`.
    pub fn from_notes(notes: &[ClinicalNote]) -> Self {
        let codes: BTreeSet<&str> = notes.iter().flat_map(|n| n.codes()).collect();
        Self::from(codes.into_iter().map(str::to_string).collect::<Vec<_>>())
    }

    pub fn index_of(&self, code: &str) -> Option<usize> {
        self.index.get(code).copied()
    }

    pub fn code_of(&self, idx: usize) -> Option<&str> {
        self.codes.get(idx).map(String::as_str)
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl From<Vec<String>> for LabelMap {
    fn from(codes: Vec<String>) -> Self {
        let index = codes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Self { codes, index }
    }
}

impl From<LabelMap> for Vec<String> {
    fn from(map: LabelMap) -> Self {
        map.codes
    }
}

/// Label mix of a split: how many notes carry each code.
///
/// With `primary_only` only the first code of each note is
/// counted (the class a single-label run trains on).
/// Sorted by count descending, then by code.
pub fn count_labels(notes: &[ClinicalNote], primary_only: bool) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for note in notes {
        if primary_only {
            if let Some(code) = note.primary_code() {
                *counts.entry(code).or_insert(0) += 1;
            }
        } else {
            for code in note.codes() {
                *counts.entry(code).or_insert(0) += 1;
            }
        }
    }

    let mut counts: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(c, n)| (c.to_string(), n))
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notes() -> Vec<ClinicalNote> {
        vec![
            ClinicalNote::new("1", vec![vec!["a".into()]], "428.0 401.9"),
            ClinicalNote::new("2", vec![vec!["b".into()]], "401.9"),
            ClinicalNote::new("3", vec![vec!["c".into()]], "250.00 428.0"),
        ]
    }

    #[test]
    fn test_codes_are_sorted_and_indexed() {
        let map = LabelMap::from_notes(&notes());
        assert_eq!(map.codes(), &["250.00", "401.9", "428.0"]);
        assert_eq!(map.index_of("401.9"), Some(1));
        assert_eq!(map.code_of(2), Some("428.0"));
        assert_eq!(map.index_of("999.9"), None);
    }

    #[test]
    fn test_json_roundtrip_rebuilds_index() {
        let map  = LabelMap::from_notes(&notes());
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"["250.00","401.9","428.0"]"#);
        let back: LabelMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back.index_of("428.0"), Some(2));
    }

    #[test]
    fn test_count_labels_all_codes() {
        let counts = count_labels(&notes(), false);
        assert_eq!(counts[0], ("401.9".to_string(), 2));
        assert_eq!(counts[1], ("428.0".to_string(), 2));
        assert_eq!(counts[2], ("250.00".to_string(), 1));
    }

    #[test]
    fn test_count_labels_primary_only() {
        let counts = count_labels(&notes(), true);
        let total: usize = counts.iter().map(|(_, n)| n).sum();
        assert_eq!(total, 3);
        assert!(counts.iter().all(|(_, n)| *n == 1));
    }
}

// ============================================================
// Layer 3 — ClinicalNote Domain Type
// ============================================================
// A discharge note as it arrives from the preprocessing step:
// the hospital admission id, the note text split into sentences
// of tokens, and the billing codes assigned to the admission.
//
// Codes are stored exactly as the preprocessing step wrote them:
// a single space-separated string ("428.0 584.9 427.31").
// The first code is the primary code used for single-label runs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalNote {
    /// Hospital admission id (HADM_ID)
    pub id: String,

    /// Sentences, each a list of tokens
    pub sentences: Vec<Vec<String>>,

    /// Space-separated billing codes. Absent for notes that only
    /// need predictions.
    #[serde(default)]
    pub labels: String,
}

impl ClinicalNote {
    pub fn new(
        id:        impl Into<String>,
        sentences: Vec<Vec<String>>,
        labels:    impl Into<String>,
    ) -> Self {
        Self {
            id:     id.into(),
            sentences,
            labels: labels.into(),
        }
    }

    /// Every code attached to this note, in file order
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.labels.split_whitespace()
    }

    /// The first listed code, used as the class in single-label mode
    pub fn primary_code(&self) -> Option<&str> {
        self.codes().next()
    }

    pub fn token_count(&self) -> usize {
        self.sentences.iter().map(Vec::len).sum()
    }

    /// Iterate over all tokens in reading order
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.sentences.iter().flatten().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(labels: &str) -> ClinicalNote {
        ClinicalNote::new(
            "100001",
            vec![
                vec!["patient".into(), "admitted".into()],
                vec!["chf".into()],
            ],
            labels,
        )
    }

    #[test]
    fn test_codes_split_on_whitespace() {
        let n = note("428.0  584.9 ");
        assert_eq!(n.codes().collect::<Vec<_>>(), vec!["428.0", "584.9"]);
        assert_eq!(n.primary_code(), Some("428.0"));
    }

    #[test]
    fn test_no_codes() {
        assert_eq!(note("").primary_code(), None);
    }

    #[test]
    fn test_token_count_spans_sentences() {
        let n = note("428.0");
        assert_eq!(n.token_count(), 3);
        assert_eq!(n.tokens().last(), Some("chf"));
    }
}

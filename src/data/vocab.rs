// ============================================================
// Layer 4 — Vocabulary
// ============================================================
// Maps tokens to embedding rows.
//
// Layout:
//   0  <PAD>  padding, never a real token
//   1  UNK    anything not in the vocabulary
//   2… tokens seen at least `threshold` times in the training
//      split, most frequent first (ties broken alphabetically)
//
// The preprocessing step already replaces rare words with the
// literal "UNK", so that token is never counted as a word of its own.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::note::ClinicalNote;

pub const PAD_TOKEN: &str = "<PAD>";
pub const UNK_TOKEN: &str = "UNK";
pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Vocabulary {
    tokens: Vec<String>,
    index:  HashMap<String, u32>,
}

impl Vocabulary {
    /// Count every token in `notes` and keep those seen at least `threshold` times.
    pub fn build(notes: &[ClinicalNote], threshold: usize) -> Self {
        let mut freq: HashMap<&str, usize> = HashMap::new();
        for token in notes.iter().flat_map(|n| n.tokens()) {
            *freq.entry(token).or_insert(0) += 1;
        }

        let mut words: Vec<(&str, usize)> = freq
            .into_iter()
            .filter(|(w, n)| *n >= threshold && *w != UNK_TOKEN && *w != PAD_TOKEN)
            .collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let mut tokens = Vec::with_capacity(words.len() + 2);
        tokens.push(PAD_TOKEN.to_string());
        tokens.push(UNK_TOKEN.to_string());
        tokens.extend(words.into_iter().map(|(w, _)| w.to_string()));

        Self::from(tokens)
    }

    /// Row for `token`, or the UNK row
    pub fn index_of(&self, token: &str) -> u32 {
        self.index.get(token).copied().unwrap_or(UNK_ID)
    }

    pub fn token_of(&self, idx: u32) -> Option<&str> {
        self.tokens.get(idx as usize).map(String::as_str)
    }

    pub fn encode_sentence(&self, sentence: &[String]) -> Vec<u32> {
        sentence.iter().map(|t| self.index_of(t)).collect()
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl From<Vec<String>> for Vocabulary {
    fn from(tokens: Vec<String>) -> Self {
        let index = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i as u32))
            .collect();
        Self { tokens, index }
    }
}

impl From<Vocabulary> for Vec<String> {
    fn from(v: Vocabulary) -> Self {
        v.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent(words: &str) -> Vec<String> {
        words.split_whitespace().map(str::to_string).collect()
    }

    fn notes() -> Vec<ClinicalNote> {
        vec![
            ClinicalNote::new("1", vec![sent("pain chest pain"), sent("UNK chf")], "401.9"),
            ClinicalNote::new("2", vec![sent("chf pain UNK UNK")], "428.0"),
        ]
    }

    #[test]
    fn test_special_tokens_come_first() {
        let v = Vocabulary::build(&notes(), 1);
        assert_eq!(v.token_of(0), Some(PAD_TOKEN));
        assert_eq!(v.token_of(1), Some(UNK_TOKEN));
        assert_eq!(v.index_of(UNK_TOKEN), UNK_ID);
    }

    #[test]
    fn test_ordered_by_frequency_then_alphabet() {
        let v = Vocabulary::build(&notes(), 1);
        // pain ×3, chf ×2, chest ×1
        assert_eq!(&v.tokens()[2..], &["pain", "chf", "chest"]);
    }

    #[test]
    fn test_threshold_drops_rare_tokens() {
        let v = Vocabulary::build(&notes(), 2);
        assert_eq!(v.len(), 4);
        assert_eq!(v.index_of("chest"), UNK_ID);
    }

    #[test]
    fn test_encode_sentence() {
        let v = Vocabulary::build(&notes(), 1);
        assert_eq!(v.encode_sentence(&sent("chf pain nowhere")), vec![3, 2, UNK_ID]);
    }
}

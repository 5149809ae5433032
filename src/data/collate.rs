// ============================================================
// Layer 4 — Collation
// ============================================================
// Packs a batch of notes with a ragged number of sentences,
// each with a ragged number of words, into dense row-major
// buffers that the batcher turns into tensors.
//
// Shape of a collated batch:
//
//   tokens     [batch, max_sents, max_words]   PAD (0) filled
//   word_mask  [batch, max_sents, max_words]   1 = real token
//   sent_mask  [batch, max_sents]              1 = real sentence
//
// max_sents is the largest sentence count in the batch and
// max_words the longest sentence anywhere in the batch, so a
// note's padding depends only on its batch mates.
//
// Example, batch of two notes:
//
//   note A: [[5, 6, 7], [8]]
//   note B: [[9, 4]]
//
//   tokens[A] = [[5, 6, 7], [8, 0, 0]]
//   tokens[B] = [[9, 4, 0], [0, 0, 0]]
//   sent_mask = [[1, 1], [1, 0]]

use anyhow::{bail, Result};

use crate::data::dataset::{NoteItem, NoteTarget};
use crate::data::vocab::PAD_ID;

/// Collated targets, flattened the same way as the token buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum CollatedTargets {
    /// One class index per note: [batch]
    Classes(Vec<i64>),
    /// Multi-hot rows, flattened: [batch, num_labels]
    MultiHot { values: Vec<i64>, num_labels: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollatedNotes {
    pub batch_size:  usize,
    pub max_sents:   usize,
    pub max_words:   usize,
    pub ids:         Vec<String>,
    pub tokens:      Vec<i64>,
    pub word_mask:   Vec<bool>,
    pub sent_mask:   Vec<bool>,
    /// Real sentence count per note
    pub sent_counts: Vec<usize>,
    pub targets:     CollatedTargets,
}

impl CollatedNotes {
    #[inline]
    pub fn offset(&self, b: usize, s: usize, w: usize) -> usize {
        (b * self.max_sents + s) * self.max_words + w
    }
}

pub fn collate(items: &[NoteItem]) -> Result<CollatedNotes> {
    if items.is_empty() {
        bail!("Cannot collate an empty batch");
    }

    let batch_size = items.len();
    let max_sents  = items.iter().map(NoteItem::sentence_count).max().unwrap_or(0);
    let max_words  = items.iter().map(NoteItem::longest_sentence).max().unwrap_or(0);

    if max_sents == 0 || max_words == 0 {
        bail!("Cannot collate a batch whose notes have no tokens");
    }

    let cells         = batch_size * max_sents * max_words;
    let mut tokens    = vec![PAD_ID as i64; cells];
    let mut word_mask = vec![false; cells];
    let mut sent_mask = vec![false; batch_size * max_sents];

    for (b, item) in items.iter().enumerate() {
        for (s, sentence) in item.sentences.iter().enumerate() {
            sent_mask[b * max_sents + s] = true;
            let row = (b * max_sents + s) * max_words;
            for (w, &tok) in sentence.iter().enumerate() {
                tokens[row + w]    = tok as i64;
                word_mask[row + w] = true;
            }
        }
    }

    let targets = collate_targets(items)?;

    Ok(CollatedNotes {
        batch_size,
        max_sents,
        max_words,
        ids:         items.iter().map(|i| i.id.clone()).collect(),
        tokens,
        word_mask,
        sent_mask,
        sent_counts: items.iter().map(NoteItem::sentence_count).collect(),
        targets,
    })
}

fn collate_targets(items: &[NoteItem]) -> Result<CollatedTargets> {
    match &items[0].target {
        NoteTarget::Class(_) => {
            let mut classes = Vec::with_capacity(items.len());
            for item in items {
                let NoteTarget::Class(c) = item.target else {
                    bail!("Batch mixes single-label and multilabel notes");
                };
                classes.push(c as i64);
            }
            Ok(CollatedTargets::Classes(classes))
        }
        NoteTarget::MultiHot(first) => {
            let num_labels = first.len();
            let mut values = Vec::with_capacity(items.len() * num_labels);
            for item in items {
                let NoteTarget::MultiHot(hot) = &item.target else {
                    bail!("Batch mixes single-label and multilabel notes");
                };
                if hot.len() != num_labels {
                    bail!("Note {} has {} labels, expected {}", item.id, hot.len(), num_labels);
                }
                values.extend(hot.iter().map(|&v| if v > 0.5 { 1 } else { 0 }));
            }
            Ok(CollatedTargets::MultiHot { values, num_labels })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, sentences: Vec<Vec<u32>>, class: usize) -> NoteItem {
        NoteItem { id: id.into(), sentences, target: NoteTarget::Class(class) }
    }

    #[test]
    fn test_pads_to_batch_maxima() {
        let batch = collate(&[
            item("a", vec![vec![5, 6, 7], vec![8]], 1),
            item("b", vec![vec![9, 4]], 0),
        ])
        .unwrap();

        assert_eq!((batch.batch_size, batch.max_sents, batch.max_words), (2, 2, 3));
        assert_eq!(batch.tokens, vec![5, 6, 7, 8, 0, 0, 9, 4, 0, 0, 0, 0]);
        assert_eq!(batch.sent_mask, vec![true, true, true, false]);
        assert_eq!(batch.sent_counts, vec![2, 1]);
        assert_eq!(batch.targets, CollatedTargets::Classes(vec![1, 0]));
    }

    #[test]
    fn test_word_mask_marks_exactly_the_real_tokens() {
        let items = [
            item("a", vec![vec![5, 6, 7], vec![8]], 0),
            item("b", vec![vec![9, 4], vec![3], vec![2, 2]], 0),
        ];
        let batch = collate(&items).unwrap();

        for (b, it) in items.iter().enumerate() {
            for s in 0..batch.max_sents {
                for w in 0..batch.max_words {
                    let off  = batch.offset(b, s, w);
                    let real = it.sentences.get(s).and_then(|sent| sent.get(w));
                    match real {
                        Some(&tok) => {
                            assert!(batch.word_mask[off]);
                            assert_eq!(batch.tokens[off], tok as i64);
                        }
                        None => {
                            assert!(!batch.word_mask[off]);
                            assert_eq!(batch.tokens[off], PAD_ID as i64);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_multi_hot_targets_are_flattened() {
        let items = [
            NoteItem { id: "a".into(), sentences: vec![vec![2]], target: NoteTarget::MultiHot(vec![1.0, 0.0, 1.0]) },
            NoteItem { id: "b".into(), sentences: vec![vec![3]], target: NoteTarget::MultiHot(vec![0.0, 1.0, 0.0]) },
        ];
        let batch = collate(&items).unwrap();
        assert_eq!(
            batch.targets,
            CollatedTargets::MultiHot { values: vec![1, 0, 1, 0, 1, 0], num_labels: 3 }
        );
    }

    #[test]
    fn test_empty_batch_is_error() {
        assert!(collate(&[]).is_err());
    }

    #[test]
    fn test_mixed_targets_are_error() {
        let items = [
            item("a", vec![vec![2]], 0),
            NoteItem { id: "b".into(), sentences: vec![vec![3]], target: NoteTarget::MultiHot(vec![1.0]) },
        ];
        assert!(collate(&items).is_err());
    }
}

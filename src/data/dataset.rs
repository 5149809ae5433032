use anyhow::{bail, Result};
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::data::{labels::LabelMap, vocab::Vocabulary};
use crate::domain::note::ClinicalNote;

/// What the classifier should predict for one note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NoteTarget {
    /// Index of the primary code
    Class(usize),
    /// 1.0 for every code attached to the note, 0.0 elsewhere
    MultiHot(Vec<f32>),
}

/// One encoded note: sentences of vocabulary ids plus its target.
/// Sentences have ragged lengths; padding happens at collation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteItem {
    pub id:        String,
    pub sentences: Vec<Vec<u32>>,
    pub target:    NoteTarget,
}

impl NoteItem {
    pub fn sentence_count(&self) -> usize {
        self.sentences.len()
    }

    pub fn longest_sentence(&self) -> usize {
        self.sentences.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// Caps applied while encoding. `None` keeps everything.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EncodeOptions {
    pub multilabel:    bool,
    pub max_sentences: Option<usize>,
    pub max_words:     Option<usize>,
    /// Drop notes whose primary code is missing from the label map
    /// instead of failing. Off for the training split.
    pub skip_unknown_codes: bool,
}

pub struct NotesDataset {
    items: Vec<NoteItem>,
}

impl NotesDataset {
    pub fn new(items: Vec<NoteItem>) -> Self { Self { items } }

    /// Encode raw notes against the training vocabulary and label map.
    ///
    /// Empty sentences are removed; notes left without any sentence
    /// are dropped because they cannot be collated.
    pub fn encode(
        notes:  &[ClinicalNote],
        vocab:  &Vocabulary,
        labels: &LabelMap,
        opts:   EncodeOptions,
    ) -> Result<Self> {
        let mut items   = Vec::with_capacity(notes.len());
        let mut dropped = 0usize;
        let mut unknown = 0usize;

        for note in notes {
            let mut sentences: Vec<Vec<u32>> = note
                .sentences
                .iter()
                .filter(|s| !s.is_empty())
                .map(|s| {
                    let mut ids = vocab.encode_sentence(s);
                    if let Some(max) = opts.max_words {
                        ids.truncate(max);
                    }
                    ids
                })
                .collect();

            if let Some(max) = opts.max_sentences {
                sentences.truncate(max);
            }

            if sentences.is_empty() {
                dropped += 1;
                continue;
            }

            let target = match encode_target(note, labels, opts.multilabel) {
                Ok(target) => target,
                Err(_) if opts.skip_unknown_codes && !opts.multilabel => {
                    unknown += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            items.push(NoteItem { id: note.id.clone(), sentences, target });
        }

        if dropped > 0 {
            tracing::warn!("Dropped {} notes with no sentences", dropped);
        }
        if unknown > 0 {
            tracing::warn!("Dropped {} notes whose primary code was not seen in training", unknown);
        }

        Ok(Self { items })
    }

    pub fn items(&self) -> &[NoteItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<NoteItem> {
        self.items
    }

    pub fn sample_count(&self) -> usize { self.items.len() }
}

impl Dataset<NoteItem> for NotesDataset {
    fn get(&self, index: usize) -> Option<NoteItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

fn encode_target(note: &ClinicalNote, labels: &LabelMap, multilabel: bool) -> Result<NoteTarget> {
    if multilabel {
        let mut hot = vec![0.0f32; labels.len()];
        for code in note.codes() {
            match labels.index_of(code) {
                Some(i) => hot[i] = 1.0,
                None    => tracing::debug!("Note {}: ignoring unseen code {}", note.id, code),
            }
        }
        return Ok(NoteTarget::MultiHot(hot));
    }

    let Some(code) = note.primary_code() else {
        bail!("Note {} has no billing code", note.id);
    };
    match labels.index_of(code) {
        Some(i) => Ok(NoteTarget::Class(i)),
        None    => bail!("Note {} has code {} which is not in the training label set", note.id, code),
    }
}

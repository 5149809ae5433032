// ============================================================
// Layer 4 — Note Batcher
// ============================================================
// Implements Burn's Batcher trait: takes the notes the
// DataLoader picked for one step, collates them (see
// collate.rs) and uploads the buffers to the target device.
//
// Masks are built on the device from 0/1 integer buffers so
// every backend sees the same Bool tensors.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::collate::{collate, CollatedNotes, CollatedTargets};
use crate::data::dataset::NoteItem;

/// Targets of a batch, in the layout the loss functions expect.
#[derive(Debug, Clone)]
pub enum NoteTargets<B: Backend> {
    /// Class indices — shape: [batch]
    Classes(Tensor<B, 1, Int>),
    /// 0/1 indicators — shape: [batch, num_labels]
    MultiHot(Tensor<B, 2, Int>),
}

impl<B: Backend> NoteTargets<B> {
    pub fn batch_size(&self) -> usize {
        match self {
            NoteTargets::Classes(t)  => t.dims()[0],
            NoteTargets::MultiHot(t) => t.dims()[0],
        }
    }
}

#[derive(Debug, Clone)]
pub struct NoteBatch<B: Backend> {
    /// Admission ids, in batch order
    pub ids: Vec<String>,

    /// Token ids — shape: [batch, max_sents, max_words]
    pub tokens: Tensor<B, 3, Int>,

    /// true = real token — shape: [batch, max_sents, max_words]
    pub word_mask: Tensor<B, 3, Bool>,

    /// true = real sentence — shape: [batch, max_sents]
    pub sent_mask: Tensor<B, 2, Bool>,

    /// Real sentence count per note — shape: [batch, 1]
    pub sent_counts: Tensor<B, 2>,

    pub targets: NoteTargets<B>,
}

#[derive(Clone, Debug, Default)]
pub struct NoteBatcher;

impl NoteBatcher {
    pub fn new() -> Self {
        Self
    }

    /// Upload an already collated batch.
    pub fn to_tensors<B: Backend>(c: CollatedNotes, device: &B::Device) -> NoteBatch<B> {
        let [b, s, w] = [c.batch_size, c.max_sents, c.max_words];

        let tokens = Tensor::<B, 3, Int>::from_data(TensorData::new(c.tokens, [b, s, w]), device);

        let word_mask = Tensor::<B, 3, Int>::from_data(
            TensorData::new(as_ints(&c.word_mask), [b, s, w]),
            device,
        )
        .equal_elem(1);

        let sent_mask = Tensor::<B, 2, Int>::from_data(
            TensorData::new(as_ints(&c.sent_mask), [b, s]),
            device,
        )
        .equal_elem(1);

        let counts: Vec<f32> = c.sent_counts.iter().map(|&n| n as f32).collect();
        let sent_counts = Tensor::<B, 2>::from_data(TensorData::new(counts, [b, 1]), device);

        let targets = match c.targets {
            CollatedTargets::Classes(classes) => NoteTargets::Classes(
                Tensor::<B, 1, Int>::from_data(TensorData::new(classes, [b]), device),
            ),
            CollatedTargets::MultiHot { values, num_labels } => NoteTargets::MultiHot(
                Tensor::<B, 2, Int>::from_data(TensorData::new(values, [b, num_labels]), device),
            ),
        };

        NoteBatch { ids: c.ids, tokens, word_mask, sent_mask, sent_counts, targets }
    }
}

impl<B: Backend> Batcher<B, NoteItem, NoteBatch<B>> for NoteBatcher {
    fn batch(&self, items: Vec<NoteItem>, device: &B::Device) -> NoteBatch<B> {
        // NotesDataset::encode only admits notes with at least one
        // non-empty sentence and a target of the run's kind.
        let collated = collate(&items).expect("dataset items are validated at encode time");
        Self::to_tensors(collated, device)
    }
}

fn as_ints(mask: &[bool]) -> Vec<i64> {
    mask.iter().map(|&m| m as i64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::NoteTarget;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_batch_shapes_and_masks() {
        let device = Default::default();
        let items = vec![
            NoteItem { id: "a".into(), sentences: vec![vec![5, 6, 7], vec![8]], target: NoteTarget::Class(1) },
            NoteItem { id: "b".into(), sentences: vec![vec![9, 4]],             target: NoteTarget::Class(0) },
        ];
        let batch: NoteBatch<TestBackend> = NoteBatcher::new().batch(items, &device);

        assert_eq!(batch.tokens.dims(), [2, 2, 3]);
        assert_eq!(batch.word_mask.dims(), [2, 2, 3]);
        assert_eq!(batch.sent_mask.dims(), [2, 2]);
        assert_eq!(batch.targets.batch_size(), 2);

        let real_words: i64 = batch.word_mask.int().sum().into_scalar().elem::<i64>();
        assert_eq!(real_words, 6);

        let counts = batch.sent_counts.into_data().convert::<f32>().to_vec::<f32>().unwrap();
        assert_eq!(counts, vec![2.0, 1.0]);
    }

    #[test]
    fn test_multi_hot_targets() {
        let device = Default::default();
        let items = vec![
            NoteItem { id: "a".into(), sentences: vec![vec![2]], target: NoteTarget::MultiHot(vec![0.0, 1.0]) },
        ];
        let batch: NoteBatch<TestBackend> = NoteBatcher::new().batch(items, &device);
        match batch.targets {
            NoteTargets::MultiHot(t) => assert_eq!(t.dims(), [1, 2]),
            NoteTargets::Classes(_)  => panic!("expected multi-hot targets"),
        }
    }
}

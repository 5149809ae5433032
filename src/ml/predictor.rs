// ============================================================
// Layer 5 — Predictor
// ============================================================
// Rebuilds a trained classifier from its run directory and
// turns notes into ranked billing codes.
use anyhow::{anyhow, Result};
use burn::{prelude::*, tensor::activation};
use serde::{Deserialize, Serialize};

use crate::data::batcher::NoteBatch;
use crate::data::labels::LabelMap;
use crate::infra::checkpoint::{CheckpointChoice, CheckpointManager};
use crate::ml::model::NoteClassifier;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotePrediction {
    pub id:    String,
    /// (code, probability), most probable first
    pub codes: Vec<(String, f32)>,
}

pub struct Predictor<B: Backend> {
    model:      NoteClassifier<B>,
    labels:     LabelMap,
    multilabel: bool,
    top_k:      usize,
}

impl<B: Backend> Predictor<B> {
    pub fn new(model: NoteClassifier<B>, labels: LabelMap, multilabel: bool, top_k: usize) -> Self {
        Self { model, labels, multilabel, top_k: top_k.max(1) }
    }

    pub fn from_checkpoint(
        ckpt:   &CheckpointManager,
        choice: CheckpointChoice,
        top_k:  usize,
        device: &B::Device,
    ) -> Result<Self> {
        let cfg       = ckpt.load_config()?;
        let model_cfg = ckpt.load_model_config()?.with_dropout(0.0);
        let model     = ckpt.load_model(model_cfg.init::<B>(device), choice, device)?;
        let labels    = ckpt.load_labels()?;
        tracing::info!("Model loaded from '{}'", ckpt.dir().display());
        Ok(Self::new(model, labels, cfg.multilabel, top_k))
    }

    pub fn predict(&self, batch: NoteBatch<B>) -> Result<Vec<NotePrediction>> {
        let output = self.model.forward(batch.tokens, batch.word_mask, batch.sent_mask);
        let [n, c] = output.logits.dims();

        let probs = if self.multilabel {
            activation::sigmoid(output.logits)
        } else {
            activation::softmax(output.logits, 1)
        };
        let probs: Vec<f32> = probs
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("Cannot read probabilities: {e:?}"))?;

        let predictions = batch
            .ids
            .into_iter()
            .enumerate()
            .take(n)
            .map(|(row, id)| NotePrediction { id, codes: self.top_codes(&probs[row * c..(row + 1) * c]) })
            .collect();
        Ok(predictions)
    }

    fn top_codes(&self, row: &[f32]) -> Vec<(String, f32)> {
        let mut ranked: Vec<(usize, f32)> = row.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
            .into_iter()
            .take(self.top_k)
            .filter_map(|(i, p)| self.labels.code_of(i).map(|code| (code.to_string(), p)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::NoteBatcher;
    use crate::data::dataset::{NoteItem, NoteTarget};
    use crate::ml::model::NoteClassifierConfig;
    use burn::backend::NdArray;
    use burn::data::dataloader::batcher::Batcher;

    type TestBackend = NdArray;

    #[test]
    fn test_top_k_codes_sorted_by_probability() {
        let device = Default::default();
        let model  = NoteClassifierConfig::new(10, 4, 3, 3).init::<TestBackend>(&device);
        let labels = LabelMap::from(vec!["250.00".to_string(), "401.9".to_string(), "428.0".to_string()]);
        let pred   = Predictor::new(model, labels, false, 2);

        let items = vec![
            NoteItem { id: "a".into(), sentences: vec![vec![2, 3]], target: NoteTarget::Class(0) },
            NoteItem { id: "b".into(), sentences: vec![vec![4]],    target: NoteTarget::Class(1) },
        ];
        let out = pred.predict(NoteBatcher::new().batch(items, &device)).unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[1].id, "b");
        for p in &out {
            assert_eq!(p.codes.len(), 2);
            assert!(p.codes[0].1 >= p.codes[1].1);
        }
    }
}

// ============================================================
// Layer 2 — PredictUseCase
// ============================================================
// Ranks billing codes for every note of a .jsonl file using a
// saved run, and optionally writes them as JSON Lines:
//
//   {"id": "100001", "codes": [["428.0", 0.81], ["401.9", 0.07]]}
//
// Notes do not need a "labels" field here; whatever codes they
// carry are ignored.

use anyhow::{bail, Context, Result};
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    prelude::*,
};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    sync::Arc,
};

use crate::application::backend::{ndarray_device, wgpu_device, BackendKind, NdArrayBackend, WgpuBackend};
use crate::data::{
    batcher::{NoteBatch, NoteBatcher},
    dataset::{EncodeOptions, NotesDataset},
    loader::JsonlNoteLoader,
};
use crate::domain::traits::NoteSource;
use crate::infra::checkpoint::{CheckpointChoice, CheckpointManager};
use crate::ml::predictor::{NotePrediction, Predictor};

pub struct PredictUseCase {
    run_dir:   String,
    data_path: String,
    output:    Option<String>,
    top_k:     usize,
    choice:    CheckpointChoice,
    backend:   BackendKind,
}

impl PredictUseCase {
    pub fn new(
        run_dir:   String,
        data_path: String,
        output:    Option<String>,
        top_k:     usize,
        choice:    CheckpointChoice,
        backend:   BackendKind,
    ) -> Self {
        Self { run_dir, data_path, output, top_k, choice, backend }
    }

    pub fn run(&self) -> Result<Vec<NotePrediction>> {
        match self.backend {
            BackendKind::Wgpu    => self.execute::<WgpuBackend>(wgpu_device()),
            BackendKind::NdArray => self.execute::<NdArrayBackend>(ndarray_device()),
        }
    }

    pub fn execute<B: Backend>(&self, device: B::Device) -> Result<Vec<NotePrediction>> {
        let ckpt      = CheckpointManager::open(&self.run_dir)?;
        let cfg       = ckpt.load_config()?;
        let vocab     = ckpt.load_vocab()?;
        let labels    = ckpt.load_labels()?;
        let predictor = Predictor::<B>::from_checkpoint(&ckpt, self.choice, self.top_k, &device)?;

        let notes = JsonlNoteLoader::new(&self.data_path).load_all()?;

        // Multi-hot targets accept notes without codes; the
        // predictor never reads them.
        let opts = EncodeOptions { multilabel: true, ..cfg.encode_options() };
        let dataset = NotesDataset::encode(&notes, &vocab, &labels, opts)?;
        if dataset.sample_count() == 0 {
            bail!("'{}' holds no note with text", self.data_path);
        }

        // Single worker keeps the input order.
        let loader: Arc<dyn DataLoader<B, NoteBatch<B>>> = DataLoaderBuilder::new(NoteBatcher::new())
            .batch_size(cfg.batch_size)
            .set_device(device)
            .build(Arc::new(dataset));

        let mut predictions = Vec::with_capacity(notes.len());
        for batch in loader.iter() {
            predictions.extend(predictor.predict(batch)?);
        }
        tracing::info!("Predicted codes for {} notes", predictions.len());

        if let Some(path) = &self.output {
            write_predictions(&predictions, Path::new(path))?;
        }
        Ok(predictions)
    }
}

pub fn write_predictions(predictions: &[NotePrediction], path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Cannot create '{}'", path.display()))?;
    let mut out = BufWriter::new(file);
    for p in predictions {
        serde_json::to_writer(&mut out, p)?;
        writeln!(out)?;
    }
    out.flush()?;
    tracing::info!("Wrote predictions to '{}'", path.display());
    Ok(())
}

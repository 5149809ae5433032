// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Scores a finished run on any .jsonl split:
//
//   1. Open the run directory and reload its train config,
//      vocabulary, label map and model config
//   2. Restore the chosen weights (best by default)
//   3. Encode the notes exactly as training did
//   4. Loss / accuracy / precision / recall / F1
//
// Notes whose primary code never appeared in training cannot
// be scored by a single-label model and are skipped with a
// warning.

use anyhow::{bail, Result};
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    prelude::*,
};
use std::sync::Arc;

use crate::application::backend::{ndarray_device, wgpu_device, BackendKind, NdArrayBackend, WgpuBackend};
use crate::data::{
    batcher::{NoteBatch, NoteBatcher},
    dataset::{EncodeOptions, NotesDataset},
    loader::JsonlNoteLoader,
};
use crate::domain::traits::NoteSource;
use crate::infra::checkpoint::{CheckpointChoice, CheckpointManager};
use crate::ml::evaluator::{evaluate, EvalReport};

pub struct EvaluateUseCase {
    run_dir:   String,
    data_path: String,
    choice:    CheckpointChoice,
    backend:   BackendKind,
}

impl EvaluateUseCase {
    pub fn new(run_dir: String, data_path: String, choice: CheckpointChoice, backend: BackendKind) -> Self {
        Self { run_dir, data_path, choice, backend }
    }

    pub fn run(&self) -> Result<EvalReport> {
        match self.backend {
            BackendKind::Wgpu    => self.execute::<WgpuBackend>(wgpu_device()),
            BackendKind::NdArray => self.execute::<NdArrayBackend>(ndarray_device()),
        }
    }

    pub fn execute<B: Backend>(&self, device: B::Device) -> Result<EvalReport> {
        let ckpt   = CheckpointManager::open(&self.run_dir)?;
        let cfg    = ckpt.load_config()?;
        let vocab  = ckpt.load_vocab()?;
        let labels = ckpt.load_labels()?;

        let model_cfg = ckpt.load_model_config()?.with_dropout(0.0);
        let model     = ckpt.load_model(model_cfg.init::<B>(&device), self.choice, &device)?;

        tracing::info!("Evaluating '{}' on '{}'", self.run_dir, self.data_path);
        let notes   = JsonlNoteLoader::new(&self.data_path).load_all()?;
        let opts    = EncodeOptions { skip_unknown_codes: true, ..cfg.encode_options() };
        let dataset = NotesDataset::encode(&notes, &vocab, &labels, opts)?;
        if dataset.sample_count() == 0 {
            bail!("No note in '{}' can be scored by this run", self.data_path);
        }

        let loader: Arc<dyn DataLoader<B, NoteBatch<B>>> = DataLoaderBuilder::new(NoteBatcher::new())
            .batch_size(cfg.batch_size)
            .num_workers(cfg.num_workers)
            .set_device(device)
            .build(Arc::new(dataset));

        let report = evaluate(&model, loader.iter(), cfg.loss()?)?;
        tracing::info!(
            samples = report.samples,
            loss = report.loss,
            f1 = report.scores.f1,
            "evaluation finished"
        );
        Ok(report)
    }
}

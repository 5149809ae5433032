// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Owns one run directory:
//
//   <model_dir>/<exp_name>/
//     train_config.json    ← every flag the run was started with
//     model_config.json    ← NoteClassifierConfig (Burn Config)
//     vocab.json           ← token list, index = embedding row
//     labels.json          ← code list, index = class
//     epoch_1.mpk.gz       ← weights after epoch 1 (CompactRecorder)
//     epoch_2.mpk.gz
//     ...
//     latest_epoch.json    ← number of the last saved epoch
//     best_epoch.json      ← epoch with the lowest validation loss
//
// A run directory is written once. Starting a run whose
// directory already holds a train_config.json is refused so
// an old experiment is never overwritten by accident.

use anyhow::{bail, Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{labels::LabelMap, vocab::Vocabulary};
use crate::ml::model::{NoteClassifier, NoteClassifierConfig};

const TRAIN_CONFIG: &str = "train_config.json";
const MODEL_CONFIG: &str = "model_config.json";
const VOCAB:        &str = "vocab.json";
const LABELS:       &str = "labels.json";
const LATEST_EPOCH: &str = "latest_epoch.json";
const BEST_EPOCH:   &str = "best_epoch.json";

/// Which saved weights to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointChoice {
    Latest,
    Best,
    Epoch(usize),
}

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create the directory for a new run.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        Self::ensure_fresh(&dir)?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create run directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open the directory of a finished (or running) experiment.
    /// Fails when `dir` already holds a saved experiment.
    pub fn ensure_fresh(dir: &Path) -> Result<()> {
        if dir.join(TRAIN_CONFIG).exists() {
            bail!(
                "Run directory '{}' already holds an experiment. Choose a new exp_name",
                dir.display()
            );
        }
        Ok(())
    }

    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.join(TRAIN_CONFIG).exists() {
            bail!(
                "'{}' is not a run directory. Have you run 'train' first?",
                dir.display()
            );
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // ─── Run metadata ────────────────────────────────────────────────────────

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        self.write_json(TRAIN_CONFIG, cfg)
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        self.read_json(TRAIN_CONFIG)
    }

    pub fn save_model_config(&self, cfg: &NoteClassifierConfig) -> Result<()> {
        let path = self.dir.join(MODEL_CONFIG);
        cfg.save(&path)
            .with_context(|| format!("Cannot write model config to '{}'", path.display()))
    }

    pub fn load_model_config(&self) -> Result<NoteClassifierConfig> {
        let path = self.dir.join(MODEL_CONFIG);
        NoteClassifierConfig::load(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read model config '{}': {e:?}", path.display()))
    }

    pub fn save_vocab(&self, vocab: &Vocabulary) -> Result<()> {
        self.write_json(VOCAB, vocab)
    }

    pub fn load_vocab(&self) -> Result<Vocabulary> {
        self.read_json(VOCAB)
    }

    pub fn save_labels(&self, labels: &LabelMap) -> Result<()> {
        self.write_json(LABELS, labels)
    }

    pub fn load_labels(&self) -> Result<LabelMap> {
        self.read_json(LABELS)
    }

    // ─── Weights ─────────────────────────────────────────────────────────────

    /// Write {dir}/epoch_{epoch}.mpk.gz and move the latest pointer.
    pub fn save_model<B: Backend>(&self, model: &NoteClassifier<B>, epoch: usize) -> Result<()> {
        let path = self.weights_path(epoch);

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        self.write_json(LATEST_EPOCH, &epoch)?;
        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(())
    }

    pub fn mark_best(&self, epoch: usize) -> Result<()> {
        self.write_json(BEST_EPOCH, &epoch)
    }

    pub fn latest_epoch(&self) -> Result<usize> {
        self.read_json(LATEST_EPOCH)
            .context("No checkpoint saved yet. Has training finished an epoch?")
    }

    pub fn best_epoch(&self) -> Result<usize> {
        self.read_json(BEST_EPOCH)
    }

    /// Restore weights into `model`, which must have the saved architecture.
    pub fn load_model<B: Backend>(
        &self,
        model:  NoteClassifier<B>,
        choice: CheckpointChoice,
        device: &B::Device,
    ) -> Result<NoteClassifier<B>> {
        let epoch = match choice {
            CheckpointChoice::Latest   => self.latest_epoch()?,
            CheckpointChoice::Best     => self.best_epoch().or_else(|_| self.latest_epoch())?,
            CheckpointChoice::Epoch(n) => n,
        };
        let path = self.weights_path(epoch);

        tracing::info!("Loading checkpoint from epoch {}", epoch);

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;

        Ok(model.load_record(record))
    }

    fn weights_path(&self, epoch: usize) -> PathBuf {
        // the recorder appends .mpk.gz
        self.dir.join(format!("epoch_{epoch}"))
    }

    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).with_context(|| format!("Cannot write '{}'", path.display()))
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.dir.join(name);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Malformed '{}'", path.display()))
    }
}

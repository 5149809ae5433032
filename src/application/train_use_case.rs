// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one training run in order:
//
//   Step 1: Load the .jsonl splits          (Layer 4 - data)
//   Step 2: Build the label map             (Layer 4 - data)
//   Step 3: Build the vocabulary            (Layer 4 - data)
//   Step 4: Report the label mix            (Layer 4 - data)
//   Step 5: Build StarSpace vectors         (Layer 4 - data, optional)
//   Step 6: Encode the datasets             (Layer 4 - data)
//   Step 7: Create the run directory        (Layer 6 - infra)
//   Step 8: Build the model + embeddings    (Layer 5 - ml)
//   Step 9: Run the training loop           (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{bail, Result};
use burn::{backend::Autodiff, tensor::backend::AutodiffBackend};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::application::backend::{ndarray_device, wgpu_device, BackendKind, NdArrayBackend, WgpuBackend};
use crate::data::{
    dataset::{EncodeOptions, NotesDataset},
    labels::{count_labels, LabelMap},
    loader::JsonlNoteLoader,
    splitter::split_train_val,
    starspace,
    vocab::Vocabulary,
};
use crate::domain::{
    note::ClinicalNote,
    traits::{MetricsSink, NoteSource},
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{CsvMetricsSink, LogMetricsSink},
};
use crate::ml::{
    loss::{LossKind, DEFAULT_FOCAL_GAMMA},
    model::{ModelKind, NoteClassifierConfig},
    trainer::{run_training, TrainDevices, TrainSummary},
};

/// How many entries of the label mix are shown at info level.
const LABEL_MIX_SHOWN: usize = 10;

// ─── Training Configuration ──────────────────────────────────────────────────
// Every flag of a run. Saved as train_config.json in the run
// directory so evaluate / predict can rebuild the same pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    // paths
    pub train_path:   String,
    /// Separate validation file. Without it `val_fraction` of the
    /// training notes are held out.
    pub val_path:     Option<String>,
    pub val_fraction: f64,
    pub model_dir:    String,
    pub log_dir:      String,
    pub exp_name:     String,
    pub backend:      BackendKind,

    // model
    pub model:       ModelKind,
    pub embed_dim:   usize,
    pub hidden_dim:  usize,
    pub dropout:     f64,

    // optimisation
    pub batch_size:      usize,
    pub num_workers:     usize,
    pub lr:              f64,
    pub lr_decay_rate:   f64,
    pub lr_decay_epoch:  usize,
    pub num_epochs:      usize,
    pub log_interval:    usize,
    pub clip_norm:       f32,
    pub seed:            u64,

    // data
    pub vocab_threshold: usize,
    pub max_sentences:   Option<usize>,
    pub max_words:       Option<usize>,

    // loss
    pub multilabel:  bool,
    pub focal_loss:  bool,
    pub focal_gamma: f64,

    // StarSpace
    pub build_starspace:      bool,
    pub use_starspace:        bool,
    pub starspace_exec:       String,
    pub starspace_args:       Vec<String>,
    pub starspace_train_file: String,
    pub embed_path:           String,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_path:   "data/train.jsonl".to_string(),
            val_path:     None,
            val_fraction: 0.1,
            model_dir:    "models".to_string(),
            log_dir:      "log".to_string(),
            exp_name:     "run".to_string(),
            backend:      BackendKind::Wgpu,

            model:      ModelKind::Han,
            embed_dim:  50,
            hidden_dim: 100,
            dropout:    0.0,

            batch_size:     16,
            num_workers:    4,
            lr:             1e-2,
            lr_decay_rate:  0.9,
            lr_decay_epoch: 10,
            num_epochs:     10,
            log_interval:   100,
            clip_norm:      1.0,
            seed:           1,

            vocab_threshold: 20,
            max_sentences:   None,
            max_words:       None,

            multilabel:  false,
            focal_loss:  false,
            focal_gamma: DEFAULT_FOCAL_GAMMA,

            build_starspace:      false,
            use_starspace:        false,
            starspace_exec:       "./Starspace/run.sh".to_string(),
            starspace_args:       Vec::new(),
            starspace_train_file: "stsp_embeddings.txt".to_string(),
            embed_path:           "Starspace/stsp_model.tsv".to_string(),
        }
    }
}

impl TrainConfig {
    pub fn run_dir(&self) -> PathBuf {
        Path::new(&self.model_dir).join(&self.exp_name)
    }

    pub fn run_log_dir(&self) -> PathBuf {
        Path::new(&self.log_dir).join(&self.exp_name)
    }

    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            multilabel:         self.multilabel,
            max_sentences:      self.max_sentences,
            max_words:          self.max_words,
            skip_unknown_codes: false,
        }
    }

    pub fn model_config(&self, vocab_size: usize, num_labels: usize) -> NoteClassifierConfig {
        NoteClassifierConfig::new(vocab_size, self.embed_dim, self.hidden_dim, num_labels)
            .with_dropout(self.dropout)
            .with_kind(self.model)
    }

    pub fn loss(&self) -> Result<LossKind> {
        LossKind::for_task(self.multilabel, self.focal_loss, self.focal_gamma)
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Run on the backend named in the config.
    pub fn run(&self) -> Result<TrainSummary> {
        tracing::info!("Training on the {} backend", self.config.backend);
        match self.config.backend {
            BackendKind::Wgpu => {
                let device = wgpu_device();
                self.execute::<Autodiff<WgpuBackend>>(TrainDevices { train: device.clone(), eval: device })
            }
            BackendKind::NdArray => {
                let device = ndarray_device();
                self.execute::<Autodiff<NdArrayBackend>>(TrainDevices { train: device.clone(), eval: device })
            }
        }
    }

    /// Execute the full training pipeline end to end
    pub fn execute<B: AutodiffBackend>(&self, devices: TrainDevices<B>) -> Result<TrainSummary> {
        let cfg = &self.config;

        // The CSV of an earlier run would otherwise be appended to.
        let log_dir = cfg.run_log_dir();
        if log_dir.join("metrics.csv").exists() {
            bail!("Log path '{}' already exists. Enter a new exp_name", log_dir.display());
        }
        CheckpointManager::ensure_fresh(&cfg.run_dir())?;

        // ── Step 1: Load notes ────────────────────────────────────────────────
        tracing::info!("Loading training notes from '{}'", cfg.train_path);
        let notes = JsonlNoteLoader::new(&cfg.train_path).load_all()?;

        let (train_notes, val_notes) = match &cfg.val_path {
            Some(path) => {
                tracing::info!("Loading validation notes from '{}'", path);
                (notes, JsonlNoteLoader::new(path).load_all()?)
            }
            None => {
                tracing::info!("No validation file; holding out {:.0}% of training notes", cfg.val_fraction * 100.0);
                split_train_val(notes, 1.0 - cfg.val_fraction, cfg.seed)
            }
        };
        tracing::info!("Train size: {}, valid size: {}", train_notes.len(), val_notes.len());
        if train_notes.is_empty() {
            bail!("No training notes in '{}'", cfg.train_path);
        }

        // ── Step 2: Label map ─────────────────────────────────────────────────
        let labels = LabelMap::from_notes(&train_notes);
        if labels.is_empty() {
            bail!("Training notes carry no billing codes");
        }
        tracing::info!("Number of labels is {}", labels.len());
        tracing::debug!("Labels: {:?}", labels.codes());

        // ── Step 3: Vocabulary ────────────────────────────────────────────────
        let vocab = Vocabulary::build(&train_notes, cfg.vocab_threshold);
        tracing::info!("Vocab size: {}", vocab.len());
        tracing::debug!("First tokens: {:?}", &vocab.tokens()[..vocab.len().min(20)]);

        // ── Step 4: Label mix ─────────────────────────────────────────────────
        log_label_mix("training", &train_notes, !cfg.multilabel);
        log_label_mix("valid", &val_notes, !cfg.multilabel);

        // ── Step 5: StarSpace ─────────────────────────────────────────────────
        if cfg.build_starspace {
            starspace::write_training_file(&train_notes, Path::new(&cfg.starspace_train_file))?;
            starspace::run_starspace(Path::new(&cfg.starspace_exec), &cfg.starspace_args)?;
        }

        // ── Step 6: Datasets ──────────────────────────────────────────────────
        let train_dataset = NotesDataset::encode(&train_notes, &vocab, &labels, cfg.encode_options())?;
        let val_opts      = EncodeOptions { skip_unknown_codes: true, ..cfg.encode_options() };
        let val_dataset   = NotesDataset::encode(&val_notes, &vocab, &labels, val_opts)?;
        tracing::info!(
            "Encoded {} training and {} validation notes",
            train_dataset.sample_count(),
            val_dataset.sample_count()
        );

        // ── Step 7: Run directory ─────────────────────────────────────────────
        let ckpt = CheckpointManager::create(cfg.run_dir())?;
        let model_cfg = cfg.model_config(vocab.len(), labels.len());
        ckpt.save_config(cfg)?;
        ckpt.save_model_config(&model_cfg)?;
        ckpt.save_vocab(&vocab)?;
        ckpt.save_labels(&labels)?;

        let mut sinks: Vec<Box<dyn MetricsSink>> = vec![
            Box::new(LogMetricsSink),
            Box::new(CsvMetricsSink::new(&log_dir)?),
        ];

        // ── Step 8: Model ─────────────────────────────────────────────────────
        tracing::info!("Using {:?} model", cfg.model);
        let mut model = model_cfg.init::<B>(&devices.train);

        if cfg.use_starspace {
            let embeds = starspace::load_embeddings(Path::new(&cfg.embed_path), cfg.embed_dim)?;
            let matrix = starspace::embedding_matrix(&embeds, &vocab, cfg.embed_dim, cfg.seed);
            model = model.with_pretrained_embeddings(matrix, &devices.train)?;
            tracing::info!("Model embeddings initialized with StarSpace");
        }

        let loss = cfg.loss()?;
        tracing::info!("Using {:?} loss", loss);

        // ── Step 9: Train ─────────────────────────────────────────────────────
        run_training(cfg, model, loss, train_dataset, val_dataset, &ckpt, &mut sinks, devices)
    }
}

fn log_label_mix(split: &str, notes: &[ClinicalNote], primary_only: bool) {
    let counts = count_labels(notes, primary_only);
    tracing::info!("Label mix {} data ({} distinct codes)", split, counts.len());
    for (i, (code, n)) in counts.iter().enumerate() {
        if i < LABEL_MIX_SHOWN {
            tracing::info!("  {:<8} {}", code, n);
        } else {
            tracing::debug!("  {:<8} {}", code, n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::checkpoint::CheckpointChoice;
    use std::fs;

    type TestBackend = Autodiff<NdArrayBackend>;

    fn write_notes(path: &Path, n: usize) {
        let lines: Vec<String> = (0..n)
            .map(|i| {
                let code = if i % 2 == 0 { "428.0" } else { "401.9" };
                format!(
                    r#"{{"id": "{i}", "sentences": [["chest", "pain"], ["history", "of", "chf"]], "labels": "{code}"}}"#
                )
            })
            .collect();
        fs::write(path, lines.join("\n")).unwrap();
    }

    fn config(dir: &Path) -> TrainConfig {
        let train = dir.join("train.jsonl");
        write_notes(&train, 8);
        TrainConfig {
            train_path:      train.display().to_string(),
            val_fraction:    0.25,
            model_dir:       dir.join("models").display().to_string(),
            log_dir:         dir.join("log").display().to_string(),
            backend:         BackendKind::NdArray,
            embed_dim:       4,
            hidden_dim:      3,
            batch_size:      4,
            num_workers:     1,
            num_epochs:      1,
            vocab_threshold: 1,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let cfg  = TrainConfig { val_path: Some("v.jsonl".into()), model: ModelKind::Cbow, ..TrainConfig::default() };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: TrainConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.val_path.as_deref(), Some("v.jsonl"));
        assert_eq!(back.model, ModelKind::Cbow);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let cfg: TrainConfig = serde_json::from_str(r#"{"exp_name": "x"}"#).unwrap();
        assert_eq!(cfg.exp_name, "x");
        assert_eq!(cfg.batch_size, 16);
    }

    #[test]
    fn test_execute_writes_run_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());

        let summary = TrainUseCase::new(cfg.clone())
            .execute::<TestBackend>(TrainDevices { train: Default::default(), eval: Default::default() })
            .unwrap();
        assert_eq!(summary.epochs, 1);

        let ckpt = CheckpointManager::open(cfg.run_dir()).unwrap();
        assert_eq!(ckpt.load_labels().unwrap().len(), 2);
        assert_eq!(ckpt.latest_epoch().unwrap(), 1);
        assert!(cfg.run_log_dir().join("metrics.csv").exists());
    }

    #[test]
    fn test_reusing_exp_name_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let use_case = TrainUseCase::new(cfg);

        use_case
            .execute::<TestBackend>(TrainDevices { train: Default::default(), eval: Default::default() })
            .unwrap();
        let again = use_case.execute::<TestBackend>(TrainDevices { train: Default::default(), eval: Default::default() });
        assert!(again.is_err());
    }

    #[test]
    fn test_existing_run_dir_fails_before_loading_notes() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = TrainConfig { train_path: dir.path().join("missing.jsonl").display().to_string(), ..config(dir.path()) };
        fs::create_dir_all(cfg.run_dir()).unwrap();
        fs::write(cfg.run_dir().join("train_config.json"), "{}").unwrap();

        let err = TrainUseCase::new(cfg)
            .execute::<TestBackend>(TrainDevices { train: Default::default(), eval: Default::default() })
            .unwrap_err();
        assert!(err.to_string().contains("exp_name"), "{err}");
    }

    #[test]
    fn test_multilabel_run_learns_every_code() {
        let dir   = tempfile::tempdir().unwrap();
        let train = dir.path().join("multi.jsonl");
        fs::write(
            &train,
            (0..8)
                .map(|i| {
                    let codes = if i % 2 == 0 { "428.0 401.9" } else { "401.9 250.00" };
                    format!(r#"{{"id": "{i}", "sentences": [["chest", "pain"], ["edema"]], "labels": "{codes}"}}"#)
                })
                .collect::<Vec<_>>()
                .join("\n"),
        )
        .unwrap();
        let cfg = TrainConfig {
            train_path: train.display().to_string(),
            val_path:   Some(train.display().to_string()),
            multilabel: true,
            ..config(dir.path())
        };

        let summary = TrainUseCase::new(cfg.clone())
            .execute::<TestBackend>(TrainDevices { train: Default::default(), eval: Default::default() })
            .unwrap();
        assert!(summary.best_val_loss.is_finite());

        let ckpt = CheckpointManager::open(cfg.run_dir()).unwrap();
        assert_eq!(ckpt.load_labels().unwrap().len(), 3);
        assert!(ckpt.load_config().unwrap().multilabel);
        assert_eq!(ckpt.load_model_config().unwrap().num_labels, 3);
    }

    #[test]
    fn test_starspace_vectors_seed_the_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let tsv = dir.path().join("stsp_model.tsv");
        fs::write(
            &tsv,
            "chest\t0.5\t-0.25\t0.125\t1\n\
             pain\t-1\t0\t0.75\t0.25\n\
             __label__428.0\t9\t9\t9\t9\n",
        )
        .unwrap();

        // Zero learning rate leaves the loaded vectors untouched.
        let cfg = TrainConfig {
            use_starspace: true,
            embed_path:    tsv.display().to_string(),
            lr:            0.0,
            ..config(dir.path())
        };
        TrainUseCase::new(cfg.clone())
            .execute::<TestBackend>(TrainDevices { train: Default::default(), eval: Default::default() })
            .unwrap();

        let ckpt   = CheckpointManager::open(cfg.run_dir()).unwrap();
        let vocab  = ckpt.load_vocab().unwrap();
        let device = Default::default();
        let model  = ckpt
            .load_model(
                ckpt.load_model_config().unwrap().init::<NdArrayBackend>(&device),
                CheckpointChoice::Latest,
                &device,
            )
            .unwrap();
        let weights = model.embedding.weight.val().into_data().to_vec::<f32>().unwrap();
        let row = |token: &str| {
            let i = vocab.index_of(token) as usize;
            weights[i * 4..(i + 1) * 4].to_vec()
        };

        assert_eq!(row("chest"), vec![0.5, -0.25, 0.125, 1.0]);
        assert_eq!(row("pain"), vec![-1.0, 0.0, 0.75, 0.25]);
        assert_eq!(&weights[..4], &[0.0; 4]);
    }
}

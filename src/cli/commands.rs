// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the four subcommands and all their flags:
//
//   train      — build vocabulary + labels, train, checkpoint
//   evaluate   — score a saved run on a .jsonl file
//   predict    — top-k codes per note from a saved run
//   starspace  — write (and optionally build) StarSpace input
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::backend::BackendKind;
use crate::application::train_use_case::TrainConfig;
use crate::infra::checkpoint::CheckpointChoice;
use crate::ml::{loss::DEFAULT_FOCAL_GAMMA, model::ModelKind};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a note classifier on a .jsonl split
    Train(TrainArgs),

    /// Evaluate a trained run on a .jsonl file
    Evaluate(EvaluateArgs),

    /// Predict billing codes with a trained run
    Predict(PredictArgs),

    /// Write the StarSpace training file (and optionally run StarSpace)
    Starspace(StarspaceArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Training notes, one JSON object per line
    #[arg(long)]
    pub train_path: String,

    /// Validation notes. Without it --val-fraction of the training notes are held out
    #[arg(long)]
    pub val_path: Option<String>,

    #[arg(long, default_value_t = 0.1)]
    pub val_fraction: f64,

    /// Parent directory of the run directory
    #[arg(long, default_value = "models")]
    pub model_dir: String,

    /// Parent directory of the metrics CSV
    #[arg(long, default_value = "log")]
    pub log_dir: String,

    /// Name of this run; must not exist yet
    #[arg(long, default_value = "run")]
    pub exp_name: String,

    /// han | hierarchical | cbow
    #[arg(long, default_value = "han")]
    pub model: ModelKind,

    /// wgpu | ndarray
    #[arg(long, default_value = "wgpu")]
    pub backend: BackendKind,

    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,

    /// Data loader worker threads
    #[arg(long, default_value_t = 4)]
    pub num_workers: usize,

    /// Word embedding size; must match the StarSpace vectors when used
    #[arg(long, default_value_t = 50)]
    pub embed_dim: usize,

    /// Hidden size of each GRU direction
    #[arg(long, default_value_t = 100)]
    pub hidden_dim: usize,

    #[arg(long, default_value_t = 0.0)]
    pub dropout: f64,

    #[arg(long, default_value_t = 1e-2)]
    pub lr: f64,

    /// Learning rate multiplier applied at each decay
    #[arg(long, default_value_t = 0.9)]
    pub lr_decay_rate: f64,

    /// Epochs between two decays
    #[arg(long, default_value_t = 10)]
    pub lr_decay_epoch: usize,

    #[arg(long, default_value_t = 10)]
    pub num_epochs: usize,

    /// Steps between two running-loss log lines
    #[arg(long, default_value_t = 100)]
    pub log_interval: usize,

    /// Minimum count for a token to enter the vocabulary
    #[arg(long, default_value_t = 20)]
    pub vocab_threshold: usize,

    /// Maximum global gradient norm
    #[arg(long, default_value_t = 1.0)]
    pub clip_norm: f32,

    /// Seed for the shuffle, the validation split and the StarSpace fill-in
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Keep at most this many sentences per note
    #[arg(long)]
    pub max_sentences: Option<usize>,

    /// Keep at most this many tokens per sentence
    #[arg(long)]
    pub max_words: Option<usize>,

    /// Predict every code of a note instead of the primary one
    #[arg(long)]
    pub multilabel: bool,

    /// Focal loss instead of cross-entropy (single-label only)
    #[arg(long)]
    pub focal_loss: bool,

    #[arg(long, default_value_t = DEFAULT_FOCAL_GAMMA)]
    pub focal_gamma: f64,

    /// Write the StarSpace file and run --starspace-exec before training
    #[arg(long)]
    pub build_starspace: bool,

    /// Initialise word embeddings from --embed-path
    #[arg(long)]
    pub use_starspace: bool,

    #[arg(long, default_value = "./Starspace/run.sh")]
    pub starspace_exec: String,

    /// Extra argument for the StarSpace executable (repeatable)
    #[arg(long = "starspace-arg", allow_hyphen_values = true)]
    pub starspace_args: Vec<String>,

    #[arg(long, default_value = "stsp_embeddings.txt")]
    pub starspace_train_file: String,

    /// StarSpace .tsv model
    #[arg(long, default_value = "Starspace/stsp_model.tsv")]
    pub embed_path: String,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            train_path:           a.train_path,
            val_path:             a.val_path,
            val_fraction:         a.val_fraction,
            model_dir:            a.model_dir,
            log_dir:              a.log_dir,
            exp_name:             a.exp_name,
            backend:              a.backend,
            model:                a.model,
            embed_dim:            a.embed_dim,
            hidden_dim:           a.hidden_dim,
            dropout:              a.dropout,
            batch_size:           a.batch_size,
            num_workers:          a.num_workers,
            lr:                   a.lr,
            lr_decay_rate:        a.lr_decay_rate,
            lr_decay_epoch:       a.lr_decay_epoch,
            num_epochs:           a.num_epochs,
            log_interval:         a.log_interval,
            clip_norm:            a.clip_norm,
            seed:                 a.seed,
            vocab_threshold:      a.vocab_threshold,
            max_sentences:        a.max_sentences,
            max_words:            a.max_words,
            multilabel:           a.multilabel,
            focal_loss:           a.focal_loss,
            focal_gamma:          a.focal_gamma,
            build_starspace:      a.build_starspace,
            use_starspace:        a.use_starspace,
            starspace_exec:       a.starspace_exec,
            starspace_args:       a.starspace_args,
            starspace_train_file: a.starspace_train_file,
            embed_path:           a.embed_path,
        }
    }
}

/// Which weights of a run to load. Best validation loss unless told otherwise.
#[derive(Args, Debug)]
pub struct CheckpointArgs {
    /// Run directory written by `train` (<model_dir>/<exp_name>)
    #[arg(long)]
    pub run_dir: String,

    /// Load this epoch's weights
    #[arg(long, conflicts_with = "latest")]
    pub epoch: Option<usize>,

    /// Load the last saved epoch instead of the best one
    #[arg(long)]
    pub latest: bool,

    /// wgpu | ndarray
    #[arg(long, default_value = "wgpu")]
    pub backend: BackendKind,
}

impl CheckpointArgs {
    pub fn choice(&self) -> CheckpointChoice {
        match (self.epoch, self.latest) {
            (Some(n), _)   => CheckpointChoice::Epoch(n),
            (None, true)   => CheckpointChoice::Latest,
            (None, false)  => CheckpointChoice::Best,
        }
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub checkpoint: CheckpointArgs,

    /// Notes to score, with their codes
    #[arg(long)]
    pub data_path: String,
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    #[command(flatten)]
    pub checkpoint: CheckpointArgs,

    /// Notes to label; the "labels" field may be absent
    #[arg(long)]
    pub data_path: String,

    /// Write predictions here as JSON Lines instead of printing them
    #[arg(long)]
    pub output: Option<String>,

    /// Codes reported per note
    #[arg(long, default_value_t = 5)]
    pub top_k: usize,
}

#[derive(Args, Debug)]
pub struct StarspaceArgs {
    /// Training notes, one JSON object per line
    #[arg(long)]
    pub train_path: String,

    #[arg(long, default_value = "stsp_embeddings.txt")]
    pub output: PathBuf,

    /// Run this StarSpace executable after writing the file
    #[arg(long)]
    pub exec: Option<PathBuf>,

    /// Extra argument for the executable (repeatable)
    #[arg(long = "exec-arg", allow_hyphen_values = true)]
    pub exec_args: Vec<String>,
}

// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Train + evaluate loop using Burn's DataLoader and Adam.
//
// Per epoch:
//   1. learning rate from the step-decay schedule
//   2. for each shuffled batch: forward → loss → backward →
//      clip gradient norm → Adam step
//   3. model.valid() (dropout off, no autodiff) evaluated on
//      the training split and the validation split
//   4. EpochMetrics → MetricsSink, weights → checkpoint
//
// Burn notes:
//   - Training batches live on B (Autodiff<…>)
//   - model.valid() returns the model on B::InnerBackend,
//     so evaluation loaders are built for the inner backend
//   - Gradient clipping is configured on the optimizer
//
// Reference: Kingma & Ba (2015) Adam

use anyhow::{bail, Result};
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::sync::Arc;

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{NoteBatch, NoteBatcher},
    dataset::NotesDataset,
};
use crate::domain::{metrics::EpochMetrics, traits::MetricsSink};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{evaluator::evaluate, loss::LossKind, model::NoteClassifier, schedule::StepDecay};

/// Adam betas used for every run
const ADAM_BETA_1: f32 = 0.5;
const ADAM_BETA_2: f32 = 0.999;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainSummary {
    pub epochs:        usize,
    pub steps:         usize,
    pub best_epoch:    usize,
    pub best_val_loss: f64,
}

/// Devices for the autodiff backend and for its inner backend.
/// For every backend in this crate both are the same device.
pub struct TrainDevices<B: AutodiffBackend> {
    pub train: B::Device,
    pub eval:  <B::InnerBackend as Backend>::Device,
}

pub fn run_training<B: AutodiffBackend>(
    cfg:           &TrainConfig,
    model:         NoteClassifier<B>,
    loss:          LossKind,
    train_dataset: NotesDataset,
    val_dataset:   NotesDataset,
    ckpt:          &CheckpointManager,
    sink:          &mut dyn MetricsSink,
    devices:       TrainDevices<B>,
) -> Result<TrainSummary> {
    if train_dataset.sample_count() == 0 {
        bail!("Training split is empty");
    }
    if val_dataset.sample_count() == 0 {
        tracing::warn!("Validation split is empty; validation metrics will be NaN");
    }

    let train = Arc::new(train_dataset);
    let val   = Arc::new(val_dataset);

    // ── Loaders ───────────────────────────────────────────────────────────────
    let train_loader: Arc<dyn DataLoader<B, NoteBatch<B>>> = DataLoaderBuilder::new(NoteBatcher::new())
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(cfg.num_workers)
        .set_device(devices.train.clone())
        .build(train.clone());

    let train_eval_loader: Arc<dyn DataLoader<B::InnerBackend, NoteBatch<B::InnerBackend>>> =
        DataLoaderBuilder::new(NoteBatcher::new())
            .batch_size(cfg.batch_size)
            .num_workers(cfg.num_workers)
            .set_device(devices.eval.clone())
            .build(train);

    let val_loader: Arc<dyn DataLoader<B::InnerBackend, NoteBatch<B::InnerBackend>>> =
        DataLoaderBuilder::new(NoteBatcher::new())
            .batch_size(cfg.batch_size)
            .num_workers(cfg.num_workers)
            .set_device(devices.eval)
            .build(val);

    // ── Adam with gradient-norm clipping ─────────────────────────────────────
    let mut optim = AdamConfig::new()
        .with_beta_1(ADAM_BETA_1)
        .with_beta_2(ADAM_BETA_2)
        .with_grad_clipping(Some(GradientClippingConfig::Norm(cfg.clip_norm)))
        .init();

    let schedule = StepDecay::new(cfg.lr, cfg.lr_decay_rate, cfg.lr_decay_epoch);

    let mut model         = model;
    let mut step          = 0usize;
    let mut best_epoch    = 0usize;
    let mut best_val_loss = f64::INFINITY;

    for epoch_idx in 0..cfg.num_epochs {
        let epoch = epoch_idx + 1;
        let lr    = schedule.lr_for_epoch(epoch_idx);
        tracing::info!("Epoch {}/{} (lr={:.3e})", epoch, cfg.num_epochs, lr);

        // ── Training phase ────────────────────────────────────────────────────
        let mut running_loss  = 0.0f64;
        let mut running_steps = 0usize;

        for batch in train_loader.iter() {
            let output = model.forward(batch.tokens, batch.word_mask, batch.sent_mask);
            let batch_loss = loss.forward(output.logits, &batch.targets)?;

            running_loss  += batch_loss.clone().into_scalar().elem::<f64>();
            running_steps += 1;

            let grads = batch_loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(lr, model, grads);
            step += 1;

            if cfg.log_interval > 0 && step % cfg.log_interval == 0 {
                tracing::info!(
                    "Epoch {} step {}: train_loss={:.4}",
                    epoch,
                    step,
                    running_loss / running_steps as f64,
                );
                running_loss  = 0.0;
                running_steps = 0;

                let norms = model.param_norms();
                tracing::debug!(step, param_l1 = norms.l1, param_l2 = norms.l2(), "parameter norms");
            }
        }

        // ── Evaluation phase ──────────────────────────────────────────────────
        let model_valid = model.valid();

        tracing::info!("Evaluating on training set");
        let train_report = evaluate(&model_valid, train_eval_loader.iter(), loss)?;
        tracing::info!("Evaluating on validation set");
        let val_report = evaluate(&model_valid, val_loader.iter(), loss)?;

        let metrics = EpochMetrics {
            epoch,
            lr,
            train_loss:    train_report.loss,
            train_acc:     train_report.scores.accuracy,
            val_loss:      val_report.loss,
            val_acc:       val_report.scores.accuracy,
            val_f1:        val_report.scores.f1,
            val_precision: val_report.scores.precision,
            val_recall:    val_report.scores.recall,
        };
        sink.record(&metrics)?;

        ckpt.save_model(&model, epoch)?;
        if metrics.is_improvement(best_val_loss) || best_epoch == 0 {
            best_val_loss = metrics.val_loss;
            best_epoch    = epoch;
            ckpt.mark_best(epoch)?;
            tracing::info!("New best validation loss {:.4} at epoch {}", best_val_loss, epoch);
        }
    }

    tracing::info!("Training complete after {} steps", step);
    Ok(TrainSummary { epochs: cfg.num_epochs, steps: step, best_epoch, best_val_loss })
}

// ============================================================
// Layer 5 — Evaluator
// ============================================================
// Runs a model over a split without gradients and reports
// loss, accuracy, precision, recall and F1.
//
// Single-label runs:
//   prediction = argmax of the logits
//   accuracy   = fraction of notes whose primary code is hit
//   P / R / F1 = macro average over every code that occurs in
//                the gold labels or the predictions
//
// Multilabel runs:
//   prediction = every code with sigmoid(logit) > 0.5
//   accuracy   = fraction of notes whose code set is exactly right
//   P / R / F1 = micro average over all (note, code) decisions
//
// A metric whose denominator is zero is reported as 0.

use anyhow::{anyhow, Result};
use burn::{prelude::*, tensor::activation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::data::batcher::{NoteBatch, NoteTargets};
use crate::ml::loss::LossKind;
use crate::ml::model::NoteClassifier;

const MULTILABEL_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub accuracy:  f64,
    pub precision: f64,
    pub recall:    f64,
    pub f1:        f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    /// Mean loss per note
    pub loss:    f64,
    pub scores:  Scores,
    pub samples: usize,
}

/// Evaluate `model` over `batches`.
pub fn evaluate<B, I>(model: &NoteClassifier<B>, batches: I, loss: LossKind) -> Result<EvalReport>
where
    B: Backend,
    I: IntoIterator<Item = NoteBatch<B>>,
{
    let mut loss_sum = 0.0f64;
    let mut samples  = 0usize;

    let mut pred_classes = Vec::new();
    let mut gold_classes = Vec::new();
    let mut pred_hot     = Vec::new();
    let mut gold_hot     = Vec::new();
    let mut num_labels   = 0usize;

    for batch in batches {
        let n      = batch.targets.batch_size();
        let output = model.forward(batch.tokens, batch.word_mask, batch.sent_mask);

        let batch_loss: f64 = loss
            .forward(output.logits.clone(), &batch.targets)?
            .into_scalar()
            .elem::<f64>();
        loss_sum += batch_loss * n as f64;
        samples  += n;

        match batch.targets {
            NoteTargets::Classes(gold) => {
                let pred = output.logits.argmax(1).flatten::<1>(0, 1);
                pred_classes.extend(int_values(pred.into_data())?.into_iter().map(|v| v as usize));
                gold_classes.extend(int_values(gold.into_data())?.into_iter().map(|v| v as usize));
            }
            NoteTargets::MultiHot(gold) => {
                num_labels = gold.dims()[1];
                let pred = activation::sigmoid(output.logits)
                    .greater_elem(MULTILABEL_THRESHOLD)
                    .int();
                pred_hot.extend(int_values(pred.into_data())?.into_iter().map(|v| v != 0));
                gold_hot.extend(int_values(gold.into_data())?.into_iter().map(|v| v != 0));
            }
        }
    }

    let scores = if loss.is_multilabel() {
        multilabel_scores(&pred_hot, &gold_hot, num_labels)
    } else {
        single_label_scores(&pred_classes, &gold_classes)
    };

    Ok(EvalReport {
        loss: if samples > 0 { loss_sum / samples as f64 } else { f64::NAN },
        scores,
        samples,
    })
}

fn int_values(data: TensorData) -> Result<Vec<i64>> {
    data.convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| anyhow!("Cannot read tensor values: {e:?}"))
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 { 0.0 } else { 2.0 * precision * recall / (precision + recall) }
}

/// Accuracy plus macro-averaged precision / recall / F1.
pub fn single_label_scores(pred: &[usize], gold: &[usize]) -> Scores {
    let correct = pred.iter().zip(gold).filter(|(p, g)| p == g).count();
    let classes: BTreeSet<usize> = pred.iter().chain(gold).copied().collect();

    if classes.is_empty() {
        return Scores::default();
    }

    let (mut p_sum, mut r_sum, mut f_sum) = (0.0, 0.0, 0.0);
    for &c in &classes {
        let tp = pred.iter().zip(gold).filter(|&(&p, &g)| p == c && g == c).count();
        let predicted = pred.iter().filter(|&&p| p == c).count();
        let actual    = gold.iter().filter(|&&g| g == c).count();

        let p = ratio(tp, predicted);
        let r = ratio(tp, actual);
        p_sum += p;
        r_sum += r;
        f_sum += f1(p, r);
    }

    let k = classes.len() as f64;
    Scores {
        accuracy:  ratio(correct, gold.len()),
        precision: p_sum / k,
        recall:    r_sum / k,
        f1:        f_sum / k,
    }
}

/// Exact-match accuracy plus micro-averaged precision / recall / F1.
/// `pred` and `gold` are flat [notes, num_labels] indicator rows.
pub fn multilabel_scores(pred: &[bool], gold: &[bool], num_labels: usize) -> Scores {
    if num_labels == 0 || gold.is_empty() {
        return Scores::default();
    }

    let tp        = pred.iter().zip(gold).filter(|&(&p, &g)| p && g).count();
    let predicted = pred.iter().filter(|&&p| p).count();
    let actual    = gold.iter().filter(|&&g| g).count();

    let exact = pred
        .chunks(num_labels)
        .zip(gold.chunks(num_labels))
        .filter(|(p, g)| p == g)
        .count();

    let precision = ratio(tp, predicted);
    let recall    = ratio(tp, actual);

    Scores {
        accuracy: ratio(exact, gold.len() / num_labels),
        precision,
        recall,
        f1: f1(precision, recall),
    }
}

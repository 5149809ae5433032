// ============================================================
// Layer 5 — Loss Functions
// ============================================================
// The training loop only asks "how wrong are these logits";
// which criterion answers is chosen once per run:
//
//   CrossEntropy        single-label, one primary code per note
//   Focal { gamma }     single-label, down-weights easy notes:
//                       mean(−(1 − p_t)^γ · log p_t)
//   BinaryCrossEntropy  multilabel, sigmoid per code
//
// Reference: Lin et al. (2017) Focal Loss for Dense Object Detection

use anyhow::{bail, Result};
use burn::{
    nn::loss::{BinaryCrossEntropyLossConfig, CrossEntropyLossConfig},
    prelude::*,
    tensor::activation,
};
use serde::{Deserialize, Serialize};

use crate::data::batcher::NoteTargets;

pub const DEFAULT_FOCAL_GAMMA: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LossKind {
    CrossEntropy,
    Focal { gamma: f64 },
    BinaryCrossEntropy,
}

impl LossKind {
    /// Pick the criterion for a run.
    pub fn for_task(multilabel: bool, focal: bool, gamma: f64) -> Result<Self> {
        match (multilabel, focal) {
            (true, true)   => bail!("Focal loss is only available for single-label runs"),
            (true, false)  => Ok(LossKind::BinaryCrossEntropy),
            (false, true)  => Ok(LossKind::Focal { gamma }),
            (false, false) => Ok(LossKind::CrossEntropy),
        }
    }

    pub fn is_multilabel(&self) -> bool {
        matches!(self, LossKind::BinaryCrossEntropy)
    }

    /// Mean loss over the batch — shape [1]
    pub fn forward<B: Backend>(&self, logits: Tensor<B, 2>, targets: &NoteTargets<B>) -> Result<Tensor<B, 1>> {
        let device = logits.device();
        match (self, targets) {
            (LossKind::CrossEntropy, NoteTargets::Classes(classes)) => {
                let ce = CrossEntropyLossConfig::new().init(&device);
                Ok(ce.forward(logits, classes.clone()))
            }
            (LossKind::Focal { gamma }, NoteTargets::Classes(classes)) => {
                Ok(focal_loss(logits, classes.clone(), *gamma))
            }
            (LossKind::BinaryCrossEntropy, NoteTargets::MultiHot(hot)) => {
                let bce = BinaryCrossEntropyLossConfig::new().with_logits(true).init(&device);
                Ok(bce.forward(logits, hot.clone()))
            }
            _ => bail!("{:?} does not match the batch targets", self),
        }
    }
}

fn focal_loss<B: Backend>(logits: Tensor<B, 2>, classes: Tensor<B, 1, Int>, gamma: f64) -> Tensor<B, 1> {
    let [batch] = classes.dims();
    let log_probs = activation::log_softmax(logits, 1);
    let log_pt    = log_probs.gather(1, classes.reshape([batch, 1])); // [batch, 1]
    let pt        = log_pt.clone().exp();

    let weight = pt.neg().add_scalar(1.0).powf_scalar(gamma as f32);
    (weight * log_pt).neg().mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn logits() -> Tensor<TestBackend, 2> {
        Tensor::from_data(
            TensorData::new(vec![2.0f32, 0.0, -1.0, 0.5, 0.5, 3.0], [2, 3]),
            &Default::default(),
        )
    }

    fn classes() -> NoteTargets<TestBackend> {
        NoteTargets::Classes(Tensor::from_data(TensorData::new(vec![0i64, 2], [2]), &Default::default()))
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar().elem::<f32>()
    }

    #[test]
    fn test_focal_with_zero_gamma_is_cross_entropy() {
        let ce    = scalar(LossKind::CrossEntropy.forward(logits(), &classes()).unwrap());
        let focal = scalar(LossKind::Focal { gamma: 0.0 }.forward(logits(), &classes()).unwrap());
        assert!((ce - focal).abs() < 1e-5);
    }

    #[test]
    fn test_focal_is_smaller_than_cross_entropy() {
        let ce    = scalar(LossKind::CrossEntropy.forward(logits(), &classes()).unwrap());
        let focal = scalar(LossKind::Focal { gamma: 2.0 }.forward(logits(), &classes()).unwrap());
        assert!(focal < ce);
        assert!(focal > 0.0);
    }

    #[test]
    fn test_bce_on_multi_hot() {
        let hot = NoteTargets::MultiHot(Tensor::from_data(
            TensorData::new(vec![1i64, 0, 0, 0, 0, 1], [2, 3]),
            &Default::default(),
        ));
        let loss = scalar(LossKind::BinaryCrossEntropy.forward(logits(), &hot).unwrap());
        assert!(loss.is_finite() && loss > 0.0);
    }

    #[test]
    fn test_mismatched_targets_are_error() {
        assert!(LossKind::BinaryCrossEntropy.forward(logits(), &classes()).is_err());
    }

    #[test]
    fn test_for_task() {
        assert_eq!(LossKind::for_task(true, false, 2.0).unwrap(), LossKind::BinaryCrossEntropy);
        assert_eq!(LossKind::for_task(false, true, 2.0).unwrap(), LossKind::Focal { gamma: 2.0 });
        assert!(LossKind::for_task(true, true, 2.0).is_err());
    }
}

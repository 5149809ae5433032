use serde::{Deserialize, Serialize};

/// Step learning-rate decay.
///
/// After every epoch `j` (0-based) with `j % every == 0` the rate is
/// multiplied by `rate`, so epoch 0 runs at `base_lr`, epoch 1 at
/// `base_lr · rate`, and further decays follow every `every` epochs.
/// `every == 0` keeps the rate constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepDecay {
    pub base_lr: f64,
    pub rate:    f64,
    pub every:   usize,
}

impl StepDecay {
    pub fn new(base_lr: f64, rate: f64, every: usize) -> Self {
        Self { base_lr, rate, every }
    }

    pub fn lr_for_epoch(&self, epoch: usize) -> f64 {
        if self.every == 0 || epoch == 0 {
            return self.base_lr;
        }
        // decays happened after epochs 0, every, 2·every, ... below `epoch`
        let decays = (epoch - 1) / self.every + 1;
        self.base_lr * self.rate.powi(decays as i32)
    }
}

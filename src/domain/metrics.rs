use serde::{Deserialize, Serialize};

/// Everything recorded about one finished epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Epoch number, starting at 1
    pub epoch:         usize,
    /// Learning rate used during this epoch
    pub lr:            f64,
    pub train_loss:    f64,
    pub train_acc:     f64,
    pub val_loss:      f64,
    pub val_acc:       f64,
    pub val_f1:        f64,
    pub val_precision: f64,
    pub val_recall:    f64,
}

impl EpochMetrics {
    /// Returns true if this epoch improved over the previous best val_loss.
    /// A NaN best (empty validation split so far) is beaten by any real loss.
    pub fn is_improvement(&self, best_val_loss: f64) -> bool {
        !self.val_loss.is_nan() && (best_val_loss.is_nan() || self.val_loss < best_val_loss)
    }
}

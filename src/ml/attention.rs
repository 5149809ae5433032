// ============================================================
// Layer 5 — Attention Pooling
// ============================================================
// Collapses a sequence of hidden states into one vector.
//
//   u_t  = tanh(W·h_t + b)
//   e_t  = u_t · c            (c is a learned context vector)
//   α    = softmax(e) over real steps only
//   out  = Σ α_t · h_t
//
// Used twice by the HAN: words → sentence vector, then
// sentences → document vector.

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation,
};

/// Score given to padded steps before the softmax
const MASKED_SCORE: f32 = -1.0e9;

#[derive(Config, Debug)]
pub struct AttentionPoolConfig {
    /// Size of the hidden states being pooled
    pub d_model: usize,
}

impl AttentionPoolConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AttentionPool<B> {
        AttentionPool {
            projection: LinearConfig::new(self.d_model, self.d_model).init(device),
            context:    LinearConfig::new(self.d_model, 1).with_bias(false).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct AttentionPool<B: Backend> {
    pub projection: Linear<B>,
    /// Weight of this layer is the context vector
    pub context:    Linear<B>,
}

impl<B: Backend> AttentionPool<B> {
    /// h: [n, t, d], mask: [n, t] → (pooled [n, d], weights [n, t])
    ///
    /// A row with no real step gets all-zero weights.
    pub fn forward(&self, h: Tensor<B, 3>, mask: Tensor<B, 2, Bool>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let [n, t, d] = h.dims();

        let u      = activation::tanh(self.projection.forward(h.clone()));
        let scores = self.context.forward(u).reshape([n, t]);
        let scores = scores.mask_fill(mask.clone().bool_not(), MASKED_SCORE);

        let weights = activation::softmax(scores, 1) * mask.float();
        let pooled  = (h * weights.clone().unsqueeze_dim::<3>(2))
            .sum_dim(1)
            .reshape([n, d]);

        (pooled, weights)
    }
}

/// Mean over real steps: h [n, t, d], mask [n, t] → [n, d]
pub fn masked_mean<B: Backend>(h: Tensor<B, 3>, mask: Tensor<B, 2, Bool>) -> Tensor<B, 2> {
    let [n, _, d] = h.dims();
    let m     = mask.float().unsqueeze_dim::<3>(2);
    let count = m.clone().sum_dim(1).reshape([n, 1]).clamp_min(1.0);
    (h * m).sum_dim(1).reshape([n, d]) / count
}

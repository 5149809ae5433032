// ============================================================
// Layer 5 — Bidirectional GRU
// ============================================================
// A GRU unrolled over time from two Linear projections, run
// once left-to-right and once right-to-left, outputs concatenated.
//
//   r  = σ(W_r·x + U_r·h)
//   z  = σ(W_z·x + U_z·h)
//   n  = tanh(W_n·x + r ⊙ (U_n·h))
//   h' = (1 − z) ⊙ n + z ⊙ h
//
// Every step takes a padding mask. At a padded step the hidden
// state is carried through unchanged and the emitted output is
// zero, so the right-to-left pass starts at each sequence's
// real last token rather than at the end of the padding.
//
// Hidden state starts at zero for every batch.

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation,
};

#[derive(Config, Debug)]
pub struct BiGruConfig {
    pub d_input:  usize,
    pub d_hidden: usize,
}

impl BiGruConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> BiGru<B> {
        BiGru {
            forward_cell:  self.build_cell(device),
            backward_cell: self.build_cell(device),
            d_hidden:      self.d_hidden,
        }
    }

    fn build_cell<B: Backend>(&self, device: &B::Device) -> GruCell<B> {
        GruCell {
            input:    LinearConfig::new(self.d_input, 3 * self.d_hidden).init(device),
            hidden:   LinearConfig::new(self.d_hidden, 3 * self.d_hidden).init(device),
            d_hidden: self.d_hidden,
        }
    }
}

#[derive(Module, Debug)]
pub struct GruCell<B: Backend> {
    pub input:    Linear<B>,
    pub hidden:   Linear<B>,
    pub d_hidden: usize,
}

impl<B: Backend> GruCell<B> {
    /// One step. `x_gates` is the precomputed input projection [batch, 3·hidden].
    fn step(&self, x_gates: Tensor<B, 2>, h: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, _] = x_gates.dims();
        let d = self.d_hidden;
        let h_gates = self.hidden.forward(h.clone());

        let gate = |t: &Tensor<B, 2>, k: usize| t.clone().slice([0..batch, k * d..(k + 1) * d]);

        let r = activation::sigmoid(gate(&x_gates, 0) + gate(&h_gates, 0));
        let z = activation::sigmoid(gate(&x_gates, 1) + gate(&h_gates, 1));
        let n = activation::tanh(gate(&x_gates, 2) + r * gate(&h_gates, 2));

        let keep = z.clone().neg().add_scalar(1.0);
        keep * n + z * h
    }

    /// Unroll over `[batch, time, d_input]`, optionally right to left.
    fn run(&self, x: Tensor<B, 3>, mask: Tensor<B, 2>, reverse: bool) -> Tensor<B, 3> {
        let [batch, time, _] = x.dims();
        let d       = self.d_hidden;
        let x_gates = self.input.forward(x);

        let mut h       = Tensor::<B, 2>::zeros([batch, d], &x_gates.device());
        let mut outputs = Vec::with_capacity(time);

        let steps: Vec<usize> = if reverse { (0..time).rev().collect() } else { (0..time).collect() };
        for t in steps {
            let xt = x_gates.clone().slice([0..batch, t..t + 1, 0..3 * d]).reshape([batch, 3 * d]);
            let m  = mask.clone().slice([0..batch, t..t + 1]); // [batch, 1]

            let h_new = self.step(xt, h.clone());
            let out   = h_new.clone() * m.clone();
            h = out.clone() + h * m.neg().add_scalar(1.0);
            outputs.push(out);
        }

        if reverse {
            outputs.reverse();
        }
        Tensor::stack::<3>(outputs, 1)
    }
}

#[derive(Module, Debug)]
pub struct BiGru<B: Backend> {
    pub forward_cell:  GruCell<B>,
    pub backward_cell: GruCell<B>,
    pub d_hidden:      usize,
}

impl<B: Backend> BiGru<B> {
    /// x: [batch, time, d_input], mask: [batch, time] → [batch, time, 2·hidden]
    pub fn forward(&self, x: Tensor<B, 3>, mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let mask = mask.float();
        let fw = self.forward_cell.run(x.clone(), mask.clone(), false);
        let bw = self.backward_cell.run(x, mask, true);
        Tensor::cat(vec![fw, bw], 2)
    }

    pub fn d_output(&self) -> usize {
        2 * self.d_hidden
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn mask(rows: &[&[i64]]) -> Tensor<TestBackend, 2, Bool> {
        let t    = rows[0].len();
        let flat = rows.iter().flat_map(|r| r.iter().copied()).collect::<Vec<_>>();
        Tensor::<TestBackend, 2, Int>::from_data(TensorData::new(flat, [rows.len(), t]), &Default::default())
            .equal_elem(1)
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let gru    = BiGruConfig::new(4, 3).init::<TestBackend>(&device);
        let x      = Tensor::<TestBackend, 3>::ones([2, 5, 4], &device);
        let out    = gru.forward(x, mask(&[&[1, 1, 1, 1, 1], &[1, 1, 0, 0, 0]]));
        assert_eq!(out.dims(), [2, 5, 6]);
        assert_eq!(gru.d_output(), 6);
    }

    #[test]
    fn test_padded_steps_emit_zeros() {
        let device = Default::default();
        let gru    = BiGruConfig::new(2, 3).init::<TestBackend>(&device);
        let x      = Tensor::<TestBackend, 3>::ones([1, 4, 2], &device);
        let out    = gru.forward(x, mask(&[&[1, 1, 0, 0]]));

        let padded = out.slice([0..1, 2..4, 0..6]).abs().sum().into_scalar().elem::<f32>();
        assert_eq!(padded, 0.0);
    }

    #[test]
    fn test_padding_does_not_change_real_outputs() {
        let device = Default::default();
        let gru    = BiGruConfig::new(2, 3).init::<TestBackend>(&device);

        let short = Tensor::<TestBackend, 3>::ones([1, 2, 2], &device);
        let long  = Tensor::cat(vec![short.clone(), Tensor::zeros([1, 3, 2], &device).add_scalar(7.0)], 1);

        let a = gru.forward(short, mask(&[&[1, 1]]));
        let b = gru.forward(long, mask(&[&[1, 1, 0, 0, 0]])).slice([0..1, 0..2, 0..6]);

        let diff = (a - b).abs().max().into_scalar().elem::<f32>();
        assert!(diff < 1e-5, "padding leaked into real steps: {diff}");
    }
}

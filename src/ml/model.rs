use anyhow::{bail, Result};
use burn::{
    module::Param,
    nn::{Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig},
    prelude::*,
};
use serde::{Deserialize, Serialize};

use crate::ml::attention::{masked_mean, AttentionPool, AttentionPoolConfig};
use crate::ml::gru::{BiGru, BiGruConfig};

/// Which document encoder to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Word GRU + attention, sentence GRU + attention
    Han,
    /// Word GRU + mean, sentence GRU + mean
    Hierarchical,
    /// Mean of word embeddings, sentence GRU + mean
    Cbow,
}

impl ModelKind {
    pub fn uses_attention(self) -> bool {
        matches!(self, ModelKind::Han)
    }
}

impl std::str::FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "han"                   => Ok(ModelKind::Han),
            "hierarchical" | "hier" => Ok(ModelKind::Hierarchical),
            "cbow"                  => Ok(ModelKind::Cbow),
            other => Err(format!("unknown model '{other}' (expected han, hierarchical or cbow)")),
        }
    }
}

#[derive(Config, Debug)]
pub struct NoteClassifierConfig {
    pub vocab_size: usize,
    pub embed_dim:  usize,
    pub hidden_dim: usize,
    pub num_labels: usize,
    #[config(default = 0.0)]
    pub dropout:    f64,
    #[config(default = "ModelKind::Han")]
    pub kind:       ModelKind,
}

impl NoteClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> NoteClassifier<B> {
        let embedding = EmbeddingConfig::new(self.vocab_size, self.embed_dim).init(device);
        let rnn_out   = 2 * self.hidden_dim;

        let word_encoder = match self.kind {
            ModelKind::Cbow => None,
            _ => Some(BiGruConfig::new(self.embed_dim, self.hidden_dim).init(device)),
        };
        let sent_input = if word_encoder.is_some() { rnn_out } else { self.embed_dim };

        let (word_attention, sent_attention) = if self.kind.uses_attention() {
            (
                Some(AttentionPoolConfig::new(rnn_out).init(device)),
                Some(AttentionPoolConfig::new(rnn_out).init(device)),
            )
        } else {
            (None, None)
        };

        NoteClassifier {
            embedding,
            word_encoder,
            word_attention,
            sent_encoder: BiGruConfig::new(sent_input, self.hidden_dim).init(device),
            sent_attention,
            dropout: DropoutConfig::new(self.dropout).init(),
            head:    LinearConfig::new(rnn_out, self.num_labels).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct NoteClassifier<B: Backend> {
    pub embedding:      Embedding<B>,
    pub word_encoder:   Option<BiGru<B>>,
    pub word_attention: Option<AttentionPool<B>>,
    pub sent_encoder:   BiGru<B>,
    pub sent_attention: Option<AttentionPool<B>>,
    pub dropout:        Dropout,
    pub head:           Linear<B>,
}

/// L1 norm and squared L2 norm summed over every parameter tensor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParamNorms {
    pub l1:         f64,
    pub l2_squared: f64,
}

impl ParamNorms {
    pub fn l2(&self) -> f64 {
        self.l2_squared.sqrt()
    }

    fn add<B: Backend, const D: usize>(&mut self, t: Tensor<B, D>) {
        self.l1         += t.clone().abs().sum().into_scalar().elem::<f64>();
        self.l2_squared += t.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
    }

    fn add_linear<B: Backend>(&mut self, layer: &Linear<B>) {
        self.add(layer.weight.val());
        if let Some(bias) = &layer.bias {
            self.add(bias.val());
        }
    }

    fn add_gru<B: Backend>(&mut self, gru: &BiGru<B>) {
        for cell in [&gru.forward_cell, &gru.backward_cell] {
            self.add_linear(&cell.input);
            self.add_linear(&cell.hidden);
        }
    }

    fn add_attention<B: Backend>(&mut self, attn: &AttentionPool<B>) {
        self.add_linear(&attn.projection);
        self.add_linear(&attn.context);
    }
}

pub struct ClassifierOutput<B: Backend> {
    /// Unnormalised class scores — [batch, num_labels]
    pub logits: Tensor<B, 2>,
    /// Word weights inside each sentence — [batch, max_sents, max_words]
    pub word_attention: Option<Tensor<B, 3>>,
    /// Sentence weights inside each note — [batch, max_sents]
    pub sentence_attention: Option<Tensor<B, 2>>,
}

impl<B: Backend> NoteClassifier<B> {
    /// tokens, word_mask: [batch, sents, words]; sent_mask: [batch, sents]
    pub fn forward(
        &self,
        tokens:    Tensor<B, 3, Int>,
        word_mask: Tensor<B, 3, Bool>,
        sent_mask: Tensor<B, 2, Bool>,
    ) -> ClassifierOutput<B> {
        let [batch, sents, words] = tokens.dims();
        let rows = batch * sents;

        // Every sentence of every note becomes one row of the word level.
        let word_mask = word_mask.reshape([rows, words]);
        let embedded  = self.embedding.forward(tokens.reshape([rows, words])); // [rows, words, embed]

        let (sent_vecs, word_weights) = match &self.word_encoder {
            Some(encoder) => {
                let h = encoder.forward(embedded, word_mask.clone());
                match &self.word_attention {
                    Some(attn) => {
                        let (pooled, w) = attn.forward(h, word_mask);
                        (pooled, Some(w.reshape([batch, sents, words])))
                    }
                    None => (masked_mean(h, word_mask), None),
                }
            }
            None => (masked_mean(embedded, word_mask), None),
        };

        let [_, d_sent] = sent_vecs.dims();
        let sent_vecs = sent_vecs.reshape([batch, sents, d_sent]);

        let h = self.sent_encoder.forward(sent_vecs, sent_mask.clone());
        let (doc, sent_weights) = match &self.sent_attention {
            Some(attn) => {
                let (pooled, w) = attn.forward(h, sent_mask);
                (pooled, Some(w))
            }
            None => (masked_mean(h, sent_mask), None),
        };

        let logits = self.head.forward(self.dropout.forward(doc));

        ClassifierOutput {
            logits,
            word_attention: word_weights,
            sentence_attention: sent_weights,
        }
    }

    /// Parameter norms, logged by the trainer to watch weight growth.
    pub fn param_norms(&self) -> ParamNorms {
        let mut norms = ParamNorms::default();
        norms.add(self.embedding.weight.val());
        for gru in self.word_encoder.iter().chain(std::iter::once(&self.sent_encoder)) {
            norms.add_gru(gru);
        }
        for attn in self.word_attention.iter().chain(self.sent_attention.iter()) {
            norms.add_attention(attn);
        }
        norms.add_linear(&self.head);
        norms
    }

    /// Replace the embedding table with a flat [vocab, embed] matrix.
    pub fn with_pretrained_embeddings(mut self, matrix: Vec<f32>, device: &B::Device) -> Result<Self> {
        let [vocab, dim] = self.embedding.weight.dims();
        if matrix.len() != vocab * dim {
            bail!(
                "Embedding matrix has {} values, model expects {}x{}",
                matrix.len(), vocab, dim
            );
        }
        let weight = Tensor::<B, 2>::from_data(TensorData::new(matrix, [vocab, dim]), device);
        self.embedding.weight = Param::from_tensor(weight);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::{NoteBatch, NoteBatcher};
    use crate::data::dataset::{NoteItem, NoteTarget};
    use burn::backend::NdArray;
    use burn::data::dataloader::batcher::Batcher;

    type TestBackend = NdArray;

    fn batch() -> NoteBatch<TestBackend> {
        let items = vec![
            NoteItem { id: "a".into(), sentences: vec![vec![2, 3, 4], vec![5]], target: NoteTarget::Class(0) },
            NoteItem { id: "b".into(), sentences: vec![vec![6, 7]],             target: NoteTarget::Class(2) },
        ];
        NoteBatcher::new().batch(items, &Default::default())
    }

    fn config(kind: ModelKind) -> NoteClassifierConfig {
        NoteClassifierConfig::new(10, 8, 6, 3).with_kind(kind)
    }

    #[test]
    fn test_han_shapes() {
        let device = Default::default();
        let model  = config(ModelKind::Han).init::<TestBackend>(&device);
        let b      = batch();
        let out    = model.forward(b.tokens, b.word_mask, b.sent_mask);

        assert_eq!(out.logits.dims(), [2, 3]);
        assert_eq!(out.word_attention.unwrap().dims(), [2, 2, 3]);
        assert_eq!(out.sentence_attention.unwrap().dims(), [2, 2]);
    }

    #[test]
    fn test_sentence_attention_skips_padded_sentences() {
        let device = Default::default();
        let model  = config(ModelKind::Han).init::<TestBackend>(&device);
        let b      = batch();
        let out    = model.forward(b.tokens, b.word_mask, b.sent_mask);

        let w = out.sentence_attention.unwrap().into_data().convert::<f32>().to_vec::<f32>().unwrap();
        // note b has a single real sentence
        assert!((w[2] - 1.0).abs() < 1e-5);
        assert_eq!(w[3], 0.0);
    }

    #[test]
    fn test_variants_without_attention() {
        let device = Default::default();
        for kind in [ModelKind::Hierarchical, ModelKind::Cbow] {
            let model = config(kind).init::<TestBackend>(&device);
            let b     = batch();
            let out   = model.forward(b.tokens, b.word_mask, b.sent_mask);
            assert_eq!(out.logits.dims(), [2, 3]);
            assert!(out.word_attention.is_none());
            assert!(out.sentence_attention.is_none());
        }
        assert!(config(ModelKind::Cbow).init::<TestBackend>(&device).word_encoder.is_none());
    }

    #[test]
    fn test_pretrained_embeddings() {
        let device = Default::default();
        let model  = NoteClassifierConfig::new(3, 2, 4, 2).init::<TestBackend>(&device);
        let model  = model
            .with_pretrained_embeddings(vec![0.0, 0.0, 1.0, 2.0, 3.0, 4.0], &device)
            .unwrap();

        let w = model.embedding.weight.val().into_data().convert::<f32>().to_vec::<f32>().unwrap();
        assert_eq!(w, vec![0.0, 0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_pretrained_embeddings_wrong_size() {
        let device = Default::default();
        let model  = NoteClassifierConfig::new(3, 2, 4, 2).init::<TestBackend>(&device);
        assert!(model.with_pretrained_embeddings(vec![0.0; 5], &device).is_err());
    }

    #[test]
    fn test_model_kind_parses_names() {
        assert_eq!("HAN".parse::<ModelKind>(), Ok(ModelKind::Han));
        assert_eq!("hier".parse::<ModelKind>(), Ok(ModelKind::Hierarchical));
        assert_eq!("cbow".parse::<ModelKind>(), Ok(ModelKind::Cbow));
        assert!("lstm".parse::<ModelKind>().is_err());
    }

    #[test]
    fn test_param_norms_track_embedding_values() {
        let device = Default::default();
        let model  = NoteClassifierConfig::new(3, 2, 4, 2)
            .with_kind(ModelKind::Cbow)
            .init::<TestBackend>(&device);

        let zeros = model.with_pretrained_embeddings(vec![0.0; 6], &device).unwrap();
        let base  = zeros.param_norms();
        let ones  = zeros.with_pretrained_embeddings(vec![1.0; 6], &device).unwrap().param_norms();

        assert!(base.l1 > 0.0);
        assert!((ones.l1 - base.l1 - 6.0).abs() < 1e-3);
        assert!((ones.l2_squared - base.l2_squared - 6.0).abs() < 1e-3);
        assert!(ones.l2() <= ones.l1);
    }
}

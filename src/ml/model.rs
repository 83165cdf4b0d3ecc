// ============================================================
// Layer 5 — Rationale-Augmented CNN
// ============================================================
// Hierarchical multi-task architecture, after Zhang, Marshall &
// Wallace (2016), "Rationale-Augmented Convolutional Neural
// Networks for Text Classification":
//
//   tokens [batch, doc_len, sent_len]
//     → shared embedding (padding id 0 forced to the zero vector)
//     → per n-gram width: Conv1d over words + ReLU + max-over-time
//     → sentence vectors [batch, doc_len, widths * n_filters]
//     → per domain: time-distributed sigmoid rationale head
//     → per domain: rationale-probability-weighted sum of sentence
//       vectors (NOT a normalized attention average — documents
//       with many confident rationales produce larger-magnitude
//       vectors, and that magnitude is signal)
//     → per domain: dropout + 3-way judgment head
//
// Heads are built from an explicit domain count fixed at
// construction; domain names live in the configuration, never in
// the module.

use burn::{
    nn::{
        conv::{Conv1d, Conv1dConfig},
        Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::{relu, sigmoid},
};

use crate::domain::labels::NUM_CLASSES;

#[derive(Config, Debug)]
pub struct RationaleCnnConfig {
    /// Embedding rows: vocabulary budget plus the padding row.
    pub vocab_rows: usize,
    pub max_sent_len: usize,
    pub max_doc_len: usize,
    pub embedding_dims: usize,
    pub num_domains: usize,
    /// Convolution widths, in words. One parallel branch each.
    pub ngram_widths: Vec<usize>,
    #[config(default = 32)]
    pub n_filters: usize,
    #[config(default = 0.5)]
    pub sent_dropout: f64,
    #[config(default = 0.5)]
    pub doc_dropout: f64,
}

impl RationaleCnnConfig {
    /// Width of one sentence vector after concatenation.
    pub fn sentence_dim(&self) -> usize {
        self.ngram_widths.len() * self.n_filters
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> RationaleCnn<B> {
        let embedding = EmbeddingConfig::new(self.vocab_rows, self.embedding_dims).init(device);
        let convs = self
            .ngram_widths
            .iter()
            .map(|&width| {
                Conv1dConfig::new(self.embedding_dims, self.n_filters, width).init(device)
            })
            .collect();

        let sentence_dim = self.sentence_dim();
        let sent_heads = (0..self.num_domains)
            .map(|_| LinearConfig::new(sentence_dim, 1).init(device))
            .collect();
        let doc_heads = (0..self.num_domains)
            .map(|_| LinearConfig::new(sentence_dim, NUM_CLASSES).init(device))
            .collect();

        RationaleCnn {
            embedding,
            convs,
            sent_heads,
            doc_heads,
            sent_dropout: DropoutConfig::new(self.sent_dropout).init(),
            doc_dropout: DropoutConfig::new(self.doc_dropout).init(),
            n_filters: self.n_filters,
            embedding_dims: self.embedding_dims,
        }
    }
}

#[derive(Module, Debug)]
pub struct RationaleCnn<B: Backend> {
    pub embedding: Embedding<B>,
    pub convs: Vec<Conv1d<B>>,
    /// One time-distributed logistic rationale head per domain.
    pub sent_heads: Vec<Linear<B>>,
    /// One 3-way judgment head per domain.
    pub doc_heads: Vec<Linear<B>>,
    pub sent_dropout: Dropout,
    pub doc_dropout: Dropout,
    pub n_filters: usize,
    pub embedding_dims: usize,
}

/// Full forward-pass result: per-domain sentence rationale
/// probabilities and per-domain document judgment logits
/// (softmax is applied by the loss / at prediction time).
pub struct RationaleOutput<B: Backend> {
    pub sentence_probs: Vec<Tensor<B, 3>>,
    pub doc_logits: Vec<Tensor<B, 2>>,
}

impl<B: Backend> RationaleCnn<B> {
    /// tokens [batch, doc_len, sent_len] → sentence vectors
    /// [batch, doc_len, sentence_dim].
    ///
    /// Padded sentence rows still receive a well-defined embedding
    /// (all-zero words through the same convolutions); they are
    /// excluded from loss and inference, not from the graph.
    pub fn encode_sentences(&self, tokens: Tensor<B, 3, Int>) -> Tensor<B, 3> {
        let [batch, doc_len, sent_len] = tokens.dims();
        let flat = tokens.reshape([batch * doc_len, sent_len]);

        // token id 0 is the padding index; zero its embedding so
        // padding never contributes to the convolutions
        let pad_mask = flat
            .clone()
            .equal_elem(0)
            .bool_not()
            .float()
            .reshape([batch * doc_len, sent_len, 1])
            .expand([batch * doc_len, sent_len, self.embedding_dims]);

        let embedded = self.embedding.forward(flat) * pad_mask;
        // Conv1d wants [batch, channels, length]
        let embedded = embedded.swap_dims(1, 2);

        let mut pooled = Vec::with_capacity(self.convs.len());
        for conv in &self.convs {
            let features = relu(conv.forward(embedded.clone()));
            // max over the remaining within-sentence positions
            let max = features.max_dim(2).reshape([batch * doc_len, self.n_filters]);
            pooled.push(max);
        }

        let sentence_dim = self.convs.len() * self.n_filters;
        let sentences = Tensor::cat(pooled, 1);
        let sentences = self.sent_dropout.forward(sentences);
        sentences.reshape([batch, doc_len, sentence_dim])
    }

    /// Apply every domain's rationale head at every sentence
    /// position (weights shared across positions within a domain).
    pub fn sentence_probs(&self, sentence_vectors: Tensor<B, 3>) -> Vec<Tensor<B, 3>> {
        self.sent_heads
            .iter()
            .map(|head| sigmoid(head.forward(sentence_vectors.clone())))
            .collect()
    }

    /// Probability-weighted sum of sentence vectors: for weights w
    /// [batch, doc_len, 1] and sentence vectors S [batch, doc_len,
    /// dim], returns wᵀS as [batch, dim]. Weights are raw sigmoid
    /// outputs and need not sum to 1.
    pub fn aggregate(sentence_vectors: Tensor<B, 3>, weights: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch, _, dim] = sentence_vectors.dims();
        weights.swap_dims(1, 2).matmul(sentence_vectors).reshape([batch, dim])
    }

    pub fn forward(&self, tokens: Tensor<B, 3, Int>) -> RationaleOutput<B> {
        let sentence_vectors = self.encode_sentences(tokens);
        let sentence_probs = self.sentence_probs(sentence_vectors.clone());

        let doc_logits = self
            .doc_heads
            .iter()
            .zip(&sentence_probs)
            .map(|(head, weights)| {
                let doc_vector =
                    Self::aggregate(sentence_vectors.clone(), weights.clone());
                head.forward(self.doc_dropout.forward(doc_vector))
            })
            .collect();

        RationaleOutput { sentence_probs, doc_logits }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;

    type B = NdArray;

    fn tiny_config() -> RationaleCnnConfig {
        RationaleCnnConfig::new(11, 6, 4, 8, 2, vec![2, 3])
            .with_n_filters(4)
            .with_sent_dropout(0.0)
            .with_doc_dropout(0.0)
    }

    #[test]
    fn test_forward_shapes_follow_the_configuration() {
        let device = NdArrayDevice::default();
        let model: RationaleCnn<B> = tiny_config().init(&device);

        let tokens = Tensor::<B, 1, Int>::from_ints(
            [1, 2, 3, 0, 0, 0].repeat(8).as_slice(),
            &device,
        )
        .reshape([2, 4, 6]);

        let out = model.forward(tokens);
        assert_eq!(out.sentence_probs.len(), 2);
        assert_eq!(out.doc_logits.len(), 2);
        assert_eq!(out.sentence_probs[0].dims(), [2, 4, 1]);
        assert_eq!(out.doc_logits[0].dims(), [2, 3]);
    }

    #[test]
    fn test_aggregation_is_the_exact_weighted_sum() {
        let device = NdArrayDevice::default();
        // 3 sentences, 2 features, hand-computed
        let sentences = Tensor::<B, 1>::from_floats(
            [1.0, 2.0, 3.0, 4.0, 5.0, 6.0].as_slice(),
            &device,
        )
        .reshape([1, 3, 2]);
        let weights =
            Tensor::<B, 1>::from_floats([0.5, 0.0, 1.0].as_slice(), &device).reshape([1, 3, 1]);

        let doc = RationaleCnn::<B>::aggregate(sentences, weights);
        let values = doc.into_data().to_vec::<f32>().unwrap();
        // 0.5*[1,2] + 0*[3,4] + 1*[5,6] = [5.5, 7.0]
        assert!((values[0] - 5.5).abs() < 1e-6);
        assert!((values[1] - 7.0).abs() < 1e-6);
    }

    #[test]
    fn test_padded_rows_get_a_deterministic_embedding() {
        let device = NdArrayDevice::default();
        let model: RationaleCnn<B> = tiny_config().init(&device);

        let all_pad = Tensor::<B, 1, Int>::from_ints([0i32; 24].as_slice(), &device)
            .reshape([1, 4, 6]);
        let a = model.encode_sentences(all_pad.clone()).into_data();
        let b = model.encode_sentences(all_pad).into_data();
        assert_eq!(a.to_vec::<f32>().unwrap(), b.to_vec::<f32>().unwrap());
    }
}

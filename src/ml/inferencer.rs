// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Rebuilds the trained model from a checkpoint directory and
// answers two questions about a document: what is the judgment
// per domain, and which sentences argue for it.

use anyhow::{bail, Context, Result};
use burn::prelude::*;
use burn::tensor::activation::softmax;

use crate::application::train_use_case::TrainConfig;
use crate::data::batcher::DocBatcher;
use crate::data::preprocessor::Preprocessor;
use crate::domain::document::Document;
use crate::domain::labels::Judgment;
use crate::infra::checkpoint::{CheckpointManager, DOCUMENT_WEIGHTS};
use crate::ml::model::RationaleCnn;
use crate::ml::trainer::EvalBackend;

/// Sentences reported per domain when ranking rationales.
pub const DEFAULT_TOP_K: usize = 3;

/// One domain's verdict for one document.
#[derive(Debug, Clone)]
pub struct DomainPrediction {
    pub domain: String,
    pub judgment: Judgment,
    /// Softmax probabilities over [favorable, unfavorable, unknown].
    pub probabilities: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct DocumentPrediction {
    pub doc_id: String,
    pub domains: Vec<DomainPrediction>,
}

/// A rationale candidate: one sentence with the probability the
/// model assigns it for a given domain.
#[derive(Debug, Clone)]
pub struct RankedSentence {
    pub index: usize,
    pub probability: f32,
    pub text: String,
}

pub struct Inferencer {
    model: RationaleCnn<EvalBackend>,
    preprocessor: Preprocessor,
    config: TrainConfig,
    device: burn::backend::ndarray::NdArrayDevice,
}

impl Inferencer {
    pub fn from_checkpoint(ckpt: &CheckpointManager) -> Result<Self> {
        let device = burn::backend::ndarray::NdArrayDevice::default();
        let config: TrainConfig = ckpt
            .load_config()
            .context("no training configuration found; has the model been trained?")?;
        let preprocessor = Preprocessor::load(&ckpt.vocabulary_path())?;

        let model: RationaleCnn<EvalBackend> = config.model_config().init(&device);
        let model = ckpt.load_weights(model, DOCUMENT_WEIGHTS, &device)?;
        tracing::info!("Model loaded from checkpoint");
        Ok(Self { model, preprocessor, config, device })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    fn forward(&self, doc: &mut Document) -> Result<crate::ml::model::RationaleOutput<EvalBackend>> {
        if doc.sequences.is_none() {
            self.preprocessor.encode_document(doc)?;
        }
        let grid = doc.padded_tokens(self.config.max_doc_len, self.config.max_sent_len)?;
        let batcher = DocBatcher::<EvalBackend>::new(self.device.clone());
        Ok(self.model.forward(batcher.tokens(&[grid])))
    }

    /// Judge one document across every configured domain.
    ///
    /// The reported judgment is the argmax over the favorable and
    /// unfavorable columns; the unknown class keeps its probability
    /// mass in the report but is never emitted as a verdict.
    pub fn predict(&self, doc: &mut Document) -> Result<DocumentPrediction> {
        let output = self.forward(doc)?;

        let mut domains = Vec::with_capacity(self.config.domains.len());
        for (spec, logits) in self.config.domains.iter().zip(output.doc_logits) {
            let probabilities = softmax(logits, 1)
                .reshape([crate::domain::labels::NUM_CLASSES])
                .into_data()
                .to_vec::<f32>()
                .unwrap_or_default();
            let judgment = if probabilities[0] >= probabilities[1] {
                Judgment::Favorable
            } else {
                Judgment::Unfavorable
            };
            domains.push(DomainPrediction {
                domain: spec.name.clone(),
                judgment,
                probabilities,
            });
        }
        Ok(DocumentPrediction { doc_id: doc.id.clone(), domains })
    }

    /// Rank a document's sentences as rationale candidates for one
    /// domain, best first, truncated to `top_k`.
    ///
    /// Ranking is per domain by that domain's own head: a sentence
    /// can be the top rationale for blinding and irrelevant to
    /// randomization. Padded positions never appear.
    pub fn rank_rationales(
        &self,
        doc: &mut Document,
        domain: &str,
        top_k: usize,
    ) -> Result<Vec<RankedSentence>> {
        let Some(head) = self.config.domains.iter().position(|d| d.name == domain) else {
            bail!("unknown domain '{domain}'; this model was trained without it");
        };

        let output = self.forward(doc)?;
        let probs = output.sentence_probs[head]
            .clone()
            .reshape([self.config.max_doc_len])
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default();

        let real = doc.num_sentences().min(self.config.max_doc_len);
        let mut ranked: Vec<RankedSentence> = probs
            .into_iter()
            .take(real)
            .enumerate()
            .map(|(index, probability)| RankedSentence {
                index,
                probability,
                text: doc.sentences[index].clone(),
            })
            .collect();
        ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        ranked.truncate(top_k);
        Ok(ranked)
    }
}

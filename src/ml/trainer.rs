// ============================================================
// Layer 5 — Two-phase training loop
// ============================================================
// Phase 1 pretrains the shared encoder and the per-domain
// rationale heads on balanced pseudo-documents (AdaGrad, weighted
// binary cross-entropy, lower validation loss checkpoints).
// Phase 2 trains the judgment heads on real documents (Adam,
// weighted categorical cross-entropy, higher accuracy-sum
// checkpoints), optionally with the sentence stack frozen.
//
// Each phase reloads its best checkpoint before handing the model
// on, so a late overfit epoch never wins.
//
// Backends: training needs gradients, validation does not.
// model.valid() strips the autodiff graph for evaluation.

use std::collections::BTreeMap;

use anyhow::{ensure, Result};
use burn::{
    module::AutodiffModule,
    optim::{AdaGradConfig, AdamConfig, GradientsParams, Optimizer},
    prelude::*,
};
use tracing::{info, warn};

use crate::data::batcher::DocBatcher;
use crate::data::sampler::BalancedSampler;
use crate::data::splitter::split_validation_tail;
use crate::domain::document::Document;
use crate::domain::labels::{DomainSpec, Judgment, NUM_CLASSES};
use crate::infra::checkpoint::{
    CheckpointManager, ScoreDirection, ScoreTracker, DOCUMENT_WEIGHTS, SENTENCE_WEIGHTS,
};
use crate::infra::metrics::{EpochMetrics, MetricsLogger};
use crate::ml::losses::{
    document_sample_weights, per_domain_scarcity_weights, sentence_validation_weights,
    weighted_binary_cross_entropy, weighted_categorical_cross_entropy,
};
use crate::ml::metrics::accuracy_ignoring_unknown;
use crate::ml::model::{RationaleCnn, RationaleCnnConfig};

pub type TrainBackend = burn::backend::Autodiff<burn::backend::NdArray>;
pub type EvalBackend = burn::backend::NdArray;

#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub sentence_epochs: usize,
    pub doc_epochs: usize,
    pub batch_size: usize,
    pub sentence_lr: f64,
    pub doc_lr: f64,
    pub val_split: f64,
    /// Balanced mode: resample a cross-domain subset every epoch
    /// instead of sweeping the full training pool.
    pub downsample: bool,
    /// Keep the sentence stack trainable during phase 2.
    pub end_to_end: bool,
    /// Full-pool mode only: epochs without improvement before
    /// stopping early.
    pub patience: usize,
    pub seed: u64,
}

/// Everything the epoch loops need about one document, computed
/// once up front.
struct PreparedDoc {
    grid: Vec<Vec<u32>>,
    /// Rationale target column per domain, padded to doc length.
    rationales: Vec<Vec<f32>>,
    indicators: Vec<f32>,
    judgments: Vec<Judgment>,
}

fn prepare(
    documents: &[Document],
    domains: &[DomainSpec],
    cfg: &RationaleCnnConfig,
) -> Result<Vec<PreparedDoc>> {
    documents
        .iter()
        .map(|doc| {
            let grid = doc.padded_tokens(cfg.max_doc_len, cfg.max_sent_len)?;
            let per_domain = doc.padded_rationales(domains, cfg.max_doc_len)?;
            let rationales = domains
                .iter()
                .map(|d| per_domain[&d.name].clone())
                .collect();
            let indicators = doc.combined_rationale_indicators(domains, cfg.max_doc_len)?;
            let judgments = domains
                .iter()
                .map(|d| doc.judgment_for(&d.name))
                .collect();
            Ok(PreparedDoc { grid, rationales, indicators, judgments })
        })
        .collect()
}

pub fn run_training(
    model_cfg: &RationaleCnnConfig,
    domains: &[DomainSpec],
    documents: &[Document],
    opts: &TrainOptions,
    ckpt: &CheckpointManager,
    logger: &mut MetricsLogger,
) -> Result<RationaleCnn<TrainBackend>> {
    ensure!(!documents.is_empty(), "no documents to train on");
    ensure!(
        domains.len() == model_cfg.num_domains,
        "{} domains configured but model built for {}",
        domains.len(),
        model_cfg.num_domains
    );

    let device = burn::backend::ndarray::NdArrayDevice::default();
    TrainBackend::seed(opts.seed);
    let mut sampler = BalancedSampler::new(opts.seed);

    let prepared = prepare(documents, domains, model_cfg)?;
    let model: RationaleCnn<TrainBackend> = model_cfg.init(&device);
    info!(
        domains = domains.len(),
        documents = documents.len(),
        "model initialised"
    );

    let model = train_sentence_phase(
        model, domains, &prepared, opts, ckpt, logger, &mut sampler, &device,
    )?;
    let model = train_document_phase(
        model, domains, &prepared, opts, ckpt, logger, &mut sampler, &device,
    )?;
    Ok(model)
}

// ─── Phase 1: sentence pretraining ───────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn train_sentence_phase(
    mut model: RationaleCnn<TrainBackend>,
    domains: &[DomainSpec],
    prepared: &[PreparedDoc],
    opts: &TrainOptions,
    ckpt: &CheckpointManager,
    logger: &mut MetricsLogger,
    sampler: &mut BalancedSampler,
    device: &burn::backend::ndarray::NdArrayDevice,
) -> Result<RationaleCnn<TrainBackend>> {
    // Only documents holding at least one rationale carry signal
    // for this phase.
    let candidates: Vec<&PreparedDoc> = prepared
        .iter()
        .filter(|doc| doc.indicators.iter().any(|&v| v > 0.0))
        .collect();
    ensure!(
        !candidates.is_empty(),
        "no document has a rationale sentence; cannot pretrain the sentence model"
    );

    let (train_docs, val_docs) = split_validation_tail(&candidates, opts.val_split);
    info!(
        train = train_docs.len(),
        val = val_docs.len(),
        "sentence phase split"
    );

    let doc_len = candidates[0].indicators.len();
    let batcher = DocBatcher::<TrainBackend>::new(device.clone());
    let val_batcher = DocBatcher::<EvalBackend>::new(device.clone());

    // Validation tensors never change across epochs.
    let val_inputs = if val_docs.is_empty() {
        None
    } else {
        let grids: Vec<Vec<Vec<u32>>> = val_docs.iter().map(|d| d.grid.clone()).collect();
        let tokens = val_batcher.tokens(&grids);
        let per_domain: Vec<(Tensor<EvalBackend, 3>, Tensor<EvalBackend, 2>)> = (0..domains.len())
            .map(|d| {
                let rows: Vec<Vec<f32>> =
                    val_docs.iter().map(|doc| doc.rationales[d].clone()).collect();
                let weights = sentence_validation_weights(&rows);
                (val_batcher.sentence_targets(&rows), val_batcher.sentence_weights(&weights))
            })
            .collect();
        Some((tokens, per_domain))
    };

    let mut optim = AdaGradConfig::new().init();
    let mut tracker = ScoreTracker::new(ScoreDirection::LowerIsBetter);

    for epoch in 1..=opts.sentence_epochs {
        // Fresh balanced pseudo-documents each epoch: half the rows
        // of each are rationale sentences drawn with replacement.
        let mut grids = Vec::new();
        let mut targets: Vec<Vec<Vec<f32>>> = vec![Vec::new(); domains.len()];
        for doc in train_docs {
            let Some(picked) = sampler.sentence_sample(&doc.indicators, doc_len) else {
                continue;
            };
            grids.push(picked.iter().map(|&i| doc.grid[i].clone()).collect());
            for (d, slot) in targets.iter_mut().enumerate() {
                slot.push(picked.iter().map(|&i| doc.rationales[d][i]).collect());
            }
        }

        let mut loss_sum = 0.0f64;
        let mut batches = 0usize;
        for start in (0..grids.len()).step_by(opts.batch_size) {
            let end = (start + opts.batch_size).min(grids.len());
            let tokens = batcher.tokens(&grids[start..end]);
            let ones = vec![vec![1.0f32; doc_len]; end - start];
            let weights = batcher.sentence_weights(&ones);

            let vectors = model.encode_sentences(tokens);
            let probs = model.sentence_probs(vectors);
            let mut loss: Option<Tensor<TrainBackend, 1>> = None;
            for (d, prob) in probs.into_iter().enumerate() {
                let rows: Vec<Vec<f32>> = targets[d][start..end].to_vec();
                let domain_loss = weighted_binary_cross_entropy(
                    prob,
                    batcher.sentence_targets(&rows),
                    weights.clone(),
                );
                loss = Some(match loss {
                    Some(total) => total + domain_loss,
                    None => domain_loss,
                });
            }
            let Some(loss) = loss else { continue };

            loss_sum += loss.clone().into_scalar().elem::<f64>();
            batches += 1;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(opts.sentence_lr, model, grads);
        }
        let train_loss = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };

        // Validation: mean of the per-domain weighted losses, a
        // domain contributing only when it has a defined score
        // (all-zero weights make the loss NaN).
        let val_score = val_inputs.as_ref().and_then(|(tokens, per_domain)| {
            let valid = model.valid();
            let probs = valid.sentence_probs(valid.encode_sentences(tokens.clone()));
            let mut defined = Vec::new();
            for (prob, (target, weight)) in probs.into_iter().zip(per_domain) {
                let loss = weighted_binary_cross_entropy(prob, target.clone(), weight.clone())
                    .into_scalar()
                    .elem::<f64>();
                if !loss.is_nan() {
                    defined.push(loss);
                }
            }
            if defined.is_empty() {
                warn!(epoch, "no domain produced a defined validation loss");
                None
            } else {
                Some(defined.iter().sum::<f64>() / defined.len() as f64)
            }
        });

        println!(
            "Sentence epoch {:>3}/{} | train_loss={:.4} | val_loss={}",
            epoch,
            opts.sentence_epochs,
            train_loss,
            val_score.map_or("n/a".to_string(), |v| format!("{v:.4}")),
        );
        logger.record(&EpochMetrics { phase: "sentence", epoch, train_loss, val_score })?;

        if let Some(score) = val_score {
            if tracker.update(score) {
                ckpt.save_weights(model.clone(), SENTENCE_WEIGHTS)?;
                ckpt.save_best_score(SENTENCE_WEIGHTS, score)?;
            }
        }
    }

    if ckpt.weights_exist::<TrainBackend>(SENTENCE_WEIGHTS) {
        model = ckpt.load_weights(model, SENTENCE_WEIGHTS, device)?;
        info!(best = ?tracker.best(), "reloaded best sentence weights");
    } else {
        // Nothing was ever good enough to checkpoint (e.g. no
        // validation split); persist the final state instead.
        ckpt.save_weights(model.clone(), SENTENCE_WEIGHTS)?;
    }
    Ok(model)
}

// ─── Phase 2: document training ──────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn train_document_phase(
    mut model: RationaleCnn<TrainBackend>,
    domains: &[DomainSpec],
    prepared: &[PreparedDoc],
    opts: &TrainOptions,
    ckpt: &CheckpointManager,
    logger: &mut MetricsLogger,
    sampler: &mut BalancedSampler,
    device: &burn::backend::ndarray::NdArrayDevice,
) -> Result<RationaleCnn<TrainBackend>> {
    if !opts.end_to_end {
        // Freeze everything the sentence phase learned; only the
        // judgment heads keep moving.
        model = RationaleCnn {
            embedding: model.embedding.no_grad(),
            convs: model.convs.no_grad(),
            sent_heads: model.sent_heads.no_grad(),
            ..model
        };
        info!("sentence stack frozen for document phase");
    }

    let (train_docs, val_docs) = split_validation_tail(prepared, opts.val_split);

    // Per-domain effective weight: the configured judgment weight
    // scaled by label scarcity across the training pool.
    let unknown_counts: Vec<usize> = (0..domains.len())
        .map(|d| {
            train_docs
                .iter()
                .filter(|doc| doc.judgments[d].is_unknown())
                .count()
        })
        .collect();
    let scarcity = per_domain_scarcity_weights(&unknown_counts);
    let effective: Vec<f32> = domains
        .iter()
        .zip(&scarcity)
        .map(|(d, &s)| d.judgment_weight * s)
        .collect();
    info!(?effective, "per-domain document loss weights");

    let batcher = DocBatcher::<TrainBackend>::new(device.clone());
    let val_batcher = DocBatcher::<EvalBackend>::new(device.clone());
    let val_tokens = (!val_docs.is_empty())
        .then(|| val_batcher.tokens(&val_docs.iter().map(|d| d.grid.clone()).collect::<Vec<_>>()));

    let mut optim = AdamConfig::new().with_epsilon(1e-8).init();
    let mut tracker = ScoreTracker::new(ScoreDirection::HigherIsBetter);
    let mut epochs_since_best = 0usize;

    for epoch in 1..=opts.doc_epochs {
        let selected: Vec<usize> = if opts.downsample {
            // Balanced mode: per-domain known-label pools, equal
            // draw counts, deduplicated union.
            let pools: BTreeMap<String, Vec<usize>> = domains
                .iter()
                .enumerate()
                .map(|(d, spec)| {
                    let pool = train_docs
                        .iter()
                        .enumerate()
                        .filter(|(_, doc)| !doc.judgments[d].is_unknown())
                        .map(|(i, _)| i)
                        .collect();
                    (spec.name.clone(), pool)
                })
                .collect();
            sampler.cross_domain_sample(&pools)?
        } else {
            (0..train_docs.len()).collect()
        };

        let mut loss_sum = 0.0f64;
        let mut batches = 0usize;
        for chunk in selected.chunks(opts.batch_size) {
            let grids: Vec<Vec<Vec<u32>>> =
                chunk.iter().map(|&i| train_docs[i].grid.clone()).collect();
            let tokens = batcher.tokens(&grids);
            let output = model.forward(tokens);

            let mut loss: Option<Tensor<TrainBackend, 1>> = None;
            for (d, logits) in output.doc_logits.into_iter().enumerate() {
                let labels: Vec<Judgment> =
                    chunk.iter().map(|&i| train_docs[i].judgments[d]).collect();
                let one_hot: Vec<[f32; NUM_CLASSES]> =
                    labels.iter().map(|l| l.one_hot()).collect();
                let weights = document_sample_weights(&labels, effective[d]);

                let domain_loss = weighted_categorical_cross_entropy(
                    logits,
                    batcher.doc_targets(&one_hot),
                    batcher.sample_weights(&weights),
                );
                loss = Some(match loss {
                    Some(total) => total + domain_loss,
                    None => domain_loss,
                });
            }
            let Some(loss) = loss else { continue };

            loss_sum += loss.clone().into_scalar().elem::<f64>();
            batches += 1;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(opts.doc_lr, model, grads);
        }
        let train_loss = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };

        // Validation score: sum of per-domain accuracies, unknown
        // labels excluded, domains with no known label skipped.
        let val_score = val_tokens.as_ref().and_then(|tokens| {
            let valid = model.valid();
            let output = valid.forward(tokens.clone());
            let mut scores = Vec::new();
            for (d, logits) in output.doc_logits.into_iter().enumerate() {
                let predicted = judgments_from_logits(logits);
                let truth: Vec<Judgment> =
                    val_docs.iter().map(|doc| doc.judgments[d]).collect();
                if let Some(acc) = accuracy_ignoring_unknown(&truth, &predicted) {
                    scores.push(acc);
                }
            }
            (!scores.is_empty()).then(|| scores.iter().sum::<f64>())
        });

        println!(
            "Document epoch {:>3}/{} | train_loss={:.4} | val_acc_sum={}",
            epoch,
            opts.doc_epochs,
            train_loss,
            val_score.map_or("n/a".to_string(), |v| format!("{v:.4}")),
        );
        logger.record(&EpochMetrics { phase: "document", epoch, train_loss, val_score })?;

        let improved = match val_score {
            Some(score) if tracker.update(score) => {
                ckpt.save_weights(model.clone(), DOCUMENT_WEIGHTS)?;
                ckpt.save_best_score(DOCUMENT_WEIGHTS, score)?;
                true
            }
            _ => false,
        };

        if !opts.downsample {
            if improved {
                epochs_since_best = 0;
            } else {
                epochs_since_best += 1;
                if epochs_since_best >= opts.patience {
                    info!(epoch, "early stop: no improvement for {} epochs", opts.patience);
                    break;
                }
            }
        }
    }

    if ckpt.weights_exist::<TrainBackend>(DOCUMENT_WEIGHTS) {
        model = ckpt.load_weights(model, DOCUMENT_WEIGHTS, device)?;
        info!(best = ?tracker.best(), "reloaded best document weights");
    } else {
        ckpt.save_weights(model.clone(), DOCUMENT_WEIGHTS)?;
    }
    Ok(model)
}

/// Argmax over the favorable/unfavorable columns only: the unknown
/// class exists to absorb probability mass during training but is
/// never emitted as a prediction.
pub fn judgments_from_logits<B: Backend>(logits: Tensor<B, 2>) -> Vec<Judgment> {
    let [batch, _] = logits.dims();
    let picked = logits.slice([0..batch, 0..2]).argmax(1).reshape([batch]);
    picked
        .into_data()
        .to_vec::<i64>()
        .expect("argmax output converts to i64 indices")
        .into_iter()
        .map(|i| if i == 0 { Judgment::Favorable } else { Judgment::Unfavorable })
        .collect()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::labels::DomainSpec;
    use std::collections::BTreeMap;

    const RATIONALE_TOKENS: [u32; 5] = [1, 2, 3, 1, 2];

    fn toy_doc(id: &str, rationale_at: usize, favorable: bool) -> Document {
        let n = 4;
        let mut sentences = Vec::new();
        let mut rationales = Vec::new();
        let mut sequences = Vec::new();
        for i in 0..n {
            if i == rationale_at && favorable {
                sentences.push("randomized coin flip assignment used".to_string());
                rationales.push(BTreeMap::from([("rsg".to_string(), 1.0f32)]));
                sequences.push(RATIONALE_TOKENS.to_vec());
            } else {
                sentences.push("patients received the study drug daily".to_string());
                rationales.push(BTreeMap::from([("rsg".to_string(), 0.0f32)]));
                let base = 4 + (i as u32 % 4);
                sequences.push(vec![base, base + 1, base + 2, base, base + 1]);
            }
        }
        let judgment = if favorable { Judgment::Favorable } else { Judgment::Unfavorable };
        let mut doc = Document::new(
            id,
            sentences,
            BTreeMap::from([("rsg".to_string(), judgment)]),
            rationales,
            1,
        );
        doc.set_sequences(sequences).unwrap();
        doc
    }

    #[test]
    fn test_two_phase_training_learns_a_toy_rationale() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let mut logger = MetricsLogger::create(dir.path()).unwrap();

        let domains = vec![DomainSpec::new("rsg", 1.0)];
        let documents: Vec<Document> = (0..12)
            .map(|i| toy_doc(&format!("doc-{i}"), i % 4, i % 3 != 0))
            .collect();

        let model_cfg = RationaleCnnConfig::new(12, 5, 4, 16, 1, vec![2])
            .with_n_filters(8)
            .with_sent_dropout(0.0)
            .with_doc_dropout(0.0);
        let opts = TrainOptions {
            sentence_epochs: 30,
            doc_epochs: 10,
            batch_size: 4,
            sentence_lr: 0.1,
            doc_lr: 0.02,
            val_split: 0.25,
            downsample: false,
            end_to_end: false,
            patience: 10,
            seed: 7,
        };

        let model =
            run_training(&model_cfg, &domains, &documents, &opts, &ckpt, &mut logger).unwrap();

        // A fresh document with the rationale in position 2 should
        // put its highest rationale probability there.
        let held_out = toy_doc("held-out", 2, true);
        let device = burn::backend::ndarray::NdArrayDevice::default();
        let valid = model.valid();
        let batcher = DocBatcher::<EvalBackend>::new(device);
        let tokens = batcher.tokens(&[held_out.padded_tokens(4, 5).unwrap()]);
        let probs = valid.sentence_probs(valid.encode_sentences(tokens));
        let values = probs[0].clone().reshape([4]).into_data().to_vec::<f32>().unwrap();

        let best = values
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(best, 2, "rationale probabilities were {values:?}");

        // Both phase checkpoints must exist for later inference.
        assert!(ckpt.weights_exist::<TrainBackend>(SENTENCE_WEIGHTS));
        assert!(ckpt.weights_exist::<TrainBackend>(DOCUMENT_WEIGHTS));
    }

    #[test]
    fn test_training_without_rationales_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let mut logger = MetricsLogger::create(dir.path()).unwrap();

        let domains = vec![DomainSpec::new("rsg", 1.0)];
        let mut doc = toy_doc("doc-0", 0, true);
        for labels in doc.rationales.iter_mut() {
            labels.insert("rsg".to_string(), 0.0);
        }

        let model_cfg = RationaleCnnConfig::new(12, 5, 4, 16, 1, vec![2]);
        let opts = TrainOptions {
            sentence_epochs: 1,
            doc_epochs: 1,
            batch_size: 4,
            sentence_lr: 0.1,
            doc_lr: 0.02,
            val_split: 0.1,
            downsample: false,
            end_to_end: true,
            patience: 3,
            seed: 7,
        };

        let err = run_training(&model_cfg, &domains, &[doc], &opts, &ckpt, &mut logger)
            .unwrap_err();
        assert!(err.to_string().contains("rationale"));
    }

    #[test]
    fn test_predictions_never_emit_the_unknown_class() {
        let device = burn::backend::ndarray::NdArrayDevice::default();
        // Unknown column has the largest logit everywhere; argmax
        // must still pick between the first two columns.
        let logits = Tensor::<EvalBackend, 1>::from_floats(
            [0.2, 0.1, 5.0, 0.1, 0.2, 5.0].as_slice(),
            &device,
        )
        .reshape([2, 3]);
        let picked = judgments_from_logits(logits);
        assert_eq!(picked, vec![Judgment::Favorable, Judgment::Unfavorable]);
    }
}

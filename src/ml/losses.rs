// ============================================================
// Layer 5 — Weighted losses and weight builders
// ============================================================
// Both objectives are weighted by host-built per-element weights:
//
//   * sentence task — binary cross-entropy over rationale
//     probabilities. Training weights are all ones (the balanced
//     sampler already equalizes classes); validation weights
//     up-weight positive positions by the negative/positive ratio
//     of the split, with padded rows counted as ordinary
//     weight-1 negatives;
//   * document task — categorical cross-entropy over judgment
//     logits, with unknown-judgment documents zero-weighted and
//     the rest carrying the domain's configured weight.
//
// Following the convention of the framework this design descends
// from, the sentence loss is the weighted mean over positions
// while the document loss divides by the batch size, so a
// zero-weighted document still dilutes the batch.

use burn::prelude::*;
use burn::tensor::activation::log_softmax;

use crate::domain::labels::Judgment;

const PROB_EPSILON: f32 = 1e-7;

/// Element-weighted binary cross-entropy.
///
/// `probs` and `targets` are [batch, doc_len, 1] sigmoid outputs
/// and 0/1 rationale indicators; `weights` is [batch, doc_len].
/// Returns the scalar weighted mean; NaN when every weight is 0.
pub fn weighted_binary_cross_entropy<B: Backend>(
    probs: Tensor<B, 3>,
    targets: Tensor<B, 3>,
    weights: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let [batch, doc_len, _] = probs.dims();
    let probs = probs
        .reshape([batch, doc_len])
        .clamp(PROB_EPSILON, 1.0 - PROB_EPSILON);
    let targets = targets.reshape([batch, doc_len]);

    let loss = -(targets.clone() * probs.clone().log()
        + (targets.neg() + 1.0) * (probs.neg() + 1.0).log());
    let weighted = (loss * weights.clone()).sum();
    weighted / weights.sum()
}

/// Sample-weighted categorical cross-entropy over raw logits.
///
/// `logits` is [batch, classes], `targets` one-hot rows, `weights`
/// [batch]. Divides by the batch size, not the weight sum.
pub fn weighted_categorical_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2>,
    weights: Tensor<B, 1>,
) -> Tensor<B, 1> {
    let [batch, _] = logits.dims();
    let log_probs = log_softmax(logits, 1);
    let ce = (targets * log_probs).sum_dim(1).neg().reshape([batch]);
    (ce * weights).sum() / batch as f32
}

/// Per-position sentence weights for one domain of a validation
/// (or training) slab of rationale indicator rows.
///
/// Positions holding a positive indicator get `n_neg / n_pos` so a
/// handful of rationale sentences is not drowned out; everything
/// else gets 1. A domain with no positive position at all returns
/// all zeros, which makes its loss NaN downstream — the caller
/// filters those domains out rather than scoring on noise.
pub fn sentence_validation_weights(rows: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let n_pos: usize = rows
        .iter()
        .map(|row| row.iter().filter(|&&v| v > 0.0).count())
        .sum();
    if n_pos == 0 {
        return rows.iter().map(|row| vec![0.0; row.len()]).collect();
    }

    let n_total: usize = rows.iter().map(Vec::len).sum();
    let pos_weight = (n_total - n_pos) as f32 / n_pos as f32;
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|&v| if v > 0.0 { pos_weight } else { 1.0 })
                .collect()
        })
        .collect()
}

/// Document sample weights for one domain: 0 silences documents
/// whose judgment is unknown, everything else carries the domain's
/// configured judgment weight.
pub fn document_sample_weights(labels: &[Judgment], domain_weight: f32) -> Vec<f32> {
    labels
        .iter()
        .map(|label| if label.is_unknown() { 0.0 } else { domain_weight })
        .collect()
}

/// Scarcity-derived domain weights: each domain's unknown-label
/// count divided by the largest unknown count across domains.
/// All 1.0 when no domain has unknown labels.
pub fn per_domain_scarcity_weights(unknown_counts: &[usize]) -> Vec<f32> {
    let max_unknown = unknown_counts.iter().copied().max().unwrap_or(0);
    if max_unknown == 0 {
        return vec![1.0; unknown_counts.len()];
    }
    unknown_counts
        .iter()
        .map(|&n| n as f32 / max_unknown as f32)
        .collect()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;

    type B = NdArray;

    fn scalar(t: Tensor<B, 1>) -> f32 {
        t.into_data().to_vec::<f32>().unwrap()[0]
    }

    #[test]
    fn test_binary_loss_is_the_weighted_mean() {
        let device = NdArrayDevice::default();
        let probs = Tensor::<B, 1>::from_floats([0.9, 0.1].as_slice(), &device)
            .reshape([1, 2, 1]);
        let targets = Tensor::<B, 1>::from_floats([1.0, 0.0].as_slice(), &device)
            .reshape([1, 2, 1]);
        let weights =
            Tensor::<B, 1>::from_floats([3.0, 1.0].as_slice(), &device).reshape([1, 2]);

        let loss = scalar(weighted_binary_cross_entropy(probs, targets, weights));
        let expected = (3.0 * -(0.9f32.ln()) + 1.0 * -(0.9f32.ln())) / 4.0;
        assert!((loss - expected).abs() < 1e-5);
    }

    #[test]
    fn test_zero_weighted_positions_do_not_contribute() {
        let device = NdArrayDevice::default();
        let probs = Tensor::<B, 1>::from_floats([0.9, 0.001].as_slice(), &device)
            .reshape([1, 2, 1]);
        let targets = Tensor::<B, 1>::from_floats([1.0, 1.0].as_slice(), &device)
            .reshape([1, 2, 1]);
        let weights =
            Tensor::<B, 1>::from_floats([1.0, 0.0].as_slice(), &device).reshape([1, 2]);

        let loss = scalar(weighted_binary_cross_entropy(probs, targets, weights));
        assert!((loss - -(0.9f32.ln())).abs() < 1e-5);
    }

    #[test]
    fn test_binary_loss_on_all_zero_weights_is_nan() {
        let device = NdArrayDevice::default();
        let probs = Tensor::<B, 1>::from_floats([0.5].as_slice(), &device).reshape([1, 1, 1]);
        let targets =
            Tensor::<B, 1>::from_floats([1.0].as_slice(), &device).reshape([1, 1, 1]);
        let weights = Tensor::<B, 1>::from_floats([0.0].as_slice(), &device).reshape([1, 1]);

        assert!(scalar(weighted_binary_cross_entropy(probs, targets, weights)).is_nan());
    }

    #[test]
    fn test_categorical_loss_divides_by_batch_size() {
        let device = NdArrayDevice::default();
        // Uniform logits: cross-entropy is ln(3) for any target row.
        let logits = Tensor::<B, 1>::from_floats([0.0f32; 6].as_slice(), &device)
            .reshape([2, 3]);
        let targets = Tensor::<B, 1>::from_floats(
            [1.0, 0.0, 0.0, 0.0, 1.0, 0.0].as_slice(),
            &device,
        )
        .reshape([2, 3]);
        let weights = Tensor::<B, 1>::from_floats([1.0, 0.0].as_slice(), &device);

        let loss = scalar(weighted_categorical_cross_entropy(logits, targets, weights));
        assert!((loss - 3.0f32.ln() / 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_positive_positions_are_upweighted_by_class_ratio() {
        let rows = vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 0.0, 0.0, 0.0]];
        let weights = sentence_validation_weights(&rows);
        // 1 positive, 7 negatives → pos weight 7
        assert_eq!(weights[0], vec![7.0, 1.0, 1.0, 1.0]);
        assert_eq!(weights[1], vec![1.0; 4]);
    }

    #[test]
    fn test_domains_without_positives_are_fully_silenced() {
        let rows = vec![vec![0.0, 0.0], vec![0.0, 0.0]];
        let weights = sentence_validation_weights(&rows);
        assert!(weights.iter().flatten().all(|&w| w == 0.0));
    }

    #[test]
    fn test_unknown_judgments_carry_no_weight() {
        let labels = vec![Judgment::Favorable, Judgment::Unknown, Judgment::Unfavorable];
        assert_eq!(document_sample_weights(&labels, 0.8), vec![0.8, 0.0, 0.8]);
    }

    #[test]
    fn test_scarcity_weights_are_relative_to_the_worst_domain() {
        assert_eq!(per_domain_scarcity_weights(&[10, 5, 0]), vec![1.0, 0.5, 0.0]);
        assert_eq!(per_domain_scarcity_weights(&[0, 0]), vec![1.0, 1.0]);
    }
}

// ============================================================
// Layer 5 — Evaluation metrics
// ============================================================

use crate::domain::labels::Judgment;

/// Fraction of correct judgments among documents whose true label
/// is known. Unknown-labelled documents never count for or
/// against the model. `None` when every label is unknown.
pub fn accuracy_ignoring_unknown(truth: &[Judgment], predicted: &[Judgment]) -> Option<f64> {
    debug_assert_eq!(truth.len(), predicted.len());
    let mut known = 0usize;
    let mut correct = 0usize;
    for (t, p) in truth.iter().zip(predicted) {
        if t.is_unknown() {
            continue;
        }
        known += 1;
        if t == p {
            correct += 1;
        }
    }
    if known == 0 {
        None
    } else {
        Some(correct as f64 / known as f64)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use Judgment::*;

    #[test]
    fn test_unknown_labels_are_excluded_from_the_denominator() {
        let truth = vec![Favorable, Unknown, Unfavorable];
        let predicted = vec![Favorable, Favorable, Favorable];
        assert_eq!(accuracy_ignoring_unknown(&truth, &predicted), Some(0.5));
    }

    #[test]
    fn test_all_unknown_yields_no_score() {
        let truth = vec![Unknown, Unknown];
        let predicted = vec![Favorable, Unfavorable];
        assert_eq!(accuracy_ignoring_unknown(&truth, &predicted), None);
    }

    #[test]
    fn test_perfect_known_predictions_score_one() {
        let truth = vec![Favorable, Unfavorable, Unknown];
        let predicted = vec![Favorable, Unfavorable, Unfavorable];
        assert_eq!(accuracy_ignoring_unknown(&truth, &predicted), Some(1.0));
    }
}

// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// The held-out split is taken at the *document* level: the last
// k% of documents become validation for both training phases.
// Splitting at the sentence level would leak sentences from the
// same report across train and validation, which inflates the
// sentence model's apparent performance.
//
// The split itself is deterministic (tail of the list); whether
// documents are shuffled first is decided upstream with a seeded
// RNG, so the whole pipeline stays reproducible.

/// Split off the trailing `val_split` fraction of `items` as the
/// validation set. A tiny collection can end up with an empty
/// validation slice; callers treat that as "no validation signal",
/// not as an error.
pub fn split_validation_tail<T>(items: &[T], val_split: f64) -> (&[T], &[T]) {
    let n_val = ((val_split * items.len() as f64) as usize).min(items.len());
    items.split_at(items.len() - n_val)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_fraction_becomes_validation() {
        let items: Vec<usize> = (0..10).collect();
        let (train, val) = split_validation_tail(&items, 0.2);
        assert_eq!(train.len(), 8);
        assert_eq!(val, &[8, 9]);
    }

    #[test]
    fn test_fraction_truncates_rather_than_rounds() {
        let items: Vec<usize> = (0..7).collect();
        // int(0.2 * 7) = 1
        let (train, val) = split_validation_tail(&items, 0.2);
        assert_eq!(train.len(), 6);
        assert_eq!(val.len(), 1);
    }

    #[test]
    fn test_tiny_collections_get_an_empty_validation_slice() {
        let items = [1];
        let (train, val) = split_validation_tail(&items, 0.2);
        assert_eq!(train.len(), 1);
        assert!(val.is_empty());
    }
}

// ============================================================
// Layer 4 — Balanced Sampler
// ============================================================
// Positive rationale sentences are rare — typically a handful per
// document against hundreds of neutral sentences — and some
// domains have far fewer labeled documents than others. Both
// imbalances are countered by resampling, redrawn independently
// every epoch so successive epochs see different negative
// sentences (implicit augmentation).
//
// The RNG is owned and seeded explicitly so training runs and
// tests are reproducible.

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

pub struct BalancedSampler {
    rng: StdRng,
}

impl BalancedSampler {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// Build one balanced pseudo-document for sentence training.
    ///
    /// `indicators` holds one combined rationale indicator per
    /// padded sentence row (positive when any domain flags the
    /// sentence). The result is `n_target_rows` row indices: half
    /// drawn from positive rows and half from negative rows, both
    /// with replacement, shuffled. Using the document's own padded
    /// length as the target keeps tensor shapes uniform.
    ///
    /// Returns None when the document has no positive sentence at
    /// all — there is nothing to learn from it this phase. When the
    /// document has no negative sentence, the negative half falls
    /// back to drawing from all rows rather than failing.
    pub fn sentence_sample(
        &mut self,
        indicators: &[f32],
        n_target_rows: usize,
    ) -> Option<Vec<usize>> {
        let positives: Vec<usize> = indicators
            .iter()
            .enumerate()
            .filter(|(_, &v)| v > 0.0)
            .map(|(i, _)| i)
            .collect();
        if positives.is_empty() {
            return None;
        }
        let negatives: Vec<usize> = indicators
            .iter()
            .enumerate()
            .filter(|(_, &v)| v <= 0.0)
            .map(|(i, _)| i)
            .collect();

        let n_positive_rows = n_target_rows / 2;
        let mut rows = Vec::with_capacity(n_target_rows);
        for _ in 0..n_positive_rows {
            rows.push(positives[self.rng.gen_range(0..positives.len())]);
        }

        let negative_pool: Vec<usize> = if negatives.is_empty() {
            (0..indicators.len()).collect()
        } else {
            negatives
        };
        for _ in 0..n_target_rows - n_positive_rows {
            rows.push(negative_pool[self.rng.gen_range(0..negative_pool.len())]);
        }

        rows.shuffle(&mut self.rng);
        Some(rows)
    }

    /// Per-domain draws for cross-domain balancing: with `m` the
    /// minimum known-label pool size across domains, draw exactly
    /// `m` document indices per domain, with replacement.
    ///
    /// A domain with an empty pool has no trainable documents at
    /// all, which is a configuration/data problem worth failing on
    /// before any compute is spent.
    pub fn cross_domain_draws(
        &mut self,
        known_pools: &BTreeMap<String, Vec<usize>>,
    ) -> Result<BTreeMap<String, Vec<usize>>> {
        for (domain, pool) in known_pools {
            if pool.is_empty() {
                bail!("domain '{domain}' has no documents with a known label");
            }
        }
        let m = known_pools.values().map(|p| p.len()).min().unwrap_or(0);

        let mut draws = BTreeMap::new();
        for (domain, pool) in known_pools {
            let drawn: Vec<usize> = (0..m)
                .map(|_| pool[self.rng.gen_range(0..pool.len())])
                .collect();
            draws.insert(domain.clone(), drawn);
        }
        Ok(draws)
    }

    /// Cross-domain balanced document sample: the deduplicated
    /// union of the per-domain draws, sorted for determinism. This
    /// equalizes domain representation when some domains have far
    /// fewer known labels than others.
    pub fn cross_domain_sample(
        &mut self,
        known_pools: &BTreeMap<String, Vec<usize>>,
    ) -> Result<Vec<usize>> {
        let draws = self.cross_domain_draws(known_pools)?;
        let mut union: Vec<usize> = draws.into_values().flatten().collect();
        union.sort_unstable();
        union.dedup();
        Ok(union)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pseudo_document_is_at_least_half_positive() {
        let mut sampler = BalancedSampler::new(7);
        // 2 positives among 10 rows
        let mut indicators = vec![0.0; 10];
        indicators[3] = 1.0;
        indicators[7] = 2.0;

        let rows = sampler.sentence_sample(&indicators, 10).unwrap();
        assert_eq!(rows.len(), 10);
        let positive_rows = rows.iter().filter(|&&i| indicators[i] > 0.0).count();
        assert!(positive_rows >= 5, "only {positive_rows} positive rows");
    }

    #[test]
    fn test_document_without_positives_is_excluded() {
        let mut sampler = BalancedSampler::new(7);
        assert!(sampler.sentence_sample(&[0.0, 0.0, 0.0], 3).is_none());
    }

    #[test]
    fn test_all_positive_document_falls_back_instead_of_panicking() {
        let mut sampler = BalancedSampler::new(7);
        let rows = sampler.sentence_sample(&[1.0, 1.0], 4).unwrap();
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn test_sampling_is_reproducible_for_a_fixed_seed() {
        let indicators = vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let a = BalancedSampler::new(42).sentence_sample(&indicators, 8).unwrap();
        let b = BalancedSampler::new(42).sentence_sample(&indicators, 8).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_every_domain_draws_exactly_the_minimum_pool_size() {
        let mut sampler = BalancedSampler::new(11);
        let pools = BTreeMap::from([
            ("ac".to_string(), vec![0, 1, 2, 3, 4, 5, 6]),
            ("rsg".to_string(), vec![2, 5, 9]),
        ]);
        let draws = sampler.cross_domain_draws(&pools).unwrap();
        // m = 3, the smallest pool
        assert_eq!(draws["ac"].len(), 3);
        assert_eq!(draws["rsg"].len(), 3);
        assert!(draws["rsg"].iter().all(|i| pools["rsg"].contains(i)));
    }

    #[test]
    fn test_cross_domain_union_is_deduplicated_and_sorted() {
        let mut sampler = BalancedSampler::new(11);
        let pools = BTreeMap::from([
            ("ac".to_string(), vec![4, 4, 4]),
            ("rsg".to_string(), vec![1, 1, 1]),
        ]);
        let sample = sampler.cross_domain_sample(&pools).unwrap();
        assert_eq!(sample, vec![1, 4]);
    }

    #[test]
    fn test_empty_known_pool_is_an_error() {
        let mut sampler = BalancedSampler::new(11);
        let pools = BTreeMap::from([("rsg".to_string(), Vec::new())]);
        assert!(sampler.cross_domain_draws(&pools).is_err());
    }
}

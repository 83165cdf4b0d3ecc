// ============================================================
// Layer 3 — Document Domain Type
// ============================================================
// A clinical-trial report: an ordered list of sentences, one
// judgment per domain, and a binary rationale flag per sentence
// per domain.
//
// Documents are constructed once from ingested rows and
// token-encoded once; every training epoch reuses them read-only
// and only the sampled subset changes.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::labels::{stack_label_maps, DomainSpec, Judgment};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// PMID or DOI, kept for traceability.
    pub id: String,

    /// Sentences surviving the minimum-word filter, in report order.
    pub sentences: Vec<String>,

    /// Document judgment per domain name.
    pub judgments: BTreeMap<String, Judgment>,

    /// One rationale-flag map per sentence, keyed by domain name.
    /// Parallel to `sentences`.
    pub rationales: Vec<BTreeMap<String, f32>>,

    /// Token sequences, one row per sentence, each already padded
    /// to the preprocessor's sentence length. Generated lazily.
    pub sequences: Option<Vec<Vec<u32>>>,
}

impl Document {
    /// Build a document, dropping sentences shorter than
    /// `min_sent_words` (with their rationale maps) before any
    /// padding or truncation happens.
    pub fn new(
        id: impl Into<String>,
        sentences: Vec<String>,
        judgments: BTreeMap<String, Judgment>,
        rationales: Vec<BTreeMap<String, f32>>,
        min_sent_words: usize,
    ) -> Self {
        let mut kept_sentences = Vec::with_capacity(sentences.len());
        let mut kept_rationales = Vec::with_capacity(rationales.len());
        for (sentence, labels) in sentences.into_iter().zip(rationales) {
            if sentence.split_whitespace().count() >= min_sent_words {
                kept_sentences.push(sentence);
                kept_rationales.push(labels);
            }
        }
        Self {
            id: id.into(),
            sentences: kept_sentences,
            judgments,
            rationales: kept_rationales,
            sequences: None,
        }
    }

    /// True (unpadded) sentence count. Rationale ranking at
    /// inference never looks past this.
    pub fn num_sentences(&self) -> usize {
        self.sentences.len()
    }

    /// Attach token sequences produced by the preprocessor.
    /// One row per surviving sentence.
    pub fn set_sequences(&mut self, sequences: Vec<Vec<u32>>) -> Result<()> {
        ensure!(
            sequences.len() == self.sentences.len(),
            "document '{}': {} token rows for {} sentences",
            self.id,
            sequences.len(),
            self.sentences.len()
        );
        self.sequences = Some(sequences);
        Ok(())
    }

    /// Token grid of exactly `max_doc_len` rows by `max_sent_len`
    /// columns: longer documents are truncated, shorter ones padded
    /// with all-zero rows. Padded rows still flow through the
    /// architecture; they are excluded from loss and inference, not
    /// from the tensor shapes.
    pub fn padded_tokens(&self, max_doc_len: usize, max_sent_len: usize) -> Result<Vec<Vec<u32>>> {
        let sequences = self
            .sequences
            .as_ref()
            .with_context(|| format!("document '{}': sequences not generated yet", self.id))?;

        let mut grid: Vec<Vec<u32>> = sequences.iter().take(max_doc_len).cloned().collect();
        while grid.len() < max_doc_len {
            grid.push(vec![0; max_sent_len]);
        }
        Ok(grid)
    }

    /// Per-domain rationale target vectors of length `max_doc_len`.
    /// Padded sentence positions carry an all-zero label for every
    /// domain. Fails fast if any sentence map is missing a domain.
    pub fn padded_rationales(
        &self,
        domains: &[DomainSpec],
        max_doc_len: usize,
    ) -> Result<BTreeMap<String, Vec<f32>>> {
        let keys: Vec<String> = domains.iter().map(|d| d.name.clone()).collect();
        let truncated: Vec<_> = self.rationales.iter().take(max_doc_len).cloned().collect();
        let mut stacked = stack_label_maps(&truncated, &keys)
            .with_context(|| format!("document '{}': bad rationale labels", self.id))?;
        for column in stacked.values_mut() {
            column.resize(max_doc_len, 0.0);
        }
        Ok(stacked)
    }

    /// Combined positive indicator per padded row: the sum of all
    /// domain rationale flags at that sentence position. Rows with a
    /// value above zero are "positive" for balanced sampling; padded
    /// rows are always zero and sample as negatives like any other
    /// non-rationale row.
    pub fn combined_rationale_indicators(
        &self,
        domains: &[DomainSpec],
        max_doc_len: usize,
    ) -> Result<Vec<f32>> {
        let per_domain = self.padded_rationales(domains, max_doc_len)?;
        let mut combined = vec![0.0; max_doc_len];
        for column in per_domain.values() {
            for (slot, v) in combined.iter_mut().zip(column) {
                *slot += v;
            }
        }
        Ok(combined)
    }

    /// Judgment for `domain`, defaulting to unknown when the
    /// document is unlabeled for it.
    pub fn judgment_for(&self, domain: &str) -> Judgment {
        self.judgments.get(domain).copied().unwrap_or(Judgment::Unknown)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(sentences: &[&str], flags: &[f32]) -> Document {
        let rationales = flags
            .iter()
            .map(|&f| BTreeMap::from([("rsg".to_string(), f)]))
            .collect();
        Document::new(
            "doc-1",
            sentences.iter().map(|s| s.to_string()).collect(),
            BTreeMap::from([("rsg".to_string(), Judgment::Favorable)]),
            rationales,
            1,
        )
    }

    #[test]
    fn test_short_sentences_are_dropped_before_padding() {
        let rationales = vec![BTreeMap::new(), BTreeMap::new()];
        let doc = Document::new(
            "doc-1",
            vec!["too short".to_string(), "this one is long enough".to_string()],
            BTreeMap::new(),
            rationales,
            3,
        );
        assert_eq!(doc.num_sentences(), 1);
        assert_eq!(doc.sentences[0], "this one is long enough");
    }

    #[test]
    fn test_padded_grid_has_fixed_shape_regardless_of_length() {
        let mut short = doc_with(&["one two", "three four"], &[0.0, 1.0]);
        short.set_sequences(vec![vec![1, 2, 0], vec![3, 4, 0]]).unwrap();
        let grid = short.padded_tokens(5, 3).unwrap();
        assert_eq!(grid.len(), 5);
        assert!(grid.iter().all(|row| row.len() == 3));
        assert_eq!(grid[4], vec![0, 0, 0]);

        let mut long = doc_with(&["a b", "c d", "e f"], &[0.0, 1.0, 0.0]);
        long.set_sequences(vec![vec![1, 2], vec![3, 4], vec![5, 6]]).unwrap();
        let grid = long.padded_tokens(2, 2).unwrap();
        assert_eq!(grid.len(), 2);
        assert_eq!(grid[1], vec![3, 4]);
    }

    #[test]
    fn test_padded_rows_carry_all_zero_rationales() {
        let doc = doc_with(&["one two", "three four"], &[1.0, 0.0]);
        let domains = vec![DomainSpec::new("rsg", 1.0)];
        let padded = doc.padded_rationales(&domains, 4).unwrap();
        assert_eq!(padded["rsg"], vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_combined_indicator_sums_domains() {
        let mut doc = doc_with(&["one two", "three four"], &[1.0, 0.0]);
        for labels in doc.rationales.iter_mut() {
            labels.insert("ac".to_string(), 1.0);
        }
        let domains = vec![DomainSpec::new("ac", 1.0), DomainSpec::new("rsg", 1.0)];
        let combined = doc.combined_rationale_indicators(&domains, 3).unwrap();
        assert_eq!(combined, vec![2.0, 1.0, 0.0]);
    }
}

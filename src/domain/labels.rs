// ============================================================
// Layer 3 — Judgments, Domains and Label Maps
// ============================================================
// Label vocabulary for risk-of-bias assessment. Every judgment
// domain (e.g. random-sequence-generation) carries a 3-way
// document label and a binary per-sentence rationale flag.
//
// The raw data encodes judgments as {low, high, unclear, unk};
// "unclear" is folded into the unfavorable category before it
// reaches the model, and "unk" is a real third class — it is
// masked out of losses and metrics, never silently dropped.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of document-level judgment classes:
/// favorable / unfavorable-or-unclear / unknown.
pub const NUM_CLASSES: usize = 3;

/// A document-level judgment for one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Judgment {
    /// Low risk of bias.
    Favorable,
    /// High or unclear risk of bias (folded into one class).
    Unfavorable,
    /// No determinable label. A class of its own, not a missing value.
    Unknown,
}

impl Judgment {
    /// Parse the raw label vocabulary used in the training CSVs.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Favorable),
            "high" | "unclear" => Ok(Self::Unfavorable),
            "unk" | "unknown" => Ok(Self::Unknown),
            other => bail!(
                "unrecognised judgment label '{other}' (expected one of low/high/unclear/unk)"
            ),
        }
    }

    /// Index of this judgment in the 3-way output layer.
    pub fn class_index(self) -> usize {
        match self {
            Self::Favorable => 0,
            Self::Unfavorable => 1,
            Self::Unknown => 2,
        }
    }

    pub fn from_class_index(idx: usize) -> Result<Self> {
        match idx {
            0 => Ok(Self::Favorable),
            1 => Ok(Self::Unfavorable),
            2 => Ok(Self::Unknown),
            other => bail!("judgment class index out of range: {other}"),
        }
    }

    /// One-hot target vector. Always sums to exactly 1: "unknown"
    /// is its own category.
    pub fn one_hot(self) -> [f32; NUM_CLASSES] {
        let mut v = [0.0; NUM_CLASSES];
        v[self.class_index()] = 1.0;
        v
    }

    pub fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl std::fmt::Display for Judgment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Favorable => "favorable",
            Self::Unfavorable => "unfavorable/unclear",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

// ─── DomainSpec ───────────────────────────────────────────────────────────────
/// One judgment axis the model is trained on.
///
/// Domains are an explicit configuration list handed to the model
/// constructor; nothing is discovered dynamically at call sites.
/// The `judgment_weight` scales the domain's document-loss
/// contribution and reflects inverse data scarcity (0–1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainSpec {
    pub name: String,
    pub judgment_weight: f32,
}

impl DomainSpec {
    pub fn new(name: impl Into<String>, judgment_weight: f32) -> Self {
        Self { name: name.into(), judgment_weight }
    }

    /// CSV column holding this domain's document judgment.
    pub fn judgment_column(&self) -> String {
        format!("{}-judgment", self.name)
    }

    /// CSV column holding this domain's per-sentence rationale flag.
    pub fn rationale_column(&self) -> String {
        format!("{}-rationale", self.name)
    }
}

// ─── Label map stacking ───────────────────────────────────────────────────────
/// Stack N per-sentence label maps (all sharing the same key set)
/// into one map from key to a length-N vector.
///
/// A missing key is a data-integrity problem and fails fast instead
/// of silently producing ragged label tensors.
pub fn stack_label_maps(
    maps: &[BTreeMap<String, f32>],
    keys: &[String],
) -> Result<BTreeMap<String, Vec<f32>>> {
    let mut stacked = BTreeMap::new();
    for key in keys {
        let mut column = Vec::with_capacity(maps.len());
        for (i, map) in maps.iter().enumerate() {
            let value = map
                .get(key)
                .with_context(|| format!("label map {i} is missing key '{key}'"))?;
            column.push(*value);
        }
        stacked.insert(key.clone(), column);
    }
    Ok(stacked)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_hot_always_sums_to_one() {
        for j in [Judgment::Favorable, Judgment::Unfavorable, Judgment::Unknown] {
            let v = j.one_hot();
            assert!((v.iter().sum::<f32>() - 1.0).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_unclear_folds_into_unfavorable() {
        assert_eq!(Judgment::parse("unclear").unwrap(), Judgment::Unfavorable);
        assert_eq!(Judgment::parse("high").unwrap(), Judgment::Unfavorable);
        assert_eq!(Judgment::parse("low").unwrap(), Judgment::Favorable);
        assert_eq!(Judgment::parse("unk").unwrap(), Judgment::Unknown);
    }

    #[test]
    fn test_unexpected_label_is_rejected() {
        assert!(Judgment::parse("medium").is_err());
    }

    #[test]
    fn test_stacking_produces_one_column_per_key() {
        let keys = vec!["rsg".to_string()];
        let maps = vec![
            BTreeMap::from([("rsg".to_string(), 1.0)]),
            BTreeMap::from([("rsg".to_string(), 0.0)]),
        ];
        let stacked = stack_label_maps(&maps, &keys).unwrap();
        assert_eq!(stacked["rsg"], vec![1.0, 0.0]);
    }

    #[test]
    fn test_stacking_fails_fast_on_missing_key() {
        let keys = vec!["rsg".to_string(), "ac".to_string()];
        let maps = vec![BTreeMap::from([("rsg".to_string(), 1.0)])];
        assert!(stack_label_maps(&maps, &keys).is_err());
    }
}

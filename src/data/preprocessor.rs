// ============================================================
// Layer 4 — Preprocessor
// ============================================================
// Word-level vocabulary and sentence encoding. Owns the mapping
// from raw sentence text to fixed-length integer sequences:
//
//   - tokens are lowercased and trimmed of edge punctuation
//   - stop words are dropped (a compact biomedical-ish list)
//   - bare numbers collapse into one shared number token, so
//     "randomized 140 patients" and "randomized 250 patients"
//     encode identically
//   - the vocabulary keeps the `max_features` most frequent
//     tokens; index 0 is reserved for padding
//   - sequences are pre-padded / pre-truncated to `max_sent_len`
//     (the tail of a long sentence survives, not the head)
//
// The fitted vocabulary is persisted as JSON next to the model
// checkpoints and reloaded verbatim for inference.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::domain::document::Document;

/// Stand-in token for any all-digit word.
const NUMBER_TOKEN: &str = "numbernumbernumber";

const STOPWORDS: &[&str] = &[
    "a", "about", "again", "all", "almost", "also", "although", "always", "among", "an", "and",
    "another", "any", "are", "as", "at", "b", "be", "because", "been", "before", "being",
    "between", "both", "but", "by", "c", "can", "could", "did", "do", "d", "does", "each",
    "either", "enough", "etc", "f", "for", "from", "had", "has", "have", "here", "how", "h", "i",
    "if", "in", "into", "is", "it", "its", "j", "just", "k", "made", "make", "may", "must", "n",
    "o", "of", "often", "on", "p", "q", "r", "s", "so", "that", "the", "them", "then", "their",
    "those", "thus", "to", "t", "u", "use", "used", "v", "w", "x", "y", "z", "we", "was",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preprocessor {
    max_features: usize,
    pub max_sent_len: usize,
    pub max_doc_len: usize,
    stopword: bool,
    /// token → index, 1-based. 0 is the padding index and never
    /// appears here.
    vocab: HashMap<String, u32>,
}

impl Preprocessor {
    pub fn new(max_features: usize, max_sent_len: usize, max_doc_len: usize, stopword: bool) -> Self {
        Self {
            max_features,
            max_sent_len,
            max_doc_len,
            stopword,
            vocab: HashMap::new(),
        }
    }

    /// Normalize one raw whitespace token. Returns None for tokens
    /// that are filtered out entirely.
    fn normalize(&self, raw: &str) -> Option<String> {
        let token = raw.to_lowercase();
        let token = token.trim_matches(|c: char| !c.is_alphanumeric());
        if token.is_empty() {
            return None;
        }
        if self.stopword && STOPWORDS.contains(&token) {
            return None;
        }
        if token.chars().all(|c| c.is_ascii_digit()) {
            return Some(NUMBER_TOKEN.to_string());
        }
        Some(token.to_string())
    }

    fn tokenize(&self, sentence: &str) -> Vec<String> {
        sentence
            .split_whitespace()
            .filter_map(|w| self.normalize(w))
            .collect()
    }

    /// Fit the vocabulary on a corpus of sentences: count token
    /// frequencies, keep the top `max_features`, assign indices by
    /// descending frequency (ties broken alphabetically so fitting
    /// is deterministic).
    pub fn fit<'a>(&mut self, sentences: impl IntoIterator<Item = &'a str>) {
        let mut freq: HashMap<String, usize> = HashMap::new();
        for sentence in sentences {
            for token in self.tokenize(sentence) {
                *freq.entry(token).or_insert(0) += 1;
            }
        }

        let mut tokens: Vec<(String, usize)> = freq.into_iter().collect();
        tokens.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        tokens.truncate(self.max_features);

        self.vocab = tokens
            .into_iter()
            .enumerate()
            .map(|(i, (token, _))| (token, (i + 1) as u32))
            .collect();
        tracing::info!("Fitted vocabulary with {} tokens", self.vocab.len());
    }

    /// Number of fitted vocabulary entries (excluding padding).
    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Rows the embedding table needs: the full feature budget plus
    /// the padding row.
    pub fn embedding_rows(&self) -> usize {
        self.max_features + 1
    }

    /// Encode one sentence as exactly `max_sent_len` token indices.
    /// Out-of-vocabulary tokens are dropped; over-long sentences
    /// keep their tail; short ones are zero-padded on the left.
    pub fn encode(&self, sentence: &str) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .tokenize(sentence)
            .iter()
            .filter_map(|t| self.vocab.get(t).copied())
            .collect();

        if ids.len() > self.max_sent_len {
            ids.drain(..ids.len() - self.max_sent_len);
        }
        let mut row = vec![0u32; self.max_sent_len - ids.len()];
        row.extend(ids);
        row
    }

    /// Encode every sentence of a document and attach the rows.
    pub fn encode_document(&self, doc: &mut Document) -> Result<()> {
        let rows = doc.sentences.iter().map(|s| self.encode(s)).collect();
        doc.set_sequences(rows)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        fs::write(path, json)
            .with_context(|| format!("cannot write vocabulary to '{}'", path.display()))?;
        tracing::debug!("Saved vocabulary to '{}'", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).with_context(|| {
            format!(
                "cannot read vocabulary from '{}'; has the model been trained?",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}

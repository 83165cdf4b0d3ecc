// ============================================================
// Layer 2 — Predict Use Case
// ============================================================
// Loads a trained checkpoint, reads documents from a CSV of the
// same shape as the training data (judgment columns may be all
// "unk" for unlabelled input), and prints one report per
// document: each domain's judgment with its class probabilities,
// followed by the top rationale sentences.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::Result;

use crate::data::ingest::read_documents;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::inferencer::Inferencer;

pub struct PredictUseCase {
    inferencer: Inferencer,
    top_k: usize,
}

impl PredictUseCase {
    pub fn new(checkpoint_dir: &str, top_k: usize) -> Result<Self> {
        let ckpt = CheckpointManager::new(checkpoint_dir)?;
        let inferencer = Inferencer::from_checkpoint(&ckpt)?;
        Ok(Self { inferencer, top_k })
    }

    /// Judge every document in `data_path`, or only `doc_id` when
    /// one is given, and return the formatted report.
    pub fn report(&self, data_path: &Path, doc_id: Option<&str>) -> Result<String> {
        let config = self.inferencer.config();
        let mut documents =
            read_documents(data_path, &config.domains, config.min_sent_words)?;
        if let Some(wanted) = doc_id {
            documents.retain(|d| d.id == wanted);
            anyhow::ensure!(!documents.is_empty(), "no document with id '{wanted}'");
        }

        let mut out = String::new();
        for doc in documents.iter_mut() {
            let prediction = self.inferencer.predict(doc)?;
            writeln!(out, "=== {} ===", prediction.doc_id)?;
            for domain in &prediction.domains {
                writeln!(
                    out,
                    "  {}: {} (favorable={:.3} unfavorable={:.3} unknown={:.3})",
                    domain.domain,
                    domain.judgment,
                    domain.probabilities[0],
                    domain.probabilities[1],
                    domain.probabilities[2],
                )?;
                let ranked =
                    self.inferencer.rank_rationales(doc, &domain.domain, self.top_k)?;
                for sentence in ranked {
                    writeln!(
                        out,
                        "    [{:>3}] p={:.3} {}",
                        sentence.index, sentence.probability, sentence.text
                    )?;
                }
            }
        }
        Ok(out)
    }
}

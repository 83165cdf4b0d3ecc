// ============================================================
// Layer 4 — Checkpoint persistence
// ============================================================
// One directory holds everything a later process needs to pick
// the model back up: the two weight snapshots (sentence-phase and
// document-phase best), the training configuration and the fitted
// vocabulary. Weight files are written to a temporary name and
// renamed into place so an interrupted save never clobbers the
// previous best.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::module::Module;
use burn::prelude::*;
use burn::record::{CompactRecorder, FileRecorder};
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

/// Best weights of the sentence-level pretraining phase.
pub const SENTENCE_WEIGHTS: &str = "sentence_model";
/// Best weights of the document-level training phase.
pub const DOCUMENT_WEIGHTS: &str = "document_model";

const CONFIG_FILE: &str = "train_config.json";
const VOCABULARY_FILE: &str = "vocabulary.json";

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating checkpoint directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn vocabulary_path(&self) -> PathBuf {
        self.dir.join(VOCABULARY_FILE)
    }

    /// Persist module weights under `name`, atomically.
    ///
    /// The temp stem must stay dot-free: the recorder applies its
    /// extension with `set_extension`, which would replace a
    /// `.tmp` suffix and write straight to the final path.
    pub fn save_weights<B: Backend, M: Module<B>>(&self, model: M, name: &str) -> Result<()> {
        let ext = <CompactRecorder as FileRecorder<B>>::file_extension();
        let tmp_stem = self.dir.join(format!("{name}_tmp"));
        model
            .save_file(&tmp_stem, &CompactRecorder::new())
            .with_context(|| format!("writing weights '{name}'"))?;

        let tmp = self.dir.join(format!("{name}_tmp.{ext}"));
        let target = self.dir.join(format!("{name}.{ext}"));
        fs::rename(&tmp, &target)
            .with_context(|| format!("moving weights into place at {}", target.display()))?;
        info!(name, path = %target.display(), "saved checkpoint");
        Ok(())
    }

    pub fn weights_exist<B: Backend>(&self, name: &str) -> bool {
        let ext = <CompactRecorder as FileRecorder<B>>::file_extension();
        self.dir.join(format!("{name}.{ext}")).exists()
    }

    pub fn load_weights<B: Backend, M: Module<B>>(
        &self,
        model: M,
        name: &str,
        device: &B::Device,
    ) -> Result<M> {
        let stem = self.dir.join(name);
        model
            .load_file(&stem, &CompactRecorder::new(), device)
            .with_context(|| format!("loading weights '{name}' from {}", self.dir.display()))
    }

    pub fn save_config<T: Serialize>(&self, config: &T) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(config)?;
        fs::write(&path, json)
            .with_context(|| format!("writing configuration to {}", path.display()))
    }

    pub fn load_config<T: DeserializeOwned>(&self) -> Result<T> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("reading configuration from {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("parsing configuration at {}", path.display()))
    }

    /// Record the score a weight snapshot was taken at, so a later
    /// run can see what it is resuming from.
    pub fn save_best_score(&self, name: &str, score: f64) -> Result<()> {
        let path = self.dir.join(format!("{name}_best.json"));
        let json = serde_json::to_string(&serde_json::json!({ "score": score }))?;
        fs::write(&path, json)
            .with_context(|| format!("writing best score to {}", path.display()))
    }
}

// ─── Score tracking ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScoreDirection {
    /// Validation loss: smaller is better.
    LowerIsBetter,
    /// Accuracy sums: larger is better.
    HigherIsBetter,
}

/// Tracks a validation score across epochs; `update` reports
/// whether the new score strictly improves on the best so far.
/// NaN never improves.
pub struct ScoreTracker {
    direction: ScoreDirection,
    best: Option<f64>,
}

impl ScoreTracker {
    pub fn new(direction: ScoreDirection) -> Self {
        Self { direction, best: None }
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn update(&mut self, score: f64) -> bool {
        if score.is_nan() {
            return false;
        }
        let improved = match self.best {
            None => true,
            Some(best) => match self.direction {
                ScoreDirection::LowerIsBetter => score < best,
                ScoreDirection::HigherIsBetter => score > best,
            },
        };
        if improved {
            self.best = Some(score);
        }
        improved
    }
}

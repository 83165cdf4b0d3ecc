// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Validate configuration
//   Step 2: Load sentence-level CSV      (Layer 4 - data)
//   Step 3: Fit vocabulary + encode docs (Layer 4 - data)
//   Step 4: Shuffle documents            (Layer 4 - data)
//   Step 5: Save config + vocabulary     (Layer 4 - infra)
//   Step 6: Run two-phase training       (Layer 5 - ml)

use anyhow::{ensure, Result};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::preprocessor::Preprocessor;
use crate::domain::labels::DomainSpec;
use crate::domain::traits::DocumentSource;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::metrics::MetricsLogger;
use crate::ml::model::RationaleCnnConfig;
use crate::ml::trainer::{run_training, TrainOptions};

// ─── Training Configuration ──────────────────────────────────────────────────
// Every hyperparameter of a run. Serialisable so the exact
// architecture can be rebuilt for inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_path:       String,
    pub checkpoint_dir:  String,
    /// Risk-of-bias domains to model, in head order. Each carries
    /// the weight its judgment loss contributes.
    pub domains:         Vec<DomainSpec>,

    // vocabulary / shapes
    pub max_features:    usize,
    pub max_sent_len:    usize,
    pub max_doc_len:     usize,
    pub min_sent_words:  usize,
    pub stopword:        bool,

    // architecture
    pub embedding_dims:  usize,
    pub n_filters:       usize,
    pub ngram_widths:    Vec<usize>,
    pub sent_dropout:    f64,
    pub doc_dropout:     f64,

    // optimisation
    pub sentence_epochs: usize,
    pub doc_epochs:      usize,
    pub batch_size:      usize,
    pub sentence_lr:     f64,
    pub doc_lr:          f64,
    pub val_split:       f64,
    pub downsample:      bool,
    pub end_to_end:      bool,
    pub patience:        usize,
    pub shuffle:         bool,
    pub seed:            u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_path:       "data/sentences.csv".to_string(),
            checkpoint_dir:  "checkpoints".to_string(),
            domains:         vec![DomainSpec::new("random-sequence-generation", 1.0)],
            max_features:    20_000,
            max_sent_len:    25,
            max_doc_len:     200,
            min_sent_words:  3,
            stopword:        true,
            embedding_dims:  200,
            n_filters:       32,
            ngram_widths:    vec![3, 4, 5],
            sent_dropout:    0.5,
            doc_dropout:     0.5,
            sentence_epochs: 10,
            doc_epochs:      25,
            batch_size:      50,
            sentence_lr:     1e-2,
            doc_lr:          1e-3,
            val_split:       0.1,
            downsample:      true,
            end_to_end:      false,
            patience:        5,
            shuffle:         true,
            seed:            42,
        }
    }
}

impl TrainConfig {
    /// Architecture-only view, used both here and when the
    /// inferencer rebuilds the model from disk.
    pub fn model_config(&self) -> RationaleCnnConfig {
        RationaleCnnConfig::new(
            self.max_features + 1,
            self.max_sent_len,
            self.max_doc_len,
            self.embedding_dims,
            self.domains.len(),
            self.ngram_widths.clone(),
        )
        .with_n_filters(self.n_filters)
        .with_sent_dropout(self.sent_dropout)
        .with_doc_dropout(self.doc_dropout)
    }

    pub fn train_options(&self) -> TrainOptions {
        TrainOptions {
            sentence_epochs: self.sentence_epochs,
            doc_epochs:      self.doc_epochs,
            batch_size:      self.batch_size,
            sentence_lr:     self.sentence_lr,
            doc_lr:          self.doc_lr,
            val_split:       self.val_split,
            downsample:      self.downsample,
            end_to_end:      self.end_to_end,
            patience:        self.patience,
            seed:            self.seed,
        }
    }

    /// Reject configurations that would only fail later, deep in a
    /// training epoch.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.domains.is_empty(), "at least one domain must be configured");
        for domain in &self.domains {
            ensure!(
                (0.0..=1.0).contains(&domain.judgment_weight),
                "domain '{}': judgment weight {} outside [0, 1]",
                domain.name,
                domain.judgment_weight
            );
        }
        ensure!(!self.ngram_widths.is_empty(), "at least one n-gram width is required");
        for &width in &self.ngram_widths {
            ensure!(
                width >= 1 && width <= self.max_sent_len,
                "n-gram width {} does not fit a sentence of {} tokens",
                width,
                self.max_sent_len
            );
        }
        ensure!(self.batch_size >= 1, "batch size must be at least 1");
        ensure!(
            (0.0..1.0).contains(&self.val_split),
            "validation split {} outside [0, 1)",
            self.val_split
        );
        Ok(())
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end.
    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Step 2: Load the sentence-level CSV ───────────────────────────────
        tracing::info!("Loading training data from '{}'", cfg.data_path);
        let loader = crate::data::ingest::CsvLoader::new(
            &cfg.data_path,
            &cfg.domains,
            cfg.min_sent_words,
        );
        let mut documents = loader.load_all()?;
        tracing::info!("Loaded {} documents", documents.len());

        // ── Step 3: Fit the vocabulary, then encode every document ────────────
        let mut preprocessor = Preprocessor::new(
            cfg.max_features,
            cfg.max_sent_len,
            cfg.max_doc_len,
            cfg.stopword,
        );
        preprocessor.fit(
            documents
                .iter()
                .flat_map(|d| d.sentences.iter().map(String::as_str)),
        );
        tracing::info!("Vocabulary fitted: {} distinct tokens kept", preprocessor.vocab_size());
        for doc in documents.iter_mut() {
            preprocessor.encode_document(doc)?;
        }

        // ── Step 4: Shuffle so the tail validation split is not
        // whatever order the CSV happened to arrive in ────────────────────────
        if cfg.shuffle {
            let mut rng = StdRng::seed_from_u64(cfg.seed);
            documents.shuffle(&mut rng);
        }

        // ── Step 5: Persist config + vocabulary for inference ─────────────────
        let ckpt = CheckpointManager::new(&cfg.checkpoint_dir)?;
        ckpt.save_config(cfg)?;
        preprocessor.save(&ckpt.vocabulary_path())?;

        // ── Step 6: Two-phase training loop (Layer 5) ─────────────────────────
        let mut logger = MetricsLogger::create(ckpt.dir())?;
        run_training(
            &cfg.model_config(),
            &cfg.domains,
            &documents,
            &cfg.train_options(),
            &ckpt,
            &mut logger,
        )?;
        Ok(())
    }
}

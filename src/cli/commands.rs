// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `predict`
// and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, etc.)

use anyhow::{bail, Result};
use clap::{Args, Subcommand};

use crate::application::train_use_case::TrainConfig;
use crate::domain::labels::DomainSpec;

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the risk-of-bias model on a sentence-level CSV
    Train(TrainArgs),

    /// Judge documents and rank rationale sentences from a checkpoint
    Predict(PredictArgs),
}

/// All arguments for the `train` command.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// CSV with one row per sentence: doc_id, sentence, then a
    /// judgment and a rationale column per domain
    #[arg(long, default_value = "data/sentences.csv")]
    pub data_path: String,

    /// Directory to save weights, config and vocabulary
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Risk-of-bias domain to model, as name=weight; repeat the
    /// flag for multi-task training (e.g. --domain blinding=0.5)
    #[arg(long = "domain", value_parser = parse_domain)]
    pub domains: Vec<DomainSpec>,

    /// Vocabulary budget: most frequent tokens kept
    #[arg(long, default_value_t = 20_000)]
    pub max_features: usize,

    /// Tokens per sentence after padding/truncation
    #[arg(long, default_value_t = 25)]
    pub max_sent_len: usize,

    /// Sentences per document after padding/truncation
    #[arg(long, default_value_t = 200)]
    pub max_doc_len: usize,

    /// Sentences with fewer words than this are dropped
    #[arg(long, default_value_t = 3)]
    pub min_sent_words: usize,

    /// Skip stopword removal
    #[arg(long)]
    pub no_stopword: bool,

    /// Word embedding dimensions
    #[arg(long, default_value_t = 200)]
    pub embedding_dims: usize,

    /// Convolution filters per n-gram width
    #[arg(long, default_value_t = 32)]
    pub n_filters: usize,

    /// Convolution widths in words; repeat for parallel branches
    #[arg(long = "ngram-width", default_values_t = [3usize, 4, 5])]
    pub ngram_widths: Vec<usize>,

    /// Dropout on sentence vectors
    #[arg(long, default_value_t = 0.5)]
    pub sent_dropout: f64,

    /// Dropout before the judgment heads
    #[arg(long, default_value_t = 0.5)]
    pub doc_dropout: f64,

    /// Epochs of balanced sentence pretraining (phase 1)
    #[arg(long, default_value_t = 10)]
    pub sentence_epochs: usize,

    /// Epochs of document training (phase 2)
    #[arg(long, default_value_t = 25)]
    pub doc_epochs: usize,

    #[arg(long, default_value_t = 50)]
    pub batch_size: usize,

    /// AdaGrad learning rate for phase 1
    #[arg(long, default_value_t = 1e-2)]
    pub sentence_lr: f64,

    /// Adam learning rate for phase 2
    #[arg(long, default_value_t = 1e-3)]
    pub doc_lr: f64,

    /// Fraction of documents held out as the validation tail
    #[arg(long, default_value_t = 0.1)]
    pub val_split: f64,

    /// Sweep the full training pool each document epoch instead of
    /// resampling a balanced cross-domain subset
    #[arg(long)]
    pub no_downsample: bool,

    /// Keep the sentence stack trainable during phase 2
    #[arg(long)]
    pub end_to_end: bool,

    /// Full-pool mode: epochs without improvement before stopping
    #[arg(long, default_value_t = 5)]
    pub patience: usize,

    /// Keep documents in CSV order instead of shuffling
    #[arg(long)]
    pub no_shuffle: bool,

    /// Seed for shuffling, sampling and weight initialisation
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Parse one `--domain name=weight` value; a bare name gets
/// weight 1.
fn parse_domain(raw: &str) -> Result<DomainSpec> {
    match raw.split_once('=') {
        None => Ok(DomainSpec::new(raw, 1.0)),
        Some((name, weight)) => {
            if name.is_empty() {
                bail!("domain name missing in '{raw}'");
            }
            let weight: f32 = weight
                .parse()
                .map_err(|_| anyhow::anyhow!("bad domain weight in '{raw}'"))?;
            Ok(DomainSpec::new(name, weight))
        }
    }
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// This is the boundary between Layer 1 and Layer 2 —
/// the application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        let defaults = TrainConfig::default();
        TrainConfig {
            data_path:       a.data_path,
            checkpoint_dir:  a.checkpoint_dir,
            domains:         if a.domains.is_empty() { defaults.domains } else { a.domains },
            max_features:    a.max_features,
            max_sent_len:    a.max_sent_len,
            max_doc_len:     a.max_doc_len,
            min_sent_words:  a.min_sent_words,
            stopword:        !a.no_stopword,
            embedding_dims:  a.embedding_dims,
            n_filters:       a.n_filters,
            ngram_widths:    a.ngram_widths,
            sent_dropout:    a.sent_dropout,
            doc_dropout:     a.doc_dropout,
            sentence_epochs: a.sentence_epochs,
            doc_epochs:      a.doc_epochs,
            batch_size:      a.batch_size,
            sentence_lr:     a.sentence_lr,
            doc_lr:          a.doc_lr,
            val_split:       a.val_split,
            downsample:      !a.no_downsample,
            end_to_end:      a.end_to_end,
            patience:        a.patience,
            shuffle:         !a.no_shuffle,
            seed:            a.seed,
        }
    }
}

/// All arguments for the `predict` command
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// CSV of documents to judge (judgment columns may be "unk")
    #[arg(long, default_value = "data/sentences.csv")]
    pub data_path: String,

    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Only judge the document with this id
    #[arg(long)]
    pub doc_id: Option<String>,

    /// Rationale sentences reported per domain
    #[arg(long, default_value_t = 3)]
    pub top_k: usize,
}

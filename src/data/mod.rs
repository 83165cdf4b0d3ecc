// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between the raw CSV and backend tensors:
//
//   training CSV (row per sentence)
//       │
//       ▼
//   CsvLoader        → groups rows into labeled Documents
//       │
//       ▼
//   Preprocessor     → vocabulary + fixed-length token sequences
//       │
//       ▼
//   splitter         → document-level train/validation tail split
//       │
//       ▼
//   BalancedSampler  → per-epoch balanced pseudo-documents and
//                      cross-domain document resampling
//       │
//       ▼
//   DocBatcher       → padded grids stacked into tensors

/// Reads the row-per-sentence training CSVs into Documents
pub mod ingest;

/// Word-level vocabulary, stop-word filtering, sequence encoding
pub mod preprocessor;

/// Balanced resampling against rationale and label scarcity
pub mod sampler;

/// Document-level validation tail split
pub mod splitter;

/// Host grids → backend tensors
pub mod batcher;

// ============================================================
// Layer 3 — Core Traits
// ============================================================
// The application layer talks to these instead of concrete
// loaders, so a different ingestion format only means a new
// implementation, not a new pipeline.

use anyhow::Result;
use crate::domain::document::Document;

/// Any component that can load labeled documents from a source.
///
/// Implementations:
///   - CsvLoader → reads the row-per-sentence training CSVs
pub trait DocumentSource {
    /// Load all available documents, grouped and label-checked.
    fn load_all(&self) -> Result<Vec<Document>>;
}

// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure types only: no Burn, no file I/O, no ML code. This layer
// defines what a document, a judgment domain and a rationale ARE;
// the other layers decide how they move through the pipeline.

// A clinical-trial report with its sentence and document labels
pub mod document;

// Judgment classes, domain configuration, label-map stacking
pub mod labels;

// Abstractions the data layer implements
pub mod traits;

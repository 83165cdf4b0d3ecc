// ============================================================
// Layer 4 — Infrastructure
// ============================================================

pub mod checkpoint;
pub mod metrics;

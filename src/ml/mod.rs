// ============================================================
// Layer 5 — Machine Learning
// ============================================================

pub mod inferencer;
pub mod losses;
pub mod metrics;
pub mod model;
pub mod trainer;

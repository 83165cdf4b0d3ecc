// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a specific goal (training or judging documents).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No UI or printing here (that's Layer 1)
//   - No direct file access (that's Layer 4)
//   - Only workflow coordination

// The two-phase training workflow
pub mod train_use_case;

// The judgment + rationale-report workflow
pub mod predict_use_case;

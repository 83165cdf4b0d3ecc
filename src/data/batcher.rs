// ============================================================
// Layer 4 — Tensor Batching
// ============================================================
// Converts host-side document grids and label vectors into
// backend tensors. All rows are already padded to uniform shape,
// so batching is flatten-then-reshape.
//
// The trainer assembles its own epoch-specific batches (balanced
// pseudo-documents change every epoch), so this is a set of plain
// constructors rather than a DataLoader adapter.

use burn::prelude::*;

use crate::domain::labels::NUM_CLASSES;

#[derive(Clone, Debug)]
pub struct DocBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> DocBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Token grids → [batch, max_doc_len, max_sent_len] Int tensor.
    pub fn tokens(&self, grids: &[Vec<Vec<u32>>]) -> Tensor<B, 3, Int> {
        let batch = grids.len();
        let doc_len = grids[0].len();
        let sent_len = grids[0][0].len();

        let flat: Vec<i32> = grids
            .iter()
            .flat_map(|grid| grid.iter().flat_map(|row| row.iter().map(|&t| t as i32)))
            .collect();

        Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device)
            .reshape([batch, doc_len, sent_len])
    }

    /// Per-sentence binary targets → [batch, max_doc_len, 1].
    pub fn sentence_targets(&self, rows: &[Vec<f32>]) -> Tensor<B, 3> {
        let batch = rows.len();
        let doc_len = rows[0].len();
        let flat: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Tensor::<B, 1>::from_floats(flat.as_slice(), &self.device).reshape([batch, doc_len, 1])
    }

    /// Per-sentence weights → [batch, max_doc_len].
    pub fn sentence_weights(&self, rows: &[Vec<f32>]) -> Tensor<B, 2> {
        let batch = rows.len();
        let doc_len = rows[0].len();
        let flat: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Tensor::<B, 1>::from_floats(flat.as_slice(), &self.device).reshape([batch, doc_len])
    }

    /// One-hot document targets → [batch, 3].
    pub fn doc_targets(&self, rows: &[[f32; NUM_CLASSES]]) -> Tensor<B, 2> {
        let batch = rows.len();
        let flat: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Tensor::<B, 1>::from_floats(flat.as_slice(), &self.device).reshape([batch, NUM_CLASSES])
    }

    /// Per-document sample weights → [batch].
    pub fn sample_weights(&self, weights: &[f32]) -> Tensor<B, 1> {
        Tensor::<B, 1>::from_floats(weights, &self.device)
    }
}

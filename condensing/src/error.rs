use dense_linalg::LinalgError;
use thiserror::Error;

use crate::solver::SolverStatus;

/// Top-level error type for condensing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CondensingError {
    #[error("Dimension error: {0}")]
    Dimension(#[from] DimensionError),

    #[error("Linear algebra error: {0}")]
    Linalg(#[from] LinalgError),

    /// The dense QP solver returned a non-success status.
    #[error("Dense QP solver failed with status {status:?}")]
    Solver { status: SolverStatus },
}

/// Caller contract violations on problem or solution shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DimensionError {
    #[error("Horizon must have at least one stage transition")]
    EmptyHorizon,

    #[error("Expected {expected} entries in {what}, got {got}")]
    StageCount { what: &'static str, expected: usize, got: usize },

    #[error("Terminal stage must have no controls, got nu[N] = {nu}")]
    TerminalControls { nu: usize },

    #[error("Stage {stage}: {block} is {got_rows}x{got_cols}, expected {rows}x{cols}")]
    Shape {
        stage: usize,
        block: &'static str,
        rows: usize,
        cols: usize,
        got_rows: usize,
        got_cols: usize,
    },

    #[error("Stage {stage}: bound index {index} out of range (stage vector has {limit} entries)")]
    BoundIndex { stage: usize, index: usize, limit: usize },

    #[error("Expected {what} of length {expected}, got {got}")]
    Length { what: &'static str, expected: usize, got: usize },
}

use thiserror::Error;

/// Errors reported by the dense linear-algebra routines.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum LinalgError {
    /// Zero pivot found during LU factorization. `column` is 1-based.
    #[error("matrix is singular: zero pivot in column {column}")]
    Singular { column: usize },

    #[error("QL iteration for eigenvalue {index} did not converge within {iterations} iterations")]
    NoConvergence { index: usize, iterations: usize },

    #[error("expected a square matrix, got {nrows}x{ncols}")]
    NotSquare { nrows: usize, ncols: usize },

    #[error("matrix contains non-finite entries")]
    NonFinite,
}

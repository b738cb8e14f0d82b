//! Eigenvalue repair for symmetric matrices that should be positive definite.

use nalgebra::DMatrix;

use crate::eigen::{reconstruct, SymmetricEigen};
use crate::error::LinalgError;

/// Smallest eigenvalue magnitude left after regularization.
pub const REGULARIZATION_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegularizationMode {
    /// Near-zero eigenvalues become `epsilon`, negative ones are reflected to
    /// `|d|`. Negative curvature is kept as positive curvature.
    #[default]
    Mirror,
    /// Every eigenvalue `<= epsilon` becomes `epsilon`.
    Cut,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regularization {
    pub mode: RegularizationMode,
    pub epsilon: f64,
}

impl Default for Regularization {
    fn default() -> Self {
        Self { mode: RegularizationMode::Mirror, epsilon: REGULARIZATION_EPS }
    }
}

impl Regularization {
    pub fn repair_eigenvalue(&self, d: f64) -> f64 {
        match self.mode {
            RegularizationMode::Mirror if d.abs() <= self.epsilon => self.epsilon,
            RegularizationMode::Mirror if d < 0.0 => -d,
            RegularizationMode::Mirror => d,
            RegularizationMode::Cut => d.max(self.epsilon),
        }
    }

    /// Replaces `a` with `V diag(repair(d)) Vᵀ`, keeping the eigenvector basis.
    pub fn apply(&self, a: &mut DMatrix<f64>) -> Result<(), LinalgError> {
        let eig = SymmetricEigen::new(a)?;
        let repaired: Vec<f64> =
            eig.eigenvalues.iter().map(|&d| self.repair_eigenvalue(d)).collect();
        *a = reconstruct(&eig.eigenvectors, &repaired);
        Ok(())
    }
}

/// Mirroring regularization with [`REGULARIZATION_EPS`].
pub fn regularize(a: &mut DMatrix<f64>) -> Result<(), LinalgError> {
    Regularization::default().apply(a)
}

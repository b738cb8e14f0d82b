//! Fixed-initial-state condensing of multi-stage optimal control QPs.
//!
//! An [`OcpQp`] is reduced to a [`DenseQp`] over the stacked controls, handed
//! to an external [`DenseQpSolver`], and the solution is expanded back into
//! the stage-wise trajectory.

pub mod context;
pub mod dense_qp;
pub mod error;
pub mod ocp_qp;
pub mod solver;
pub mod workspace;

pub use context::{CondensingConfig, CondensingContext, OcpQpSolution};
pub use dense_qp::{condense, DenseQp};
pub use error::{CondensingError, DimensionError};
pub use ocp_qp::{Dynamics, GeneralConstraints, OcpQp, OcpQpDims, StageBounds, StageCost};
pub use solver::{DenseQpSolver, RowMajorQp, SolverBudget, SolverOutput, SolverStatus};
pub use workspace::{SensitivityWorkspace, Trajectory};

//! Dense linear-algebra kernels for the condensing core: BLAS-style
//! primitives, LU solve, symmetric eigen-decomposition, Hessian
//! regularization and the matrix exponential.

pub mod eigen;
pub mod error;
pub mod expm;
pub mod kernels;
pub mod lu;
pub mod regularize;

pub use eigen::SymmetricEigen;
pub use error::LinalgError;
pub use expm::{expm, PadeOrder};
pub use lu::{lu_factor, lu_solve, solve, LuFactors};
pub use regularize::{regularize, Regularization, RegularizationMode, REGULARIZATION_EPS};

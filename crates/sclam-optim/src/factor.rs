//! Residual terms of a least squares problem.

use faer::Mat;
use thiserror::Error;

/// Errors raised while evaluating a factor.
#[derive(Debug, Error)]
pub enum FactorError {
    /// The parameter block has the wrong length for this factor.
    #[error("factor expects {expected} parameters, got {actual}")]
    WrongDimension {
        /// expected length
        expected: usize,
        /// actual length
        actual: usize,
    },

    /// The residual or its Jacobian is not finite at the evaluation point.
    #[error("non-finite evaluation: {0}")]
    NonFinite(String),
}

/// Result type for factor operations
pub type FactorResult<T> = Result<T, FactorError>;

/// Residual and Jacobian of a factor at one point.
#[derive(Debug, Clone)]
pub struct Linearization {
    /// Residual `r(x)`, already whitened for weighted factors.
    pub residual: Vec<f64>,
    /// `∂r(x ⊞ δ)/∂δ` at `δ = 0`, `residual_dim × dim`.
    pub jacobian: Mat<f64>,
}

/// A residual over the problem's single parameter block.
///
/// Weighted factors return whitened residuals and Jacobians, so that the
/// optimizer only ever minimizes `Σ ‖rᵢ‖²`.
pub trait Factor: Send + Sync {
    /// Length of the residual vector.
    fn residual_dim(&self) -> usize;

    /// Residual at `x`.
    fn residual(&self, x: &[f64]) -> FactorResult<Vec<f64>>;

    /// Residual and Jacobian at `x`.
    fn linearize(&self, x: &[f64]) -> FactorResult<Linearization>;
}

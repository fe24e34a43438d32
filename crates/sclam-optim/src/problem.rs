use faer::Mat;
use thiserror::Error;

use crate::factor::{Factor, FactorError};
use crate::manifold::{Manifold, ManifoldError};

/// Errors raised while building or evaluating a problem.
#[derive(Debug, Error)]
pub enum ProblemError {
    /// The parameter block could not be set or moved.
    #[error(transparent)]
    Manifold(#[from] ManifoldError),

    /// A factor failed to evaluate.
    #[error("factor {index}: {source}")]
    Factor {
        /// position of the factor in the problem
        index: usize,
        /// the evaluation failure
        #[source]
        source: FactorError,
    },

    /// A factor returned output of a different shape than it declares.
    #[error("factor {index} returned a {rows}x{cols} linearization, expected {expected_rows}x{expected_cols}")]
    Shape {
        /// position of the factor in the problem
        index: usize,
        /// rows returned
        rows: usize,
        /// Jacobian columns returned
        cols: usize,
        /// declared residual dimension
        expected_rows: usize,
        /// dimension of the parameter block
        expected_cols: usize,
    },
}

/// Gauss-Newton normal equations at one point.
#[derive(Debug, Clone)]
pub struct NormalEquations {
    /// `JᵀJ`, `dim × dim`.
    pub hessian: Mat<f64>,
    /// `Jᵀr`, `dim × 1`.
    pub gradient: Mat<f64>,
    /// `Σ ‖rᵢ‖²`.
    pub cost: f64,
}

/// Nonlinear least squares over one parameter block, `min Σ ‖rᵢ(x)‖²`.
///
/// Every factor sees the whole block, so the normal equations are a single
/// dense `dim × dim` system.
pub struct Problem {
    manifold: Manifold,
    values: Vec<f64>,
    factors: Vec<Box<dyn Factor>>,
}

impl Problem {
    /// A problem without factors, starting at `initial`.
    pub fn new(manifold: Manifold, initial: Vec<f64>) -> Result<Self, ProblemError> {
        manifold.check("initial values", &initial)?;
        Ok(Self {
            manifold,
            values: initial,
            factors: Vec::new(),
        })
    }

    /// Add a residual term.
    pub fn add_factor(&mut self, factor: Box<dyn Factor>) {
        self.factors.push(factor);
    }

    /// Space of the parameter block.
    pub fn manifold(&self) -> Manifold {
        self.manifold
    }

    /// Current estimate.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Replace the current estimate.
    pub fn set_values(&mut self, values: Vec<f64>) -> Result<(), ProblemError> {
        self.manifold.check("parameter block", &values)?;
        self.values = values;
        Ok(())
    }

    /// Number of factors.
    pub fn num_factors(&self) -> usize {
        self.factors.len()
    }

    /// Cost at the current estimate.
    pub fn cost(&self) -> Result<f64, ProblemError> {
        self.cost_at(&self.values)
    }

    /// Cost at `x`, leaving the estimate untouched.
    pub fn cost_at(&self, x: &[f64]) -> Result<f64, ProblemError> {
        self.manifold.check("parameter block", x)?;

        let mut cost = 0.0;
        for (index, factor) in self.factors.iter().enumerate() {
            let residual = factor
                .residual(x)
                .map_err(|source| ProblemError::Factor { index, source })?;
            if residual.len() != factor.residual_dim() {
                return Err(ProblemError::Shape {
                    index,
                    rows: residual.len(),
                    cols: self.manifold.dim(),
                    expected_rows: factor.residual_dim(),
                    expected_cols: self.manifold.dim(),
                });
            }
            cost += residual.iter().map(|r| r * r).sum::<f64>();
        }
        Ok(cost)
    }

    /// `JᵀJ`, `Jᵀr` and the cost at the current estimate.
    pub fn normal_equations(&self) -> Result<NormalEquations, ProblemError> {
        let n = self.manifold.dim();
        let mut hessian = Mat::<f64>::zeros(n, n);
        let mut gradient = Mat::<f64>::zeros(n, 1);
        let mut cost = 0.0;

        for (index, factor) in self.factors.iter().enumerate() {
            let lin = factor
                .linearize(&self.values)
                .map_err(|source| ProblemError::Factor { index, source })?;
            let (jac, r) = (&lin.jacobian, &lin.residual);

            let m = factor.residual_dim();
            if r.len() != m || jac.nrows() != m || jac.ncols() != n {
                return Err(ProblemError::Shape {
                    index,
                    rows: r.len().max(jac.nrows()),
                    cols: jac.ncols(),
                    expected_rows: m,
                    expected_cols: n,
                });
            }

            for i in 0..n {
                for j in i..n {
                    let acc: f64 = (0..m).map(|k| jac.read(k, i) * jac.read(k, j)).sum();
                    hessian.write(i, j, hessian.read(i, j) + acc);
                    if i != j {
                        hessian.write(j, i, hessian.read(j, i) + acc);
                    }
                }
                let acc: f64 = (0..m).map(|k| jac.read(k, i) * r[k]).sum();
                gradient.write(i, 0, gradient.read(i, 0) + acc);
            }
            cost += r.iter().map(|v| v * v).sum::<f64>();
        }

        Ok(NormalEquations {
            hessian,
            gradient,
            cost,
        })
    }
}

//! Iterative calibration as a star-shaped factor graph.
//!
//! The offset `X` between the two sensor frames is the only variable. Every
//! motion pair `(A, B)` contributes the residual
//!
//! ```text
//! r = log(A⁻¹ · X⁻¹ · B · X)
//! ```
//!
//! where `A` is the target motion and `B` the reference motion. The residual
//! vanishes when `B · X = X · A`.

use faer::Mat;
use glam::{DMat3, DVec3};
use sclam_lie::{se2::SE2, Pose2D};
use sclam_optim::{
    Factor, FactorError, FactorResult, LevenbergMarquardt, Linearization, Manifold, Problem,
    TerminationReason,
};

use crate::error::CalibError;
use crate::pairing::{all_motions_coincide, MotionPair};

/// Smallest accepted ratio between the extreme singular values of `JᵀΩJ`.
const INFORMATION_CONDITION_TOLERANCE: f64 = 1e-10;

/// Residual of one motion pair against the calibration offset.
#[derive(Debug, Clone)]
pub struct CalibrationFactor {
    target_motion: Pose2D,
    reference_motion: Pose2D,
    /// Upper triangular `Lᵀ` with `Ω = L Lᵀ`.
    sqrt_information: DMat3,
}

impl CalibrationFactor {
    /// Create a factor weighted by the information matrix `information`.
    ///
    /// Returns `None` if `information` is not symmetric positive definite.
    pub fn new(pair: &MotionPair, information: &DMat3) -> Option<Self> {
        Some(Self {
            target_motion: pair.target_motion,
            reference_motion: pair.reference_motion,
            sqrt_information: cholesky_upper(information)?,
        })
    }

    /// Unweighted residual at `offset`.
    pub fn unweighted_residual(&self, offset: &Pose2D) -> DVec3 {
        (self.target_motion.inverse() * offset.inverse() * self.reference_motion * *offset).log()
    }

    /// `X⁻¹ B X` and the unweighted residual at the stored offset `x`.
    fn evaluate(&self, x: &[f64]) -> FactorResult<(Pose2D, DVec3)> {
        let [ox, oy, otheta] = x[..] else {
            return Err(FactorError::WrongDimension {
                expected: 3,
                actual: x.len(),
            });
        };

        let offset = SE2::from_xytheta(ox, oy, otheta);
        let conjugated = offset.inverse() * self.reference_motion * offset;
        let error = (self.target_motion.inverse() * conjugated).log();

        if !error.is_finite() {
            return Err(FactorError::NonFinite(format!(
                "residual at offset [{ox}, {oy}, {otheta}]"
            )));
        }
        Ok((conjugated, error))
    }
}

impl Factor for CalibrationFactor {
    fn residual_dim(&self) -> usize {
        3
    }

    fn residual(&self, x: &[f64]) -> FactorResult<Vec<f64>> {
        let (_, error) = self.evaluate(x)?;
        Ok((self.sqrt_information * error).to_array().to_vec())
    }

    fn linearize(&self, x: &[f64]) -> FactorResult<Linearization> {
        let (conjugated, error) = self.evaluate(x)?;

        // X ⊞ δ: M = X⁻¹BX becomes M·exp((I - Ad(M⁻¹)) δ) to first order
        let d_conjugated = DMat3::IDENTITY - conjugated.inverse().adjoint();
        let jac = self.sqrt_information * SE2::right_jacobian(error).inverse() * d_conjugated;

        Ok(Linearization {
            residual: (self.sqrt_information * error).to_array().to_vec(),
            jacobian: Mat::from_fn(3, 3, |row, col| jac.col(col)[row]),
        })
    }
}

/// `Lᵀ` of the Cholesky factorization `m = L Lᵀ`, if `m` is symmetric positive definite.
fn cholesky_upper(m: &DMat3) -> Option<DMat3> {
    let a = |r: usize, c: usize| m.col(c)[r];
    let scale = m
        .to_cols_array()
        .iter()
        .fold(1.0_f64, |acc, v| acc.max(v.abs()));
    let tolerance = 1e-12 * scale;
    for r in 0..3 {
        for c in 0..r {
            if (a(r, c) - a(c, r)).abs() > tolerance {
                return None;
            }
        }
    }

    let mut l = [[0.0_f64; 3]; 3];
    for j in 0..3 {
        let diag = a(j, j) - (0..j).map(|k| l[j][k] * l[j][k]).sum::<f64>();
        if !(diag.is_finite() && diag > 0.0) {
            return None;
        }
        l[j][j] = diag.sqrt();
        for i in j + 1..3 {
            l[i][j] = (a(i, j) - (0..j).map(|k| l[i][k] * l[j][k]).sum::<f64>()) / l[j][j];
        }
    }

    // columns of Lᵀ are the rows of L
    Some(DMat3::from_cols(
        DVec3::from_array(l[0]),
        DVec3::from_array(l[1]),
        DVec3::from_array(l[2]),
    ))
}

/// Result of an iterative calibration.
#[derive(Debug, Clone)]
pub struct CalibrationEstimate {
    /// Offset such that `reference_motion · offset = offset · target_motion`.
    pub offset: Pose2D,
    /// Weighted sum of squared residuals at `offset`.
    pub final_cost: f64,
    /// Optimizer iterations.
    pub iterations: usize,
    /// Why the optimizer stopped.
    pub termination_reason: TerminationReason,
    /// Covariance `(JᵀΩJ)⁻¹` of the offset in its tangent space at the solution.
    pub covariance: DMat3,
}

#[derive(Debug, Clone)]
struct Constraint {
    pair: MotionPair,
    information: DMat3,
}

/// One calibration variable and one weighted residual per motion pair.
#[derive(Debug, Clone)]
pub struct CalibrationConstraintSet {
    constraints: Vec<Constraint>,
    seed: Pose2D,
}

impl CalibrationConstraintSet {
    /// Unit-weight constraints for `pairs`, seeded at `seed`.
    pub fn new(pairs: &[MotionPair], seed: Pose2D) -> Self {
        Self {
            constraints: pairs
                .iter()
                .map(|pair| Constraint {
                    pair: *pair,
                    information: DMat3::IDENTITY,
                })
                .collect(),
            seed,
        }
    }

    /// Replace the initial guess of the offset.
    pub fn with_seed(mut self, seed: Pose2D) -> Self {
        self.seed = seed;
        self
    }

    /// Override the information matrix of the constraint at `index`.
    pub fn with_information(mut self, index: usize, information: DMat3) -> Result<Self, CalibError> {
        let len = self.constraints.len();
        let constraint = self
            .constraints
            .get_mut(index)
            .ok_or(CalibError::ConstraintOutOfRange { index, len })?;
        if cholesky_upper(&information).is_none() {
            return Err(CalibError::InvalidInformation { index });
        }
        constraint.information = information;
        Ok(self)
    }

    /// Number of residuals.
    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Initial guess of the offset.
    pub fn seed(&self) -> Pose2D {
        self.seed
    }

    /// Weighted cost `Σ rᵢᵀ Ωᵢ rᵢ` at `offset`.
    pub fn total_cost(&self, offset: &Pose2D) -> Result<f64, CalibError> {
        let mut cost = 0.0;
        for factor in self.factors()? {
            let r = factor.sqrt_information * factor.unweighted_residual(offset);
            cost += r.length_squared();
        }
        Ok(cost)
    }

    fn factors(&self) -> Result<Vec<CalibrationFactor>, CalibError> {
        self.constraints
            .iter()
            .enumerate()
            .map(|(index, c)| {
                CalibrationFactor::new(&c.pair, &c.information)
                    .ok_or(CalibError::InvalidInformation { index })
            })
            .collect()
    }

    /// Build the factor graph handed to the optimizer.
    pub fn build_problem(&self) -> Result<Problem, CalibError> {
        let mut problem = Problem::new(Manifold::SE2, self.seed.to_vector().to_vec())?;

        for (index, factor) in self.factors()?.into_iter().enumerate() {
            log::debug!(
                "edge {index}: target {:?} reference {:?}",
                factor.target_motion.to_vector(),
                factor.reference_motion.to_vector()
            );
            problem.add_factor(Box::new(factor));
        }

        log::debug!(
            "calibration graph: 1 vertex, {} edges, seed {:?}",
            problem.num_factors(),
            self.seed.to_vector()
        );

        Ok(problem)
    }

    /// Refine the offset with Levenberg-Marquardt.
    ///
    /// Fails with [`CalibError::OptimizerDivergence`] when the optimizer breaks
    /// down or when the offset is not observable from the motions. The one
    /// exception is a pair sequence in which both sensors report identical
    /// motions: the identity is returned, with an unbounded covariance if the
    /// motions do not pin it down.
    pub fn solve(&self, max_iterations: usize) -> Result<CalibrationEstimate, CalibError> {
        let diverged = |e: &dyn std::fmt::Display| CalibError::OptimizerDivergence(e.to_string());

        let mut problem = self.build_problem()?;
        let optimizer = LevenbergMarquardt::with_max_iterations(max_iterations);
        let result = optimizer.optimize(&mut problem).map_err(|e| diverged(&e))?;

        match result.termination_reason {
            TerminationReason::LambdaMaxExceeded => {
                return Err(CalibError::OptimizerDivergence(format!(
                    "damping exceeded {} after {} iterations (cost {:.6e})",
                    optimizer.lambda_max, result.iterations, result.final_cost
                )));
            }
            TerminationReason::MaxIterations => {
                log::warn!(
                    "calibration stopped at the iteration limit ({max_iterations}), cost {:.6e}",
                    result.final_cost
                );
            }
            reason => log::info!(
                "calibration converged ({reason:?}) after {} iterations, cost {:.6e}",
                result.iterations,
                result.final_cost
            ),
        }

        if !result.final_cost.is_finite() {
            return Err(CalibError::OptimizerDivergence(
                "final cost is not finite".to_string(),
            ));
        }

        let offset = SE2::from_vector([
            problem.values()[0],
            problem.values()[1],
            problem.values()[2],
        ]);

        let information = problem.normal_equations().map_err(|e| diverged(&e))?.hessian;
        let singular_values = information.singular_values();
        let sigma_max = singular_values.iter().fold(0.0_f64, |acc, s| acc.max(*s));
        let sigma_min = singular_values
            .iter()
            .fold(f64::INFINITY, |acc, s| acc.min(*s));
        if sigma_max <= 0.0 || sigma_min / sigma_max < INFORMATION_CONDITION_TOLERANCE {
            let pairs: Vec<MotionPair> = self.constraints.iter().map(|c| c.pair).collect();
            if all_motions_coincide(&pairs) {
                log::warn!(
                    "both sensors report identical motions that do not constrain the offset, \
                     returning the identity"
                );
                return Ok(CalibrationEstimate {
                    offset: Pose2D::IDENTITY,
                    final_cost: self.total_cost(&Pose2D::IDENTITY)?,
                    iterations: result.iterations,
                    termination_reason: result.termination_reason,
                    covariance: DMat3::from_diagonal(DVec3::splat(f64::INFINITY)),
                });
            }
            return Err(CalibError::OptimizerDivergence(format!(
                "information matrix is singular (σmin {sigma_min:.3e}, σmax {sigma_max:.3e}), \
                 the offset is not observable from these motions"
            )));
        }

        let information = DMat3::from_cols_array(&[
            information.read(0, 0),
            information.read(1, 0),
            information.read(2, 0),
            information.read(0, 1),
            information.read(1, 1),
            information.read(2, 1),
            information.read(0, 2),
            information.read(1, 2),
            information.read(2, 2),
        ]);

        Ok(CalibrationEstimate {
            offset,
            final_cost: result.final_cost,
            iterations: result.iterations,
            termination_reason: result.termination_reason,
            covariance: information.inverse(),
        })
    }
}

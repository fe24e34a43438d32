//! Levenberg-Marquardt over a single dense parameter block.
//!
//! Each iteration solves the damped normal equations `(JᵀJ + λI) δ = -Jᵀr`,
//! evaluates the cost at `x ⊞ δ` and only commits the step when the cost does
//! not increase. Rejected steps raise `λ`, accepted ones lower it.

use faer::prelude::SpSolver;
use faer::Mat;
use thiserror::Error;

use crate::problem::{NormalEquations, Problem, ProblemError};

/// Errors that stop the optimizer before it reaches a termination criterion.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Evaluating the problem failed.
    #[error(transparent)]
    Problem(#[from] ProblemError),

    /// There is nothing to minimize.
    #[error("problem has no factors")]
    NoFactors,

    /// The cost at the starting point is NaN or infinite.
    #[error("initial cost is not finite ({0})")]
    NonFiniteCost(f64),

    /// The damped normal equations could not be solved.
    #[error("damped normal equations could not be solved: {0}")]
    SolveFailed(String),
}

/// Result of an optimization run.
#[derive(Debug, Clone)]
pub struct OptimizerResult {
    /// Cost at the returned estimate.
    pub final_cost: f64,
    /// Evaluated steps, accepted or not.
    pub iterations: usize,
    /// Why the optimizer stopped.
    pub termination_reason: TerminationReason,
}

impl OptimizerResult {
    /// Whether the run ended on one of the convergence criteria.
    pub fn converged(&self) -> bool {
        matches!(
            self.termination_reason,
            TerminationReason::CostConverged
                | TerminationReason::GradientConverged
                | TerminationReason::StepConverged
        )
    }
}

/// Reason why the optimizer terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Relative cost decrease below `cost_tolerance`.
    CostConverged,
    /// `‖Jᵀr‖` below `gradient_tolerance`.
    GradientConverged,
    /// The update step vanished.
    StepConverged,
    /// `max_iterations` steps were evaluated.
    MaxIterations,
    /// Damping grew past `lambda_max` without finding a descent step.
    LambdaMaxExceeded,
}

/// Levenberg-Marquardt optimizer configuration.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    /// Initial damping
    pub lambda_init: f64,
    /// Damping above which the run is abandoned
    pub lambda_max: f64,
    /// Damping multiplier on rejection, divisor on acceptance
    pub lambda_factor: f64,
    /// Maximum number of evaluated steps
    pub max_iterations: usize,
    /// Relative cost change threshold
    pub cost_tolerance: f64,
    /// Gradient norm threshold
    pub gradient_tolerance: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            lambda_init: 1e-3,
            lambda_max: 1e10,
            lambda_factor: 10.0,
            max_iterations: 50,
            cost_tolerance: 1e-10,
            gradient_tolerance: 1e-12,
        }
    }
}

impl LevenbergMarquardt {
    const STEP_TOLERANCE: f64 = 1e-14;
    const LAMBDA_MIN: f64 = 1e-12;

    /// Default settings with the given iteration cap.
    pub fn with_max_iterations(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..Default::default()
        }
    }

    /// Minimize the cost of `problem`, leaving the best estimate in it.
    pub fn optimize(&self, problem: &mut Problem) -> Result<OptimizerResult, OptimizerError> {
        if problem.num_factors() == 0 {
            return Err(OptimizerError::NoFactors);
        }

        let mut cost = problem.cost()?;
        if !cost.is_finite() {
            return Err(OptimizerError::NonFiniteCost(cost));
        }

        log::debug!(
            "LM start: {} factors over a {:?} block, cost {cost:.6e}",
            problem.num_factors(),
            problem.manifold()
        );

        let mut lambda = self.lambda_init;
        let mut iterations = 0;
        let finish = |reason: TerminationReason, cost: f64, iterations: usize| OptimizerResult {
            final_cost: cost,
            iterations,
            termination_reason: reason,
        };

        loop {
            if iterations >= self.max_iterations {
                log::debug!("LM hit the iteration cap ({iterations}), cost {cost:.6e}");
                return Ok(finish(TerminationReason::MaxIterations, cost, iterations));
            }

            let normal = problem.normal_equations()?;
            if normal.gradient.norm_l2() < self.gradient_tolerance {
                return Ok(finish(TerminationReason::GradientConverged, cost, iterations));
            }

            let step = Self::damped_step(&normal, lambda)?;
            if step.iter().map(|d| d * d).sum::<f64>().sqrt() < Self::STEP_TOLERANCE {
                return Ok(finish(TerminationReason::StepConverged, cost, iterations));
            }

            let candidate = problem
                .manifold()
                .retract(problem.values(), &step)
                .map_err(ProblemError::from)?;
            let new_cost = problem.cost_at(&candidate)?;
            iterations += 1;

            if new_cost.is_finite() && new_cost <= cost {
                let relative_decrease = if cost > 0.0 {
                    (cost - new_cost) / cost
                } else {
                    0.0
                };
                problem.set_values(candidate)?;
                cost = new_cost;
                lambda = (lambda / self.lambda_factor).max(Self::LAMBDA_MIN);

                log::debug!("LM iter {iterations}: accepted, cost {cost:.6e}, lambda {lambda:.1e}");

                if relative_decrease < self.cost_tolerance {
                    return Ok(finish(TerminationReason::CostConverged, cost, iterations));
                }
            } else {
                lambda *= self.lambda_factor;

                log::debug!(
                    "LM iter {iterations}: rejected, cost {new_cost:.6e}, lambda {lambda:.1e}"
                );

                if lambda > self.lambda_max {
                    return Ok(finish(TerminationReason::LambdaMaxExceeded, cost, iterations));
                }
            }
        }
    }

    /// Solve `(JᵀJ + λI) δ = -Jᵀr` with a Cholesky factorization.
    fn damped_step(normal: &NormalEquations, lambda: f64) -> Result<Vec<f64>, OptimizerError> {
        let n = normal.hessian.nrows();
        let damped = Mat::<f64>::from_fn(n, n, |i, j| {
            normal.hessian.read(i, j) + if i == j { lambda } else { 0.0 }
        });
        let rhs = Mat::<f64>::from_fn(n, 1, |i, _| -normal.gradient.read(i, 0));

        let llt = damped.cholesky(faer::Side::Lower).map_err(|_| {
            OptimizerError::SolveFailed("damped normal matrix is not positive definite".to_string())
        })?;
        let delta = llt.solve(rhs);

        let step: Vec<f64> = (0..n).map(|i| delta.read(i, 0)).collect();
        if step.iter().any(|d| !d.is_finite()) {
            return Err(OptimizerError::SolveFailed(
                "non-finite update step".to_string(),
            ));
        }
        Ok(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factor::{Factor, FactorResult, Linearization};
    use crate::manifold::Manifold;
    use approx::assert_relative_eq;

    /// r = x - target
    struct Prior(Vec<f64>);

    impl Factor for Prior {
        fn residual_dim(&self) -> usize {
            self.0.len()
        }

        fn residual(&self, x: &[f64]) -> FactorResult<Vec<f64>> {
            Ok(x.iter().zip(&self.0).map(|(a, b)| a - b).collect())
        }

        fn linearize(&self, x: &[f64]) -> FactorResult<Linearization> {
            let n = self.0.len();
            Ok(Linearization {
                residual: self.residual(x)?,
                jacobian: Mat::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 }),
            })
        }
    }

    /// Rosenbrock residuals r = [10 (y - x²), 1 - x].
    struct Rosenbrock;

    impl Factor for Rosenbrock {
        fn residual_dim(&self) -> usize {
            2
        }

        fn residual(&self, p: &[f64]) -> FactorResult<Vec<f64>> {
            Ok(vec![10.0 * (p[1] - p[0] * p[0]), 1.0 - p[0]])
        }

        fn linearize(&self, p: &[f64]) -> FactorResult<Linearization> {
            let rows = [[-20.0 * p[0], 10.0], [-1.0, 0.0]];
            Ok(Linearization {
                residual: self.residual(p)?,
                jacobian: Mat::from_fn(2, 2, |i, j| rows[i][j]),
            })
        }
    }

    fn rosenbrock_problem() -> Problem {
        let mut problem = Problem::new(Manifold::Euclidean(2), vec![-1.2, 1.0]).unwrap();
        problem.add_factor(Box::new(Rosenbrock));
        problem
    }

    #[test]
    fn test_linear_problem_converges() {
        let mut problem = Problem::new(Manifold::Euclidean(3), vec![0.0; 3]).unwrap();
        problem.add_factor(Box::new(Prior(vec![1.0, 2.0, 3.0])));
        problem.add_factor(Box::new(Prior(vec![3.0, 2.0, 1.0])));

        let result = LevenbergMarquardt::default().optimize(&mut problem).unwrap();
        assert!(result.converged(), "{:?}", result.termination_reason);
        assert!(result.iterations > 0);

        // the mean of the two priors
        for v in problem.values() {
            assert_relative_eq!(*v, 2.0, epsilon = 1e-6);
        }
        assert_relative_eq!(result.final_cost, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rosenbrock_converges() {
        let mut problem = rosenbrock_problem();
        let optimizer = LevenbergMarquardt {
            max_iterations: 200,
            ..Default::default()
        };
        let result = optimizer.optimize(&mut problem).unwrap();
        assert!(result.converged(), "{:?}", result.termination_reason);

        let p = problem.values();
        assert_relative_eq!(p[0], 1.0, epsilon = 1e-4);
        assert_relative_eq!(p[1], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_max_iterations_is_reported() {
        let mut problem = rosenbrock_problem();
        let result = LevenbergMarquardt::with_max_iterations(1)
            .optimize(&mut problem)
            .unwrap();
        assert_eq!(result.termination_reason, TerminationReason::MaxIterations);
        assert_eq!(result.iterations, 1);
        assert!(!result.converged());
    }

    #[test]
    fn test_rejected_steps_keep_the_estimate() {
        // whatever happens to the first steps, the reported cost is the cost of the estimate
        let mut problem = rosenbrock_problem();
        let start = problem.cost().unwrap();
        let result = LevenbergMarquardt::with_max_iterations(3)
            .optimize(&mut problem)
            .unwrap();
        assert!(result.final_cost <= start);
        assert_eq!(result.final_cost, problem.cost().unwrap());
    }

    #[test]
    fn test_exact_start_converges_immediately() {
        let mut problem = Problem::new(Manifold::Euclidean(2), vec![1.0, 2.0]).unwrap();
        problem.add_factor(Box::new(Prior(vec![1.0, 2.0])));
        let result = LevenbergMarquardt::default().optimize(&mut problem).unwrap();
        assert_eq!(result.termination_reason, TerminationReason::GradientConverged);
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn test_empty_problem_fails() {
        let mut problem = Problem::new(Manifold::Euclidean(1), vec![0.0]).unwrap();
        assert!(matches!(
            LevenbergMarquardt::default().optimize(&mut problem),
            Err(OptimizerError::NoFactors)
        ));
    }

    #[test]
    fn test_non_finite_start_fails() {
        let mut problem = Problem::new(Manifold::Euclidean(1), vec![f64::NAN]).unwrap();
        problem.add_factor(Box::new(Prior(vec![0.0])));
        assert!(matches!(
            LevenbergMarquardt::default().optimize(&mut problem),
            Err(OptimizerError::NonFiniteCost(_))
        ));
    }
}

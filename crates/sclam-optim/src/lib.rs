#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! A [`Problem`] holds one parameter block living on a [`Manifold`] and any
//! number of [`Factor`]s, each a residual over the whole block. The
//! [`LevenbergMarquardt`] optimizer minimizes the sum of squared residuals,
//! moving the block through its manifold retraction.
//!
//! ## Example
//!
//! ```rust
//! use faer::Mat;
//! use sclam_optim::{Factor, FactorResult, LevenbergMarquardt, Linearization, Manifold, Problem};
//!
//! /// r = x - 3
//! struct Three;
//!
//! impl Factor for Three {
//!     fn residual_dim(&self) -> usize {
//!         1
//!     }
//!
//!     fn residual(&self, x: &[f64]) -> FactorResult<Vec<f64>> {
//!         Ok(vec![x[0] - 3.0])
//!     }
//!
//!     fn linearize(&self, x: &[f64]) -> FactorResult<Linearization> {
//!         Ok(Linearization {
//!             residual: self.residual(x)?,
//!             jacobian: Mat::from_fn(1, 1, |_, _| 1.0),
//!         })
//!     }
//! }
//!
//! let mut problem = Problem::new(Manifold::Euclidean(1), vec![0.0])?;
//! problem.add_factor(Box::new(Three));
//!
//! let result = LevenbergMarquardt::default().optimize(&mut problem)?;
//! assert!(result.final_cost < 1e-9);
//! assert!((problem.values()[0] - 3.0).abs() < 1e-6);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod factor;
mod levenberg_marquardt;
mod manifold;
mod problem;

pub use factor::{Factor, FactorError, FactorResult, Linearization};
pub use levenberg_marquardt::{
    LevenbergMarquardt, OptimizerError, OptimizerResult, TerminationReason,
};
pub use manifold::{Manifold, ManifoldError};
pub use problem::{NormalEquations, Problem, ProblemError};

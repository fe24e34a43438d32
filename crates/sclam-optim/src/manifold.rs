use glam::DVec3;
use sclam_lie::se2::SE2;
use thiserror::Error;

/// Errors raised when moving a parameter block.
#[derive(Debug, Error, PartialEq)]
pub enum ManifoldError {
    /// A parameter or update vector does not match the manifold dimension.
    #[error("{what} has {actual} entries, {expected} expected")]
    WrongSize {
        /// which vector was rejected
        what: &'static str,
        /// manifold dimension
        expected: usize,
        /// length of the vector
        actual: usize,
    },
}

/// The space a parameter block lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Manifold {
    /// `ℝⁿ`, updated by addition.
    Euclidean(usize),
    /// A planar pose stored as `[x, y, θ]`, updated on the right: `X ⊞ δ = X · exp(δ)`.
    SE2,
}

impl Manifold {
    /// Degrees of freedom. Stored values and updates both have this length.
    pub fn dim(&self) -> usize {
        match self {
            Manifold::Euclidean(n) => *n,
            Manifold::SE2 => 3,
        }
    }

    /// `x ⊞ delta`.
    pub fn retract(&self, x: &[f64], delta: &[f64]) -> Result<Vec<f64>, ManifoldError> {
        self.check("parameter block", x)?;
        self.check("update", delta)?;

        Ok(match self {
            Manifold::Euclidean(_) => x.iter().zip(delta).map(|(a, b)| a + b).collect(),
            Manifold::SE2 => SE2::from_vector([x[0], x[1], x[2]])
                .rplus(DVec3::new(delta[0], delta[1], delta[2]))
                .to_vector()
                .to_vec(),
        })
    }

    pub(crate) fn check(&self, what: &'static str, v: &[f64]) -> Result<(), ManifoldError> {
        if v.len() == self.dim() {
            Ok(())
        } else {
            Err(ManifoldError::WrongSize {
                what,
                expected: self.dim(),
                actual: v.len(),
            })
        }
    }
}

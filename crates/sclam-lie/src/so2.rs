use glam::{DMat2, DVec2};
use rand::Rng;
use std::f64::consts::TAU;

/// A planar rotation stored as the unit complex number `[cos θ, sin θ]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SO2 {
    /// representing complex number [real, imaginary]
    pub z: DVec2,
}

impl SO2 {
    /// The identity rotation.
    pub const IDENTITY: Self = Self {
        z: DVec2::new(1.0, 0.0),
    };

    /// Create a rotation from a complex number. The input is expected to have unit norm.
    pub fn new(z: DVec2) -> Self {
        Self { z }
    }

    /// Create a rotation from the first column of a 2x2 rotation matrix.
    pub fn from_matrix(mat: DMat2) -> Self {
        Self {
            z: DVec2::new(mat.x_axis.x, mat.x_axis.y),
        }
    }

    /// Sample a rotation with a uniformly distributed angle.
    pub fn from_random() -> Self {
        let mut rng = rand::rng();
        let theta: f64 = rng.random_range(0.0..TAU);
        Self::exp(theta)
    }

    /// The 2x2 rotation matrix.
    pub fn matrix(&self) -> DMat2 {
        DMat2::from_cols_array(&[self.z.x, self.z.y, -self.z.y, self.z.x])
    }

    /// inverting the complex number z, assumes unit norm
    pub fn inverse(&self) -> Self {
        Self {
            z: DVec2::new(self.z.x, -self.z.y),
        }
    }

    /// Re-project onto the unit circle to remove accumulated drift.
    pub fn normalize(&self) -> Self {
        let norm = self.z.length();
        if norm > 0.0 {
            Self { z: self.z / norm }
        } else {
            Self::IDENTITY
        }
    }

    /// Exponential map from an angle in radians.
    pub fn exp(theta: f64) -> Self {
        Self {
            z: DVec2::new(theta.cos(), theta.sin()),
        }
    }

    /// Logarithm map, the rotation angle in `(-π, π]`.
    pub fn log(&self) -> f64 {
        self.z.y.atan2(self.z.x)
    }

    /// Skew-symmetric generator for the angle `theta`.
    pub fn hat(theta: f64) -> DMat2 {
        DMat2::from_cols_array(&[0.0, theta, -theta, 0.0])
    }

    /// Recover the angle from a skew-symmetric generator.
    pub fn vee(omega: DMat2) -> f64 {
        omega.x_axis.y
    }
}

impl std::ops::Mul<SO2> for SO2 {
    type Output = SO2;

    fn mul(self, rhs: SO2) -> SO2 {
        let a = self.z;
        let b = rhs.z;
        SO2::new(DVec2::new(a.x * b.x - a.y * b.y, a.x * b.y + a.y * b.x))
    }
}

impl std::ops::Mul<DVec2> for SO2 {
    type Output = DVec2;

    fn mul(self, rhs: DVec2) -> DVec2 {
        DVec2::new(
            self.z.x * rhs.x - self.z.y * rhs.y,
            self.z.y * rhs.x + self.z.x * rhs.y,
        )
    }
}

use crate::so2::SO2;
use glam::{DMat2, DMat3, DVec2, DVec3};
use rand::Rng;

const SMALL_ANGLE_EPSILON: f64 = 1.0e-8;

/// Below this angle `(θ - sin θ) / θ²` comes from its Taylor series.
const JACOBIAN_SERIES_THRESHOLD: f64 = 1.0e-3;

/// A planar rigid transformation, `p' = R p + t`.
///
/// Used both for absolute poses and for the relative motion between two poses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SE2 {
    /// Rotation part.
    pub r: SO2,
    /// Translation part.
    pub t: DVec2,
}

impl Default for SE2 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl SE2 {
    /// The identity transformation.
    pub const IDENTITY: Self = Self {
        r: SO2::IDENTITY,
        t: DVec2::ZERO,
    };

    /// Create a transformation from its rotation and translation.
    pub fn new(r: SO2, t: DVec2) -> Self {
        Self { r, t }
    }

    /// Create a transformation from `x`, `y` and heading `theta` in radians.
    pub fn from_xytheta(x: f64, y: f64, theta: f64) -> Self {
        Self {
            r: SO2::exp(theta),
            t: DVec2::new(x, y),
        }
    }

    /// Create a transformation from the `[x, y, theta]` vector form.
    pub fn from_vector(v: [f64; 3]) -> Self {
        Self::from_xytheta(v[0], v[1], v[2])
    }

    /// The `[x, y, theta]` vector form with `theta` in `(-π, π]`.
    pub fn to_vector(&self) -> [f64; 3] {
        [self.t.x, self.t.y, self.r.log()]
    }

    /// Create a transformation from a 3x3 homogeneous matrix.
    pub fn from_matrix(mat: &DMat3) -> Self {
        Self {
            r: SO2::new(DVec2::new(mat.x_axis.x, mat.x_axis.y)),
            t: DVec2::new(mat.z_axis.x, mat.z_axis.y),
        }
    }

    /// Sample a transformation with a uniform heading and a translation in `[0, 1)²`.
    pub fn from_random() -> Self {
        let mut rng = rand::rng();

        let r1: f64 = rng.random();
        let r2: f64 = rng.random();

        Self {
            r: SO2::from_random(),
            t: DVec2::new(r1, r2),
        }
    }

    /// Heading angle in radians, in `(-π, π]`.
    #[inline]
    pub fn theta(&self) -> f64 {
        self.r.log()
    }

    /// The 3x3 homogeneous matrix.
    pub fn matrix(&self) -> DMat3 {
        let r = self.r.matrix();
        DMat3::from_cols_array(&[
            r.x_axis.x, r.x_axis.y, 0.0, //
            r.y_axis.x, r.y_axis.y, 0.0, //
            self.t.x, self.t.y, 1.0, //
        ])
    }

    /// The inverse transformation.
    pub fn inverse(&self) -> Self {
        let r_inv = self.r.inverse();
        Self {
            r: r_inv,
            t: r_inv * (-self.t),
        }
    }

    /// Right perturbation, `self * exp(tau)`.
    #[inline]
    pub fn rplus(&self, tau: DVec3) -> Self {
        *self * SE2::exp(tau)
    }

    /// Tangent vector taking `self` to `other`, `log(self⁻¹ * other)`.
    #[inline]
    pub fn rminus(&self, other: &Self) -> DVec3 {
        (self.inverse() * *other).log()
    }

    /// (sin θ / θ, (1 - cos θ) / θ) with a series expansion near zero.
    ///
    /// `1 - cos θ` is evaluated as `2 sin²(θ/2)` to keep its digits at small angles.
    #[inline]
    fn v_coefficients(theta: f64) -> (f64, f64) {
        if theta.abs() < SMALL_ANGLE_EPSILON {
            (1.0 - theta * theta / 6.0, theta / 2.0)
        } else {
            let half_sin = (0.5 * theta).sin();
            (theta.sin() / theta, 2.0 * half_sin * half_sin / theta)
        }
    }

    /// ((θ - sin θ) / θ², (1 - cos θ) / θ²), the coefficients of the right
    /// Jacobian's translation column.
    #[inline]
    fn jacobian_coefficients(theta: f64) -> (f64, f64) {
        let theta2 = theta * theta;
        // θ - sin θ cancels catastrophically well before 1 - cos θ does
        let p = if theta.abs() < JACOBIAN_SERIES_THRESHOLD {
            theta / 6.0 * (1.0 - theta2 / 20.0 * (1.0 - theta2 / 42.0))
        } else {
            (theta - theta.sin()) / theta2
        };
        let q = if theta.abs() < SMALL_ANGLE_EPSILON {
            0.5 - theta2 / 24.0
        } else {
            let half_sin = (0.5 * theta).sin();
            2.0 * half_sin * half_sin / theta2
        };
        (p, q)
    }

    /// Exponential map from the tangent vector `[υx, υy, θ]`.
    pub fn exp(v: DVec3) -> Self {
        let theta = v.z;
        let (a, b) = Self::v_coefficients(theta);
        Self {
            r: SO2::exp(theta),
            t: DVec2::new(a * v.x - b * v.y, b * v.x + a * v.y),
        }
    }

    /// Logarithm map to the tangent vector `[υx, υy, θ]`.
    pub fn log(&self) -> DVec3 {
        let theta = self.r.log();
        let (a, b) = Self::v_coefficients(theta);
        let denom = a * a + b * b; // det(V)

        // V⁻¹ = 1/det(V) * [[ a,  b],[-b,  a]]
        let v_inv = DMat2::from_cols_array(&[a / denom, -b / denom, b / denom, a / denom]);
        let upsilon = v_inv * self.t;

        DVec3::new(upsilon.x, upsilon.y, theta)
    }

    /// 3x3 adjoint, mapping tangent vectors at the identity through this transformation.
    pub fn adjoint(&self) -> DMat3 {
        let mut mat = self.matrix();
        mat.z_axis.x = self.t.y; // matrix[0, 2] = t.y
        mat.z_axis.y = -self.t.x; // matrix[1, 2] = -t.x
        mat
    }

    /// Right Jacobian of the exponential map at `tau`.
    ///
    /// `exp(tau + d) ≈ exp(tau) * exp(J_r(tau) d)` for small `d`.
    pub fn right_jacobian(tau: DVec3) -> DMat3 {
        let (rho1, rho2, theta) = (tau.x, tau.y, tau.z);
        let (a, b) = Self::v_coefficients(theta);

        let (p, q) = Self::jacobian_coefficients(theta);
        let (c1, c2) = (p * rho1 - q * rho2, q * rho1 + p * rho2);

        DMat3::from_cols(
            DVec3::new(a, -b, 0.0),
            DVec3::new(b, a, 0.0),
            DVec3::new(c1, c2, 1.0),
        )
    }
}

impl std::ops::Mul<SE2> for SE2 {
    type Output = SE2;

    fn mul(self, other: SE2) -> SE2 {
        SE2::new((self.r * other.r).normalize(), self.r * other.t + self.t)
    }
}

impl std::ops::Mul<DVec2> for SE2 {
    type Output = DVec2;

    fn mul(self, rhs: DVec2) -> Self::Output {
        self.r * rhs + self.t
    }
}

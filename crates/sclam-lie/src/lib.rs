#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Sclam Lie Groups
//!
//! Planar rotations and rigid transformations used to describe robot poses and
//! the relative motions between them.
//!
//! ## Supported Groups
//!
//! - **SO(2)**: 2D rotation group
//! - **SE(2)**: 2D rigid body transformations (rotation + translation)
//!
//! ## Example
//!
//! ```rust
//! use sclam_lie::se2::SE2;
//!
//! let pose_a = SE2::from_xytheta(1.0, 0.0, 0.0);
//! let pose_b = SE2::from_xytheta(2.0, 1.0, std::f64::consts::FRAC_PI_2);
//!
//! // relative motion from a to b, expressed in the frame of a
//! let motion = pose_a.inverse() * pose_b;
//! let [x, y, theta] = motion.to_vector();
//! assert!((x - 1.0).abs() < 1e-12 && (y - 1.0).abs() < 1e-12);
//! assert!((theta - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
//! ```

/// Special Euclidean group SE(2) for 2D rigid transformations.
pub mod se2;

/// Special Orthogonal group SO(2) for 2D rotations.
pub mod so2;

/// A planar pose or relative motion.
pub type Pose2D = se2::SE2;

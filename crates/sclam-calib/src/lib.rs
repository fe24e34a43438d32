#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! Two sensors ride on the same robot: wheel odometry (the reference) and a
//! stereo visual odometry pipeline (the target). Both report the motion of
//! their own frame. This crate estimates the planar offset between the two
//! frames from their timestamped pose logs.
//!
//! 1. [`MotionPairer`] matches every consecutive pair of target poses with the
//!    nearest reference poses and yields one [`MotionPair`] per interval.
//! 2. [`CalibrationConstraintSet`] refines the offset with Levenberg-Marquardt.
//! 3. [`ClosedFormSolver`] solves the same pairs algebraically.
//!
//! ## Example
//!
//! ```rust
//! use sclam_calib::{CalibrationConstraintSet, ClosedFormSolver, MotionPair};
//! use sclam_lie::Pose2D;
//!
//! let offset = Pose2D::from_xytheta(0.3, -0.1, 0.05);
//! let pairs: Vec<MotionPair> = [(0.5, 0.0, 0.3), (0.4, 0.1, -0.2), (0.6, 0.0, 0.5)]
//!     .iter()
//!     .map(|&(x, y, theta)| {
//!         let reference_motion = Pose2D::from_xytheta(x, y, theta);
//!         MotionPair {
//!             target_motion: offset.inverse() * reference_motion * offset,
//!             reference_motion,
//!             dt: 0.1,
//!         }
//!     })
//!     .collect();
//!
//! let estimate = CalibrationConstraintSet::new(&pairs, Pose2D::IDENTITY).solve(20)?;
//! let closed_form = ClosedFormSolver::default().calibrate(&pairs)?;
//! assert!((estimate.offset.t - closed_form.t).length() < 1e-6);
//! # Ok::<(), sclam_calib::CalibError>(())
//! ```

/// Algebraic calibration and comparison of estimates.
pub mod closed_form;

/// Parameter file.
pub mod config;

/// Iterative calibration on top of the factor graph optimizer.
pub mod constraint;

mod error;

/// Readers for odometry, timestamp and camera trajectory logs.
pub mod io;

/// Association of two asynchronous pose streams.
pub mod pairing;

/// End to end calibration run.
pub mod pipeline;

/// Timestamp ordered pose storage.
pub mod stream;

/// Stereo visual odometry engine interface.
pub mod vo;

pub use closed_form::{compare, ClosedFormSolver, MethodAgreement};
pub use config::{CalibrationConfig, ConfigError};
pub use constraint::{CalibrationConstraintSet, CalibrationEstimate, CalibrationFactor};
pub use error::CalibError;
pub use io::ReadError;
pub use pairing::{MotionPair, MotionPairer, PairingStats};
pub use pipeline::{CalibrationReport, Pipeline};
pub use stream::{StreamError, TimedSample, TimestampedPoseStream};
pub use vo::{StereoOdometry, VoOutput};

use faer::prelude::SpSolverLstsq;
use faer::Mat;
use glam::{DMat2, DVec2};
use sclam_lie::{so2::SO2, Pose2D};

use crate::constraint::CalibrationEstimate;
use crate::error::CalibError;
use crate::pairing::{all_motions_coincide, MotionPair};

/// Motions closer than this to the identity carry no information.
const IDENTITY_MOTION_EPSILON: f64 = 1e-12;

/// Algebraic calibration from motion pairs, rotation first then translation.
///
/// Every pair satisfies `B · X = X · A` for the reference motion `B`, target
/// motion `A` and offset `X`. Its translational part
///
/// ```text
/// (R_B - I) t - R(φ) t_A + t_B = 0
/// ```
///
/// is linear in `[tx, ty, cos φ, sin φ]`. The heading is read from the least
/// squares solution of the stacked system, then the translation is solved again
/// with the heading fixed.
#[derive(Debug, Clone)]
pub struct ClosedFormSolver {
    /// Smallest accepted ratio between the extreme singular values of a system.
    pub condition_tolerance: f64,
}

impl Default for ClosedFormSolver {
    fn default() -> Self {
        Self {
            condition_tolerance: 1e-8,
        }
    }
}

impl ClosedFormSolver {
    /// Estimate the offset from `pairs`.
    ///
    /// When both sensors report identical motions the identity is returned,
    /// even if too few pairs are available to constrain it.
    pub fn calibrate(&self, pairs: &[MotionPair]) -> Result<Pose2D, CalibError> {
        match self.solve(pairs) {
            Err(CalibError::DegenerateMotionSet(reason)) if all_motions_coincide(pairs) => {
                log::warn!("closed form: {reason}, motions are identical, returning the identity");
                Ok(Pose2D::IDENTITY)
            }
            result => result,
        }
    }

    fn solve(&self, pairs: &[MotionPair]) -> Result<Pose2D, CalibError> {
        let usable: Vec<&MotionPair> = pairs
            .iter()
            .filter(|p| !is_identity(&p.target_motion) || !is_identity(&p.reference_motion))
            .collect();

        if usable.len() < 2 {
            return Err(CalibError::DegenerateMotionSet(format!(
                "{} usable motion pairs, at least 2 are needed",
                usable.len()
            )));
        }

        let heading = self.solve_heading(&usable)?;
        let translation = self.solve_translation(&usable, heading)?;

        log::info!(
            "closed form offset: [{:.6}, {:.6}, {:.6}] from {} pairs",
            translation.x,
            translation.y,
            heading.log(),
            usable.len()
        );

        Ok(Pose2D::new(heading, translation))
    }

    fn solve_heading(&self, pairs: &[&MotionPair]) -> Result<SO2, CalibError> {
        let n = pairs.len();
        let mut mat_a = Mat::<f64>::zeros(2 * n, 4);
        let mut mat_b = Mat::<f64>::zeros(2 * n, 1);

        for (i, pair) in pairs.iter().enumerate() {
            let r_ref = pair.reference_motion.r.matrix() - DMat2::IDENTITY;
            let t_ref = pair.reference_motion.t;
            let t_tgt = pair.target_motion.t;

            // R(φ) t_A = [c tx - s ty, s tx + c ty]
            let rows = [
                [r_ref.x_axis.x, r_ref.y_axis.x, -t_tgt.x, t_tgt.y, -t_ref.x],
                [r_ref.x_axis.y, r_ref.y_axis.y, -t_tgt.y, -t_tgt.x, -t_ref.y],
            ];
            for (k, row) in rows.iter().enumerate() {
                for (j, value) in row[..4].iter().enumerate() {
                    mat_a.write(2 * i + k, j, *value);
                }
                mat_b.write(2 * i + k, 0, row[4]);
            }
        }

        self.check_conditioning(&mat_a, "rotation")?;

        let u = mat_a.qr().solve_lstsq(mat_b);
        let (cos, sin) = (u.read(2, 0), u.read(3, 0));
        let norm = cos.hypot(sin);
        if !(norm.is_finite() && norm > IDENTITY_MOTION_EPSILON) {
            return Err(CalibError::DegenerateMotionSet(format!(
                "rotation stage produced a vanishing direction (|(cos, sin)| = {norm:.3e})"
            )));
        }

        log::debug!("closed form rotation stage: |(cos, sin)| = {norm:.6}");

        Ok(SO2::new(DVec2::new(cos / norm, sin / norm)))
    }

    fn solve_translation(&self, pairs: &[&MotionPair], heading: SO2) -> Result<DVec2, CalibError> {
        let n = pairs.len();
        let mut mat_a = Mat::<f64>::zeros(2 * n, 2);
        let mut mat_b = Mat::<f64>::zeros(2 * n, 1);

        for (i, pair) in pairs.iter().enumerate() {
            let r_ref = pair.reference_motion.r.matrix() - DMat2::IDENTITY;
            let rhs = heading * pair.target_motion.t - pair.reference_motion.t;

            mat_a.write(2 * i, 0, r_ref.x_axis.x);
            mat_a.write(2 * i, 1, r_ref.y_axis.x);
            mat_a.write(2 * i + 1, 0, r_ref.x_axis.y);
            mat_a.write(2 * i + 1, 1, r_ref.y_axis.y);
            mat_b.write(2 * i, 0, rhs.x);
            mat_b.write(2 * i + 1, 0, rhs.y);
        }

        self.check_conditioning(&mat_a, "translation")?;

        let t = mat_a.qr().solve_lstsq(mat_b);
        Ok(DVec2::new(t.read(0, 0), t.read(1, 0)))
    }

    fn check_conditioning(&self, mat: &Mat<f64>, stage: &str) -> Result<(), CalibError> {
        let singular_values = mat.singular_values();
        let sigma_max = singular_values.iter().fold(0.0_f64, |acc, s| acc.max(*s));
        let sigma_min = singular_values
            .iter()
            .fold(f64::INFINITY, |acc, s| acc.min(*s));

        if sigma_max <= 0.0 || sigma_min / sigma_max < self.condition_tolerance {
            return Err(CalibError::DegenerateMotionSet(format!(
                "{stage} stage is ill conditioned (σmin {sigma_min:.3e}, σmax {sigma_max:.3e})"
            )));
        }
        Ok(())
    }
}

fn is_identity(motion: &Pose2D) -> bool {
    motion.t.length() < IDENTITY_MOTION_EPSILON && motion.theta().abs() < IDENTITY_MOTION_EPSILON
}

/// Gap between two offset estimates of the same pair sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MethodAgreement {
    /// Euclidean distance between the two translations.
    pub translation_gap: f64,
    /// Absolute heading difference, wrapped to `[0, π]`.
    pub heading_gap: f64,
}

impl MethodAgreement {
    /// Whether both gaps are within `tolerance`.
    pub fn within(&self, tolerance: f64) -> bool {
        self.translation_gap <= tolerance && self.heading_gap <= tolerance
    }
}

/// Compare the iterative and the closed form estimates.
pub fn compare(iterative: &CalibrationEstimate, closed_form: &Pose2D) -> MethodAgreement {
    let delta = iterative.offset.inverse() * *closed_form;
    MethodAgreement {
        translation_gap: (iterative.offset.t - closed_form.t).length(),
        heading_gap: delta.theta().abs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pairs_for(offset: &Pose2D, motions: &[(f64, f64, f64)]) -> Vec<MotionPair> {
        motions
            .iter()
            .map(|&(x, y, theta)| {
                let reference_motion = Pose2D::from_xytheta(x, y, theta);
                MotionPair {
                    target_motion: offset.inverse() * reference_motion * *offset,
                    reference_motion,
                    dt: 0.1,
                }
            })
            .collect()
    }

    #[test]
    fn test_recovers_known_offset() {
        let truth = Pose2D::from_xytheta(0.3, -0.1, 0.05);
        let pairs = pairs_for(&truth, &[(0.5, 0.0, 0.3), (0.4, 0.1, -0.2), (0.2, 0.3, 0.6)]);

        let estimate = ClosedFormSolver::default().calibrate(&pairs).unwrap();
        let [x, y, theta] = estimate.to_vector();
        assert_relative_eq!(x, 0.3, epsilon = 1e-9);
        assert_relative_eq!(y, -0.1, epsilon = 1e-9);
        assert_relative_eq!(theta, 0.05, epsilon = 1e-9);
    }

    #[test]
    fn test_large_heading_offset() {
        let truth = Pose2D::from_xytheta(-0.7, 1.2, 2.8);
        let pairs = pairs_for(&truth, &[(1.0, 0.0, 0.4), (0.8, -0.2, -0.5), (0.6, 0.1, 0.9)]);

        let estimate = ClosedFormSolver::default().calibrate(&pairs).unwrap();
        let [x, y, theta] = estimate.to_vector();
        assert_relative_eq!(x, -0.7, epsilon = 1e-9);
        assert_relative_eq!(y, 1.2, epsilon = 1e-9);
        assert_relative_eq!(theta, 2.8, epsilon = 1e-9);
    }

    #[test]
    fn test_pure_translation_is_degenerate() {
        let truth = Pose2D::from_xytheta(0.3, -0.1, 0.05);
        let pairs = pairs_for(&truth, &[(0.5, 0.0, 0.0), (0.4, 0.1, 0.0), (0.2, 0.3, 0.0)]);
        assert!(matches!(
            ClosedFormSolver::default().calibrate(&pairs),
            Err(CalibError::DegenerateMotionSet(_))
        ));
    }

    #[test]
    fn test_too_few_pairs() {
        let truth = Pose2D::from_xytheta(0.3, -0.1, 0.05);
        let mut pairs = pairs_for(&truth, &[(0.5, 0.0, 0.3)]);
        // identity motions are not usable
        pairs.extend(pairs_for(&truth, &[(0.0, 0.0, 0.0), (0.0, 0.0, 0.0)]));
        assert!(matches!(
            ClosedFormSolver::default().calibrate(&pairs),
            Err(CalibError::DegenerateMotionSet(_))
        ));
        assert!(ClosedFormSolver::default().calibrate(&[]).is_err());
    }

    #[test]
    fn test_identical_motions_give_identity() {
        let solver = ClosedFormSolver::default();

        // one pair is too few to solve, but the motions already agree
        let single = pairs_for(&Pose2D::IDENTITY, &[(0.4, 0.05, 0.3)]);
        assert_eq!(solver.calibrate(&single).unwrap(), Pose2D::IDENTITY);

        let straight = pairs_for(&Pose2D::IDENTITY, &[(0.5, 0.0, 0.0), (0.4, 0.1, 0.0)]);
        assert_eq!(solver.calibrate(&straight).unwrap(), Pose2D::IDENTITY);

        let rotating = pairs_for(&Pose2D::IDENTITY, &[(0.5, 0.0, 0.3), (0.4, 0.1, -0.2)]);
        let [x, y, theta] = solver.calibrate(&rotating).unwrap().to_vector();
        assert_relative_eq!(x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(theta, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_method_agreement() {
        let iterative = CalibrationEstimate {
            offset: Pose2D::from_xytheta(1.0, 0.0, 3.1),
            final_cost: 0.0,
            iterations: 1,
            termination_reason: sclam_optim::TerminationReason::CostConverged,
            covariance: glam::DMat3::IDENTITY,
        };
        let closed_form = Pose2D::from_xytheta(1.0, 0.02, -3.1);

        let agreement = compare(&iterative, &closed_form);
        assert_relative_eq!(agreement.translation_gap, 0.02, epsilon = 1e-12);
        // headings on both sides of ±π are close
        assert_relative_eq!(
            agreement.heading_gap,
            2.0 * std::f64::consts::PI - 6.2,
            epsilon = 1e-9
        );
        assert!(agreement.within(0.1));
        assert!(!agreement.within(0.01));
    }
}

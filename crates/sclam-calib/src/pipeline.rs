use sclam_lie::Pose2D;

use crate::closed_form::{compare, ClosedFormSolver, MethodAgreement};
use crate::config::CalibrationConfig;
use crate::constraint::{CalibrationConstraintSet, CalibrationEstimate};
use crate::error::CalibError;
use crate::io;
use crate::pairing::{MotionPairer, PairingStats};
use crate::stream::TimestampedPoseStream;
use crate::vo::StereoOdometry;

/// Everything a calibration run produced.
///
/// A failing closed form solve does not discard the iterative estimate: its
/// error is kept in `closed_form` instead.
#[derive(Debug)]
pub struct CalibrationReport {
    /// Levenberg-Marquardt estimate.
    pub iterative: CalibrationEstimate,
    /// Closed form estimate or its failure, when requested.
    pub closed_form: Option<Result<Pose2D, CalibError>>,
    /// Gap between the two estimates, when both exist.
    pub agreement: Option<MethodAgreement>,
    /// Pairing diagnostics.
    pub pairing: PairingStats,
    /// Number of wheel odometry samples read.
    pub num_odometry: usize,
    /// Number of stereo VO poses.
    pub num_vo: usize,
}

/// Load, pair, solve and compare.
pub struct Pipeline;

impl Pipeline {
    /// Run a full calibration described by `config`.
    ///
    /// `vo` is only used when `use_viso` is set; the precomputed camera
    /// trajectory is read otherwise.
    pub fn run(
        config: &CalibrationConfig,
        vo: Option<&mut dyn StereoOdometry>,
    ) -> Result<CalibrationReport, CalibError> {
        let general = &config.general;

        let times = io::read_timestamps(config.vo_times_path())?;
        log::info!("{} stereo frames in {}", times.len(), general.data_folder.display());
        if times.is_empty() {
            return Err(CalibError::EmptyInput("stereo frame timestamp"));
        }

        let odometry = io::read_odometry(config.odometry_path())?;
        let Some(odometry_reference) = odometry.first() else {
            return Err(CalibError::EmptyInput("odometry"));
        };
        log::info!("read {} odometry readings", odometry.len());

        let (target, seed) = if general.use_viso {
            let engine = vo.ok_or(CalibError::VoUnavailable)?;
            let output = engine
                .run(&general.data_folder, times.len(), odometry_reference, &times)
                .map_err(CalibError::Vo)?;
            (output.poses, output.initial_pose)
        } else {
            let init_offset = config.init_offset();
            let poses =
                io::read_camera_trajectory(config.camera_trajectory_path(), &times, &init_offset)?;
            (poses, init_offset)
        };
        log::info!("{} stereo VO poses", target.len());

        Self::calibrate(config, &target, &odometry, seed)
    }

    /// Calibrate from streams already in memory.
    pub fn calibrate(
        config: &CalibrationConfig,
        target: &TimestampedPoseStream,
        reference: &TimestampedPoseStream,
        seed: Pose2D,
    ) -> Result<CalibrationReport, CalibError> {
        let general = &config.general;

        let (pairs, pairing) = MotionPairer::new(target, reference).pair_with_stats()?;
        log::info!("built {} motion pairs", pairs.len());

        let iterative =
            CalibrationConstraintSet::new(&pairs, seed).solve(general.max_iterations)?;
        let [x, y, theta] = iterative.offset.to_vector();
        log::info!("iterative offset: [{x:.6}, {y:.6}, {theta:.6}]");

        let closed_form = general.use_closed_form.then(|| {
            let solver = ClosedFormSolver {
                condition_tolerance: general.condition_tolerance,
            };
            solver.calibrate(&pairs).inspect_err(|e| {
                log::warn!("closed form calibration failed, keeping the iterative estimate: {e}")
            })
        });

        let agreement = match &closed_form {
            Some(Ok(cf)) => Some(compare(&iterative, cf)),
            _ => None,
        };
        if let Some(agreement) = &agreement {
            if !agreement.within(general.agreement_tolerance) {
                log::warn!(
                    "iterative and closed form estimates disagree: translation gap {:.4}, heading gap {:.4}",
                    agreement.translation_gap,
                    agreement.heading_gap
                );
            }
        }

        Ok(CalibrationReport {
            iterative,
            closed_form,
            agreement,
            pairing,
            num_odometry: reference.len(),
            num_vo: target.len(),
        })
    }
}

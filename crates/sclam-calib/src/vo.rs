use std::path::Path;

use sclam_lie::Pose2D;

use crate::stream::{TimedSample, TimestampedPoseStream};

/// Poses produced by a stereo visual odometry run.
#[derive(Debug, Clone)]
pub struct VoOutput {
    /// Robot frame poses stamped with the frame timestamps.
    pub poses: TimestampedPoseStream,
    /// Pose of the first stereo frame, used to seed the calibration.
    pub initial_pose: Pose2D,
}

/// A stereo visual odometry engine run over a recorded image folder.
pub trait StereoOdometry {
    /// Track `frame_count` stereo frames found in `data_folder`.
    ///
    /// `odometry_reference` is the first wheel odometry sample and `times`
    /// holds the timestamp of every frame.
    fn run(
        &mut self,
        data_folder: &Path,
        frame_count: usize,
        odometry_reference: &TimedSample,
        times: &[f64],
    ) -> Result<VoOutput, Box<dyn std::error::Error + Send + Sync>>;
}

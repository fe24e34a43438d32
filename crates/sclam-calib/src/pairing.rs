use sclam_lie::Pose2D;

use crate::stream::{StreamError, TimestampedPoseStream};

/// The motion both sensors measured over the same time interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionPair {
    /// Relative motion reported by the target sensor (stereo VO).
    pub target_motion: Pose2D,
    /// Relative motion reported by the reference sensor (wheel odometry).
    pub reference_motion: Pose2D,
    /// Time between the two matched reference samples, `prev - cur`.
    pub dt: f64,
}

/// Tangent-space distance under which two measured motions count as the same.
pub(crate) const COINCIDENT_MOTION_TOLERANCE: f64 = 1e-9;

/// Whether there is at least one pair and both sensors agree on every motion.
///
/// The identity offset then explains the data exactly, even when the motions
/// are too poor to single it out.
pub(crate) fn all_motions_coincide(pairs: &[MotionPair]) -> bool {
    !pairs.is_empty()
        && pairs
            .iter()
            .all(|p| p.motions_coincide(COINCIDENT_MOTION_TOLERANCE))
}

impl MotionPair {
    /// Whether both sensors report the same motion, up to `tolerance` in the tangent space.
    pub fn motions_coincide(&self, tolerance: f64) -> bool {
        self.target_motion.rminus(&self.reference_motion).length() <= tolerance
    }
}

/// Diagnostics gathered while pairing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairingStats {
    /// Number of pairs produced.
    pub pairs: usize,
    /// Pairs whose two target timestamps matched the same reference sample.
    pub reused_reference: usize,
}

/// Associates consecutive target samples with their nearest reference samples.
#[derive(Debug, Clone, Copy)]
pub struct MotionPairer<'a> {
    target: &'a TimestampedPoseStream,
    reference: &'a TimestampedPoseStream,
}

impl<'a> MotionPairer<'a> {
    /// Pair `target` motions against `reference` motions.
    pub fn new(target: &'a TimestampedPoseStream, reference: &'a TimestampedPoseStream) -> Self {
        Self { target, reference }
    }

    /// One motion pair per consecutive pair of target samples, in time order.
    pub fn pair(&self) -> Result<Vec<MotionPair>, StreamError> {
        self.pair_with_stats().map(|(pairs, _)| pairs)
    }

    /// Same as [`MotionPairer::pair`], also returning pairing diagnostics.
    pub fn pair_with_stats(&self) -> Result<(Vec<MotionPair>, PairingStats), StreamError> {
        let samples = self.target.as_slice();
        let mut stats = PairingStats::default();
        let mut pairs = Vec::with_capacity(samples.len().saturating_sub(1));

        for window in samples.windows(2) {
            let (prev, cur) = (&window[0], &window[1]);

            let target_motion = prev.pose.inverse() * cur.pose;

            let ref_prev = self.reference.find_closest(prev.timestamp)?;
            let ref_cur = self.reference.find_closest(cur.timestamp)?;
            let reference_motion = ref_prev.pose.inverse() * ref_cur.pose;

            if ref_prev.timestamp == ref_cur.timestamp {
                log::debug!(
                    "reference sample at {} reused for target interval [{}, {}]",
                    ref_prev.timestamp,
                    prev.timestamp,
                    cur.timestamp
                );
                stats.reused_reference += 1;
            }

            pairs.push(MotionPair {
                target_motion,
                reference_motion,
                dt: ref_prev.timestamp - ref_cur.timestamp,
            });
        }

        stats.pairs = pairs.len();
        if stats.reused_reference > 0 {
            log::warn!(
                "{} of {} motion pairs matched a single reference sample",
                stats.reused_reference,
                stats.pairs
            );
        }

        Ok((pairs, stats))
    }
}

use sclam_lie::Pose2D;

/// Errors raised by a [`TimestampedPoseStream`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StreamError {
    /// The stream has no samples to match against.
    #[error("the pose stream is empty")]
    EmptyStream,

    /// A sample with this timestamp was already recorded.
    #[error("duplicate timestamp {0}")]
    DuplicateTimestamp(f64),

    /// The timestamp is NaN or infinite.
    #[error("invalid timestamp {0}")]
    InvalidTimestamp(f64),
}

/// A pose recorded by one sensor at a given time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedSample {
    /// Acquisition time in seconds.
    pub timestamp: f64,
    /// Pose of the sensor in its own odometry frame.
    pub pose: Pose2D,
}

impl TimedSample {
    /// Create a new sample.
    pub fn new(timestamp: f64, pose: Pose2D) -> Self {
        Self { timestamp, pose }
    }
}

/// Timestamp ordered poses of one sensor.
///
/// Samples are kept sorted by timestamp and timestamps are unique, so iteration
/// replays the trajectory in order regardless of insertion order.
#[derive(Debug, Clone, Default)]
pub struct TimestampedPoseStream {
    samples: Vec<TimedSample>,
}

impl TimestampedPoseStream {
    /// Create an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a stream from samples in any order.
    pub fn try_from_samples(
        samples: impl IntoIterator<Item = TimedSample>,
    ) -> Result<Self, StreamError> {
        let mut stream = Self::new();
        for sample in samples {
            stream.add(sample)?;
        }
        Ok(stream)
    }

    /// Insert a sample, keeping the stream sorted.
    pub fn add(&mut self, sample: TimedSample) -> Result<(), StreamError> {
        if !sample.timestamp.is_finite() {
            return Err(StreamError::InvalidTimestamp(sample.timestamp));
        }

        // appending in time order is the common case
        if let Some(last) = self.samples.last() {
            if sample.timestamp > last.timestamp {
                self.samples.push(sample);
                return Ok(());
            }
        }

        let idx = self
            .samples
            .partition_point(|s| s.timestamp < sample.timestamp);
        if self
            .samples
            .get(idx)
            .is_some_and(|s| s.timestamp == sample.timestamp)
        {
            return Err(StreamError::DuplicateTimestamp(sample.timestamp));
        }
        self.samples.insert(idx, sample);
        Ok(())
    }

    /// The sample closest in time to `timestamp`.
    ///
    /// When two samples are equally distant the earlier one is returned.
    pub fn find_closest(&self, timestamp: f64) -> Result<&TimedSample, StreamError> {
        if !timestamp.is_finite() {
            return Err(StreamError::InvalidTimestamp(timestamp));
        }

        let idx = self.samples.partition_point(|s| s.timestamp < timestamp);
        let after = self.samples.get(idx);
        let before = idx.checked_sub(1).and_then(|i| self.samples.get(i));

        match (before, after) {
            (Some(b), Some(a)) => {
                if timestamp - b.timestamp <= a.timestamp - timestamp {
                    Ok(b)
                } else {
                    Ok(a)
                }
            }
            (Some(s), None) | (None, Some(s)) => Ok(s),
            (None, None) => Err(StreamError::EmptyStream),
        }
    }

    /// Samples in ascending timestamp order.
    pub fn iter(&self) -> std::slice::Iter<'_, TimedSample> {
        self.samples.iter()
    }

    /// Samples as a sorted slice.
    pub fn as_slice(&self) -> &[TimedSample] {
        &self.samples
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the stream holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The earliest sample.
    pub fn first(&self) -> Option<&TimedSample> {
        self.samples.first()
    }

    /// The latest sample.
    pub fn last(&self) -> Option<&TimedSample> {
        self.samples.last()
    }

    /// Time covered by the stream, `last - first`.
    pub fn time_span(&self) -> Option<f64> {
        Some(self.last()?.timestamp - self.first()?.timestamp)
    }
}

impl<'a> IntoIterator for &'a TimestampedPoseStream {
    type Item = &'a TimedSample;
    type IntoIter = std::slice::Iter<'a, TimedSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

use crate::config::ConfigError;
use crate::io::ReadError;
use crate::stream::StreamError;

/// Errors raised while calibrating.
#[derive(Debug, thiserror::Error)]
pub enum CalibError {
    /// Nearest-timestamp association or stream construction failed.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// A log file could not be read or parsed.
    #[error(transparent)]
    Read(#[from] ReadError),

    /// The parameter file could not be read or parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An input that must hold data is empty.
    #[error("no {0} data was read")]
    EmptyInput(&'static str),

    /// A constraint index past the end of the constraint set.
    #[error("constraint {index} does not exist, the set holds {len}")]
    ConstraintOutOfRange {
        /// requested index
        index: usize,
        /// number of constraints
        len: usize,
    },

    /// The factor graph could not be assembled.
    #[error("failed to build the calibration problem: {0}")]
    Problem(#[from] sclam_optim::ProblemError),

    /// A per-constraint information matrix is not symmetric positive definite.
    #[error("information matrix of constraint {index} is not symmetric positive definite")]
    InvalidInformation {
        /// index of the constraint
        index: usize,
    },

    /// The iterative solver failed to produce a usable estimate.
    #[error("optimizer diverged: {0}")]
    OptimizerDivergence(String),

    /// The motion set does not constrain every parameter of the offset.
    #[error("degenerate motion set: {0}")]
    DegenerateMotionSet(String),

    /// Live stereo visual odometry was requested but no engine was provided.
    #[error("stereo visual odometry requested but no engine is available")]
    VoUnavailable,

    /// The stereo visual odometry engine failed.
    #[error("stereo visual odometry failed: {0}")]
    Vo(Box<dyn std::error::Error + Send + Sync>),
}

impl CalibError {
    /// Whether the error comes from the inputs rather than from the solvers.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            CalibError::Stream(_)
                | CalibError::Read(_)
                | CalibError::Config(_)
                | CalibError::EmptyInput(_)
                | CalibError::VoUnavailable
                | CalibError::Vo(_)
        )
    }
}

use thiserror::Error;

/// Failure taxonomy of a sequential run. Step indices are 1-based
/// stream positions; step 0 marks work done before the stream starts
/// (prior construction, initial test draw).
#[derive(Debug, Error)]
pub enum SequorError {
    /// Fatal pairing or construction problem, surfaced before any
    /// step runs and never retried.
    #[error("configuration: {0}")]
    Config(String),

    /// Non-finite loss, mean, or covariance produced by an update.
    /// The run terminates early instead of propagating NaNs into the
    /// belief state.
    #[error("numerical divergence at step {step}: {quantity} is not finite")]
    NumericalDivergence { step: usize, quantity: String },

    /// A generator returned malformed data. Never retried: re-drawing
    /// would desynchronize the stream from its seed-determined
    /// sequence.
    #[error("sampling failed at step {step}: {reason}")]
    Sampling { step: usize, reason: String },

    /// Record stream could not be written or read back.
    #[error("record output: {0}")]
    Output(String),
}

impl SequorError {
    /// Stamp the step index on step-scoped errors raised by code that
    /// does not know its position in the stream.
    pub fn at_step(self, tt: usize) -> Self {
        match self {
            Self::NumericalDivergence { quantity, .. } => Self::NumericalDivergence {
                step: tt,
                quantity,
            },
            Self::Sampling { reason, .. } => Self::Sampling { step: tt, reason },
            other => other,
        }
    }

    /// The step the error occurred at, if it is step-scoped.
    pub fn step(&self) -> Option<usize> {
        match self {
            Self::NumericalDivergence { step, .. } | Self::Sampling { step, .. } => Some(*step),
            Self::Config(_) | Self::Output(_) => None,
        }
    }
}

impl From<std::io::Error> for SequorError {
    fn from(err: std::io::Error) -> Self {
        Self::Output(err.to_string())
    }
}

impl From<serde_json::Error> for SequorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Output(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SequorError>;

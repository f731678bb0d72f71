use std::time::Duration;

use thiserror::Error;

/// Reasons the frame source could not hand over a frame on this tick.
/// Never fatal: the loop simply tries again on the next tick.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("no frame source available (last frame {0:?} ago)")]
    Unavailable(Option<Duration>),
    #[error("frame source is being re-acquired")]
    Resetting,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("inference call exceeded timeout of {0:?}")]
    Timeout(Duration),
    #[error("inference call failed: {0}")]
    Failure(String),
    #[error("invalid frame encoding: {0}")]
    InvalidFrameEncoding(String),
    #[error("inference worker is no longer running")]
    WorkerStopped,
    #[error("inference worker is still busy with an abandoned call")]
    Busy,
}

impl InferenceError {
    /// Encoding problems belong to the caller, and a busy worker was already
    /// counted when its call timed out; everything else counts against model health.
    pub fn is_model_fault(&self) -> bool {
        !matches!(
            self,
            InferenceError::InvalidFrameEncoding(_) | InferenceError::Busy
        )
    }
}

use thiserror::Error;
use crate::types::{ChannelRole, ControllerPhase};
#[derive(Debug, Error)]
pub enum FlystickError {
    #[error("sample rate must be greater than zero")]
    InvalidSampleRate,
    #[error("sample rate mismatch: expected {expected}, got {actual}")]
    SampleRateMismatch { expected: f64, actual: f64 },
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
    #[error("channel {0} is not mapped to an EEG row")]
    MissingChannel(ChannelRole),
    #[error("window incomplete: need {required} samples, have {available}")]
    InsufficientData { required: usize, available: usize },
    #[error("invalid setting `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
    #[error("failed to read config: {0}")]
    ConfigIo(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("controller is {actual:?}, operation needs {expected:?}")]
    WrongPhase {
        expected: ControllerPhase,
        actual: ControllerPhase,
    },
    #[error("stopped on request")]
    Interrupted,
    #[error("failed to deliver command: {0}")]
    Transport(String),
}
impl FlystickError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        FlystickError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

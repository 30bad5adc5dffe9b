use thiserror::Error;

/// Misuse of the slot accessors. These never reach the host when the session
/// drives the sequence; they exist so a bad call leaves the sequence untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlotError {
    #[error("sequence length must be positive (got {0})")]
    InvalidLength(usize),
    #[error("slot {position} is outside 1..={len}")]
    IndexOutOfRange { position: usize, len: usize },
    #[error("slot {position} already holds a capture")]
    SlotAlreadyCaptured { position: usize },
    #[error("slot {position} has no capture to caption")]
    SlotNotCaptured { position: usize },
    #[error("caption for slot {position} is blank")]
    EmptyCaption { position: usize },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("no active slot (cursor {cursor} is past {len})")]
    NoActiveSlot { cursor: usize, len: usize },
    #[error(transparent)]
    Slot(#[from] SlotError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unrecognized response shape: {found}")]
pub struct UnrecognizedResponseShape {
    pub found: String,
}

impl UnrecognizedResponseShape {
    pub fn new(found: impl Into<String>) -> Self {
        Self {
            found: found.into(),
        }
    }
}

/// Runtime conditions a session absorbs instead of failing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionWarning {
    #[error(transparent)]
    UnrecognizedResponseShape(#[from] UnrecognizedResponseShape),
    #[error("inference failed: {0}")]
    InferenceFailure(String),
}

impl SessionWarning {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnrecognizedResponseShape(_) => "unrecognized_response_shape",
            Self::InferenceFailure(_) => "inference_failure",
        }
    }
}

pub type FramecastResult<T> = Result<T, FramecastError>;

/// Crate-wide error type.
///
/// Variants map onto how far a failure is allowed to travel: see [`FramecastError::class`].
#[derive(thiserror::Error, Debug)]
pub enum FramecastError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("surface unavailable")]
    SurfaceUnavailable,

    #[error("render submission failed: {0}")]
    RenderSubmissionFailed(String),

    #[error("encoder start failed: {0}")]
    EncoderStartFailed(String),

    #[error("encoder append failed: {0}")]
    EncoderAppendFailed(String),

    #[error("headroom query failed: {0}")]
    HeadroomQueryFailed(String),

    #[error("command queue error: {0}")]
    Queue(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse propagation class of a [`FramecastError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Affects a single frame; the tick loop keeps going.
    FrameLocal,
    /// Affects only the encode path; presentation is unaffected.
    EncodePath,
    /// Rejected configuration or arguments.
    Config,
    /// The pipeline cannot continue.
    Fatal,
}

impl FramecastError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::RenderSubmissionFailed(msg.into())
    }

    pub fn encoder_start(msg: impl Into<String>) -> Self {
        Self::EncoderStartFailed(msg.into())
    }

    pub fn encoder_append(msg: impl Into<String>) -> Self {
        Self::EncoderAppendFailed(msg.into())
    }

    pub fn headroom(msg: impl Into<String>) -> Self {
        Self::HeadroomQueryFailed(msg.into())
    }

    pub fn queue(msg: impl Into<String>) -> Self {
        Self::Queue(msg.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::SurfaceUnavailable
            | Self::RenderSubmissionFailed(_)
            | Self::HeadroomQueryFailed(_) => ErrorClass::FrameLocal,
            Self::EncoderStartFailed(_) | Self::EncoderAppendFailed(_) => ErrorClass::EncodePath,
            Self::Validation(_) => ErrorClass::Config,
            Self::Queue(_) | Self::Other(_) => ErrorClass::Fatal,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;

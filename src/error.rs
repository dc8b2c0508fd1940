//! Error types shared by the speech pipeline and its delivery surfaces.

use crate::audio::{EncodeError, StitchError};

/// A request rejected before any synthesis work starts.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Text must not be empty")]
    EmptyText,
    #[error("Voice must not be empty")]
    EmptyVoice,
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),
    #[error("Unsupported language code: {0}")]
    UnsupportedLanguage(char),
}

#[derive(thiserror::Error, Debug)]
pub enum SpeechError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Synthesis failed for chunk {chunk}: {message}")]
    Synthesis { chunk: usize, message: String },
    #[error("Encoding failed: {0}")]
    Encoding(#[from] EncodeError),
    #[error("Stitching failed: {0}")]
    Stitch(#[from] StitchError),
    #[error("Segment sample rates disagree: expected {expected} Hz, got {found} Hz")]
    SampleRateMismatch { expected: u32, found: u32 },
    #[error("Delivery cancelled after {emitted} chunk(s)")]
    Cancelled { emitted: usize },
}

impl SpeechError {
    /// True when the caller sent a bad request rather than the server failing.
    pub fn is_validation(&self) -> bool {
        matches!(self, SpeechError::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, SpeechError>;

//! Error taxonomy for the transcoding pipeline.
//!
//! Every variant is fatal to a run. The pipeline surfaces the first error it
//! meets and tears down whatever it had already acquired.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TranscodeError>;

#[derive(Error, Debug)]
pub enum TranscodeError {
    /// The frame source could not be opened.
    #[error("cannot open source '{path}': {reason}")]
    SourceOpenFailed { path: String, reason: String },

    /// Reading or decoding a frame from the source failed.
    #[error("failed to read frame {index} from source: {reason}")]
    SourceReadFailed { index: u64, reason: String },

    /// Pixel buffer size or layout does not match the converter configuration.
    #[error("pixel conversion failed: {0}")]
    ConversionError(String),

    /// No encoder implementation is registered for the requested codec.
    #[error("no encoder available for {0}")]
    UnsupportedCodec(String),

    /// The encoder implementation rejected the stream parameters.
    #[error("failed to open encoder {codec}: {reason}")]
    EncoderOpenFailed { codec: String, reason: String },

    /// The codec reported a fault while encoding a frame.
    #[error("failed to encode frame {index}: {reason}")]
    EncodeFailed { index: u64, reason: String },

    /// The codec reported a fault while flushing buffered output.
    #[error("failed to drain encoder: {0}")]
    DrainFailed(String),

    /// The output sink could not be created or no container format matched.
    #[error("cannot open output '{path}': {reason}")]
    CannotOpenOutput { path: String, reason: String },

    /// Writing header, packet or trailer to the container failed.
    #[error("failed to write container: {0}")]
    MuxWriteFailed(String),

    /// A lifecycle operation was called in a state that does not allow it.
    #[error("{operation} is not allowed while {component} is {state}")]
    InvalidState {
        component: &'static str,
        operation: &'static str,
        state: String,
    },
}

impl TranscodeError {
    /// Name of the pipeline stage that produced the error.
    pub fn stage(&self) -> &'static str {
        match self {
            TranscodeError::SourceOpenFailed { .. } | TranscodeError::SourceReadFailed { .. } => {
                "source"
            }
            TranscodeError::ConversionError(_) => "convert",
            TranscodeError::UnsupportedCodec(_)
            | TranscodeError::EncoderOpenFailed { .. }
            | TranscodeError::EncodeFailed { .. } => "encode",
            TranscodeError::DrainFailed(_) => "drain",
            TranscodeError::CannotOpenOutput { .. } | TranscodeError::MuxWriteFailed(_) => "mux",
            TranscodeError::InvalidState { component, .. } => component,
        }
    }

    pub(crate) fn invalid_state(
        component: &'static str,
        operation: &'static str,
        state: impl std::fmt::Debug,
    ) -> Self {
        TranscodeError::InvalidState {
            component,
            operation,
            state: format!("{:?}", state),
        }
    }
}

//! Transcodes the first N frames of a video source into a single-stream
//! container: pull a frame, convert its pixels, encode, mux.
//!
//! ```ignore
//! let registry = Registry::new()?;
//! let report = transcode_file(
//!     &registry,
//!     "input.avi",
//!     None,
//!     Path::new("out.webm"),
//!     250,
//!     &EncodeSettings::default(),
//! )?;
//! ```

pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod input;
pub mod metadata;
pub mod output;
pub mod packet;
pub mod pipeline;
pub mod registry;
pub mod scaler;
pub mod source;
pub mod stream;

#[cfg(test)]
mod pipeline_test;

pub use config::{EncodeSettings, ScalingAlgorithm};
pub use error::{Result, TranscodeError};
pub use input::AvFrameSource;
pub use pipeline::{TranscodeReport, run, transcode_file};
pub use registry::Registry;
pub use source::{FrameSource, PatternSource, SourceInfo};

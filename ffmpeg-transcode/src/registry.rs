//! Codec and container lookup.
//!
//! FFmpeg keeps its codec/format tables process-wide; `Registry` is the one
//! place that initializes them and answers capability questions, so the
//! encoder and container writer receive it explicitly instead of touching
//! global state themselves.

use std::path::Path;

use ffmpeg_next::codec::capabilities::Capabilities;

use crate::error::{Result, TranscodeError};

pub struct Registry {
    _private: (),
}

impl Registry {
    /// Initializes FFmpeg. Build one per process, before any other call.
    pub fn new() -> Result<Self> {
        ffmpeg_next::init()
            .map_err(|e| TranscodeError::UnsupportedCodec(format!("ffmpeg init: {}", e)))?;
        ffmpeg_next::util::log::set_level(ffmpeg_next::util::log::Level::Error);
        Ok(Self { _private: () })
    }

    /// Resolves an encoder: by implementation name when given, otherwise the
    /// default encoder for `codec_id`.
    pub fn find_encoder(
        &self,
        codec_id: ffmpeg_next::codec::Id,
        name: Option<&str>,
    ) -> Result<ffmpeg_next::Codec> {
        let codec = match name {
            Some(name) => ffmpeg_next::encoder::find_by_name(name)
                .ok_or_else(|| TranscodeError::UnsupportedCodec(format!("encoder '{}'", name)))?,
            None => ffmpeg_next::encoder::find(codec_id)
                .ok_or_else(|| TranscodeError::UnsupportedCodec(format!("codec {:?}", codec_id)))?,
        };
        if !codec.is_video() {
            return Err(TranscodeError::UnsupportedCodec(format!(
                "{} is not a video encoder",
                codec.name()
            )));
        }
        log::debug!(
            "resolved encoder {} for {:?} (delay: {})",
            codec.name(),
            codec.id(),
            has_delay(&codec)
        );
        Ok(codec)
    }

    /// Opens an output context for `path`, using `format_hint` when present and
    /// the file extension otherwise. The sink is opened for writing here.
    pub fn open_output(
        &self,
        path: &Path,
        format_hint: Option<&str>,
    ) -> Result<ffmpeg_next::format::context::Output> {
        let opened = match format_hint {
            Some(format) => ffmpeg_next::format::output_as(path, format),
            None => ffmpeg_next::format::output(path),
        };
        opened.map_err(|e| TranscodeError::CannotOpenOutput {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Whether the codec buffers frames internally and needs an explicit flush.
pub fn has_delay(codec: &ffmpeg_next::Codec) -> bool {
    codec.capabilities().contains(Capabilities::DELAY)
}

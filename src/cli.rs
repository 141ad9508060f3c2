use std::path::PathBuf;

use clap::Parser;
use ffmpeg_transcode::EncodeSettings;

/// Encode the first N frames of a video into a new single-stream file.
#[derive(Parser, Debug)]
#[command(name = "frame-transcoder")]
#[command(version)]
#[command(about = "Transcode the first N frames of a video source")]
pub struct Args {
    /// Input file, URL or device
    pub input: String,

    /// Output file; the container is picked from its extension
    pub output: PathBuf,

    /// Maximum number of frames to encode
    pub frames: u64,

    /// Encoder implementation name (e.g. libvpx, mpeg4). Defaults to the VP8 encoder
    #[arg(long)]
    pub codec: Option<String>,

    /// Output container format, overriding the extension (e.g. webm, matroska)
    #[arg(long)]
    pub format: Option<String>,

    /// Input format for devices and virtual sources (e.g. v4l2, lavfi)
    #[arg(long)]
    pub input_format: Option<String>,
}

impl Args {
    pub fn settings(&self) -> EncodeSettings {
        let mut settings = EncodeSettings::default();
        if let Some(codec) = &self.codec {
            settings = settings.with_encoder_name(codec.as_str());
        }
        if let Some(format) = &self.format {
            settings = settings.with_container_format(format.as_str());
        }
        settings
    }
}

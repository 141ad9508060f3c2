//! Media file metadata (similar to ffprobe).

use std::fmt;
use std::path::Path;

use crate::input::InputStream;

/// Format-level info (corresponds to ffprobe format).
#[derive(Debug, Clone)]
pub struct FormatInfo {
    /// Format name, e.g. "matroska,webm"
    pub format_name: String,
    /// Duration in seconds; None if unknown.
    pub duration_sec: Option<f64>,
    /// Total bitrate in bps; 0 if unknown.
    pub bit_rate: i64,
    pub nb_streams: u32,
}

/// Per-stream info (corresponds to ffprobe stream).
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub index: usize,
    /// "video" | "audio" | "subtitle" etc.
    pub codec_type: String,
    /// e.g. "vp8", "mpeg4"
    pub codec_name: String,
    /// e.g. "1/1000"
    pub time_base: String,
    /// e.g. "25/1"
    pub rate: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Frames recorded or estimated from the duration; None if unknown.
    pub frame_count: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub format: FormatInfo,
    pub streams: Vec<StreamInfo>,
}

impl MediaInfo {
    pub fn video_streams(&self) -> impl Iterator<Item = &StreamInfo> {
        self.streams.iter().filter(|s| s.codec_type == "video")
    }
}

impl fmt::Display for MediaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[FORMAT]")?;
        writeln!(f, "format_name={}", self.format.format_name)?;
        if let Some(d) = self.format.duration_sec {
            writeln!(f, "duration_sec={:.3}", d)?;
        } else {
            writeln!(f, "duration_sec=N/A")?;
        }
        writeln!(f, "bit_rate={}", self.format.bit_rate)?;
        writeln!(f, "nb_streams={}", self.format.nb_streams)?;
        writeln!(f, "[/FORMAT]")?;
        for s in &self.streams {
            writeln!(f, "[STREAM]")?;
            writeln!(f, "index={}", s.index)?;
            writeln!(f, "codec_type={}", s.codec_type)?;
            writeln!(f, "codec_name={}", s.codec_name)?;
            writeln!(f, "time_base={}", s.time_base)?;
            writeln!(f, "rate={}", s.rate)?;
            if let Some(w) = s.width {
                writeln!(f, "width={}", w)?;
            }
            if let Some(h) = s.height {
                writeln!(f, "height={}", h)?;
            }
            if let Some(n) = s.frame_count {
                writeln!(f, "frame_count={}", n)?;
            }
            writeln!(f, "[/STREAM]")?;
        }
        Ok(())
    }
}

/// Opens a file and returns its metadata.
///
/// ```ignore
/// let info = ffmpeg_transcode::metadata::probe(Path::new("out.webm"))?;
/// println!("{}", info);
/// ```
pub fn probe(path: &Path) -> anyhow::Result<MediaInfo> {
    let input = ffmpeg_next::format::input(path)?;

    let format_name = input.format().name().to_string();
    let nb_streams = input.nb_streams();
    let bit_rate = input.bit_rate();
    let duration_sec = {
        let d = input.duration();
        if d == ffmpeg_next::ffi::AV_NOPTS_VALUE as i64 || d <= 0 {
            None
        } else {
            Some(d as f64 / 1_000_000.0)
        }
    };

    let mut streams = Vec::with_capacity(nb_streams as usize);
    for stream in input.streams() {
        let s = InputStream::from(stream);
        let params = s.parameters();
        let is_video = params.medium() == ffmpeg_next::media::Type::Video;
        let (width, height) = if is_video {
            let (w, h) = video_size_from_parameters(params);
            (Some(w), Some(h))
        } else {
            (None, None)
        };
        let time_base = s.time_base();
        let rate = s.rate();
        streams.push(StreamInfo {
            index: s.index(),
            codec_type: format!("{:?}", params.medium()).to_lowercase(),
            codec_name: format!("{:?}", params.id()).to_lowercase(),
            time_base: format!("{}/{}", time_base.numerator(), time_base.denominator()),
            rate: format!("{}/{}", rate.numerator(), rate.denominator()),
            width,
            height,
            frame_count: if is_video { s.frame_count() } else { None },
        });
    }

    Ok(MediaInfo {
        format: FormatInfo {
            format_name,
            duration_sec,
            bit_rate,
            nb_streams,
        },
        streams,
    })
}

/// Counts the packets stored for `stream_index` by demuxing the whole file.
pub fn count_packets(path: &Path, stream_index: usize) -> anyhow::Result<u64> {
    let mut input = ffmpeg_next::format::input(path)?;
    let mut count = 0;
    for (stream, _) in input.packets() {
        if stream.index() == stream_index {
            count += 1;
        }
    }
    Ok(count)
}

/// Reads video width/height from codec parameters (not exposed by ffmpeg-next).
fn video_size_from_parameters(params: &ffmpeg_next::codec::Parameters) -> (u32, u32) {
    unsafe {
        let ptr = params.as_ptr() as *const ffmpeg_next::ffi::AVCodecParameters;
        let w = (*ptr).width;
        let h = (*ptr).height;
        (w.max(0) as u32, h.max(0) as u32)
    }
}

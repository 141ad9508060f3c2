use std::ffi::CString;
use std::path::Path;

use ffmpeg_next::{Dictionary, Rational, codec::Parameters, format::stream};

use crate::{
    decoder::Decoder,
    error::{Result, TranscodeError},
    frame::RawFrame,
    packet::EncodedPacket,
    registry::Registry,
    source::{FrameSource, SourceInfo},
};

/// Snapshot of a demuxed stream's parameters.
#[derive(Clone)]
pub struct InputStream {
    index: usize,
    parameters: Parameters,
    time_base: Rational,
    rate: Rational,
    frames: i64,
    duration: i64,
}

impl InputStream {
    pub fn index(&self) -> usize {
        self.index
    }
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }
    pub fn time_base(&self) -> Rational {
        self.time_base
    }
    pub fn rate(&self) -> Rational {
        self.rate
    }

    /// Frame count recorded by the container, else estimated from the stream
    /// duration.
    pub fn frame_count(&self) -> Option<u64> {
        if self.frames > 0 {
            return Some(self.frames as u64);
        }
        if self.duration == ffmpeg_next::ffi::AV_NOPTS_VALUE as i64 || self.duration <= 0 {
            return None;
        }
        if self.rate.numerator() <= 0 || self.rate.denominator() <= 0 {
            return None;
        }
        let seconds = self.duration as f64 * f64::from(self.time_base);
        Some((seconds * f64::from(self.rate)).round() as u64)
    }
}

impl From<stream::Stream<'_>> for InputStream {
    fn from(stream: stream::Stream<'_>) -> Self {
        let avg = stream.avg_frame_rate();
        let rate = if avg.numerator() > 0 && avg.denominator() > 0 {
            avg
        } else {
            stream.rate()
        };
        Self {
            index: stream.index(),
            parameters: stream.parameters(),
            time_base: stream.time_base(),
            rate,
            frames: stream.frames(),
            duration: stream.duration(),
        }
    }
}

/// Demuxer for a file, URL or capture device.
pub struct AvInput {
    inner: ffmpeg_next::format::context::Input,
    video: InputStream,
}

impl AvInput {
    /// Resolve input format by name (e.g. "lavfi", "v4l2") via FFmpeg's av_find_input_format.
    fn find_input_format(name: &str) -> anyhow::Result<ffmpeg_next::format::format::Input> {
        let cname = CString::new(name)
            .map_err(|e| anyhow::anyhow!("invalid format name {:?}: {}", name, e))?;
        let ptr = unsafe { ffmpeg_next::ffi::av_find_input_format(cname.as_ptr()) };
        if ptr.is_null() {
            return Err(anyhow::anyhow!("input format not found: {}", name));
        }
        Ok(unsafe { ffmpeg_next::format::format::Input::wrap(ptr as *mut _) })
    }

    pub fn new(url: &str, format: Option<&str>) -> anyhow::Result<Self> {
        use ffmpeg_next::format::format::Format;

        let path = Path::new(url);
        let input = match format {
            Some(fmt_name) => {
                let fmt = Self::find_input_format(fmt_name)?;
                let ctx =
                    ffmpeg_next::format::open_with(path, &Format::Input(fmt), Dictionary::new())?;
                ctx.input()
            }
            None => ffmpeg_next::format::input(path)?,
        };

        let video = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .map(InputStream::from)
            .ok_or_else(|| anyhow::anyhow!("no video stream in {}", url))?;

        Ok(Self {
            inner: input,
            video,
        })
    }

    pub fn video(&self) -> &InputStream {
        &self.video
    }

    /// Container-level duration, used when the stream has none.
    fn duration_frames(&self) -> Option<u64> {
        let d = self.inner.duration();
        let rate = self.video.rate();
        if d == ffmpeg_next::ffi::AV_NOPTS_VALUE as i64 || d <= 0 {
            return None;
        }
        if rate.numerator() <= 0 || rate.denominator() <= 0 {
            return None;
        }
        // AV_TIME_BASE = 1_000_000
        let seconds = d as f64 / 1_000_000.0;
        Some((seconds * f64::from(rate)).round() as u64)
    }

    /// Next demuxed packet, `Ok(None)` at end of input. Read errors are
    /// returned as they come; `format::context::Input::packets` would retry
    /// them forever.
    pub fn read_packet(&mut self) -> anyhow::Result<Option<EncodedPacket>> {
        let mut packet = ffmpeg_next::Packet::empty();
        match packet.read(&mut self.inner) {
            Ok(()) => {}
            Err(ffmpeg_next::Error::Eof) => return Ok(None),
            Err(e) => return Err(anyhow::anyhow!("demux: {}", e)),
        }
        let time_base = self
            .inner
            .stream(packet.stream())
            .map(|s| s.time_base())
            .ok_or_else(|| anyhow::anyhow!("packet for unknown stream {}", packet.stream()))?;
        Ok(Some((packet, time_base).into()))
    }
}

/// Frame source backed by FFmpeg demuxing and decoding of the best video
/// stream of its input.
pub struct AvFrameSource {
    input: AvInput,
    decoder: Decoder,
    info: SourceInfo,
    eof_sent: bool,
    frames_read: u64,
}

impl AvFrameSource {
    /// Opens `url`, optionally forcing an input format such as "lavfi" or
    /// "v4l2". Takes the registry so FFmpeg is known to be initialized.
    pub fn open(_registry: &Registry, url: &str, format: Option<&str>) -> Result<Self> {
        let open_failed = |e: anyhow::Error| TranscodeError::SourceOpenFailed {
            path: url.to_string(),
            reason: e.to_string(),
        };
        let input = AvInput::new(url, format).map_err(open_failed)?;
        let decoder = Decoder::new(input.video()).map_err(open_failed)?;
        let frame_count = input
            .video()
            .frame_count()
            .or_else(|| input.duration_frames());
        let info = SourceInfo {
            width: decoder.width(),
            height: decoder.height(),
            frame_rate: input.video().rate(),
            frame_count,
            pixel_format: decoder.format(),
        };
        log::info!(
            "{} [width: {}, height: {}, fps: {:.3}, frame count: {}, format: {:?}]",
            url,
            info.width,
            info.height,
            info.fps(),
            frame_count.map_or_else(|| "unknown".to_string(), |n| n.to_string()),
            info.pixel_format
        );
        Ok(Self {
            input,
            decoder,
            info,
            eof_sent: false,
            frames_read: 0,
        })
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

impl FrameSource for AvFrameSource {
    fn info(&self) -> SourceInfo {
        self.info
    }

    fn read(&mut self) -> Result<Option<RawFrame>> {
        let index = self.frames_read;
        let read_failed = |e: anyhow::Error| TranscodeError::SourceReadFailed {
            index,
            reason: e.to_string(),
        };
        loop {
            if let Some(frame) = self.decoder.receive_frame().map_err(read_failed)? {
                self.frames_read += 1;
                return Ok(Some(RawFrame::from_video(&frame)));
            }
            if self.eof_sent {
                return Ok(None);
            }
            match self.input.read_packet().map_err(read_failed)? {
                Some(packet) if packet.index() == self.decoder.stream_index() => {
                    self.decoder.send_packet(packet).map_err(read_failed)?;
                }
                Some(_) => {}
                None => {
                    self.decoder.send_eof().map_err(read_failed)?;
                    self.eof_sent = true;
                }
            }
        }
    }
}

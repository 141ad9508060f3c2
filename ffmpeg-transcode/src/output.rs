use std::path::{Path, PathBuf};

use ffmpeg_next::Rational;

use crate::{
    encoder::EncoderSession,
    error::{Result, TranscodeError},
    packet::EncodedPacket,
    registry::Registry,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Created,
    StreamAdded,
    HeaderWritten,
    TrailerWritten,
    Closed,
}

/// Tags packets for the stream registered with [`ContainerWriter::add_stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHandle {
    index: usize,
}

impl StreamHandle {
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Output container holding exactly one video stream.
///
/// Order of calls: `create`, `add_stream`, `write_header`, any number of
/// `write_packet`, `write_trailer`, `close`. Calls out of that order fail
/// with `InvalidState`. The sink is released on `close` or on drop.
pub struct ContainerWriter {
    inner: Option<ffmpeg_next::format::context::Output>,
    path: PathBuf,
    format_name: String,
    stream: Option<StreamHandle>,
    stream_time_base: Rational,
    state: WriterState,
    last_ts: Option<i64>,
    packets_written: u64,
    bytes_written: u64,
}

impl ContainerWriter {
    pub fn create(registry: &Registry, path: &Path, format_hint: Option<&str>) -> Result<Self> {
        let output = registry.open_output(path, format_hint)?;
        let format_name = output.format().name().to_string();
        log::info!("output {} opened as {}", path.display(), format_name);
        Ok(Self {
            inner: Some(output),
            path: path.to_path_buf(),
            format_name,
            stream: None,
            stream_time_base: Rational::new(0, 1),
            state: WriterState::Created,
            last_ts: None,
            packets_written: 0,
            bytes_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format_name(&self) -> &str {
        &self.format_name
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Time base the muxer settled on; only meaningful after the header.
    pub fn stream_time_base(&self) -> Rational {
        self.stream_time_base
    }

    /// Whether the container wants codec headers out of band (extradata)
    /// rather than in the bitstream.
    pub fn wants_global_header(&self) -> bool {
        self.inner.as_ref().is_some_and(|output| {
            output
                .format()
                .flags()
                .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER)
        })
    }

    /// Registers the single output stream with the parameters of an open
    /// encoder session.
    pub fn add_stream(&mut self, session: &EncoderSession) -> Result<StreamHandle> {
        if self.state != WriterState::Created {
            return Err(TranscodeError::invalid_state("muxer", "add_stream", self.state));
        }
        let encoder = session
            .encoder()
            .ok_or_else(|| TranscodeError::invalid_state("encoder", "add_stream", session.state()))?;
        let output = self.output_mut("add_stream")?;
        let mut stream = output
            .add_stream(session.codec())
            .map_err(|e| TranscodeError::MuxWriteFailed(format!("add stream: {}", e)))?;
        stream.set_parameters(encoder);
        stream.set_time_base(session.time_base());
        let handle = StreamHandle {
            index: stream.index(),
        };
        log::debug!(
            "stream {} added for {} ({}x{})",
            handle.index,
            session.codec().name(),
            session.descriptor().width(),
            session.descriptor().height()
        );
        self.stream = Some(handle);
        self.state = WriterState::StreamAdded;
        Ok(handle)
    }

    pub fn write_header(&mut self) -> Result<()> {
        if self.state != WriterState::StreamAdded {
            return Err(TranscodeError::invalid_state("muxer", "write_header", self.state));
        }
        let index = self.stream.map(|s| s.index).unwrap_or_default();
        let output = self.output_mut("write_header")?;
        output
            .write_header()
            .map_err(|e| TranscodeError::MuxWriteFailed(format!("header: {}", e)))?;
        // The muxer may replace the time base we asked for.
        let time_base = output
            .stream(index)
            .map(|s| s.time_base())
            .ok_or_else(|| TranscodeError::MuxWriteFailed(format!("stream {} vanished", index)))?;
        self.stream_time_base = time_base;
        self.state = WriterState::HeaderWritten;
        log::debug!(
            "header written, stream time base {}/{}",
            time_base.numerator(),
            time_base.denominator()
        );
        Ok(())
    }

    /// Appends one packet. Decode timestamps must not go backwards; packets
    /// are never reordered here.
    pub fn write_packet(&mut self, handle: StreamHandle, mut packet: EncodedPacket) -> Result<()> {
        if self.state != WriterState::HeaderWritten {
            return Err(TranscodeError::invalid_state("muxer", "write_packet", self.state));
        }
        if self.stream != Some(handle) {
            return Err(TranscodeError::MuxWriteFailed(format!(
                "stream {} is not registered",
                handle.index
            )));
        }
        let ts = packet.ordering_ts();
        if let (Some(prev), Some(ts)) = (self.last_ts, ts) {
            if ts < prev {
                return Err(TranscodeError::MuxWriteFailed(format!(
                    "timestamp {} after {} on stream {}",
                    ts, prev, handle.index
                )));
            }
        }

        let size = packet.size();
        let time_base = packet.time_base();
        let stream_time_base = self.stream_time_base;
        let p = packet.get_mut();
        p.set_stream(handle.index);
        p.set_position(-1);
        p.rescale_ts(time_base, stream_time_base);
        let output = self.output_mut("write_packet")?;
        p.write(output)
            .map_err(|e| TranscodeError::MuxWriteFailed(format!("packet: {}", e)))?;

        if ts.is_some() {
            self.last_ts = ts;
        }
        self.packets_written += 1;
        self.bytes_written += size as u64;
        Ok(())
    }

    pub fn write_trailer(&mut self) -> Result<()> {
        if self.state != WriterState::HeaderWritten {
            return Err(TranscodeError::invalid_state("muxer", "write_trailer", self.state));
        }
        let output = self.output_mut("write_trailer")?;
        output
            .write_trailer()
            .map_err(|e| TranscodeError::MuxWriteFailed(format!("trailer: {}", e)))?;
        self.state = WriterState::TrailerWritten;
        log::info!(
            "trailer written to {}: {} packets, {} bytes",
            self.path.display(),
            self.packets_written,
            self.bytes_written
        );
        Ok(())
    }

    /// Closes the sink and frees the context. Safe to call in any state and
    /// more than once.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            if self.state != WriterState::TrailerWritten {
                log::warn!(
                    "closing {} without a trailer (state {:?})",
                    self.path.display(),
                    self.state
                );
            }
            log::debug!("output {} closed", self.path.display());
        }
        self.state = WriterState::Closed;
    }

    fn output_mut(&mut self, operation: &'static str) -> Result<&mut ffmpeg_next::format::context::Output> {
        let state = self.state;
        self.inner
            .as_mut()
            .ok_or_else(|| TranscodeError::invalid_state("muxer", operation, state))
    }
}

impl Drop for ContainerWriter {
    fn drop(&mut self) {
        self.close();
    }
}

//! Pull, convert, encode and mux loop for one run.

use std::path::Path;

use crate::{
    config::EncodeSettings,
    encoder::EncoderSession,
    error::{Result, TranscodeError},
    input::AvFrameSource,
    output::{ContainerWriter, StreamHandle},
    packet::EncodedPacket,
    registry::Registry,
    scaler::{PictureSpec, PixelConverter},
    source::FrameSource,
    stream::StreamDescriptor,
};

/// Counters of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranscodeReport {
    pub frames_requested: u64,
    /// What the source said it holds; `None` when it could not tell.
    pub frames_available: Option<u64>,
    pub frames_encoded: u64,
    pub packets_from_submit: u64,
    pub packets_drained: u64,
    pub packets_written: u64,
    pub bytes_written: u64,
}

/// Transcodes up to `max_frames` frames of `source` into a new container at
/// `output`.
///
/// The first error aborts the run. The encoder and container are released on
/// every path; a partially written file is left where it is.
pub fn run(
    registry: &Registry,
    source: &mut dyn FrameSource,
    output: &Path,
    max_frames: u64,
    settings: &EncodeSettings,
) -> Result<TranscodeReport> {
    let info = source.info();
    if info.width == 0 || info.height == 0 {
        return Err(TranscodeError::SourceOpenFailed {
            path: "<frame source>".to_string(),
            reason: format!("source reports an empty picture {}x{}", info.width, info.height),
        });
    }

    let frames = info.clamp(max_frames);
    if frames < max_frames {
        log::warn!(
            "{} frames requested but the source only has {}, encoding {}",
            max_frames,
            frames,
            frames
        );
    }

    let mut writer =
        ContainerWriter::create(registry, output, settings.container_format.as_deref())?;
    let descriptor = StreamDescriptor::new(
        settings,
        info.width,
        info.height,
        info.frame_rate,
        writer.wants_global_header(),
    );
    let mut session = EncoderSession::open(registry, descriptor)?;
    let handle = writer.add_stream(&session)?;
    writer.write_header()?;

    let mut converter = PixelConverter::new(
        PictureSpec::new(info.pixel_format, info.width, info.height),
        PictureSpec::new(
            session.descriptor().pixel_format(),
            session.descriptor().width(),
            session.descriptor().height(),
        ),
        settings.scaling,
    )?;

    let mut report = TranscodeReport {
        frames_requested: max_frames,
        frames_available: info.frame_count,
        ..TranscodeReport::default()
    };

    for index in 0..frames {
        let Some(frame) = source.read()? else {
            log::warn!("source exhausted after {} of {} frames", index, frames);
            break;
        };
        let converted = converter.convert(&frame)?;
        let packets = session.submit(converted, index)?;
        report.frames_encoded += 1;
        report.packets_from_submit += packets.len() as u64;
        write_all(&mut writer, handle, packets)?;

        if (index + 1) % 100 == 0 {
            log::info!("{}/{} frames encoded", index + 1, frames);
        }
    }

    for packet in session.drain() {
        writer.write_packet(handle, packet?)?;
        report.packets_drained += 1;
    }

    writer.write_trailer()?;
    session.close();
    writer.close();

    report.packets_written = writer.packets_written();
    report.bytes_written = writer.bytes_written();
    log::info!(
        "{} frames encoded into {} ({} packets, {} bytes)",
        report.frames_encoded,
        output.display(),
        report.packets_written,
        report.bytes_written
    );
    Ok(report)
}

/// Opens `input` (a file, URL or device, optionally with a forced input
/// format) and runs [`run`] on it. Nothing is created at `output` when the
/// input cannot be opened.
pub fn transcode_file(
    registry: &Registry,
    input: &str,
    input_format: Option<&str>,
    output: &Path,
    max_frames: u64,
    settings: &EncodeSettings,
) -> Result<TranscodeReport> {
    let mut source = AvFrameSource::open(registry, input, input_format)?;
    run(registry, &mut source, output, max_frames, settings)
}

fn write_all(
    writer: &mut ContainerWriter,
    handle: StreamHandle,
    packets: Vec<EncodedPacket>,
) -> Result<()> {
    for packet in packets {
        writer.write_packet(handle, packet)?;
    }
    Ok(())
}

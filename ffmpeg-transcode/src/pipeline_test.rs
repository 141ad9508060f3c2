use std::path::Path;

use ffmpeg_next::{Rational, codec};

use crate::config::EncodeSettings;
use crate::error::{Result, TranscodeError};
use crate::frame::RawFrame;
use crate::input::AvFrameSource;
use crate::metadata::{count_packets, probe};
use crate::pipeline::{run, transcode_file};
use crate::registry::Registry;
use crate::source::{FrameSource, PatternSource, SourceInfo};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;

/// mpeg4 ships with every FFmpeg build, unlike libvpx.
fn mpeg4_settings() -> EncodeSettings {
    EncodeSettings {
        qmax: 31,
        ..EncodeSettings::default()
            .with_codec(codec::Id::MPEG4)
            .with_gop(12, 2)
    }
}

fn pattern(frames: u64) -> PatternSource {
    PatternSource::new(WIDTH, HEIGHT, Rational::new(25, 1), frames)
}

/// Counts the frames a decoder gets back out of `path`.
fn decoded_frames(registry: &Registry, path: &Path) -> anyhow::Result<u64> {
    let mut source = AvFrameSource::open(registry, &path.to_string_lossy(), None)?;
    let mut count = 0;
    while source.read()?.is_some() {
        count += 1;
    }
    Ok(count)
}

/// Claims more frames than it can deliver, like a container whose frame
/// count is only an estimate.
struct OverstatedSource {
    inner: PatternSource,
    claimed: u64,
}

impl FrameSource for OverstatedSource {
    fn info(&self) -> SourceInfo {
        SourceInfo {
            frame_count: Some(self.claimed),
            ..self.inner.info()
        }
    }

    fn read(&mut self) -> Result<Option<RawFrame>> {
        self.inner.read()
    }
}

/// Fails with a read error once `fail_at` frames have been delivered.
struct FailingSource {
    inner: PatternSource,
    fail_at: u64,
}

impl FrameSource for FailingSource {
    fn info(&self) -> SourceInfo {
        self.inner.info()
    }

    fn read(&mut self) -> Result<Option<RawFrame>> {
        if self.inner.frames_read() == self.fail_at {
            return Err(TranscodeError::SourceReadFailed {
                index: self.fail_at,
                reason: "device unplugged".to_string(),
            });
        }
        self.inner.read()
    }
}

#[test]
fn request_above_available_encodes_what_is_there() -> anyhow::Result<()> {
    let registry = Registry::new()?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("clamped.mkv");

    let mut source = pattern(250);
    let report = run(&registry, &mut source, &output, 300, &mpeg4_settings())?;

    assert_eq!(report.frames_requested, 300);
    assert_eq!(report.frames_available, Some(250));
    assert_eq!(report.frames_encoded, 250);
    assert_eq!(source.frames_read(), 250);
    assert_eq!(decoded_frames(&registry, &output)?, 250);
    Ok(())
}

#[test]
fn request_below_available_stops_early() -> anyhow::Result<()> {
    let registry = Registry::new()?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("short.mkv");

    let mut source = pattern(250);
    let report = run(&registry, &mut source, &output, 100, &mpeg4_settings())?;

    assert_eq!(report.frames_encoded, 100);
    assert_eq!(source.frames_read(), 100);
    assert_eq!(decoded_frames(&registry, &output)?, 100);
    Ok(())
}

#[test]
fn every_packet_reaches_the_container() -> anyhow::Result<()> {
    let registry = Registry::new()?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("count.mkv");

    let report = run(&registry, &mut pattern(40), &output, 40, &mpeg4_settings())?;

    assert_eq!(
        report.packets_from_submit + report.packets_drained,
        report.packets_written
    );
    assert_eq!(report.packets_written, 40);
    assert!(report.bytes_written > 0);
    assert_eq!(count_packets(&output, 0)?, report.packets_written);
    Ok(())
}

#[test]
fn output_round_trips_with_descriptor_dimensions() -> anyhow::Result<()> {
    let registry = Registry::new()?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("roundtrip.mkv");

    let report = run(&registry, &mut pattern(30), &output, 30, &mpeg4_settings())?;

    let info = probe(&output)?;
    assert_eq!(info.format.nb_streams, 1);
    let video: Vec<_> = info.video_streams().collect();
    assert_eq!(video.len(), 1);
    assert_eq!(video[0].codec_name, "mpeg4");
    assert_eq!((video[0].width, video[0].height), (Some(WIDTH), Some(HEIGHT)));
    assert_eq!(decoded_frames(&registry, &output)?, report.frames_encoded);
    Ok(())
}

#[test]
fn timestamps_never_go_backwards_without_b_frames() -> anyhow::Result<()> {
    let registry = Registry::new()?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("monotonic.mkv");
    let settings = EncodeSettings {
        qmax: 31,
        ..EncodeSettings::default()
            .with_codec(codec::Id::MPEG4)
            .with_gop(12, 0)
    };

    run(&registry, &mut pattern(25), &output, 25, &settings)?;

    let mut input = ffmpeg_next::format::input(&output)?;
    let mut last = None;
    let mut seen = 0;
    for (_, packet) in input.packets() {
        let pts = packet.pts().expect("muxed packet has a pts");
        if let Some(prev) = last {
            assert!(pts >= prev, "pts {} after {}", pts, prev);
        }
        last = Some(pts);
        seen += 1;
    }
    assert_eq!(seen, 25);
    Ok(())
}

#[test]
fn stateless_codec_needs_no_drain() -> anyhow::Result<()> {
    let registry = Registry::new()?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("raw.avi");
    let settings = EncodeSettings::default().with_codec(codec::Id::RAWVIDEO);

    let report = run(&registry, &mut pattern(5), &output, 5, &settings)?;

    assert_eq!(report.packets_drained, 0);
    assert_eq!(report.packets_from_submit, 5);
    assert_eq!(report.packets_written, 5);
    Ok(())
}

#[test]
fn overstated_frame_count_stops_at_exhaustion() -> anyhow::Result<()> {
    let registry = Registry::new()?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("overstated.mkv");
    let mut source = OverstatedSource {
        inner: pattern(12),
        claimed: 20,
    };

    let report = run(&registry, &mut source, &output, 50, &mpeg4_settings())?;

    assert_eq!(report.frames_available, Some(20));
    assert_eq!(report.frames_encoded, 12);
    assert_eq!(report.packets_written, 12);
    Ok(())
}

#[test]
fn unopenable_input_creates_no_output() -> anyhow::Result<()> {
    let registry = Registry::new()?;
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("missing.avi");
    let output = dir.path().join("never.mkv");

    let err = transcode_file(
        &registry,
        &input.to_string_lossy(),
        None,
        &output,
        10,
        &mpeg4_settings(),
    )
    .unwrap_err();

    assert!(matches!(err, TranscodeError::SourceOpenFailed { .. }), "{}", err);
    assert_eq!(err.stage(), "source");
    assert!(!output.exists());
    Ok(())
}

#[test]
fn read_failure_aborts_the_run() -> anyhow::Result<()> {
    let registry = Registry::new()?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("aborted.mkv");
    let mut source = FailingSource {
        inner: pattern(20),
        fail_at: 7,
    };

    let err = run(&registry, &mut source, &output, 20, &mpeg4_settings()).unwrap_err();

    assert!(
        matches!(err, TranscodeError::SourceReadFailed { index: 7, .. }),
        "{}",
        err
    );
    assert_eq!(err.stage(), "source");
    assert_eq!(source.inner.frames_read(), 7);
    // Partial output stays where it is.
    assert!(output.exists());
    Ok(())
}

#[test]
fn unwritable_output_fails_before_reading() -> anyhow::Result<()> {
    let registry = Registry::new()?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("no").join("such").join("dir.mkv");

    let mut source = pattern(10);
    let err = run(&registry, &mut source, &output, 10, &mpeg4_settings()).unwrap_err();

    assert!(matches!(err, TranscodeError::CannotOpenOutput { .. }), "{}", err);
    assert_eq!(err.stage(), "mux");
    assert_eq!(source.frames_read(), 0);
    Ok(())
}

#[test]
fn unknown_encoder_name_is_unsupported() -> anyhow::Result<()> {
    let registry = Registry::new()?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("unsupported.mkv");
    let settings = mpeg4_settings().with_encoder_name("no-such-encoder");

    let err = run(&registry, &mut pattern(3), &output, 3, &settings).unwrap_err();

    assert!(matches!(err, TranscodeError::UnsupportedCodec(_)), "{}", err);
    Ok(())
}

#[test]
fn zero_frames_writes_an_empty_stream() -> anyhow::Result<()> {
    let registry = Registry::new()?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("empty.mkv");

    let report = run(&registry, &mut pattern(10), &output, 0, &mpeg4_settings())?;

    assert_eq!(report.frames_encoded, 0);
    assert_eq!(report.packets_written, 0);
    assert!(output.exists());
    Ok(())
}

/// lavfi test picture: 2s at 10fps gives 20 frames even though 50 are asked for.
#[test]
fn lavfi_source_is_clamped() -> anyhow::Result<()> {
    let registry = Registry::new()?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("lavfi.avi");

    let report = transcode_file(
        &registry,
        "testsrc=duration=2:size=160x120:rate=10",
        Some("lavfi"),
        &output,
        50,
        &mpeg4_settings(),
    )?;

    assert_eq!(report.frames_encoded, 20);
    assert_eq!(decoded_frames(&registry, &output)?, 20);
    Ok(())
}

/// Default settings need libvpx, which not every FFmpeg build has.
#[test]
fn default_settings_write_vp8_webm() -> anyhow::Result<()> {
    let registry = Registry::new()?;
    let settings = EncodeSettings::default();
    if registry.find_encoder(settings.codec, None).is_err() {
        eprintln!("skip: no VP8 encoder in this FFmpeg build");
        return Ok(());
    }
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("out.webm");

    let report = run(&registry, &mut pattern(20), &output, 20, &settings)?;

    assert_eq!(report.frames_encoded, 20);
    let info = probe(&output)?;
    assert!(info.format.format_name.contains("webm") || info.format.format_name.contains("matroska"));
    assert_eq!(decoded_frames(&registry, &output)?, 20);
    Ok(())
}

use std::ffi::OsString;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use ffmpeg_transcode::{Registry, TranscodeError, metadata, transcode_file};

mod cli;

fn init_logging() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Warn)
        .filter_module("frame_transcoder", log::LevelFilter::Info)
        .filter_module("ffmpeg_transcode", log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

fn main() -> ExitCode {
    let args = match parse_args(std::env::args_os()) {
        Ok(args) => args,
        Err(status) => return ExitCode::from(status),
    };
    init_logging();
    ExitCode::from(exit_status(&run(&args)))
}

/// Parses the command line. On failure the usage or help text is printed and
/// the process status is returned: 0 for `--help`/`--version`, 1 otherwise.
fn parse_args<I, T>(argv: I) -> Result<cli::Args, u8>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    cli::Args::try_parse_from(argv).map_err(|e| {
        let _ = e.print();
        match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
            _ => 1,
        }
    })
}

/// Logs a failed run with its stage and maps it to the process status.
fn exit_status(result: &anyhow::Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            match e.downcast_ref::<TranscodeError>() {
                Some(err) => log::error!("{} failed: {}", err.stage(), err),
                None => log::error!("{:#}", e),
            }
            1
        }
    }
}

fn run(args: &cli::Args) -> anyhow::Result<()> {
    let registry = Registry::new()?;
    let report = transcode_file(
        &registry,
        &args.input,
        args.input_format.as_deref(),
        &args.output,
        args.frames,
        &args.settings(),
    )?;
    log::info!(
        "done: {} of {} requested frames, {} packets, {} bytes",
        report.frames_encoded,
        report.frames_requested,
        report.packets_written,
        report.bytes_written
    );

    match metadata::probe(&args.output) {
        Ok(info) => log::debug!("{}:\n{}", args.output.display(), info),
        Err(e) => log::warn!("cannot probe {}: {}", args.output.display(), e),
    }
    Ok(())
}

//! `sample_grabber`: stream raw MAX2769 samples from the FT232H FIFO to disk.
//!
//! Samples are 3-bit and saved one per byte as signed integers. End the
//! capture with Ctrl-C; queued samples are flushed before exit.

mod cli;
mod settings;

use std::fs::File;
use std::process::ExitCode;

use grabber_core::telemetry::TELEMETRY_TARGET;
use grabber_core::{CaptureSession, CaptureSummary, FtdiSource, StopReason};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Command;

#[tokio::main]
async fn main() -> ExitCode {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::new(log_filter(std::env::var("RUST_LOG").ok())))
        .init();

    let output = match cli::parse(std::env::args().skip(1)) {
        Command::Capture { output } => output,
        Command::Usage => {
            println!("{}", cli::USAGE);
            return ExitCode::FAILURE;
        }
    };

    let settings = match settings::load_settings(settings::settings_path().as_deref()) {
        Ok(s) => s,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    // ── Device ────────────────────────────────────────────────────────────
    let mut source = match FtdiSource::open(settings.usb.clone()) {
        Ok(source) => source,
        Err(e) => {
            error!("can't open ftdi device: {e}");
            return ExitCode::FAILURE;
        }
    };

    // ── Output file (capture continues without one if it can't be opened) ─
    let file = output.as_ref().and_then(|path| match File::create(path) {
        Ok(file) => {
            info!(path = %path.display(), "writing samples");
            Some(file)
        }
        Err(e) => {
            error!(path = %path.display(), "can't open output file: {e}");
            None
        }
    });

    let session = CaptureSession::new(settings.capture);
    let stop = session.stop_handle();

    // ── Ctrl-C → stop flag ────────────────────────────────────────────────
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => stop.request_stop(StopReason::UserInterrupt),
            Err(e) => warn!("can't listen for ctrl-c: {e}"),
        }
    });

    // The read loop blocks; keep it off the async executor. The device is
    // reset and released when `source` drops at the end of the closure.
    let outcome = tokio::task::spawn_blocking(move || session.run(&mut source, file)).await;

    match outcome {
        Ok(Ok(summary)) => {
            report_summary(&summary);
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            error!("capture failed: {e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("capture thread died unexpectedly: {e}");
            ExitCode::FAILURE
        }
    }
}

const DEFAULT_LOG_FILTER: &str = "grabber_app=info,grabber_core=info";

/// `RUST_LOG` (or the default), with the once-per-second telemetry line kept
/// at `info` unless the filter names its target explicitly.
fn log_filter(env: Option<String>) -> String {
    let base = env
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    if base.contains(TELEMETRY_TARGET) {
        base
    } else {
        format!("{base},{TELEMETRY_TARGET}=info")
    }
}

fn report_summary(summary: &CaptureSummary) {
    let stats = &summary.stats;
    info!(
        received_bytes = stats.bytes_received,
        saved_bytes = stats.bytes_saved,
        written_bytes = stats.bytes_written,
        dropouts = stats.dropouts,
        reason = ?summary.stop_reason,
        "capture summary"
    );
    if let Some(StopReason::HardwareOverflow { byte_offset }) = summary.stop_reason {
        warn!(
            byte_offset,
            "capture cut short by FIFO overflow; samples up to the offset are valid"
        );
    }
    if let Some(err) = &summary.write_error {
        warn!("output file is incomplete: {err}");
    }
}

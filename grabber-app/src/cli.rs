//! Command-line parsing: `sample_grabber [filename]`.

use std::path::PathBuf;

pub const USAGE: &str = "\
Usage: ./sample_grabber [filename]
       If some filename is given, write data read to that file. Progress
       information is printed each second. End sample capture with ^C.
Note : set_fifo_mode must be run before sample_grabber to configure the USB
       hardware on the device for FIFO mode. Run set_uart_mode after
       sample_grabber to set the device back to UART mode for normal
       operation.
Env  : SAMPLE_GRABBER_CONFIG=<file.json> overrides capture/USB settings,
       RUST_LOG controls log verbosity; the per-second progress line
       stays on unless RUST_LOG sets grabber_core::telemetry itself.";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// Capture, optionally saving samples to `output`.
    Capture { output: Option<PathBuf> },
    /// Print usage and exit non-zero.
    Usage,
}

/// Parse arguments (program name already skipped).
pub fn parse<I>(args: I) -> Command
where
    I: IntoIterator<Item = String>,
{
    let mut output: Option<PathBuf> = None;
    for arg in args {
        if arg.starts_with('-') {
            // -h, --help and anything unrecognised
            return Command::Usage;
        }
        if output.is_some() {
            return Command::Usage;
        }
        output = Some(PathBuf::from(arg));
    }
    Command::Capture { output }
}

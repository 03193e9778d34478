//! Throughput telemetry.
//!
//! The transfer source hands the acquisition loop a [`ProgressReport`] about
//! once per second. Each report becomes one line on the diagnostic stream:
//!
//! ```text
//!      12.00s total time    48.000 MiB captured  4096.0 kB/s curr rate  4096.0 kB/s totalrate 0 dropouts
//! ```

use serde::{Deserialize, Serialize};

/// Log target of the telemetry lines, for filter directives.
pub const TELEMETRY_TARGET: &str = "grabber_core::telemetry";

/// Progress snapshot produced by the transfer layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    /// Seconds since streaming started.
    pub elapsed_secs: f64,
    /// Bytes delivered by the device since streaming started.
    pub total_bytes: u64,
    /// Bytes delivered since the previous report.
    pub period_bytes: u64,
    /// Bytes per second over the last period.
    pub current_rate: f64,
    /// Bytes per second since streaming started.
    pub total_rate: f64,
}

/// Render one telemetry line.
pub fn format_telemetry_line(progress: &ProgressReport, dropouts: u64) -> String {
    format!(
        "{:10.2}s total time {:9.3} MiB captured {:7.1} kB/s curr rate {:7.1} kB/s totalrate {} dropouts",
        progress.elapsed_secs,
        progress.total_bytes as f64 / (1024.0 * 1024.0),
        progress.current_rate / 1024.0,
        progress.total_rate / 1024.0,
        dropouts,
    )
}

/// Emit one telemetry line to the diagnostic stream.
pub fn report(progress: &ProgressReport, dropouts: u64) {
    tracing::info!(
        target: TELEMETRY_TARGET,
        "{}",
        format_telemetry_line(progress, dropouts)
    );
}

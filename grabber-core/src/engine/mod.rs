//! `CaptureSession`: top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! CaptureSession::new(config)
//!     └─► stop_handle()        → Arc<CaptureState> for signal handlers
//!         └─► run(source, sink)
//!               ├─ queue created, writer thread spawned (only with a sink)
//!               ├─ source.stream(..) drives AcquisitionLoop until Flow::Stop
//!               ├─ producer dropped → queue closed
//!               └─ writer thread joined → sink flushed and dropped
//! ```
//!
//! ## Threading
//!
//! Two contexts only: the caller's thread (inside `source.stream`) and the
//! `sample-writer` thread. They share the byte queue and `CaptureState`,
//! nothing else.

pub mod acquisition;
pub mod persistence;
pub mod state;

use std::io::{BufWriter, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    buffering::{create_byte_queue, UNBOUNDED},
    error::{GrabberError, Result},
    source::TransferSource,
};

pub use acquisition::{AcquisitionLoop, WARM_UP_BYTES};
pub use persistence::{PersistenceWorker, WRITE_SLICE_BYTES};
pub use state::{CaptureState, CaptureStats, StopReason};

/// Output stream buffer, matching a 64 KiB fully buffered file.
pub const WRITE_BUFFER_BYTES: usize = 1 << 16;

/// Configuration for `CaptureSession`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct CaptureConfig {
    /// Device bytes discarded before capture starts. Default: 50 000.
    pub warm_up_bytes: u64,
    /// Bytes moved from the queue to the file per write. Default: 50.
    pub write_slice_bytes: usize,
    /// Queue bound in bytes; `0` is unbounded so acquisition never waits on
    /// the disk. Default: 0.
    pub queue_capacity: usize,
    /// `BufWriter` capacity for the output file. Default: 64 KiB.
    pub write_buffer_bytes: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            warm_up_bytes: WARM_UP_BYTES,
            write_slice_bytes: WRITE_SLICE_BYTES,
            queue_capacity: UNBOUNDED,
            write_buffer_bytes: WRITE_BUFFER_BYTES,
        }
    }
}

impl CaptureConfig {
    pub fn normalize(&mut self) {
        self.write_slice_bytes = self.write_slice_bytes.clamp(1, 1 << 20);
        self.write_buffer_bytes = self.write_buffer_bytes.clamp(512, 1 << 26);
    }
}

/// Outcome of a finished session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSummary {
    pub stats: CaptureStats,
    pub stop_reason: Option<StopReason>,
    /// Set when the writer thread failed; samples before the failure are on disk.
    pub write_error: Option<String>,
}

/// One capture run: acquisition on the caller's thread, persistence on its own.
pub struct CaptureSession {
    config: CaptureConfig,
    state: Arc<CaptureState>,
}

impl CaptureSession {
    pub fn new(mut config: CaptureConfig) -> Self {
        config.normalize();
        Self {
            config,
            state: Arc::new(CaptureState::new()),
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Shared state; call `request_stop` on it from a signal handler.
    pub fn stop_handle(&self) -> Arc<CaptureState> {
        Arc::clone(&self.state)
    }

    /// Stream from `source` until it stops, writing decoded samples to `sink`.
    ///
    /// With `sink = None` the session only measures throughput and watches the
    /// FIFO error bit.
    ///
    /// # Errors
    /// Spawning the writer thread, a panic on it, or a transfer failure that
    /// happened while no stop had been requested.
    pub fn run<S, W>(self, source: &mut S, sink: Option<W>) -> Result<CaptureSummary>
    where
        S: TransferSource + ?Sized,
        W: Write + Send + 'static,
    {
        let state = self.state;
        let config = self.config;

        let (producer, writer) = match sink {
            Some(sink) => {
                let (producer, consumer) = create_byte_queue(config.queue_capacity);
                let sink = BufWriter::with_capacity(config.write_buffer_bytes, sink);
                let handle = PersistenceWorker::new(
                    consumer,
                    sink,
                    Arc::clone(&state),
                    config.write_slice_bytes,
                )
                .spawn()?;
                (Some(producer), Some(handle))
            }
            None => {
                info!("no output file, samples are checked but not saved");
                (None, None)
            }
        };

        info!(
            warm_up_bytes = config.warm_up_bytes,
            queue_capacity = config.queue_capacity,
            "capture started"
        );

        let mut acquisition =
            AcquisitionLoop::new(Arc::clone(&state), producer, config.warm_up_bytes);
        let streamed =
            source.stream(&mut |buffer, progress| acquisition.on_data(buffer, progress));
        acquisition.finish();

        if streamed.is_ok() && !state.is_stop_requested() {
            state.request_stop(StopReason::TransferEnded);
        }

        let write_error = match writer {
            Some(handle) => match handle.join() {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => {
                    state.request_stop(StopReason::WriteFailed);
                    return Err(GrabberError::Other(anyhow::anyhow!(
                        "writer thread died unexpectedly"
                    )));
                }
            },
            None => None,
        };

        let summary = CaptureSummary {
            stats: state.snapshot(),
            stop_reason: state.stop_reason(),
            write_error,
        };
        info!(
            received = summary.stats.bytes_received,
            saved = summary.stats.bytes_saved,
            written = summary.stats.bytes_written,
            "Capture ended."
        );

        match streamed {
            Ok(()) => Ok(summary),
            Err(e) if summary.stop_reason.is_some() => {
                warn!("transfer ended with error after stop request: {e}");
                Ok(summary)
            }
            Err(e) => Err(e),
        }
    }
}

//! Transfer sources: the USB streaming layer as seen from the pipeline.
//!
//! A [`TransferSource`] owns the blocking read-and-dispatch loop and calls a
//! sink for every burst of device bytes. Progress snapshots are delivered as
//! separate calls with an empty buffer, at most once per [`PROGRESS_INTERVAL`].
//! The sink's [`Flow`] return value is the only way to halt the loop.

pub mod ftdi;

use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

use crate::{error::Result, telemetry::ProgressReport};

pub use ftdi::{FtdiSource, UsbConfig};

/// Default spacing between progress snapshots.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Continuation signal returned by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

impl Flow {
    pub fn is_stop(self) -> bool {
        self == Flow::Stop
    }
}

/// Per-burst callback: `(bytes, progress) -> Flow`.
pub type DataSink<'a> = dyn FnMut(&[u8], Option<&ProgressReport>) -> Flow + 'a;

/// Something that streams device bytes into a sink until told to stop.
pub trait TransferSource {
    /// Run the read loop, blocking the calling thread.
    ///
    /// Returns `Ok(())` when the sink asked to stop or the stream ended.
    fn stream(&mut self, sink: &mut DataSink<'_>) -> Result<()>;
}

/// Turns a running byte count into periodic [`ProgressReport`]s.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    interval: Duration,
    started: Instant,
    last_report: Instant,
    last_total: u64,
    total: u64,
}

impl ProgressTracker {
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    pub fn starting_at(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            started: now,
            last_report: now,
            last_total: 0,
            total: 0,
        }
    }

    /// Account for `n` freshly received bytes.
    pub fn record(&mut self, n: usize) {
        self.total = self.total.saturating_add(n as u64);
    }

    /// Produce a report if at least one interval has passed since the last one.
    pub fn poll(&mut self) -> Option<ProgressReport> {
        self.poll_at(Instant::now())
    }

    pub fn poll_at(&mut self, now: Instant) -> Option<ProgressReport> {
        let period = now.saturating_duration_since(self.last_report);
        if period < self.interval {
            return None;
        }

        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        let period_bytes = self.total - self.last_total;
        let report = ProgressReport {
            elapsed_secs: elapsed,
            total_bytes: self.total,
            period_bytes,
            current_rate: rate(period_bytes, period.as_secs_f64()),
            total_rate: rate(self.total, elapsed),
        };

        self.last_report = now;
        self.last_total = self.total;
        Some(report)
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(PROGRESS_INTERVAL)
    }
}

fn rate(bytes: u64, secs: f64) -> f64 {
    if secs > 0.0 {
        bytes as f64 / secs
    } else {
        0.0
    }
}

/// Streams bytes from any [`Read`], e.g. a replayed raw capture.
pub struct ReaderSource<R> {
    reader: R,
    chunk_bytes: usize,
    progress: ProgressTracker,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R, chunk_bytes: usize) -> Self {
        Self {
            reader,
            chunk_bytes: chunk_bytes.max(1),
            progress: ProgressTracker::default(),
        }
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress = ProgressTracker::new(interval);
        self
    }
}

impl<R: Read> TransferSource for ReaderSource<R> {
    fn stream(&mut self, sink: &mut DataSink<'_>) -> Result<()> {
        let mut buf = vec![0u8; self.chunk_bytes];
        loop {
            let n = match self.reader.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            self.progress.record(n);
            if sink(&buf[..n], None).is_stop() {
                return Ok(());
            }
            if let Some(report) = self.progress.poll() {
                if sink(&[], Some(&report)).is_stop() {
                    return Ok(());
                }
            }
        }
    }
}

//! Disk-writer thread: drains the sample queue into the output file.

use std::io::{self, Write};
use std::sync::{atomic::Ordering, Arc};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info};

use super::state::{CaptureState, StopReason};
use crate::{buffering::ByteConsumer, error::Result};

/// Bytes popped from the queue per write.
pub const WRITE_SLICE_BYTES: usize = 50;

pub struct PersistenceWorker<W> {
    consumer: ByteConsumer,
    writer: W,
    state: Arc<CaptureState>,
    slice_bytes: usize,
}

impl<W: Write> PersistenceWorker<W> {
    pub fn new(
        consumer: ByteConsumer,
        writer: W,
        state: Arc<CaptureState>,
        slice_bytes: usize,
    ) -> Self {
        Self {
            consumer,
            writer,
            state,
            slice_bytes: slice_bytes.max(1),
        }
    }

    /// Write until the queue reports end-of-stream, then flush.
    ///
    /// A stop request does not end the loop: whatever was queued before the
    /// producer closed is still written. A write or flush failure sets the stop
    /// flag and ends the loop immediately.
    ///
    /// Returns the number of bytes written.
    pub fn run(mut self) -> Result<u64> {
        info!(slice_bytes = self.slice_bytes, "persistence worker started");

        let mut buf = vec![0u8; self.slice_bytes];
        let mut written = 0u64;
        let mut draining = false;

        loop {
            if !draining && self.state.is_stop_requested() {
                draining = true;
                debug!(queued = self.consumer.len(), "stop requested, draining queue");
            }

            let n = self.consumer.pop(&mut buf);
            if n == 0 {
                break;
            }

            if let Err(e) = self.writer.write_all(&buf[..n]) {
                return Err(self.fail(e, written));
            }
            written += n as u64;
            self.state
                .bytes_written
                .fetch_add(n as u64, Ordering::Relaxed);
        }

        if let Err(e) = self.writer.flush() {
            return Err(self.fail(e, written));
        }

        info!(bytes = written, "persistence worker finished");
        Ok(written)
    }

    fn fail(&self, e: io::Error, written: u64) -> crate::error::GrabberError {
        error!(written, "write error: {e}");
        self.state.request_stop(StopReason::WriteFailed);
        e.into()
    }
}

impl<W: Write + Send + 'static> PersistenceWorker<W> {
    /// Run on a dedicated, named OS thread.
    pub fn spawn(self) -> io::Result<JoinHandle<Result<u64>>> {
        thread::Builder::new()
            .name("sample-writer".into())
            .spawn(move || self.run())
    }
}

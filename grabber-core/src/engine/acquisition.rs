//! Per-burst acquisition callback.
//!
//! ## Per invocation
//!
//! ```text
//! 1. Count every received byte (bytes_received)
//! 2. Drop bytes until bytes_received passes the warm-up threshold
//! 3. Decode each live byte; a cleared FIFO bit sets the stop flag and that
//!    byte is skipped, the rest of the burst is still decoded
//! 4. Push the decoded samples to the queue (bytes_saved)
//! 5. Emit a telemetry line if a progress report came along
//! 6. Return Flow::Stop once the stop flag is set
//! ```
//!
//! A burst that arrives after the stop flag is set was already read from the
//! device, so it is decoded and queued like any other. The flag only decides
//! the returned [`Flow`].
//!
//! Runs on the transfer layer's thread. It never touches the disk; the only
//! blocking point is `push` on a bounded queue.

use std::sync::{atomic::Ordering, Arc};

use tracing::{error, info};

use super::state::{CaptureState, StopReason};
use crate::{
    buffering::ByteProducer,
    decode::{decode, SAMPLES_PER_BYTE},
    source::Flow,
    telemetry::{self, ProgressReport},
};

/// Device bytes discarded at startup to flush stale FIFO contents.
pub const WARM_UP_BYTES: u64 = 50_000;

pub struct AcquisitionLoop {
    state: Arc<CaptureState>,
    /// `None` when capturing without an output file.
    producer: Option<ByteProducer>,
    warm_up_bytes: u64,
    /// Device bytes seen since warm-up, flagged bytes included.
    live_bytes: u64,
    warmed_up: bool,
    /// Reset at the start of every burst.
    scratch: Vec<u8>,
}

impl AcquisitionLoop {
    pub fn new(
        state: Arc<CaptureState>,
        producer: Option<ByteProducer>,
        warm_up_bytes: u64,
    ) -> Self {
        Self {
            state,
            producer,
            warm_up_bytes,
            live_bytes: 0,
            warmed_up: warm_up_bytes == 0,
            scratch: Vec::new(),
        }
    }

    /// Handle one callback from the transfer layer.
    pub fn on_data(&mut self, buffer: &[u8], progress: Option<&ProgressReport>) -> Flow {
        if !buffer.is_empty() {
            self.ingest(buffer);
        }

        if let Some(progress) = progress {
            telemetry::report(progress, self.state.dropouts.load(Ordering::Relaxed));
        }

        if self.state.is_stop_requested() {
            Flow::Stop
        } else {
            Flow::Continue
        }
    }

    /// Release the producer, which closes the queue for the consumer.
    pub fn finish(self) {
        drop(self);
    }

    fn ingest(&mut self, buffer: &[u8]) {
        let received_before = self
            .state
            .bytes_received
            .fetch_add(buffer.len() as u64, Ordering::Relaxed);

        let skip = self
            .warm_up_bytes
            .saturating_sub(received_before)
            .min(buffer.len() as u64) as usize;
        let live = &buffer[skip..];
        if live.is_empty() {
            return;
        }
        if !self.warmed_up {
            self.warmed_up = true;
            info!(discarded = self.warm_up_bytes, "warm-up complete, capturing samples");
        }

        self.scratch.clear();
        self.scratch.reserve(live.len() * SAMPLES_PER_BYTE);
        let mut decoded = 0usize;
        for (i, &byte) in live.iter().enumerate() {
            let pair = decode(byte);
            if pair.fifo_error {
                let byte_offset = self.live_bytes + i as u64;
                self.state.dropouts.fetch_add(1, Ordering::Relaxed);
                error!(
                    byte_offset,
                    sample_offset = byte_offset * SAMPLES_PER_BYTE as u64,
                    "FPGA FIFO error flag, samples are no longer contiguous"
                );
                self.state
                    .request_stop(StopReason::HardwareOverflow { byte_offset });
                continue;
            }
            self.scratch.extend_from_slice(&pair.to_bytes());
            decoded += 1;
        }
        self.live_bytes += live.len() as u64;

        if decoded == 0 {
            return;
        }
        let Some(producer) = self.producer.as_mut() else {
            return;
        };
        match producer.push(&self.scratch) {
            Ok(()) => {
                self.state
                    .bytes_saved
                    .fetch_add(decoded as u64, Ordering::Relaxed);
            }
            Err(e) => {
                error!("dropping {} decoded bytes: {e}", self.scratch.len());
                self.state.request_stop(StopReason::WriteFailed);
            }
        }
    }
}

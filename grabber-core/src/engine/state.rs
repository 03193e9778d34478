//! Process-wide capture state shared by the acquisition and persistence threads.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Why the session stopped. The first recorded reason wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "kind")]
pub enum StopReason {
    /// Ctrl-C or an equivalent external request.
    UserInterrupt,
    /// The FPGA cleared the FIFO status bit; `byte_offset` counts saved device bytes.
    HardwareOverflow { byte_offset: u64 },
    /// Writing the output file failed.
    WriteFailed,
    /// The transfer source returned on its own.
    TransferEnded,
}

/// Stop flag plus monotonic counters.
///
/// Shared as `Arc<CaptureState>`. The stop flag never clears once set.
pub struct CaptureState {
    stop: AtomicBool,
    reason: Mutex<Option<StopReason>>,
    pub bytes_received: AtomicU64,
    pub bytes_saved: AtomicU64,
    pub bytes_written: AtomicU64,
    pub dropouts: AtomicU64,
}

impl Default for CaptureState {
    fn default() -> Self {
        Self {
            stop: AtomicBool::new(false),
            reason: Mutex::new(None),
            bytes_received: AtomicU64::new(0),
            bytes_saved: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            dropouts: AtomicU64::new(0),
        }
    }
}

impl CaptureState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stop flag, recording `reason` if none was recorded yet.
    pub fn request_stop(&self, reason: StopReason) {
        {
            let mut recorded = self.reason.lock();
            if recorded.is_none() {
                info!(?reason, "stop requested");
                *recorded = Some(reason);
            }
        }
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        *self.reason.lock()
    }

    pub fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_saved: self.bytes_saved.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            dropouts: self.dropouts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStats {
    /// Every byte seen from the device, warm-up included.
    pub bytes_received: u64,
    /// Device bytes decoded and queued (each yields two output bytes).
    pub bytes_saved: u64,
    /// Output bytes written to the sink.
    pub bytes_written: u64,
    /// FIFO overflow flags observed.
    pub dropouts: u64,
}

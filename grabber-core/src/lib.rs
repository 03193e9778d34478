//! # grabber-core
//!
//! Streams 3-bit RF samples from the MAX2769 front-end FIFO to disk.
//!
//! ## Architecture
//!
//! ```text
//! USB bulk IN → TransferSource::stream ─► AcquisitionLoop::on_data
//!                                              │  warm-up discard
//!                                              │  decode + FIFO error check
//!                                              ▼
//!                                        ByteProducer ══ byte queue ══ ByteConsumer
//!                                                                          │
//!                                                              PersistenceWorker (thread)
//!                                                                          │
//!                                                                     output file
//! ```
//!
//! Both stages watch one stop flag in `CaptureState`. Ctrl-C, a FIFO overflow
//! or a write error set it; the writer still drains what was queued.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod buffering;
pub mod decode;
pub mod engine;
pub mod error;
pub mod source;
pub mod telemetry;

// Convenience re-exports for downstream crates
pub use decode::{decode, DecodedSamplePair};
pub use engine::{CaptureConfig, CaptureSession, CaptureState, CaptureSummary, StopReason};
pub use error::GrabberError;
pub use source::{Flow, FtdiSource, ReaderSource, TransferSource, UsbConfig};
pub use telemetry::ProgressReport;

//! FT232H synchronous-FIFO streaming via `rusb`.
//!
//! The FPGA pushes sample bytes into the FT232H FIFO. Every 512-byte bulk
//! packet on the IN endpoint begins with two modem-status bytes that carry no
//! sample data; [`strip_status_bytes`] removes them before the payload reaches
//! the sink.
//!
//! The device must already be switched to FIFO mode (EEPROM setting). This
//! module only opens, configures and reads it, and leaves it in reset bit
//! mode on drop.

#[cfg(feature = "ftdi")]
use std::time::Duration;

#[cfg(feature = "ftdi")]
use rusb::{Direction, GlobalContext, Recipient, RequestType};
use serde::{Deserialize, Serialize};
#[cfg(feature = "ftdi")]
use tracing::{debug, info, warn};

#[cfg(feature = "ftdi")]
use super::ProgressTracker;
use super::{DataSink, TransferSource};
use crate::error::{GrabberError, Result};

/// FTDI vendor requests and interface A addressing.
#[cfg(feature = "ftdi")]
mod sio {
    use std::time::Duration;

    pub const RESET: u8 = 0x00;
    pub const SET_LATENCY_TIMER: u8 = 0x09;
    pub const SET_BITMODE: u8 = 0x0b;
    pub const RESET_PURGE_RX: u16 = 1;
    pub const BITMODE_RESET: u8 = 0x00;

    /// USB interface 0, FTDI port index 1, bulk IN endpoint 0x81.
    pub const INTERFACE_NUMBER: u8 = 0;
    pub const PORT_INDEX: u16 = 1;
    pub const ENDPOINT_IN: u8 = 0x81;

    pub const CONTROL_TIMEOUT: Duration = Duration::from_millis(500);
}

/// High-speed bulk packet size.
pub const PACKET_SIZE: usize = 512;
/// Modem-status prefix on every packet.
pub const STATUS_BYTES: usize = 2;

/// USB-level settings for the capture device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct UsbConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    /// FTDI latency timer in ms. A value of 1 drops blocks.
    pub latency_timer_ms: u8,
    /// Bytes requested per bulk read (whole packets).
    pub read_chunk_bytes: usize,
    pub read_timeout_ms: u64,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            vendor_id: 0x0403,
            product_id: 0x8398,
            latency_timer_ms: 2,
            read_chunk_bytes: 8 * PACKET_SIZE,
            read_timeout_ms: 100,
        }
    }
}

impl UsbConfig {
    pub fn normalize(&mut self) {
        self.latency_timer_ms = self.latency_timer_ms.clamp(2, 255);
        let packets = (self.read_chunk_bytes / PACKET_SIZE).clamp(1, 1024);
        self.read_chunk_bytes = packets * PACKET_SIZE;
        self.read_timeout_ms = self.read_timeout_ms.clamp(10, 5_000);
    }
}

/// Copy the payload of each packet in `raw` into `out`, dropping status bytes.
pub fn strip_status_bytes(raw: &[u8], out: &mut Vec<u8>) {
    out.clear();
    for packet in raw.chunks(PACKET_SIZE) {
        if packet.len() > STATUS_BYTES {
            out.extend_from_slice(&packet[STATUS_BYTES..]);
        }
    }
}

/// An open, configured FT232H streaming handle.
#[cfg(feature = "ftdi")]
pub struct FtdiSource {
    handle: rusb::DeviceHandle<GlobalContext>,
    config: UsbConfig,
}

#[cfg(feature = "ftdi")]
impl FtdiSource {
    /// Open and configure the device.
    ///
    /// # Errors
    /// `GrabberError::DeviceNotFound` when no device matches the ids, or
    /// `GrabberError::DeviceSetup` when claiming or configuring it fails.
    pub fn open(config: UsbConfig) -> Result<Self> {
        let mut handle = rusb::open_device_with_vid_pid(config.vendor_id, config.product_id).ok_or(
            GrabberError::DeviceNotFound {
                vendor_id: config.vendor_id,
                product_id: config.product_id,
            },
        )?;

        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            debug!("kernel driver auto-detach unavailable: {e}");
        }
        handle
            .claim_interface(sio::INTERFACE_NUMBER)
            .map_err(|e| GrabberError::DeviceSetup(format!("can't claim interface: {e}")))?;

        let source = Self { handle, config };
        source
            .control(sio::SET_LATENCY_TIMER, source.config.latency_timer_ms as u16)
            .map_err(|e| GrabberError::DeviceSetup(format!("can't set latency: {e}")))?;
        source
            .set_bitmode(sio::BITMODE_RESET)
            .map_err(|e| GrabberError::DeviceSetup(format!("can't reset bit mode: {e}")))?;
        source
            .control(sio::RESET, sio::RESET_PURGE_RX)
            .map_err(|e| GrabberError::DeviceSetup(format!("can't rx purge: {e}")))?;

        info!(
            vendor_id = source.config.vendor_id,
            product_id = source.config.product_id,
            latency_ms = source.config.latency_timer_ms,
            "FIFO device opened"
        );
        Ok(source)
    }

    fn control(&self, request: u8, value: u16) -> rusb::Result<usize> {
        let request_type =
            rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device);
        self.handle.write_control(
            request_type,
            request,
            value,
            sio::PORT_INDEX,
            &[],
            sio::CONTROL_TIMEOUT,
        )
    }

    fn set_bitmode(&self, mode: u8) -> rusb::Result<usize> {
        self.control(sio::SET_BITMODE, ((mode as u16) << 8) | 0x00ff)
    }
}

#[cfg(feature = "ftdi")]
impl TransferSource for FtdiSource {
    fn stream(&mut self, sink: &mut DataSink<'_>) -> Result<()> {
        let timeout = Duration::from_millis(self.config.read_timeout_ms);
        let mut raw = vec![0u8; self.config.read_chunk_bytes];
        let mut payload = Vec::with_capacity(self.config.read_chunk_bytes);
        let mut progress = ProgressTracker::default();

        loop {
            match self.handle.read_bulk(sio::ENDPOINT_IN, &mut raw, timeout) {
                Ok(n) => {
                    strip_status_bytes(&raw[..n], &mut payload);
                    progress.record(payload.len());
                    if sink(&payload, None).is_stop() {
                        return Ok(());
                    }
                }
                // No data this round; still give the sink a chance to stop.
                Err(rusb::Error::Timeout) => {
                    if sink(&[], None).is_stop() {
                        return Ok(());
                    }
                }
                Err(e) => return Err(GrabberError::Transfer(e.to_string())),
            }

            if let Some(report) = progress.poll() {
                if sink(&[], Some(&report)).is_stop() {
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(feature = "ftdi")]
impl Drop for FtdiSource {
    fn drop(&mut self) {
        if let Err(e) = self.set_bitmode(sio::BITMODE_RESET) {
            warn!("can't reset bit mode on close: {e}");
        }
        if let Err(e) = self.handle.release_interface(sio::INTERFACE_NUMBER) {
            warn!("can't release interface: {e}");
        }
        info!("FIFO device released");
    }
}

/// Stub when the `ftdi` feature is disabled.
#[cfg(not(feature = "ftdi"))]
pub struct FtdiSource {
    _private: (),
}

#[cfg(not(feature = "ftdi"))]
impl FtdiSource {
    pub fn open(_config: UsbConfig) -> Result<Self> {
        Err(GrabberError::DeviceSetup("compiled without ftdi feature".into()))
    }
}

#[cfg(not(feature = "ftdi"))]
impl TransferSource for FtdiSource {
    fn stream(&mut self, _sink: &mut DataSink<'_>) -> Result<()> {
        Err(GrabberError::DeviceSetup("compiled without ftdi feature".into()))
    }
}

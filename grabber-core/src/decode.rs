//! Sample decoding for the MAX2769 FIFO byte format.
//!
//! Each device byte packs two 3-bit sign-magnitude samples plus a status bit:
//!
//! ```text
//!  bit  7 6 5 | 4 3 2 | 1      | 0
//!       smp 0 | smp 1 | unused | FIFO error (active low)
//! ```
//!
//! Samples are `{sign, msb mag, lsb mag}` and index [`SIGNMAG_TABLE`] directly,
//! so the hot path is two shifts, two masks and two loads per byte.

/// Sign-magnitude code → signed sample value.
pub const SIGNMAG_TABLE: [i8; 8] = [1, 3, 5, 7, -1, -3, -5, -7];

/// Number of output samples produced per device byte.
pub const SAMPLES_PER_BYTE: usize = 2;

/// One device byte after decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedSamplePair {
    pub sample0: i8,
    pub sample1: i8,
    /// The FPGA reported a FIFO overflow. Samples around this byte are not contiguous.
    pub fifo_error: bool,
}

impl DecodedSamplePair {
    /// The two samples in output byte order.
    #[inline]
    pub fn to_bytes(self) -> [u8; SAMPLES_PER_BYTE] {
        [self.sample0 as u8, self.sample1 as u8]
    }
}

/// Returns true when the active-low FIFO error bit is asserted.
#[inline]
pub fn fifo_error(byte: u8) -> bool {
    byte & 0x01 == 0
}

/// Decode one raw device byte. Every input byte is valid.
#[inline]
pub fn decode(byte: u8) -> DecodedSamplePair {
    DecodedSamplePair {
        sample0: SIGNMAG_TABLE[((byte >> 5) & 0x07) as usize],
        sample1: SIGNMAG_TABLE[((byte >> 2) & 0x07) as usize],
        fifo_error: fifo_error(byte),
    }
}

use std::time::Duration;

use crate::cursor::ByteCursor;
use crate::error::FieldContext;
use crate::Result;

/// System clock frequency (27 MHz).
pub const SYSTEM_CLOCK_HZ: u64 = 27_000_000;
/// PTS/DTS and PCR base frequency (90 kHz).
pub const TIMESTAMP_HZ: u64 = 90_000;

const BASE_MASK: u64 = 0x1_FFFF_FFFF;
const EXTENSION_MASK: u64 = 0x1FF;

/// Split base/extension clock value.
///
/// PCR and OPCR carry a 33-bit base @ 90 kHz and a 9-bit extension @ 27 MHz.
/// PTS and DTS only use the 33-bit base; their extension is always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClockReference {
    pub base: u64,
    pub extension: u64,
}

impl ClockReference {
    pub fn new(base: u64, extension: u64) -> Self {
        Self { base, extension }
    }

    /// A PTS/DTS-style reference with no extension.
    pub fn from_timestamp(base: u64) -> Self {
        Self { base, extension: 0 }
    }

    /// Decode a 6-byte PCR/OPCR field.
    ///
    /// Layout: `[base(33) | reserved(6) | extension(9)]`, big-endian.
    pub fn from_pcr_bytes(data: &[u8; 6]) -> Self {
        let raw = data
            .iter()
            .fold(0u64, |acc, &byte| (acc << 8) | byte as u64);
        Self {
            base: raw >> 15,
            extension: raw & EXTENSION_MASK,
        }
    }

    /// Decode a 5-byte PTS/DTS field.
    ///
    /// Layout: `[prefix(4) | ts32..30 | 1 | ts29..15 | 1 | ts14..0 | 1]`. Only the
    /// low 3 bits above the first marker carry timestamp data, so whatever the
    /// prefix nibble holds is ignored.
    pub fn from_timestamp_bytes(data: &[u8; 5]) -> Self {
        let base = (((data[0] as u64 >> 1) & 0x07) << 30)
            | ((data[1] as u64) << 22)
            | (((data[2] as u64 >> 1) & 0x7F) << 15)
            | ((data[3] as u64) << 7)
            | ((data[4] as u64 >> 1) & 0x7F);
        Self::from_timestamp(base)
    }

    pub(crate) fn read_pcr(cursor: &mut ByteCursor<'_>, field: &'static str) -> Result<Self> {
        cursor
            .next_array::<6>()
            .field(field)
            .map(Self::from_pcr_bytes)
    }

    pub(crate) fn read_timestamp(cursor: &mut ByteCursor<'_>, field: &'static str) -> Result<Self> {
        cursor
            .next_array::<5>()
            .field(field)
            .map(Self::from_timestamp_bytes)
    }

    /// Encode as a 6-byte PCR field, reserved bits set to one.
    pub fn to_pcr_bytes(&self) -> [u8; 6] {
        let raw = ((self.base & BASE_MASK) << 15) | (0x3F << 9) | (self.extension & EXTENSION_MASK);
        let bytes = raw.to_be_bytes();
        [bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]]
    }

    /// Encode the base as a 5-byte PTS/DTS field with the low four bits of
    /// `prefix` in the top nibble.
    pub fn to_timestamp_bytes(&self, prefix: u8) -> [u8; 5] {
        let ts = self.base & BASE_MASK;
        [
            ((prefix & 0x0F) << 4) | (((ts >> 30) as u8 & 0x07) << 1) | 0x01,
            (ts >> 22) as u8,
            (((ts >> 15) as u8 & 0x7F) << 1) | 0x01,
            (ts >> 7) as u8,
            (((ts as u8) & 0x7F) << 1) | 0x01,
        ]
    }

    /// Full value in 27 MHz ticks. Bits outside the 33-bit base and 9-bit
    /// extension are ignored.
    pub fn as_27mhz(&self) -> u64 {
        (self.base & BASE_MASK) * 300 + (self.extension & EXTENSION_MASK)
    }

    /// PCR/OPCR time in seconds.
    pub fn pcr_seconds(&self) -> f64 {
        self.as_27mhz() as f64 / SYSTEM_CLOCK_HZ as f64
    }

    /// PTS/DTS time in seconds; the extension is ignored.
    pub fn timestamp_seconds(&self) -> f64 {
        self.base as f64 / TIMESTAMP_HZ as f64
    }

    pub fn pcr_duration(&self) -> Duration {
        let ticks = self.as_27mhz();
        Duration::new(
            ticks / SYSTEM_CLOCK_HZ,
            ((ticks % SYSTEM_CLOCK_HZ) * 1_000 / 27) as u32,
        )
    }
}

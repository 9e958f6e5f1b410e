use bytes::Bytes;

use crate::adaptation_field::AdaptationField;
use crate::cursor::ByteCursor;
use crate::error::FieldContext;
use crate::{Result, TsError};

/// Size of a transport stream packet.
pub const PACKET_SIZE: usize = 188;

/// Sync byte that starts every packet.
pub const SYNC_BYTE: u8 = 0x47;

/// PAT PID (always 0x0000)
pub const PID_PAT: u16 = 0x0000;

/// CAT PID (always 0x0001)
pub const PID_CAT: u16 = 0x0001;

/// NULL PID (always 0x1FFF)
pub const PID_NULL: u16 = 0x1FFF;

/// Largest value a 13-bit PID can take.
pub const PID_MAX: u16 = 0x1FFF;

/// Number of distinct PIDs.
pub const PID_SPACE: usize = PID_MAX as usize + 1;

/// Size of the fixed header, sync byte included.
pub const HEADER_SIZE: usize = 4;

/// Transport packet header (the three bytes after the sync byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketHeader {
    pub transport_error_indicator: bool,
    pub payload_unit_start_indicator: bool,
    pub transport_priority: bool,
    /// Packet Identifier
    pub pid: u16,
    pub transport_scrambling_control: u8,
    /// `01` payload only, `10` adaptation field only, `11` both.
    pub adaptation_field_control: u8,
    pub continuity_counter: u8,
}

impl PacketHeader {
    /// Decode the three header bytes following the sync byte.
    pub fn decode(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let bytes = cursor.next_array::<3>().field("header")?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn from_bytes(bytes: &[u8; 3]) -> Self {
        let [byte1, byte2, byte3] = *bytes;
        PacketHeader {
            transport_error_indicator: (byte1 & 0x80) != 0,
            payload_unit_start_indicator: (byte1 & 0x40) != 0,
            transport_priority: (byte1 & 0x20) != 0,
            pid: ((byte1 as u16 & 0x1F) << 8) | byte2 as u16,
            transport_scrambling_control: (byte3 >> 6) & 0x03,
            adaptation_field_control: (byte3 >> 4) & 0x03,
            continuity_counter: byte3 & 0x0F,
        }
    }

    pub fn to_bytes(&self) -> Result<[u8; 3]> {
        if self.pid > PID_MAX {
            return Err(TsError::InvalidPid(self.pid));
        }
        let mut byte1 = (self.pid >> 8) as u8 & 0x1F;
        if self.transport_error_indicator {
            byte1 |= 0x80;
        }
        if self.payload_unit_start_indicator {
            byte1 |= 0x40;
        }
        if self.transport_priority {
            byte1 |= 0x20;
        }
        let byte3 = ((self.transport_scrambling_control & 0x03) << 6)
            | ((self.adaptation_field_control & 0x03) << 4)
            | (self.continuity_counter & 0x0F);
        Ok([byte1, self.pid as u8, byte3])
    }

    #[inline]
    pub fn has_adaptation_field(&self) -> bool {
        (self.adaptation_field_control & 0x02) != 0
    }

    #[inline]
    pub fn has_payload(&self) -> bool {
        (self.adaptation_field_control & 0x01) != 0
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.pid == PID_NULL
    }
}

/// A decoded transport stream packet.
///
/// The payload is copied out of the read buffer, so packets stay valid after
/// the buffer is reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub adaptation_field: Option<AdaptationField>,
    pub payload: Option<Bytes>,
}

impl Packet {
    /// Decode a packet from a cursor positioned at its sync byte.
    ///
    /// The cursor must span exactly one 188-byte packet: the payload is
    /// everything from the payload offset to the end of the cursor.
    pub fn decode(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let start = cursor.position();
        let sync_byte = cursor.next_byte().field("sync_byte")?;
        if sync_byte != SYNC_BYTE {
            return Err(TsError::InvalidSyncByte(sync_byte));
        }

        let header = PacketHeader::decode(cursor)?;

        let adaptation_field = if header.has_adaptation_field() {
            Some(AdaptationField::decode(cursor)?)
        } else {
            None
        };

        let payload = if header.has_payload() {
            let offset = start + payload_offset(adaptation_field.as_ref());
            cursor.seek(offset).field("payload")?;
            Some(cursor.take_remainder())
        } else {
            None
        };

        Ok(Packet {
            header,
            adaptation_field,
            payload,
        })
    }

    /// Decode a packet from a buffer that must be exactly 188 bytes long.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() != PACKET_SIZE {
            return Err(TsError::InvalidPacketSize(data.len()));
        }
        Self::decode(&mut ByteCursor::new(data))
    }

    #[inline]
    pub fn pid(&self) -> u16 {
        self.header.pid
    }

    /// Payload bytes, empty when the packet carries none.
    pub fn payload_bytes(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }

    pub fn is_random_access(&self) -> bool {
        self.adaptation_field
            .as_ref()
            .is_some_and(|af| af.random_access_indicator)
    }

    pub fn is_discontinuity(&self) -> bool {
        self.adaptation_field
            .as_ref()
            .is_some_and(|af| af.discontinuity_indicator)
    }
}

/// Offset of the payload from the sync byte.
fn payload_offset(adaptation_field: Option<&AdaptationField>) -> usize {
    HEADER_SIZE + adaptation_field.map_or(0, AdaptationField::total_len)
}

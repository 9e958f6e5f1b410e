use bytes::Bytes;
use tracing::trace;

use crate::Result;
use crate::clock::ClockReference;
use crate::cursor::ByteCursor;
use crate::error::FieldContext;

/// Maximum `adaptation_field_length` in a 188-byte packet.
pub const MAX_ADAPTATION_FIELD_LENGTH: u8 = 183;

/// Parsed adaptation field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdaptationField {
    /// Declared `adaptation_field_length` (bytes after the length byte).
    pub length: u8,
    pub discontinuity_indicator: bool,
    pub random_access_indicator: bool,
    pub elementary_stream_priority_indicator: bool,
    pub pcr: Option<ClockReference>,
    pub opcr: Option<ClockReference>,
    pub splice_countdown: Option<i8>,
    pub transport_private_data: Option<Bytes>,
    pub extension: Option<AdaptationExtensionField>,
}

impl AdaptationField {
    /// Decode an adaptation field starting at its length byte.
    ///
    /// Sub-field reads are bounded by the packet buffer, not by the declared
    /// length; the caller uses `length` to locate the payload.
    pub fn decode(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let start = cursor.position();
        let length = cursor.next_byte().field("adaptation_field_length")?;
        if length == 0 {
            return Ok(AdaptationField::default());
        }

        let flags = cursor.next_byte().field("adaptation_field_flags")?;
        let pcr_flag = (flags & 0x10) != 0;
        let opcr_flag = (flags & 0x08) != 0;
        let splicing_point_flag = (flags & 0x04) != 0;
        let transport_private_data_flag = (flags & 0x02) != 0;
        let extension_flag = (flags & 0x01) != 0;

        let pcr = if pcr_flag {
            Some(ClockReference::read_pcr(cursor, "pcr")?)
        } else {
            None
        };

        let opcr = if opcr_flag {
            Some(ClockReference::read_pcr(cursor, "opcr")?)
        } else {
            None
        };

        let splice_countdown = if splicing_point_flag {
            Some(cursor.next_byte().field("splice_countdown")? as i8)
        } else {
            None
        };

        let transport_private_data = if transport_private_data_flag {
            let private_len = cursor
                .next_byte()
                .field("transport_private_data_length")?;
            Some(
                cursor
                    .next_bytes_copy(private_len as usize)
                    .field("transport_private_data")?,
            )
        } else {
            None
        };

        let extension = if extension_flag {
            Some(AdaptationExtensionField::decode(cursor)?)
        } else {
            None
        };

        let field = AdaptationField {
            length,
            discontinuity_indicator: (flags & 0x80) != 0,
            random_access_indicator: (flags & 0x40) != 0,
            elementary_stream_priority_indicator: (flags & 0x20) != 0,
            pcr,
            opcr,
            splice_countdown,
            transport_private_data,
            extension,
        };

        let consumed = cursor.position() - start;
        if consumed > field.total_len() {
            trace!(
                declared = length,
                consumed = consumed - 1,
                "Adaptation field sub-fields overrun declared length"
            );
        }

        Ok(field)
    }

    /// Bytes occupied in the packet, length byte included.
    pub fn total_len(&self) -> usize {
        1 + self.length as usize
    }

    /// Bytes the flags and present sub-fields need, excluding the length byte
    /// and any stuffing. Zero when nothing is present.
    pub fn content_len(&self) -> usize {
        if !self.has_content() {
            return 0;
        }
        1 + self.pcr.map_or(0, |_| 6)
            + self.opcr.map_or(0, |_| 6)
            + self.splice_countdown.map_or(0, |_| 1)
            + self
                .transport_private_data
                .as_ref()
                .map_or(0, |data| 1 + data.len())
            + self.extension.as_ref().map_or(0, |ext| ext.total_len())
    }

    /// Whether anything beyond the length byte needs to be written.
    pub fn has_content(&self) -> bool {
        self.length > 0
            || self.discontinuity_indicator
            || self.random_access_indicator
            || self.elementary_stream_priority_indicator
            || self.pcr.is_some()
            || self.opcr.is_some()
            || self.splice_countdown.is_some()
            || self.transport_private_data.is_some()
            || self.extension.is_some()
    }

    /// Flags byte as written on the wire.
    pub fn flags(&self) -> u8 {
        let mut flags = 0u8;
        if self.discontinuity_indicator {
            flags |= 0x80;
        }
        if self.random_access_indicator {
            flags |= 0x40;
        }
        if self.elementary_stream_priority_indicator {
            flags |= 0x20;
        }
        if self.pcr.is_some() {
            flags |= 0x10;
        }
        if self.opcr.is_some() {
            flags |= 0x08;
        }
        if self.splice_countdown.is_some() {
            flags |= 0x04;
        }
        if self.transport_private_data.is_some() {
            flags |= 0x02;
        }
        if self.extension.is_some() {
            flags |= 0x01;
        }
        flags
    }
}

/// Seamless splice parameters from the adaptation extension field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeamlessSplice {
    pub splice_type: u8,
    /// `DTS_next_AU`, base only.
    pub dts_next_access_unit: ClockReference,
}

/// Legal time window from the adaptation extension field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegalTimeWindow {
    pub valid: bool,
    /// 15-bit offset.
    pub offset: u16,
}

/// Parsed adaptation field extension.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdaptationExtensionField {
    pub length: u8,
    pub legal_time_window: Option<LegalTimeWindow>,
    /// 22-bit piecewise rate.
    pub piecewise_rate: Option<u32>,
    pub seamless_splice: Option<SeamlessSplice>,
}

impl AdaptationExtensionField {
    pub fn decode(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let length = cursor
            .next_byte()
            .field("adaptation_extension_length")?;
        if length == 0 {
            return Ok(AdaptationExtensionField::default());
        }

        let flags = cursor.next_byte().field("adaptation_extension_flags")?;

        let legal_time_window = if (flags & 0x80) != 0 {
            let bytes = cursor.next_array::<2>().field("legal_time_window")?;
            Some(LegalTimeWindow {
                valid: (bytes[0] & 0x80) != 0,
                offset: ((bytes[0] as u16 & 0x7F) << 8) | bytes[1] as u16,
            })
        } else {
            None
        };

        let piecewise_rate = if (flags & 0x40) != 0 {
            let bytes = cursor.next_array::<3>().field("piecewise_rate")?;
            Some(((bytes[0] as u32 & 0x3F) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32)
        } else {
            None
        };

        let seamless_splice = if (flags & 0x20) != 0 {
            let splice_type = cursor.next_byte().field("splice_type")? >> 4;
            // splice_type shares its byte with the top bits of DTS_next_AU
            cursor.skip(-1).field("splice_type")?;
            let dts_next_access_unit = ClockReference::read_timestamp(cursor, "dts_next_au")?;
            Some(SeamlessSplice {
                splice_type,
                dts_next_access_unit,
            })
        } else {
            None
        };

        Ok(AdaptationExtensionField {
            length,
            legal_time_window,
            piecewise_rate,
            seamless_splice,
        })
    }

    /// Bytes occupied in the packet, length byte included.
    pub fn total_len(&self) -> usize {
        1 + self.length as usize
    }

    /// Bytes the flags and present sub-fields need, excluding the length byte.
    pub fn content_len(&self) -> usize {
        if self.length == 0
            && self.legal_time_window.is_none()
            && self.piecewise_rate.is_none()
            && self.seamless_splice.is_none()
        {
            return 0;
        }
        1 + self.legal_time_window.map_or(0, |_| 2)
            + self.piecewise_rate.map_or(0, |_| 3)
            + self.seamless_splice.map_or(0, |_| 5)
    }

    pub fn flags(&self) -> u8 {
        let mut flags = 0x1F; // reserved bits
        if self.legal_time_window.is_some() {
            flags |= 0x80;
        }
        if self.piecewise_rate.is_some() {
            flags |= 0x40;
        }
        if self.seamless_splice.is_some() {
            flags |= 0x20;
        }
        flags
    }
}

//! Serialisation of single packets back into their 188-byte wire form.

use bytes::{BufMut, Bytes};

use crate::adaptation_field::{AdaptationExtensionField, AdaptationField};
use crate::packet::{HEADER_SIZE, PACKET_SIZE, Packet, PacketHeader, SYNC_BYTE};
use crate::{Result, TsError};

const STUFFING_BYTE: u8 = 0xFF;

impl Packet {
    /// Encode the packet into exactly 188 bytes.
    ///
    /// Packets without payload are padded with stuffing bytes; packets with a
    /// payload must fill the packet exactly (see [`Packet::with_payload`]).
    pub fn encode(&self) -> Result<[u8; PACKET_SIZE]> {
        let mut buf = Vec::with_capacity(PACKET_SIZE);
        buf.put_u8(SYNC_BYTE);
        buf.put_slice(&self.header.to_bytes()?);

        if self.header.has_adaptation_field() {
            match &self.adaptation_field {
                Some(field) => write_adaptation_field(&mut buf, field)?,
                None => buf.put_u8(0),
            }
        }

        if self.header.has_payload() {
            buf.put_slice(self.payload_bytes());
        } else if buf.len() < PACKET_SIZE {
            buf.resize(PACKET_SIZE, STUFFING_BYTE);
        }

        <[u8; PACKET_SIZE]>::try_from(buf).map_err(|buf| TsError::InvalidPacketSize(buf.len()))
    }

    /// Build a packet around `payload`, sizing the adaptation field so that
    /// the packet is exactly 188 bytes long.
    ///
    /// `adaptation_field_control` in `header` is overwritten.
    pub fn with_payload(
        mut header: PacketHeader,
        adaptation_field: Option<AdaptationField>,
        payload: Bytes,
    ) -> Result<Self> {
        let available = PACKET_SIZE - HEADER_SIZE;
        let adaptation_field = if adaptation_field.is_some() || payload.len() < available {
            let mut field = adaptation_field.unwrap_or_default();
            let room = available - 1;
            let required = field.content_len() + payload.len();
            if required > room {
                return Err(TsError::LengthOverflow {
                    field: "adaptation_field",
                    declared: room,
                    required,
                });
            }
            field.length = (room - payload.len()) as u8;
            header.adaptation_field_control = 0b11;
            Some(field)
        } else if payload.len() == available {
            header.adaptation_field_control = 0b01;
            None
        } else {
            return Err(TsError::InvalidPacketSize(HEADER_SIZE + payload.len()));
        };

        Ok(Packet {
            header,
            adaptation_field,
            payload: Some(payload),
        })
    }
}

fn write_adaptation_field(buf: &mut Vec<u8>, field: &AdaptationField) -> Result<()> {
    let declared = field.length as usize;
    let required = field.content_len();
    if required > declared {
        return Err(TsError::LengthOverflow {
            field: "adaptation_field",
            declared,
            required,
        });
    }

    buf.put_u8(field.length);
    if declared == 0 {
        return Ok(());
    }

    let start = buf.len();
    buf.put_u8(field.flags());
    if let Some(pcr) = field.pcr {
        buf.put_slice(&pcr.to_pcr_bytes());
    }
    if let Some(opcr) = field.opcr {
        buf.put_slice(&opcr.to_pcr_bytes());
    }
    if let Some(countdown) = field.splice_countdown {
        buf.put_i8(countdown);
    }
    if let Some(data) = &field.transport_private_data {
        let length = u8::try_from(data.len()).map_err(|_| TsError::LengthOverflow {
            field: "transport_private_data",
            declared: u8::MAX as usize,
            required: data.len(),
        })?;
        buf.put_u8(length);
        buf.put_slice(data);
    }
    if let Some(extension) = &field.extension {
        write_extension_field(buf, extension)?;
    }

    buf.resize(start + declared, STUFFING_BYTE);
    Ok(())
}

fn write_extension_field(buf: &mut Vec<u8>, field: &AdaptationExtensionField) -> Result<()> {
    let declared = field.length as usize;
    let required = field.content_len();
    if required > declared {
        return Err(TsError::LengthOverflow {
            field: "adaptation_extension_field",
            declared,
            required,
        });
    }

    buf.put_u8(field.length);
    if declared == 0 {
        return Ok(());
    }

    let start = buf.len();
    buf.put_u8(field.flags());
    if let Some(ltw) = field.legal_time_window {
        let valid = if ltw.valid { 0x8000 } else { 0 };
        buf.put_u16(valid | (ltw.offset & 0x7FFF));
    }
    if let Some(rate) = field.piecewise_rate {
        buf.put_u8(0xC0 | ((rate >> 16) as u8 & 0x3F));
        buf.put_u16(rate as u16);
    }
    if let Some(splice) = field.seamless_splice {
        if splice.splice_type > 0x0F {
            return Err(TsError::InvalidSpliceType(splice.splice_type));
        }
        buf.put_slice(&splice.dts_next_access_unit.to_timestamp_bytes(splice.splice_type));
    }

    buf.resize(start + declared, STUFFING_BYTE);
    Ok(())
}

use crate::clock::ClockReference;
use crate::cursor::ByteCursor;
use crate::error::FieldContext;
use crate::{Result, TsError};

/// Video stream ID range (0xE0..=0xEF)
pub const STREAM_ID_VIDEO_MIN: u8 = 0xE0;
/// Video stream ID range (0xE0..=0xEF)
pub const STREAM_ID_VIDEO_MAX: u8 = 0xEF;
/// Audio stream ID range (0xC0..=0xDF)
pub const STREAM_ID_AUDIO_MIN: u8 = 0xC0;
/// Audio stream ID range (0xC0..=0xDF)
pub const STREAM_ID_AUDIO_MAX: u8 = 0xDF;
/// Private stream 1
pub const STREAM_ID_PRIVATE_1: u8 = 0xBD;
/// Private stream 2
pub const STREAM_ID_PRIVATE_2: u8 = 0xBF;
/// Padding stream
pub const STREAM_ID_PADDING: u8 = 0xBE;

const START_CODE_PREFIX: [u8; 3] = [0x00, 0x00, 0x01];

/// Check if a stream_id has an optional PES header (PTS/DTS fields).
fn has_optional_pes_header(stream_id: u8) -> bool {
    // ISO 13818-1 Table 2-18
    !matches!(
        stream_id,
        0xBC   // program_stream_map
        | 0xBE // padding_stream
        | 0xBF // private_stream_2
        | 0xF0 // ECM_stream
        | 0xF1 // EMM_stream
        | 0xFF // program_stream_directory
        | 0xF2 // DSMCC_stream
        | 0xF8 // ITU-T Rec. H.222.1 type E
    )
}

/// Whether `data` begins with the PES start code prefix.
pub fn starts_with_pes(data: &[u8]) -> bool {
    data.starts_with(&START_CODE_PREFIX)
}

/// PES header found at the start of a reassembled frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PesHeader {
    pub stream_id: u8,
    pub pes_packet_length: u16,
    pub pts: Option<ClockReference>,
    pub dts: Option<ClockReference>,
    pub data_alignment_indicator: bool,
    pub pes_header_data_length: u8,
    /// Offset to elementary stream data (past the PES header)
    pub payload_offset: usize,
}

impl PesHeader {
    /// Parse a PES header from bytes starting with the start code prefix.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data);
        let prefix = cursor.next_array::<3>().field("pes_start_code")?;
        if *prefix != START_CODE_PREFIX {
            return Err(TsError::InvalidPesStartCode);
        }

        let stream_id = cursor.next_byte().field("stream_id")?;
        let length = cursor.next_array::<2>().field("pes_packet_length")?;
        let pes_packet_length = u16::from_be_bytes(*length);

        if !has_optional_pes_header(stream_id) {
            return Ok(PesHeader {
                stream_id,
                pes_packet_length,
                pts: None,
                dts: None,
                data_alignment_indicator: false,
                pes_header_data_length: 0,
                payload_offset: cursor.position(),
            });
        }

        let [flags1, flags2, pes_header_data_length] =
            *cursor.next_array::<3>().field("pes_optional_header")?;
        let data_alignment_indicator = (flags1 & 0x04) != 0;
        let pts_dts_flags = (flags2 >> 6) & 0x03;
        let header_end = cursor.position() + pes_header_data_length as usize;

        let (pts, dts) = match pts_dts_flags {
            0b00 => (None, None),
            0b10 => (Some(ClockReference::read_timestamp(&mut cursor, "pts")?), None),
            0b11 => {
                let pts = ClockReference::read_timestamp(&mut cursor, "pts")?;
                let dts = ClockReference::read_timestamp(&mut cursor, "dts")?;
                (Some(pts), Some(dts))
            }
            flags => return Err(TsError::InvalidPtsDtsFlags(flags)),
        };

        Ok(PesHeader {
            stream_id,
            pes_packet_length,
            pts,
            dts,
            data_alignment_indicator,
            pes_header_data_length,
            payload_offset: header_end,
        })
    }

    /// Get the elementary stream payload (after PES header).
    pub fn payload<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        data.get(self.payload_offset..)
    }

    /// Check if this is a video stream.
    pub fn is_video(&self) -> bool {
        (STREAM_ID_VIDEO_MIN..=STREAM_ID_VIDEO_MAX).contains(&self.stream_id)
    }

    /// Check if this is an audio stream.
    pub fn is_audio(&self) -> bool {
        (STREAM_ID_AUDIO_MIN..=STREAM_ID_AUDIO_MAX).contains(&self.stream_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_pes_with_pts(stream_id: u8, pts: u64) -> Vec<u8> {
        let mut data = vec![
            0x00, 0x00, 0x01, // start code
            stream_id, 0x00, 0x00, // stream_id + length=0 (unbounded)
            0x80, // marker bits
            0x80, // PTS only (pts_dts_flags=0b10)
            0x05, // pes_header_data_length=5
        ];
        data.extend_from_slice(&ClockReference::from_timestamp(pts).to_timestamp_bytes(0x2));
        data.extend_from_slice(&[0xDE, 0xAD]); // payload
        data
    }

    #[test]
    fn test_pes_header_pts_only() {
        let data = make_pes_with_pts(0xE0, 90000);
        let header = PesHeader::parse(&data).unwrap();
        assert_eq!(header.stream_id, 0xE0);
        assert!(header.is_video());
        assert!(!header.is_audio());
        assert_eq!(header.pts, Some(ClockReference::from_timestamp(90000)));
        assert!(header.dts.is_none());
        assert!((header.pts.unwrap().timestamp_seconds() - 1.0).abs() < 1e-9);
        assert_eq!(header.payload_offset, 14);
        assert_eq!(header.payload(&data), Some(&[0xDE, 0xAD][..]));
    }

    #[test]
    fn test_pes_header_pts_dts() {
        let mut data = vec![
            0x00, 0x00, 0x01, // start code
            0xE0, 0x00, 0x00, // video stream, length=0
            0x80, // marker bits
            0xC0, // PTS + DTS (pts_dts_flags=0b11)
            0x0A, // pes_header_data_length=10
        ];
        data.extend_from_slice(&ClockReference::from_timestamp(180000).to_timestamp_bytes(0x3));
        data.extend_from_slice(&ClockReference::from_timestamp(90000).to_timestamp_bytes(0x1));
        data.push(0xFF);

        let header = PesHeader::parse(&data).unwrap();
        assert_eq!(header.pts.map(|pts| pts.base), Some(180000));
        assert_eq!(header.dts.map(|dts| dts.base), Some(90000));
        assert_eq!(header.payload_offset, 19);
    }

    #[test]
    fn test_pes_header_no_timestamps() {
        let data = vec![
            0x00, 0x00, 0x01, // start code
            0xC0, 0x00, 0x05, // audio stream, length=5
            0x80, // marker bits
            0x00, // no PTS/DTS
            0x00, // pes_header_data_length=0
            0xAA, 0xBB, // payload
        ];
        let header = PesHeader::parse(&data).unwrap();
        assert!(header.is_audio());
        assert!(header.pts.is_none());
        assert!(header.dts.is_none());
        assert_eq!(header.payload_offset, 9);
    }

    #[test]
    fn test_pes_header_max_pts() {
        let data = make_pes_with_pts(0xE0, 0x1_FFFF_FFFF);
        let header = PesHeader::parse(&data).unwrap();
        assert_eq!(header.pts.map(|pts| pts.base), Some(0x1_FFFF_FFFF));
    }

    #[test]
    fn test_pes_invalid_start_code() {
        let data = vec![0x00, 0x00, 0x00, 0xE0, 0x00, 0x00];
        assert_eq!(PesHeader::parse(&data), Err(TsError::InvalidPesStartCode));
        assert!(!starts_with_pes(&data));
    }

    #[test]
    fn test_pes_invalid_pts_dts_flags() {
        let data = vec![0x00, 0x00, 0x01, 0xE0, 0x00, 0x00, 0x80, 0x40, 0x00];
        assert_eq!(PesHeader::parse(&data), Err(TsError::InvalidPtsDtsFlags(0x01)));
    }

    #[test]
    fn test_pes_truncated_pts() {
        let data = vec![0x00, 0x00, 0x01, 0xE0, 0x00, 0x00, 0x80, 0x80, 0x05, 0x21];
        assert!(matches!(
            PesHeader::parse(&data),
            Err(TsError::OutOfRange { field: "pts", .. })
        ));
    }

    #[test]
    fn test_pes_padding_stream() {
        let data = vec![
            0x00, 0x00, 0x01, STREAM_ID_PADDING, 0x00, 0x04, 0xFF, 0xFF, 0xFF, 0xFF,
        ];
        let header = PesHeader::parse(&data).unwrap();
        assert_eq!(header.stream_id, STREAM_ID_PADDING);
        assert!(header.pts.is_none());
        assert_eq!(header.payload_offset, 6);
    }
}

//! Error types for transport stream decoding.

use thiserror::Error;

/// Errors raised while decoding a single packet or one of its sub-fields.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TsError {
    /// The packet buffer does not start with the 0x47 sync byte.
    #[error("packet must start with sync byte 0x47, found {0:#04x}")]
    InvalidSyncByte(u8),

    /// A sub-field asked for more bytes than the buffer holds.
    #[error(
        "reading {field}: requested {requested} bytes at position {position}, {remaining} remaining"
    )]
    OutOfRange {
        /// Name of the field being read.
        field: &'static str,
        /// Cursor position at the time of the request.
        position: usize,
        /// Number of bytes requested (or the seek target for seeks).
        requested: usize,
        /// Number of bytes left after `position`.
        remaining: usize,
    },

    /// The buffer handed to the decoder or produced by the encoder is not one packet long.
    #[error("invalid packet size: {0}")]
    InvalidPacketSize(usize),

    /// PID does not fit in 13 bits.
    #[error("invalid PID: {0:#06x}")]
    InvalidPid(u16),

    /// Encoder: the sub-fields present do not fit in the declared length.
    #[error("{field} needs {required} bytes but declares {declared}")]
    LengthOverflow {
        field: &'static str,
        declared: usize,
        required: usize,
    },

    #[error("invalid PES start code")]
    InvalidPesStartCode,

    #[error("invalid PTS_DTS_flags: {0:#04b}")]
    InvalidPtsDtsFlags(u8),

    /// Encoder: `splice_type` does not fit in 4 bits.
    #[error("invalid splice_type: {0:#x}")]
    InvalidSpliceType(u8),
}

impl TsError {
    /// Whether this is a framing error (lost packet alignment).
    pub fn is_framing(&self) -> bool {
        matches!(self, TsError::InvalidSyncByte(_))
    }

    /// Renames the field carried by an [`TsError::OutOfRange`] error.
    pub(crate) fn in_field(self, name: &'static str) -> Self {
        match self {
            TsError::OutOfRange {
                position,
                requested,
                remaining,
                ..
            } => TsError::OutOfRange {
                field: name,
                position,
                requested,
                remaining,
            },
            other => other,
        }
    }
}

/// Attaches a field name to out-of-range errors coming from the byte cursor.
pub(crate) trait FieldContext<T> {
    fn field(self, name: &'static str) -> crate::Result<T>;
}

impl<T> FieldContext<T> for crate::Result<T> {
    #[inline]
    fn field(self, name: &'static str) -> crate::Result<T> {
        self.map_err(|e| e.in_field(name))
    }
}

/// Errors raised by the packet source and the demultiplexer.
///
/// Every variant carries the absolute byte offset (from the start of the
/// stream) of the packet that was being read.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("packet at offset {offset}: {source}")]
    Decode {
        offset: u64,
        #[source]
        source: TsError,
    },

    /// The byte source ended in the middle of a packet.
    #[error("truncated packet at offset {offset}: expected {expected} bytes, got {actual}")]
    TruncatedRead {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    /// Continuity counter mismatch, only raised in strict continuity mode.
    #[error(
        "continuity gap on PID {pid:#06x} at offset {offset}: expected {expected}, got {actual}"
    )]
    ContinuityGap {
        offset: u64,
        pid: u16,
        expected: u8,
        actual: u8,
    },

    #[error("operation cancelled at offset {offset}")]
    Cancelled { offset: u64 },

    #[error("I/O error at offset {offset}: {source}")]
    Io {
        offset: u64,
        #[source]
        source: std::io::Error,
    },
}

impl StreamError {
    /// Absolute byte offset of the packet under decode.
    pub fn offset(&self) -> u64 {
        match self {
            StreamError::Decode { offset, .. }
            | StreamError::TruncatedRead { offset, .. }
            | StreamError::ContinuityGap { offset, .. }
            | StreamError::Cancelled { offset }
            | StreamError::Io { offset, .. } => *offset,
        }
    }

    /// Whether the error is a framing error of a single packet.
    pub fn is_framing(&self) -> bool {
        matches!(self, StreamError::Decode { source, .. } if source.is_framing())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamError::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_context_renames_out_of_range() {
        let err: crate::Result<()> = Err(TsError::OutOfRange {
            field: "bytes",
            position: 3,
            requested: 6,
            remaining: 2,
        });
        match err.field("pcr").unwrap_err() {
            TsError::OutOfRange { field, .. } => assert_eq!(field, "pcr"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_field_context_keeps_other_errors() {
        let err: crate::Result<()> = Err(TsError::InvalidSyncByte(0x46));
        assert_eq!(err.field("pcr").unwrap_err(), TsError::InvalidSyncByte(0x46));
    }

    #[test]
    fn test_stream_error_offset() {
        let err = StreamError::Decode {
            offset: 376,
            source: TsError::InvalidSyncByte(0x00),
        };
        assert_eq!(err.offset(), 376);
        assert!(err.is_framing());
        assert!(!err.is_cancelled());
        assert!(err.to_string().contains("offset 376"));
    }
}

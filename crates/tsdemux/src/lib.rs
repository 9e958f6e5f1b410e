//! Streaming decoder for MPEG-2 Transport Stream data
//!
//! This crate decodes 188-byte transport packets (header, adaptation field,
//! adaptation field extension, PCR/OPCR clock references) from any
//! `std::io::Read` source and reassembles per-PID elementary stream payloads
//! into frames with their PES timestamps.
//!
//! ```no_run
//! use std::fs::File;
//! use tsdemux::Demuxer;
//!
//! let file = File::open("capture.ts")?;
//! let mut demuxer = Demuxer::new(std::io::BufReader::new(file));
//! while let Some(frame) = demuxer.next_frame()? {
//!     println!("pid={:#06x} len={} pts={:?}", frame.pid, frame.payload.len(), frame.pts);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod adaptation_field;
pub mod clock;
pub mod cursor;
pub mod demux;
pub mod encode;
pub mod error;
pub mod packet;
pub mod pes;
pub mod source;

#[cfg(test)]
mod test_support;

pub use adaptation_field::{
    AdaptationExtensionField, AdaptationField, LegalTimeWindow, SeamlessSplice,
};
pub use clock::ClockReference;
pub use cursor::ByteCursor;
pub use demux::{
    ContinuityGap, ContinuityMode, Demuxer, Frame, GAP_QUEUE_CAPACITY, NoProgramTable,
    PatDisposition, ProgramTableHandler,
};
pub use error::{StreamError, TsError};
pub use packet::{PACKET_SIZE, PID_CAT, PID_NULL, PID_PAT, Packet, PacketHeader, SYNC_BYTE};
pub use pes::PesHeader;
pub use source::{PacketFormat, PacketSource, RawPacket, SyncRecovery};

/// Result type for packet decoding operations
pub type Result<T> = std::result::Result<T, TsError>;

/// Result type for stream-level operations
pub type StreamResult<T> = std::result::Result<T, StreamError>;

use std::io::{self, Read};

use memchr::memchr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::StreamError;
use crate::packet::{PACKET_SIZE, Packet, SYNC_BYTE};
use crate::{StreamResult, TsError};

/// On-the-wire packet framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacketFormat {
    /// Plain 188-byte transport stream packets.
    #[default]
    Ts188,
    /// 192-byte M2TS packets: 4-byte timecode prefix, then the TS packet.
    M2ts192,
    /// 204-byte packets: the TS packet followed by 16 parity bytes.
    Ts204,
}

impl PacketFormat {
    pub const fn packet_size(self) -> usize {
        match self {
            Self::Ts188 => 188,
            Self::M2ts192 => 192,
            Self::Ts204 => 204,
        }
    }

    /// Position of the sync byte within a packet of this format.
    pub const fn sync_offset(self) -> usize {
        match self {
            Self::Ts188 => 0,
            Self::M2ts192 => 4,
            Self::Ts204 => 0,
        }
    }
}

/// What the packet source does when a packet does not start with the sync byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncRecovery {
    /// Report the framing error; the next call reads the following packet slot.
    #[default]
    Fail,
    /// Scan forward to the next sync byte and continue from there.
    Resync,
}

/// One raw packet lent out of the source's read buffer.
#[derive(Debug, Clone, Copy)]
pub struct RawPacket<'a> {
    /// Absolute stream offset of the packet (including any format prefix).
    pub offset: u64,
    /// The 188-byte transport packet, sync byte first.
    pub data: &'a [u8],
}

/// Reads fixed-size packets from a byte stream and decodes them.
///
/// The read buffer is reused between calls; only [`RawPacket`] borrows it.
#[derive(Debug)]
pub struct PacketSource<R> {
    reader: R,
    format: PacketFormat,
    recovery: SyncRecovery,
    token: CancellationToken,
    buffer: Vec<u8>,
    /// Bytes consumed from the reader so far
    position: u64,
    /// Offset of the most recently returned packet
    last_offset: u64,
    packets_read: u64,
    bytes_skipped: u64,
    /// Bytes of the current packet already buffered when a read failed
    partial: usize,
    eos: bool,
}

impl<R: Read> PacketSource<R> {
    pub fn new(reader: R) -> Self {
        let format = PacketFormat::default();
        Self {
            reader,
            format,
            recovery: SyncRecovery::default(),
            token: CancellationToken::new(),
            buffer: vec![0; format.packet_size()],
            position: 0,
            last_offset: 0,
            packets_read: 0,
            bytes_skipped: 0,
            partial: 0,
            eos: false,
        }
    }

    pub fn with_packet_format(mut self, format: PacketFormat) -> Self {
        self.format = format;
        self.buffer = vec![0; format.packet_size()];
        self.partial = 0;
        self
    }

    pub fn with_sync_recovery(mut self, recovery: SyncRecovery) -> Self {
        self.recovery = recovery;
        self
    }

    /// Token checked at the start of every `next_*` call.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn format(&self) -> PacketFormat {
        self.format
    }

    /// Bytes consumed from the underlying reader.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Offset of the packet most recently returned or rejected.
    pub fn last_packet_offset(&self) -> u64 {
        self.last_offset
    }

    pub fn packets_read(&self) -> u64 {
        self.packets_read
    }

    /// Bytes discarded while resynchronising.
    pub fn bytes_skipped(&self) -> u64 {
        self.bytes_skipped
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    pub(crate) fn check_cancelled(&self) -> StreamResult<()> {
        if self.token.is_cancelled() {
            return Err(StreamError::Cancelled {
                offset: self.position,
            });
        }
        Ok(())
    }

    /// Decode the next packet. `Ok(None)` marks a clean end of stream.
    pub fn next_packet(&mut self) -> StreamResult<Option<Packet>> {
        self.check_cancelled()?;
        self.read_packet()
    }

    /// Lend the next raw packet without decoding it.
    pub fn next_raw(&mut self) -> StreamResult<Option<RawPacket<'_>>> {
        self.check_cancelled()?;
        if !self.read_raw()? {
            return Ok(None);
        }
        let sync = self.format.sync_offset();
        Ok(Some(RawPacket {
            offset: self.last_offset,
            data: &self.buffer[sync..sync + PACKET_SIZE],
        }))
    }

    pub(crate) fn read_packet(&mut self) -> StreamResult<Option<Packet>> {
        if !self.read_raw()? {
            return Ok(None);
        }
        let offset = self.last_offset;
        let sync = self.format.sync_offset();
        let packet = Packet::parse(&self.buffer[sync..sync + PACKET_SIZE])
            .map_err(|source| StreamError::Decode { offset, source })?;
        trace!(
            offset,
            pid = packet.header.pid,
            cc = packet.header.continuity_counter,
            pusi = packet.header.payload_unit_start_indicator,
            "Decoded packet"
        );
        Ok(Some(packet))
    }

    /// Fill the buffer with the next packet. Returns `false` at end of stream.
    fn read_raw(&mut self) -> StreamResult<bool> {
        if self.eos {
            return Ok(false);
        }

        let size = self.format.packet_size();
        // resume a packet whose read was cut short by an I/O error
        let already = std::mem::take(&mut self.partial);
        let mut offset = self.position - already as u64;
        self.last_offset = offset;
        let filled = already + self.fill(already, offset)?;
        if filled == 0 {
            self.eos = true;
            debug!(
                packets = self.packets_read,
                bytes = self.position,
                "End of transport stream"
            );
            return Ok(false);
        }
        if filled < size {
            self.eos = true;
            return Err(StreamError::TruncatedRead {
                offset,
                expected: size,
                actual: filled,
            });
        }

        let sync_byte = self.buffer[self.format.sync_offset()];
        if sync_byte != SYNC_BYTE {
            match self.recovery {
                SyncRecovery::Fail => {
                    return Err(StreamError::Decode {
                        offset,
                        source: TsError::InvalidSyncByte(sync_byte),
                    });
                }
                SyncRecovery::Resync => match self.resync(offset)? {
                    Some(found) => offset = found,
                    None => return Ok(false),
                },
            }
        }

        self.last_offset = offset;
        self.packets_read += 1;
        Ok(true)
    }

    /// Shift the buffer to the next candidate sync byte and refill it, until
    /// the buffer starts with a sync byte. Returns the new packet offset.
    fn resync(&mut self, mut offset: u64) -> StreamResult<Option<u64>> {
        let size = self.format.packet_size();
        let sync = self.format.sync_offset();
        let mut skipped = 0u64;

        loop {
            let shift = memchr(SYNC_BYTE, &self.buffer[sync + 1..]).map_or(size, |pos| pos + 1);
            self.buffer.copy_within(shift.., 0);
            let kept = size - shift;
            offset += shift as u64;
            skipped += shift as u64;
            self.bytes_skipped += shift as u64;
            self.last_offset = offset;

            let available = kept + self.fill(kept, offset)?;
            if available == 0 {
                self.eos = true;
                debug!(skipped, "End of stream while searching for sync byte");
                return Ok(None);
            }
            if available < size {
                self.eos = true;
                return Err(StreamError::TruncatedRead {
                    offset,
                    expected: size,
                    actual: available,
                });
            }
            if self.buffer[sync] == SYNC_BYTE {
                debug!(offset, skipped, "Resynchronised to sync byte");
                return Ok(Some(offset));
            }
        }
    }

    /// Read into `buffer[from..]` until it is full or the reader is exhausted.
    ///
    /// On an I/O error the bytes read so far stay buffered and count towards
    /// `position`; the next read completes the same packet.
    fn fill(&mut self, from: usize, offset: u64) -> StreamResult<usize> {
        let mut filled = from;
        while filled < self.buffer.len() {
            match self.reader.read(&mut self.buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    self.position += (filled - from) as u64;
                    self.partial = filled;
                    return Err(StreamError::Io { offset, source });
                }
            }
        }
        let read = filled - from;
        self.position += read as u64;
        Ok(read)
    }
}

impl<R: Read> Iterator for PacketSource<R> {
    type Item = StreamResult<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.eos {
            return None;
        }
        match self.next_packet() {
            Err(e) if e.is_cancelled() => {
                self.eos = true;
                Some(Err(e))
            }
            other => other.transpose(),
        }
    }
}

use std::collections::VecDeque;
use std::io::Read;

use bytes::{Bytes, BytesMut};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::StreamResult;
use crate::error::StreamError;
use crate::packet::{PID_NULL, PID_PAT, PID_SPACE, Packet};
use crate::pes::{PesHeader, starts_with_pes};
use crate::source::{PacketFormat, PacketSource, SyncRecovery};

/// Number of continuity gaps kept for [`Demuxer::take_continuity_gaps`];
/// older gaps are dropped once the queue is full.
pub const GAP_QUEUE_CAPACITY: usize = 256;

/// Continuity counter handling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContinuityMode {
    /// Do not evaluate continuity counters.
    Disabled,
    /// Report gaps as events and keep reassembling.
    #[default]
    Warn,
    /// Fail with [`StreamError::ContinuityGap`] on every gap. The packet is
    /// still applied, so reading can resume after the error.
    Strict,
}

/// A continuity counter mismatch seen on one PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuityGap {
    /// Offset of the packet that broke the sequence.
    pub offset: u64,
    pub pid: u16,
    pub expected: u8,
    pub actual: u8,
}

/// What the demuxer does with a PAT packet after the program table saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatDisposition {
    /// Reassemble PID 0 like any other stream.
    #[default]
    Reassemble,
    /// Drop the packet.
    Suppress,
}

/// Consumer of program table packets.
///
/// Table parsing lives outside this crate; implementors receive every PAT
/// packet and may narrow down the PIDs worth reassembling.
pub trait ProgramTableHandler {
    fn on_pat_packet(&mut self, _packet: &Packet) -> PatDisposition {
        PatDisposition::Reassemble
    }

    /// PIDs for which this returns `false` are skipped before any
    /// continuity or reassembly work.
    fn is_pid_of_interest(&self, _pid: u16) -> bool {
        true
    }
}

/// Handler that reassembles everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgramTable;

impl ProgramTableHandler for NoProgramTable {}

/// Elementary stream unit reassembled from the packets between two unit starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub pid: u16,
    /// Concatenated packet payloads, PES header included.
    pub payload: Bytes,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
    /// PES header at the start of `payload`, if one parsed.
    pub pes_header: Option<PesHeader>,
    /// Random access indicator of the opening packet.
    pub random_access: bool,
    /// A continuity gap was seen while this frame was assembled.
    pub discontinuity: bool,
    /// Stream offset of the opening packet.
    pub offset: u64,
}

impl Frame {
    /// Payload past the PES header, or the whole payload when there is none.
    pub fn elementary_payload(&self) -> Bytes {
        match self.pes_header {
            Some(header) if header.payload_offset <= self.payload.len() => {
                self.payload.slice(header.payload_offset..)
            }
            Some(_) => Bytes::new(),
            None => self.payload.clone(),
        }
    }

    pub fn pts_seconds(&self) -> Option<f64> {
        self.pts.map(|pts| pts as f64 / 90_000.0)
    }

    pub fn dts_seconds(&self) -> Option<f64> {
        self.dts.map(|dts| dts as f64 / 90_000.0)
    }
}

#[derive(Debug, Default)]
struct PidState {
    last_cc: Option<u8>,
    buffer: BytesMut,
    started: bool,
    offset: u64,
    random_access: bool,
    discontinuity: bool,
}

impl PidState {
    /// Add the packet's payload, returning the frame its unit start closed.
    fn apply(&mut self, pid: u16, packet: &Packet, offset: u64) -> Option<Frame> {
        if !packet.header.has_payload() {
            return None;
        }
        let payload = packet.payload_bytes();

        if packet.header.payload_unit_start_indicator {
            let finished = if self.started && !self.buffer.is_empty() {
                Some(self.finish(pid))
            } else {
                None
            };
            self.buffer.clear();
            self.buffer.extend_from_slice(payload);
            self.started = true;
            self.offset = offset;
            self.random_access = packet.is_random_access();
            self.discontinuity = false;
            return finished;
        }

        if self.started {
            self.buffer.extend_from_slice(payload);
        } else {
            trace!(pid, offset, "Dropping payload before first unit start");
        }
        None
    }

    fn finish(&mut self, pid: u16) -> Frame {
        let payload = self.buffer.split().freeze();
        self.started = false;

        let pes_header = if starts_with_pes(&payload) {
            match PesHeader::parse(&payload) {
                Ok(header) => Some(header),
                Err(e) => {
                    trace!(pid, error = %e, "Frame starts with an unparseable PES header");
                    None
                }
            }
        } else {
            None
        };

        Frame {
            pid,
            pts: pes_header.and_then(|h| h.pts).map(|pts| pts.base),
            dts: pes_header.and_then(|h| h.dts).map(|dts| dts.base),
            pes_header,
            payload,
            random_access: self.random_access,
            discontinuity: self.discontinuity,
            offset: self.offset,
        }
    }
}

/// Pull-based demultiplexer turning a byte stream into per-PID frames.
#[derive(Debug)]
pub struct Demuxer<R, H = NoProgramTable> {
    source: PacketSource<R>,
    handler: H,
    streams: Box<[Option<PidState>]>,
    continuity_mode: ContinuityMode,
    gaps: VecDeque<ContinuityGap>,
    continuity_gap_count: usize,
    null_packet_count: u64,
    /// Frame closed by a packet that also raised a strict continuity error
    pending: Option<Frame>,
    /// Next PID to flush once the source is exhausted
    flush_next: Option<usize>,
    finished: bool,
}

impl<R: Read> Demuxer<R> {
    pub fn new(reader: R) -> Self {
        Self::from_source(PacketSource::new(reader))
    }

    pub fn from_source(source: PacketSource<R>) -> Self {
        Demuxer {
            source,
            handler: NoProgramTable,
            streams: (0..PID_SPACE).map(|_| None).collect(),
            continuity_mode: ContinuityMode::default(),
            gaps: VecDeque::new(),
            continuity_gap_count: 0,
            null_packet_count: 0,
            pending: None,
            flush_next: None,
            finished: false,
        }
    }
}

impl<R: Read, H: ProgramTableHandler> Demuxer<R, H> {
    /// Replace the program table collaborator.
    pub fn with_program_table<P: ProgramTableHandler>(self, handler: P) -> Demuxer<R, P> {
        Demuxer {
            source: self.source,
            handler,
            streams: self.streams,
            continuity_mode: self.continuity_mode,
            gaps: self.gaps,
            continuity_gap_count: self.continuity_gap_count,
            null_packet_count: self.null_packet_count,
            pending: self.pending,
            flush_next: self.flush_next,
            finished: self.finished,
        }
    }

    pub fn with_continuity_mode(mut self, mode: ContinuityMode) -> Self {
        self.continuity_mode = mode;
        self
    }

    pub fn with_packet_format(mut self, format: PacketFormat) -> Self {
        self.source = self.source.with_packet_format(format);
        self
    }

    pub fn with_sync_recovery(mut self, recovery: SyncRecovery) -> Self {
        self.source = self.source.with_sync_recovery(recovery);
        self
    }

    /// Token checked at the start of every `next_frame` call.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.source = self.source.with_cancellation(token);
        self
    }

    pub fn source(&self) -> &PacketSource<R> {
        &self.source
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_inner(self) -> R {
        self.source.into_inner()
    }

    /// Drain the continuity gaps recorded since the last call, oldest first.
    /// At most [`GAP_QUEUE_CAPACITY`] are kept.
    pub fn take_continuity_gaps(&mut self) -> Vec<ContinuityGap> {
        self.gaps.drain(..).collect()
    }

    /// Total number of gaps seen, drained, dropped or not.
    pub fn continuity_gap_count(&self) -> usize {
        self.continuity_gap_count
    }

    pub fn null_packet_count(&self) -> u64 {
        self.null_packet_count
    }

    /// Whether reassembly state exists for `pid`.
    pub fn is_tracking(&self, pid: u16) -> bool {
        self.streams
            .get(pid as usize)
            .is_some_and(|state| state.is_some())
    }

    /// PIDs with reassembly state, ascending.
    pub fn tracked_pids(&self) -> impl Iterator<Item = u16> + '_ {
        self.streams
            .iter()
            .enumerate()
            .filter(|(_, state)| state.is_some())
            .map(|(pid, _)| pid as u16)
    }

    /// Return the next complete frame. `Ok(None)` once the stream is exhausted
    /// and every pending frame has been flushed.
    pub fn next_frame(&mut self) -> StreamResult<Option<Frame>> {
        self.source.check_cancelled()?;

        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }

        if self.flush_next.is_none() {
            while let Some(packet) = self.source.read_packet()? {
                let offset = self.source.last_packet_offset();
                if let Some(frame) = self.push_packet(packet, offset)? {
                    return Ok(Some(frame));
                }
            }
            debug!(
                gaps = self.continuity_gap_count,
                null_packets = self.null_packet_count,
                "Source exhausted, flushing pending frames"
            );
            self.flush_next = Some(0);
        }

        Ok(self.flush_pending())
    }

    fn push_packet(&mut self, packet: Packet, offset: u64) -> StreamResult<Option<Frame>> {
        let pid = packet.pid();
        if pid == PID_NULL {
            self.null_packet_count += 1;
            return Ok(None);
        }
        if pid == PID_PAT {
            if self.handler.on_pat_packet(&packet) == PatDisposition::Suppress {
                return Ok(None);
            }
        } else if !self.handler.is_pid_of_interest(pid) {
            return Ok(None);
        }

        let state = self.streams[pid as usize].get_or_insert_with(PidState::default);

        let mut gap = None;
        if packet.header.has_payload() {
            let actual = packet.header.continuity_counter;
            if let Some(last) = state.last_cc {
                let expected = (last + 1) & 0x0F;
                if actual != expected && !packet.is_discontinuity() {
                    gap = Some(ContinuityGap {
                        offset,
                        pid,
                        expected,
                        actual,
                    });
                }
            }
            state.last_cc = Some(actual);
        }

        let mut strict_gap = None;
        if let Some(gap) = gap.filter(|_| self.continuity_mode != ContinuityMode::Disabled) {
            self.continuity_gap_count += 1;
            state.discontinuity = true;
            if self.continuity_mode == ContinuityMode::Strict {
                strict_gap = Some(gap);
            } else {
                warn!(
                    pid,
                    offset,
                    expected = gap.expected,
                    actual = gap.actual,
                    "Continuity counter gap"
                );
                if self.gaps.len() == GAP_QUEUE_CAPACITY {
                    self.gaps.pop_front();
                }
                self.gaps.push_back(gap);
            }
        }

        let finished = state.apply(pid, &packet, offset);

        match strict_gap {
            Some(gap) => {
                self.pending = finished;
                Err(StreamError::ContinuityGap {
                    offset: gap.offset,
                    pid: gap.pid,
                    expected: gap.expected,
                    actual: gap.actual,
                })
            }
            None => Ok(finished),
        }
    }

    fn flush_pending(&mut self) -> Option<Frame> {
        while let Some(pid) = self.flush_next.filter(|&pid| pid < PID_SPACE) {
            self.flush_next = Some(pid + 1);
            if let Some(state) = self.streams[pid].as_mut()
                && state.started
                && !state.buffer.is_empty()
            {
                debug!(pid, len = state.buffer.len(), "Flushing final frame");
                return Some(state.finish(pid as u16));
            }
        }
        None
    }
}

impl<R: Read, H: ProgramTableHandler> Iterator for Demuxer<R, H> {
    type Item = StreamResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                if e.is_cancelled() {
                    self.finished = true;
                }
                Some(Err(e))
            }
        }
    }
}

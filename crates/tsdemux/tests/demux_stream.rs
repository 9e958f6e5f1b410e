use std::io::Cursor;

use bytes::Bytes;
use tsdemux::{
    AdaptationField, ClockReference, ContinuityMode, Demuxer, PACKET_SIZE, PID_NULL, Packet,
    PacketHeader, PacketSource, StreamError, SyncRecovery,
};

const VIDEO_PID: u16 = 0x0100;
const AUDIO_PID: u16 = 0x0101;

fn pes(stream_id: u8, pts: u64, body_len: usize, fill: u8) -> Vec<u8> {
    let mut data = vec![0x00, 0x00, 0x01, stream_id, 0x00, 0x00, 0x80, 0x80, 0x05];
    data.extend_from_slice(&ClockReference::from_timestamp(pts).to_timestamp_bytes(0x2));
    data.extend(std::iter::repeat_n(fill, body_len));
    data
}

/// Split a PES packet over as many transport packets as needed.
fn packetize(
    pid: u16,
    cc: &mut u8,
    pes: &[u8],
    pcr: Option<ClockReference>,
) -> Vec<[u8; PACKET_SIZE]> {
    let mut packets = Vec::new();
    let mut rest = pes;
    let mut first = true;
    while !rest.is_empty() {
        let adaptation_field = pcr.filter(|_| first).map(|pcr| AdaptationField {
            random_access_indicator: true,
            pcr: Some(pcr),
            ..Default::default()
        });
        let room = 184 - adaptation_field.as_ref().map_or(0, |af| 1 + af.content_len());
        let take = rest.len().min(room);
        let header = PacketHeader {
            payload_unit_start_indicator: first,
            pid,
            continuity_counter: *cc,
            ..Default::default()
        };
        let packet = Packet::with_payload(
            header,
            adaptation_field,
            Bytes::copy_from_slice(&rest[..take]),
        )
        .unwrap();
        packets.push(packet.encode().unwrap());
        rest = &rest[take..];
        *cc = (*cc + 1) & 0x0F;
        first = false;
    }
    packets
}

fn null_packet() -> [u8; PACKET_SIZE] {
    let header = PacketHeader {
        pid: PID_NULL,
        ..Default::default()
    };
    Packet::with_payload(header, None, Bytes::from(vec![0xFF; 184]))
        .unwrap()
        .encode()
        .unwrap()
}

fn build_stream() -> Vec<u8> {
    let mut video_cc = 0;
    let mut audio_cc = 0;
    let mut out = Vec::new();
    for i in 0..4u64 {
        let video = pes(0xE0, 90_000 + i * 3_003, 900, i as u8);
        for packet in packetize(
            VIDEO_PID,
            &mut video_cc,
            &video,
            Some(ClockReference::new(89_000 + i * 3_003, 0)),
        ) {
            out.extend_from_slice(&packet);
        }
        out.extend_from_slice(&null_packet());
        let audio = pes(0xC0, 90_000 + i * 1_920, 300, 0xA0 + i as u8);
        for packet in packetize(AUDIO_PID, &mut audio_cc, &audio, None) {
            out.extend_from_slice(&packet);
        }
    }
    out
}

#[test]
fn demuxes_interleaved_video_and_audio() {
    let mut demuxer = Demuxer::new(Cursor::new(build_stream()));
    let mut video = Vec::new();
    let mut audio = Vec::new();
    while let Some(frame) = demuxer.next_frame().unwrap() {
        match frame.pid {
            VIDEO_PID => video.push(frame),
            AUDIO_PID => audio.push(frame),
            other => panic!("unexpected PID {other:#06x}"),
        }
    }

    assert_eq!(video.len(), 4);
    assert_eq!(audio.len(), 4);
    for (i, frame) in video.iter().enumerate() {
        assert_eq!(frame.pts, Some(90_000 + i as u64 * 3_003));
        assert!(frame.random_access);
        assert!(!frame.discontinuity);
        assert_eq!(frame.elementary_payload().len(), 900);
        assert!(frame.elementary_payload().iter().all(|&b| b == i as u8));
    }
    for (i, frame) in audio.iter().enumerate() {
        assert_eq!(frame.pts, Some(90_000 + i as u64 * 1_920));
        assert_eq!(frame.elementary_payload().len(), 300);
    }
    assert_eq!(demuxer.continuity_gap_count(), 0);
    assert_eq!(demuxer.null_packet_count(), 4);
    assert!(!demuxer.is_tracking(PID_NULL));
}

#[test]
fn dropped_packet_is_reported_and_flagged() {
    let mut stream = build_stream();
    // drop the second transport packet (video continuation)
    stream.drain(PACKET_SIZE..2 * PACKET_SIZE);

    let mut demuxer = Demuxer::new(Cursor::new(stream));
    let frames: Vec<_> = demuxer.by_ref().collect::<Result<_, _>>().unwrap();
    let gaps = demuxer.take_continuity_gaps();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].pid, VIDEO_PID);
    assert_eq!(gaps[0].expected, 1);
    assert_eq!(gaps[0].actual, 2);

    let first_video = frames.iter().find(|f| f.pid == VIDEO_PID).unwrap();
    assert!(first_video.discontinuity);
    assert_eq!(frames.iter().filter(|f| f.discontinuity).count(), 1);
}

#[test]
fn strict_mode_stops_at_dropped_packet() {
    let mut stream = build_stream();
    stream.drain(PACKET_SIZE..2 * PACKET_SIZE);
    let mut demuxer =
        Demuxer::new(Cursor::new(stream)).with_continuity_mode(ContinuityMode::Strict);
    let err = demuxer.next_frame().unwrap_err();
    assert!(matches!(err, StreamError::ContinuityGap { offset: 188, .. }));
}

#[test]
fn resync_recovers_from_leading_garbage() {
    let mut stream = vec![0x12, 0x34, 0x56, 0x78, 0x9A];
    stream.extend_from_slice(&build_stream());
    let source = PacketSource::new(Cursor::new(stream)).with_sync_recovery(SyncRecovery::Resync);
    let frames: Vec<_> = Demuxer::from_source(source)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(frames.len(), 8);
}

#[test]
fn leading_garbage_fails_without_recovery() {
    let mut stream = vec![0x12, 0x34, 0x56, 0x78, 0x9A];
    stream.extend_from_slice(&build_stream());
    let mut demuxer = Demuxer::new(Cursor::new(stream));
    let err = demuxer.next_frame().unwrap_err();
    assert!(err.is_framing());
    assert_eq!(err.offset(), 0);
}

#[test]
fn truncated_source_is_not_clean_eos() {
    let mut source = PacketSource::new(Cursor::new(vec![0u8; 100]));
    let err = source.next_packet().unwrap_err();
    assert!(matches!(
        err,
        StreamError::TruncatedRead {
            expected: 188,
            actual: 100,
            ..
        }
    ));
}

use bytes::Bytes;

use crate::adaptation_field::AdaptationField;
use crate::packet::{PACKET_SIZE, Packet, PacketHeader};

/// Encode a packet carrying `payload`, stuffed to 188 bytes.
pub(crate) fn make_packet(pid: u16, cc: u8, pusi: bool, payload: &[u8]) -> [u8; PACKET_SIZE] {
    make_packet_with(pid, cc, pusi, None, payload)
}

pub(crate) fn make_packet_with(
    pid: u16,
    cc: u8,
    pusi: bool,
    adaptation_field: Option<AdaptationField>,
    payload: &[u8],
) -> [u8; PACKET_SIZE] {
    let header = PacketHeader {
        payload_unit_start_indicator: pusi,
        pid,
        continuity_counter: cc,
        ..Default::default()
    };
    Packet::with_payload(header, adaptation_field, Bytes::copy_from_slice(payload))
        .and_then(|packet| packet.encode())
        .expect("test packet must fit")
}

pub(crate) fn stream_of(packets: &[[u8; PACKET_SIZE]]) -> Vec<u8> {
    packets.concat()
}

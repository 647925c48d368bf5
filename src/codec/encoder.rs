//! Outbound packet encoding
//!
//! Handshake replies and TCP frames go out over the driver station's TCP
//! link; control packets are the 22-byte UDP datagrams sent every tick.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::protocol::PacketType;

/// Size of a UDP control packet
pub const CONTROL_PACKET_LEN: usize = 22;

/// Size of a handshake reply
pub const HANDSHAKE_REPLY_LEN: usize = 5;

/// Status byte bits
pub const STATUS_AUTO: u8 = 0x02;
pub const STATUS_ENABLED: u8 = 0x04;
pub const STATUS_ESTOP: u8 = 0x80;

/// Match type flag sent in every control packet (practice match)
pub const MATCH_TYPE_PRACTICE: u8 = 1;

/// Match repeat number
pub const MATCH_REPEAT: u8 = 1;

/// Fields of one control packet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlPacket {
    pub sequence: u16,
    pub auto: bool,
    pub enabled: bool,
    pub estop: bool,
    pub station_code: u8,
    pub match_number: u16,
    pub seconds_remaining: u16,
}

impl ControlPacket {
    /// Robot status bitfield
    pub fn status_byte(&self) -> u8 {
        let mut status = 0;
        if self.auto {
            status |= STATUS_AUTO;
        }
        if self.enabled {
            status |= STATUS_ENABLED;
        }
        if self.estop {
            status |= STATUS_ESTOP;
        }
        status
    }
}

/// Encode the 5-byte handshake reply
pub fn encode_handshake_reply(station_code: u8, wrong_station: bool) -> [u8; HANDSHAKE_REPLY_LEN] {
    [
        0,
        3,
        PacketType::HandshakeReply.as_byte(),
        station_code,
        wrong_station as u8,
    ]
}

/// Encode a control packet stamped with the given local time
pub fn encode_control_packet(
    packet: &ControlPacket,
    now: NaiveDateTime,
) -> [u8; CONTROL_PACKET_LEN] {
    let mut out = [0u8; CONTROL_PACKET_LEN];
    let mut buf = &mut out[..];

    buf.put_u16(packet.sequence);
    // Protocol version
    buf.put_u8(0);
    buf.put_u8(packet.status_byte());
    buf.put_u8(0);
    buf.put_u8(packet.station_code);
    buf.put_u8(MATCH_TYPE_PRACTICE);
    buf.put_u16(packet.match_number);
    buf.put_u8(MATCH_REPEAT);

    buf.put_u32(now.nanosecond() / 1000);
    buf.put_u8(now.second() as u8);
    buf.put_u8(now.minute() as u8);
    buf.put_u8(now.hour() as u8);
    buf.put_u8(now.day() as u8);
    buf.put_u8(now.month() as u8);
    buf.put_u8((now.year() - 1900).clamp(0, u8::MAX as i32) as u8);

    buf.put_u16(packet.seconds_remaining);

    out
}

/// Wrap a body in a length-prefixed TCP frame
///
/// The length covers the type byte and the body.
pub fn encode_frame(packet_type: PacketType, body: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(body.len() + 3);
    frame.put_u16((body.len() + 1) as u16);
    frame.put_u8(packet_type.as_byte());
    frame.put_slice(body);
    frame.freeze()
}

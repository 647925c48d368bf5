//! Inbound packet decoding
//!
//! Everything here is a pure function over byte slices; connection state
//! is updated by the caller.

use crate::error::ProtocolError;
use crate::protocol::PacketType;

/// Size of a handshake request
pub const HANDSHAKE_REQUEST_LEN: usize = 5;

/// Size of a UDP telemetry packet
pub const TELEMETRY_PACKET_LEN: usize = 50;

/// Size of a robot status payload (starting at the type byte)
pub const STATUS_PAYLOAD_LEN: usize = 36;

const RADIO_LINKED: u8 = 0x10;
const ROBOT_LINKED: u8 = 0x20;

/// Decoded UDP telemetry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    pub team_id: u16,
    pub radio_linked: bool,
    pub robot_linked: bool,
    /// Only meaningful when `robot_linked` is set
    pub battery_voltage: f64,
}

/// Decoded robot status frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobotStatus {
    pub trip_time_ms: u32,
    /// Raw missed packet counter from the driver station
    pub missed_packets_raw: u8,
}

impl RobotStatus {
    /// Missed packets since `baseline`
    pub fn missed_since(&self, baseline: u8) -> i32 {
        self.missed_packets_raw as i32 - baseline as i32
    }
}

/// Validate a handshake request and return the team id
pub fn decode_handshake_request(data: &[u8; HANDSHAKE_REQUEST_LEN]) -> Result<u16, ProtocolError> {
    match data {
        [0, 3, 24, hi, lo] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(ProtocolError::InvalidHandshake(*data)),
    }
}

/// Decode a UDP telemetry datagram
pub fn decode_telemetry(data: &[u8]) -> Result<Telemetry, ProtocolError> {
    if data.len() < TELEMETRY_PACKET_LEN {
        return Err(ProtocolError::ShortFrame {
            expected: TELEMETRY_PACKET_LEN,
            actual: data.len(),
        });
    }

    let team_id = u16::from_be_bytes([data[4], data[5]]);
    let radio_linked = data[3] & RADIO_LINKED != 0;
    let robot_linked = data[3] & ROBOT_LINKED != 0;
    // Volts * 256
    let battery_voltage = if robot_linked {
        data[6] as f64 + data[7] as f64 / 256.0
    } else {
        0.0
    };

    Ok(Telemetry {
        team_id,
        radio_linked,
        robot_linked,
        battery_voltage,
    })
}

/// Decode a robot status payload
pub fn decode_status(payload: &[u8]) -> Result<RobotStatus, ProtocolError> {
    if payload.len() < STATUS_PAYLOAD_LEN {
        return Err(ProtocolError::ShortFrame {
            expected: STATUS_PAYLOAD_LEN,
            actual: payload.len(),
        });
    }

    Ok(RobotStatus {
        trip_time_ms: payload[1] as u32 / 2,
        missed_packets_raw: payload[2],
    })
}

/// Frame type of a TCP frame body (the byte after the length prefix)
pub fn frame_type(body: &[u8]) -> Result<PacketType, ProtocolError> {
    let byte = *body.first().ok_or(ProtocolError::EmptyFrame)?;
    PacketType::from_byte(byte).ok_or(ProtocolError::UnknownFrameType(byte))
}

//! Shared protocol types
//!
//! Alliance stations, TCP frame types, match phases and the serializable
//! snapshot structures handed to the front end.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::AssignmentError;

/// One of the six fixed field positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AllianceStation {
    R1,
    R2,
    R3,
    B1,
    B2,
    B3,
}

impl AllianceStation {
    /// All stations in protocol order
    pub const ALL: [AllianceStation; 6] = [
        AllianceStation::R1,
        AllianceStation::R2,
        AllianceStation::R3,
        AllianceStation::B1,
        AllianceStation::B2,
        AllianceStation::B3,
    ];

    /// Station code carried in handshake replies and control packets
    pub fn code(self) -> u8 {
        match self {
            AllianceStation::R1 => 0,
            AllianceStation::R2 => 1,
            AllianceStation::R3 => 2,
            AllianceStation::B1 => 3,
            AllianceStation::B2 => 4,
            AllianceStation::B3 => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AllianceStation::R1 => "R1",
            AllianceStation::R2 => "R2",
            AllianceStation::R3 => "R3",
            AllianceStation::B1 => "B1",
            AllianceStation::B2 => "B2",
            AllianceStation::B3 => "B3",
        }
    }
}

impl fmt::Display for AllianceStation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllianceStation {
    type Err = AssignmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|station| station.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AssignmentError::UnknownStation(s.to_string()))
    }
}

/// TCP frame type, the third byte of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    RobotStatus,
    HandshakeRequest,
    HandshakeReply,
    Keepalive,
}

impl PacketType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            22 => Some(PacketType::RobotStatus),
            24 => Some(PacketType::HandshakeRequest),
            25 => Some(PacketType::HandshakeReply),
            28 => Some(PacketType::Keepalive),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            PacketType::RobotStatus => 22,
            PacketType::HandshakeRequest => 24,
            PacketType::HandshakeReply => 25,
            PacketType::Keepalive => 28,
        }
    }
}

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchPhase {
    #[default]
    Idle,
    Auto,
    Teleop,
    Endgame,
}

impl MatchPhase {
    pub fn is_running(self) -> bool {
        self != MatchPhase::Idle
    }
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchPhase::Idle => "Idle",
            MatchPhase::Auto => "Auto",
            MatchPhase::Teleop => "Teleop",
            MatchPhase::Endgame => "Endgame",
        };
        f.write_str(s)
    }
}

/// Per-station overrides set by the field operator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationFlags {
    /// Auto-stop: suppresses enable
    pub astop: bool,
    /// Emergency stop, latched until the match returns to idle
    pub estop: bool,
    /// Station is bypassed for this match
    pub bypass: bool,
}

impl StationFlags {
    /// Whether any override forbids enabling the robot
    pub fn blocks_enable(&self) -> bool {
        self.astop || self.estop || self.bypass
    }
}

/// Read-only link statistics for one station
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationSnapshot {
    pub station: Option<AllianceStation>,
    pub team: u16,
    pub connected: bool,
    pub auto: bool,
    pub enabled: bool,
    pub estop: bool,
    pub astop: bool,
    pub bypass: bool,
    pub ds_linked: bool,
    pub radio_linked: bool,
    pub robot_linked: bool,
    pub battery_voltage: f64,
    pub trip_time_ms: u32,
    pub missed_packets: i32,
    pub seconds_since_robot_link: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrong_station: Option<AllianceStation>,
}

/// Status handed to the API layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldStatus {
    pub state: MatchPhase,
    pub match_name: String,
    pub match_number: u16,
    pub auto_timer: String,
    pub teleop_timer: String,
    pub endgame_timer: String,
    pub current_timer: String,
    pub elapsed: String,
    /// Station position to assigned team number
    pub alliances: BTreeMap<AllianceStation, u16>,
    pub stations: Vec<StationSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_codes() {
        for (i, station) in AllianceStation::ALL.iter().enumerate() {
            assert_eq!(station.code() as usize, i);
            assert_eq!(AllianceStation::from_code(i as u8), Some(*station));
        }
        assert_eq!(AllianceStation::from_code(6), None);
    }

    #[test]
    fn test_station_parse() {
        assert_eq!("R1".parse::<AllianceStation>(), Ok(AllianceStation::R1));
        assert_eq!("b3".parse::<AllianceStation>(), Ok(AllianceStation::B3));
        assert!("R4".parse::<AllianceStation>().is_err());
    }

    #[test]
    fn test_packet_type_bytes() {
        for ty in [
            PacketType::RobotStatus,
            PacketType::HandshakeRequest,
            PacketType::HandshakeReply,
            PacketType::Keepalive,
        ] {
            assert_eq!(PacketType::from_byte(ty.as_byte()), Some(ty));
        }
        assert_eq!(PacketType::from_byte(0x17), None);
    }

    #[test]
    fn test_flags_block_enable() {
        assert!(!StationFlags::default().blocks_enable());
        assert!(StationFlags { bypass: true, ..Default::default() }.blocks_enable());
    }
}

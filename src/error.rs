//! Error types for the field management server

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Assignment error: {0}")]
    Assignment(#[from] AssignmentError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Match error: {0}")]
    Match(#[from] MatchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Malformed or unexpected wire data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid handshake packet: {0:?}")]
    InvalidHandshake([u8; 5]),

    #[error("Unknown frame type: {0}")]
    UnknownFrameType(u8),

    #[error("Frame too short: expected {expected} bytes, got {actual}")]
    ShortFrame { expected: usize, actual: usize },

    #[error("Empty frame")]
    EmptyFrame,
}

/// Driver station link errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("No telemetry within the link timeout")]
    LinkTimeout,

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Peer address unavailable: {0}")]
    AddressUnavailable(String),

    #[error("Failed to open UDP socket: {0}")]
    UdpOpen(String),

    #[error("Socket bind failed: {0}")]
    BindFailed(String),
}

/// Station assignment errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssignmentError {
    #[error("Team {0} is not assigned to any station")]
    UnassignedTeam(u16),

    #[error("Unknown alliance station: {0}")]
    UnknownStation(String),
}

/// Configuration errors, fatal at startup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to read config: {0}")]
    Io(String),
}

/// Match sequencing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("A match is already running")]
    AlreadyRunning,

    #[error("No match is running")]
    NotRunning,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;

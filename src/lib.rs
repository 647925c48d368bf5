//! # Field FMS
//!
//! Field management server for robotics competition matches: driver
//! station communication plus the match clock that gates robot enable.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                          FIELD MANAGEMENT SERVER                          │
//! │                                                                          │
//! │   ┌────────────────────┐        ┌──────────────────────────────────┐     │
//! │   │  Front end (ui)    │──────▶ │        Field (field::Field)       │     │
//! │   │  admin / viewer ws │        │ start · abort · status · estop    │     │
//! │   └────────────────────┘        └───────┬──────────────────┬────────┘     │
//! │                                         │                  │              │
//! │                                         ▼                  ▼              │
//! │                      ┌──────────────────────────┐  ┌──────────────────┐   │
//! │                      │ MatchController          │  │ PhaseAnnouncer   │   │
//! │                      │ Idle→Auto→Teleop→Endgame │  │ (sound cues)     │   │
//! │                      └────────────┬─────────────┘  └──────────────────┘   │
//! │                                   │ command_all                          │
//! │                                   ▼                                      │
//! │   ┌──────────────────────────────────────────────────────────────────┐   │
//! │   │              StationRegistry (station::registry)                  │   │
//! │   │   R1      R2      R3      B1      B2      B3                      │   │
//! │   │  ┌────┐  ┌────┐  ┌────┐  ┌────┐  ┌────┐  ┌────┐                   │   │
//! │   │  │Conn│  │Conn│  │ -- │  │Conn│  │ -- │  │Conn│  StationConnection │   │
//! │   │  └────┘  └────┘  └────┘  └────┘  └────┘  └────┘                   │   │
//! │   └───────▲───────────────────▲──────────────────────▲───────────────┘   │
//! │           │ attach/detach     │ telemetry            │ tick (1 Hz)       │
//! │   ┌───────┴────────┐  ┌───────┴────────┐  ┌──────────┴───────────┐       │
//! │   │ TCP acceptor   │  │ UDP receiver   │  │ Control scheduler    │       │
//! │   │ :1750 + reads  │  │ :1160          │  │ UDP control → :1121  │       │
//! │   └───────▲────────┘  └───────▲────────┘  └──────────┬───────────┘       │
//! └───────────┼───────────────────┼──────────────────────┼───────────────────┘
//!             │ TCP               │ UDP telemetry        │ UDP control
//!             ▼                   │                      ▼
//!   ┌──────────────────────────────────────────────────────────────────┐
//!   │                 Driver stations (one per team)                     │
//!   └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod field;
pub mod network;
pub mod protocol;
pub mod station;
pub mod ui;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::net::Ipv4Addr;

    /// Address hardcoded into the driver station software
    pub const FMS_ADDRESS: Ipv4Addr = Ipv4Addr::new(10, 0, 100, 5);

    /// TCP port driver stations connect to
    pub const DS_TCP_LISTEN_PORT: u16 = 1750;

    /// UDP port telemetry arrives on
    pub const DS_UDP_RECEIVE_PORT: u16 = 1160;

    /// UDP port control packets are sent to.
    /// FMS Lite uses 1120; 1121 works without the DS prompting for control.
    pub const DS_UDP_SEND_PORT: u16 = 1121;

    /// Largest TCP frame accepted from a driver station
    pub const MAX_TCP_FRAME_BYTES: usize = 4096;

    /// Default admin UI port
    pub const DEFAULT_ADMIN_PORT: u16 = 8080;

    /// Default viewer UI port
    pub const DEFAULT_VIEWER_PORT: u16 = 8081;
}

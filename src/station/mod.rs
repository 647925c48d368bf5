//! Alliance stations and their driver station connections

pub mod connection;
pub mod registry;

pub use connection::{CloseSignal, StationConnection};
pub use registry::{MatchCommand, StationEntry, StationRegistry};

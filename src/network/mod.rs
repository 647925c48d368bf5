//! Driver station network transport
//!
//! TCP for the handshake and status frames, UDP for telemetry in and
//! control packets out.

pub mod comms;
pub mod scheduler;
pub mod tcp;
pub mod udp;

pub use comms::DriverStationComms;
pub use scheduler::{ControlContext, MatchInfo};
pub use udp::create_socket;

use tokio::sync::watch;

/// Resolves once the stop flag is set or its sender is gone
pub(crate) async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

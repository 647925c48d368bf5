//! UDP telemetry receiver

use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::codec::decoder::{decode_telemetry, TELEMETRY_PACKET_LEN};
use crate::error::ConnectionError;
use crate::station::StationRegistry;

use super::wait_for_stop;

/// Create a non-blocking UDP socket bound to `addr`
///
/// `SO_REUSEADDR` lets a restarted receiver rebind the port immediately.
pub fn create_socket(addr: SocketAddr) -> Result<UdpSocket, ConnectionError> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| ConnectionError::BindFailed(e.to_string()))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| ConnectionError::BindFailed(format!("SO_REUSEADDR: {}", e)))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| ConnectionError::BindFailed(format!("non-blocking: {}", e)))?;
    socket
        .bind(&addr.into())
        .map_err(|e| ConnectionError::BindFailed(format!("{}: {}", addr, e)))?;

    UdpSocket::from_std(socket.into()).map_err(|e| ConnectionError::BindFailed(e.to_string()))
}

/// Receive telemetry until stopped, routing each datagram by team id
pub async fn run_receiver(
    socket: UdpSocket,
    registry: Arc<StationRegistry>,
    mut stop: watch::Receiver<bool>,
) {
    if let Ok(addr) = socket.local_addr() {
        tracing::info!("Listening for driver stations on UDP {}", addr);
    }

    let mut buf = [0u8; 1500];
    loop {
        let len = tokio::select! {
            _ = wait_for_stop(&mut stop) => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, _)) => len,
                Err(e) => {
                    tracing::debug!("UDP receive error: {}", e);
                    continue;
                }
            },
        };

        if len < TELEMETRY_PACKET_LEN {
            tracing::trace!(len, "Dropping short telemetry datagram");
            continue;
        }
        let telemetry = match decode_telemetry(&buf[..len]) {
            Ok(telemetry) => telemetry,
            Err(e) => {
                tracing::trace!("Dropping telemetry: {}", e);
                continue;
            }
        };
        if !registry.route_telemetry(&telemetry) {
            tracing::trace!(
                team = telemetry.team_id,
                "Telemetry from team without a live connection"
            );
        }
    }

    tracing::info!("UDP receiver stopped");
}

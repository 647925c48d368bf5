//! TCP handshake acceptor and per-connection read loop

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::codec::decoder::{decode_handshake_request, frame_type, HANDSHAKE_REQUEST_LEN};
use crate::codec::encoder::encode_handshake_reply;
use crate::config::NetworkConfig;
use crate::constants::MAX_TCP_FRAME_BYTES;
use crate::error::{AssignmentError, ConnectionError, Error, ProtocolError};
use crate::protocol::{AllianceStation, PacketType};
use crate::station::{CloseSignal, StationConnection, StationRegistry};

use super::wait_for_stop;

/// Bind the driver station TCP listener
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ConnectionError> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| ConnectionError::BindFailed(format!("{}: {}", addr, e)))
}

/// Accept driver stations until stopped
///
/// Every accepted stream gets its own session task. On stop the listener
/// is dropped first, then all sessions are joined.
pub async fn run_acceptor(
    listener: TcpListener,
    registry: Arc<StationRegistry>,
    config: NetworkConfig,
    mut stop: watch::Receiver<bool>,
) {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Listening for driver stations on TCP {}", addr);
    }

    let config = Arc::new(config);
    let mut sessions = JoinSet::new();
    loop {
        tokio::select! {
            _ = wait_for_stop(&mut stop) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let registry = registry.clone();
                    let config = config.clone();
                    let stop = stop.clone();
                    sessions.spawn(async move {
                        if let Err(e) = serve(stream, peer, registry, config, stop).await {
                            tracing::info!(%peer, "Driver station session ended: {}", e);
                        }
                    });
                }
                Err(e) => tracing::warn!("Error accepting driver station connection: {}", e),
            },
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
        }
    }

    drop(listener);
    while sessions.join_next().await.is_some() {}
    tracing::info!("TCP acceptor stopped");
}

/// Team number encoded in a `10.TE.AM.x` address
pub fn team_from_address(ip: IpAddr) -> Option<u16> {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            (octets[0] == 10).then(|| octets[1] as u16 * 100 + octets[2] as u16)
        }
        IpAddr::V6(_) => None,
    }
}

async fn serve(
    mut stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<StationRegistry>,
    config: Arc<NetworkConfig>,
    mut stop: watch::Receiver<bool>,
) -> Result<(), Error> {
    let mut request = [0u8; HANDSHAKE_REQUEST_LEN];
    match timeout(config.handshake_timeout(), stream.read_exact(&mut request)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => return Err(ConnectionError::ConnectionLost(e.to_string()).into()),
        Err(_) => return Err(ConnectionError::ConnectionLost("handshake timed out".into()).into()),
    }

    let team_id = match decode_handshake_request(&request) {
        Ok(team_id) => team_id,
        Err(e) => {
            tracing::warn!(%peer, "Invalid initial packet received: {:?}", request);
            reject_later(stream, &config, &mut stop).await;
            return Err(e.into());
        }
    };

    let Some(station) = registry.station_for_team(team_id) else {
        tracing::info!(team = team_id, "Rejecting connection from team not in the current match");
        reject_later(stream, &config, &mut stop).await;
        return Err(AssignmentError::UnassignedTeam(team_id).into());
    };

    let wrong_station = if config.check_station_ip {
        wrong_station_for(&registry, team_id, station, peer.ip())
    } else {
        None
    };
    if let Some(plugged_into) = wrong_station {
        tracing::warn!(
            team = team_id,
            assigned = %station,
            %plugged_into,
            "Team is in incorrect station"
        );
    }

    let reply = encode_handshake_reply(station.code(), wrong_station.is_some());
    stream
        .write_all(&reply)
        .await
        .map_err(|e| ConnectionError::SendFailed(e.to_string()))?;
    tracing::info!(team = team_id, %station, "Accepting connection");

    let (mut connection, close_rx) = StationConnection::open(
        team_id,
        station,
        &stream,
        config.udp_send_port,
        config.udp_link_timeout(),
    )
    .await?;
    connection.set_wrong_station(wrong_station);
    let id = connection.id();

    if registry.attach(connection).is_err() {
        return Err(AssignmentError::UnassignedTeam(team_id).into());
    }

    let result =
        read_loop(&mut stream, station, id, &registry, &config, close_rx, &mut stop).await;
    if registry.detach(station, id) {
        tracing::info!(team = team_id, %station, "Driver station detached");
    }
    result
}

fn wrong_station_for(
    registry: &StationRegistry,
    team_id: u16,
    station: AllianceStation,
    ip: IpAddr,
) -> Option<AllianceStation> {
    let address_team = team_from_address(ip)?;
    if address_team == team_id {
        return None;
    }
    registry
        .station_for_team(address_team)
        .filter(|plugged_into| *plugged_into != station)
}

/// Hold a rejected stream open briefly so the client does not spin on reconnects
async fn reject_later(stream: TcpStream, config: &NetworkConfig, stop: &mut watch::Receiver<bool>) {
    tokio::select! {
        _ = tokio::time::sleep(config.reject_delay()) => {}
        _ = wait_for_stop(stop) => {}
    }
    drop(stream);
}

async fn read_loop(
    stream: &mut TcpStream,
    station: AllianceStation,
    id: uuid::Uuid,
    registry: &StationRegistry,
    config: &NetworkConfig,
    mut close_rx: CloseSignal,
    stop: &mut watch::Receiver<bool>,
) -> Result<(), Error> {
    let mut body = vec![0u8; MAX_TCP_FRAME_BYTES];
    loop {
        let len = tokio::select! {
            _ = &mut close_rx => return Ok(()),
            _ = wait_for_stop(stop) => return Ok(()),
            read = timeout(config.tcp_read_timeout(), read_frame(stream, &mut body)) => match read {
                Ok(result) => result?,
                Err(_) => {
                    let lost = ConnectionError::ConnectionLost("read deadline expired".into());
                    return Err(lost.into());
                }
            },
        };
        let frame = &body[..len];

        match frame_type(frame)? {
            PacketType::Keepalive => {}
            PacketType::RobotStatus => {
                if let Some(result) = registry.ingest_status_frame(station, id, frame) {
                    result?;
                }
            }
            other => return Err(ProtocolError::UnknownFrameType(other.as_byte()).into()),
        }
    }
}

/// Read one length-prefixed frame into `body`, returning its length
async fn read_frame(stream: &mut TcpStream, body: &mut [u8]) -> Result<usize, Error> {
    let len = stream
        .read_u16()
        .await
        .map_err(|e| ConnectionError::ConnectionLost(e.to_string()))? as usize;
    if len == 0 {
        return Err(ProtocolError::EmptyFrame.into());
    }
    if len > body.len() {
        return Err(ProtocolError::ShortFrame {
            expected: body.len(),
            actual: len,
        }
        .into());
    }
    stream
        .read_exact(&mut body[..len])
        .await
        .map_err(|e| ConnectionError::ConnectionLost(e.to_string()))?;
    Ok(len)
}

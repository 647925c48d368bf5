//! Live link to one team's driver station
//!
//! The connection owns the outbound UDP socket and a close handle for the
//! TCP read loop that holds the stream. All mutable link state lives here
//! and is only touched through the registry entry that owns it.

use chrono::Local;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use crate::codec::decoder::{decode_status, decode_telemetry, Telemetry};
use crate::codec::encoder::{encode_control_packet, ControlPacket};
use crate::error::{ConnectionError, ProtocolError};
use crate::protocol::{AllianceStation, StationSnapshot};

/// Resolves when the owning connection is closed or dropped
pub type CloseSignal = oneshot::Receiver<()>;

/// One team's driver station link
pub struct StationConnection {
    id: Uuid,
    team_id: u16,
    station: AllianceStation,
    peer: SocketAddr,

    // What the server is telling the robot
    auto: bool,
    enabled: bool,
    estop: bool,

    // What the driver station reports
    ds_linked: bool,
    radio_linked: bool,
    robot_linked: bool,
    battery_voltage: f64,
    trip_time_ms: u32,
    missed_packets: i32,
    missed_packets_raw: u8,
    missed_packet_baseline: u8,
    seconds_since_robot_link: f64,

    sequence: u16,
    last_packet_at: Option<Instant>,
    last_robot_link_at: Instant,
    link_timeout: Duration,

    /// Station the DS is physically plugged into, when it is not its own
    wrong_station: Option<AllianceStation>,

    udp: Option<UdpSocket>,
    close_tx: Option<oneshot::Sender<()>>,
}

impl StationConnection {
    /// Open the UDP side of a connection for a handshaken TCP stream
    ///
    /// Control packets go to the TCP peer's address on `udp_send_port`.
    pub async fn open(
        team_id: u16,
        station: AllianceStation,
        tcp: &TcpStream,
        udp_send_port: u16,
        link_timeout: Duration,
    ) -> Result<(Self, CloseSignal), ConnectionError> {
        let peer = tcp
            .peer_addr()
            .map_err(|e| ConnectionError::AddressUnavailable(e.to_string()))?;
        let target = SocketAddr::new(peer.ip(), udp_send_port);

        let bind_addr = if target.is_ipv4() {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
        } else {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)
        };
        let udp = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| ConnectionError::UdpOpen(e.to_string()))?;
        udp.connect(target)
            .await
            .map_err(|e| ConnectionError::UdpOpen(format!("{}: {}", target, e)))?;

        tracing::info!(team = team_id, %station, peer = %peer.ip(), "Driver station connected");

        let (close_tx, close_rx) = oneshot::channel();
        let connection = Self {
            id: Uuid::new_v4(),
            team_id,
            station,
            peer,
            auto: false,
            enabled: false,
            estop: false,
            ds_linked: false,
            radio_linked: false,
            robot_linked: false,
            battery_voltage: 0.0,
            trip_time_ms: 0,
            missed_packets: 0,
            missed_packets_raw: 0,
            missed_packet_baseline: 0,
            seconds_since_robot_link: 0.0,
            sequence: 0,
            last_packet_at: None,
            last_robot_link_at: Instant::now(),
            link_timeout,
            wrong_station: None,
            udp: Some(udp),
            close_tx: Some(close_tx),
        };
        Ok((connection, close_rx))
    }

    /// Session id, unique per accepted connection
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn team_id(&self) -> u16 {
        self.team_id
    }

    pub fn station(&self) -> AllianceStation {
        self.station
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Next sequence number to be sent
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn is_closed(&self) -> bool {
        self.udp.is_none()
    }

    pub fn set_wrong_station(&mut self, station: Option<AllianceStation>) {
        self.wrong_station = station;
    }

    /// Set the command flags carried by the next control packet
    pub fn set_command(&mut self, auto: bool, enabled: bool, estop: bool) {
        self.auto = auto;
        self.enabled = enabled;
        self.estop = estop;
    }

    pub fn command(&self) -> (bool, bool, bool) {
        (self.auto, self.enabled, self.estop)
    }

    pub fn ds_linked(&self) -> bool {
        self.ds_linked
    }

    pub fn radio_linked(&self) -> bool {
        self.radio_linked
    }

    pub fn robot_linked(&self) -> bool {
        self.robot_linked
    }

    pub fn battery_voltage(&self) -> f64 {
        self.battery_voltage
    }

    pub fn trip_time_ms(&self) -> u32 {
        self.trip_time_ms
    }

    pub fn missed_packets(&self) -> i32 {
        self.missed_packets
    }

    /// Send one control packet and age the link status
    ///
    /// A send failure is returned after the link checks have run; the
    /// connection stays open and the next tick retries.
    pub fn tick(
        &mut self,
        match_number: u16,
        seconds_remaining: u16,
    ) -> Result<(), ConnectionError> {
        let sent = self.send_control_packet(match_number, seconds_remaining);

        let now = Instant::now();
        let timed_out = self
            .last_packet_at
            .map_or(true, |at| now.duration_since(at) > self.link_timeout);
        if timed_out {
            self.ds_linked = false;
            self.radio_linked = false;
            self.robot_linked = false;
            self.battery_voltage = 0.0;
        }
        self.seconds_since_robot_link = now.duration_since(self.last_robot_link_at).as_secs_f64();

        sent
    }

    fn send_control_packet(
        &mut self,
        match_number: u16,
        seconds_remaining: u16,
    ) -> Result<(), ConnectionError> {
        let packet = ControlPacket {
            sequence: self.sequence,
            auto: self.auto,
            enabled: self.enabled,
            estop: self.estop,
            station_code: self.station.code(),
            match_number,
            seconds_remaining,
        };
        let bytes = encode_control_packet(&packet, Local::now().naive_local());
        self.sequence = self.sequence.wrapping_add(1);

        let udp = self
            .udp
            .as_ref()
            .ok_or_else(|| ConnectionError::ConnectionLost("connection closed".into()))?;
        udp.try_send(&bytes)
            .map(|_| ())
            .map_err(|e| ConnectionError::SendFailed(e.to_string()))
    }

    /// Decode and apply a raw telemetry datagram
    ///
    /// Returns whether the datagram belonged to this connection.
    pub fn ingest_telemetry(&mut self, raw: &[u8]) -> Result<bool, ProtocolError> {
        let telemetry = decode_telemetry(raw)?;
        Ok(self.apply_telemetry(&telemetry))
    }

    /// Apply decoded telemetry if it is for this connection's team
    pub fn apply_telemetry(&mut self, telemetry: &Telemetry) -> bool {
        if telemetry.team_id != self.team_id {
            return false;
        }

        let now = Instant::now();
        self.ds_linked = true;
        self.last_packet_at = Some(now);
        self.radio_linked = telemetry.radio_linked;
        self.robot_linked = telemetry.robot_linked;
        if telemetry.robot_linked {
            self.last_robot_link_at = now;
            self.battery_voltage = telemetry.battery_voltage;
        }
        true
    }

    /// Apply a robot status payload (frame body starting at the type byte)
    pub fn ingest_status_frame(&mut self, raw: &[u8]) -> Result<(), ProtocolError> {
        let status = decode_status(raw)?;
        self.trip_time_ms = status.trip_time_ms;
        self.missed_packets_raw = status.missed_packets_raw;
        self.missed_packets = status.missed_since(self.missed_packet_baseline);
        Ok(())
    }

    /// Start counting missed packets from the current raw counter
    pub fn reset_missed_packet_baseline(&mut self) {
        self.missed_packet_baseline = self.missed_packets_raw;
        self.missed_packets = 0;
    }

    /// Release the UDP socket and signal the TCP read loop to drop its stream
    pub fn close(&mut self) {
        if self.udp.take().is_some() {
            tracing::info!(
                team = self.team_id,
                station = %self.station,
                "Closing driver station connection"
            );
        }
        if let Some(close_tx) = self.close_tx.take() {
            let _ = close_tx.send(());
        }
    }

    /// Link statistics; override flags are filled in by the registry
    pub fn snapshot(&self) -> StationSnapshot {
        StationSnapshot {
            station: Some(self.station),
            team: self.team_id,
            connected: !self.is_closed(),
            auto: self.auto,
            enabled: self.enabled,
            estop: self.estop,
            ds_linked: self.ds_linked,
            radio_linked: self.radio_linked,
            robot_linked: self.robot_linked,
            battery_voltage: self.battery_voltage,
            trip_time_ms: self.trip_time_ms,
            missed_packets: self.missed_packets,
            seconds_since_robot_link: self.seconds_since_robot_link,
            wrong_station: self.wrong_station,
            ..Default::default()
        }
    }
}

impl Drop for StationConnection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for StationConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StationConnection")
            .field("id", &self.id)
            .field("team_id", &self.team_id)
            .field("station", &self.station)
            .field("peer", &self.peer)
            .field("sequence", &self.sequence)
            .field("closed", &self.is_closed())
            .finish()
    }
}

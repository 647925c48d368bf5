//! Loopback tests against a running field with driver station comms

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use field_fms::codec::encoder::{encode_frame, STATUS_AUTO, STATUS_ENABLED};
use field_fms::config::{AppConfig, NetworkConfig};
use field_fms::field::{Field, SilentAnnouncer};
use field_fms::protocol::{AllianceStation, PacketType, StationSnapshot};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{sleep, timeout, Instant};

const WAIT: Duration = Duration::from_secs(3);

struct Harness {
    field: Arc<Field>,
    tcp_addr: SocketAddr,
    udp_addr: SocketAddr,
    ds_udp: UdpSocket,
}

async fn harness(alliances: &[(AllianceStation, u16)]) -> Harness {
    let ds_udp = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let ds_port = ds_udp.local_addr().unwrap().port();

    let mut config = AppConfig::default();
    config.network = NetworkConfig {
        control_period_ms: 50,
        reject_delay_ms: 100,
        reset_cooldown_ms: 10,
        ..NetworkConfig::local(0, 0, ds_port)
    };
    config.timing.auto = "2s".into();
    config.timing.teleop = "5s".into();
    config.timing.endgame = "1s".into();

    let field = Arc::new(Field::new(&config, Arc::new(SilentAnnouncer)).unwrap());
    let mapping: BTreeMap<AllianceStation, u16> = alliances.iter().copied().collect();
    field.assign_teams(&mapping);
    field.start_comms().await.unwrap();

    let (tcp_addr, udp_addr) = field.comms().unwrap().local_addrs().await.unwrap();
    let udp_addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), udp_addr.port());
    Harness {
        field,
        tcp_addr,
        udp_addr,
        ds_udp,
    }
}

fn station(field: &Field, station: AllianceStation) -> StationSnapshot {
    field
        .status()
        .stations
        .into_iter()
        .find(|snapshot| snapshot.station == Some(station))
        .unwrap_or_default()
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}

async fn handshake(addr: SocketAddr, team: u16) -> (TcpStream, [u8; 5]) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let [hi, lo] = team.to_be_bytes();
    stream.write_all(&[0, 3, 24, hi, lo]).await.unwrap();
    let mut reply = [0u8; 5];
    timeout(WAIT, stream.read_exact(&mut reply)).await.unwrap().unwrap();
    (stream, reply)
}

/// Read until EOF; a rejected or dropped connection yields no bytes
async fn read_to_eof(stream: &mut TcpStream) -> Vec<u8> {
    let mut rest = Vec::new();
    timeout(WAIT, stream.read_to_end(&mut rest))
        .await
        .expect("connection was not closed")
        .ok();
    rest
}

async fn next_control_packet(ds_udp: &UdpSocket) -> Vec<u8> {
    let mut buf = [0u8; 64];
    let len = timeout(WAIT, ds_udp.recv(&mut buf)).await.unwrap().unwrap();
    buf[..len].to_vec()
}

fn telemetry(team: u16, status: u8, volts: u8, frac: u8) -> [u8; 50] {
    let mut data = [0u8; 50];
    data[3] = status;
    data[4..6].copy_from_slice(&team.to_be_bytes());
    data[6] = volts;
    data[7] = frac;
    data
}

#[tokio::test]
async fn handshake_assigns_station_and_sends_control_packets() {
    let h = harness(&[(AllianceStation::R2, 254)]).await;

    let (_stream, reply) = handshake(h.tcp_addr, 254).await;
    assert_eq!(reply, [0, 3, 25, AllianceStation::R2.code(), 0]);

    let field = h.field.clone();
    assert!(wait_until(|| station(&field, AllianceStation::R2).connected).await);

    let packet = next_control_packet(&h.ds_udp).await;
    assert_eq!(packet.len(), 22);
    assert_eq!(packet[3] & (STATUS_AUTO | STATUS_ENABLED), 0);
    assert_eq!(packet[5], AllianceStation::R2.code());
    assert_eq!(packet[6], 1);

    h.field.shutdown().await;
}

#[tokio::test]
async fn telemetry_and_status_frames_update_snapshot() {
    let h = harness(&[(AllianceStation::B1, 1678)]).await;
    let (mut stream, _) = handshake(h.tcp_addr, 1678).await;
    let field = h.field.clone();
    assert!(wait_until(|| station(&field, AllianceStation::B1).connected).await);

    h.ds_udp
        .send_to(&telemetry(1678, 0x30, 12, 128), h.udp_addr)
        .await
        .unwrap();
    assert!(
        wait_until(|| {
            let snapshot = station(&field, AllianceStation::B1);
            snapshot.ds_linked
                && snapshot.robot_linked
                && (snapshot.battery_voltage - 12.5).abs() < 1e-9
        })
        .await
    );

    // Unknown teams are dropped silently
    h.ds_udp
        .send_to(&telemetry(9999, 0x30, 11, 0), h.udp_addr)
        .await
        .unwrap();

    // Round trip 20 / 2 ms, 3 missed packets
    let mut status = [0u8; 35];
    status[0] = 20;
    status[1] = 3;
    let frame = encode_frame(PacketType::RobotStatus, &status);
    assert_eq!(&frame[..3], &[0, 36, 22]);
    stream.write_all(&frame).await.unwrap();
    stream
        .write_all(&encode_frame(PacketType::Keepalive, &[]))
        .await
        .unwrap();
    assert!(
        wait_until(|| {
            let snapshot = station(&field, AllianceStation::B1);
            snapshot.trip_time_ms == 10 && snapshot.missed_packets == 3
        })
        .await
    );

    h.field.shutdown().await;
}

#[tokio::test]
async fn unassigned_team_is_rejected_after_delay() {
    let h = harness(&[(AllianceStation::R1, 254)]).await;

    let mut stream = TcpStream::connect(h.tcp_addr).await.unwrap();
    stream.write_all(&[0, 3, 24, 0x04, 0xD2]).await.unwrap();
    assert!(read_to_eof(&mut stream).await.is_empty());
    assert!(!station(&h.field, AllianceStation::R1).connected);

    h.field.shutdown().await;
}

#[tokio::test]
async fn invalid_handshake_is_rejected() {
    let h = harness(&[(AllianceStation::R1, 254)]).await;

    let mut stream = TcpStream::connect(h.tcp_addr).await.unwrap();
    stream.write_all(&[1, 2, 3, 4, 5]).await.unwrap();
    assert!(read_to_eof(&mut stream).await.is_empty());
    assert!(!station(&h.field, AllianceStation::R1).connected);

    h.field.shutdown().await;
}

#[tokio::test]
async fn unknown_frame_type_closes_connection() {
    let h = harness(&[(AllianceStation::R3, 118)]).await;
    let (mut stream, _) = handshake(h.tcp_addr, 118).await;
    let field = h.field.clone();
    assert!(wait_until(|| station(&field, AllianceStation::R3).connected).await);

    // Well-formed frame of a type driver stations never send
    let reply = encode_frame(PacketType::HandshakeReply, &[]);
    stream.write_all(&reply).await.unwrap();
    read_to_eof(&mut stream).await;
    assert!(wait_until(|| !station(&field, AllianceStation::R3).connected).await);

    h.field.shutdown().await;
}

#[tokio::test]
async fn dropped_client_is_detached() {
    let h = harness(&[(AllianceStation::R1, 254)]).await;
    let (stream, _) = handshake(h.tcp_addr, 254).await;
    let field = h.field.clone();
    assert!(wait_until(|| station(&field, AllianceStation::R1).connected).await);

    drop(stream);
    assert!(wait_until(|| !station(&field, AllianceStation::R1).connected).await);
    // Assignment survives the disconnect
    assert_eq!(field.status().alliances.get(&AllianceStation::R1), Some(&254));

    h.field.shutdown().await;
}

#[tokio::test]
async fn reset_comms_forces_reconnect() {
    let h = harness(&[(AllianceStation::B2, 971)]).await;
    let (mut stream, _) = handshake(h.tcp_addr, 971).await;
    let field = h.field.clone();
    assert!(wait_until(|| station(&field, AllianceStation::B2).connected).await);

    h.field.reset_comms().await.unwrap();
    read_to_eof(&mut stream).await;
    assert!(!station(&field, AllianceStation::B2).connected);

    let comms = h.field.comms().unwrap();
    assert!(comms.is_running().await);
    let (tcp_addr, _) = comms.local_addrs().await.unwrap();
    let (_stream, reply) = handshake(tcp_addr, 971).await;
    assert_eq!(reply[3], AllianceStation::B2.code());
    assert!(wait_until(|| station(&field, AllianceStation::B2).connected).await);

    h.field.shutdown().await;
    assert!(!h.field.comms().unwrap().is_running().await);
}

#[tokio::test]
async fn running_match_enables_connected_robots() {
    let h = harness(&[(AllianceStation::R1, 254), (AllianceStation::B3, 1114)]).await;
    let (_stream, _) = handshake(h.tcp_addr, 254).await;
    let field = h.field.clone();
    assert!(wait_until(|| station(&field, AllianceStation::R1).connected).await);

    // Bypassing an absent station must not hold back the others
    h.field.set_bypass(AllianceStation::B3, true);
    h.field.start(7).unwrap();

    let mut enabled_auto = None;
    for _ in 0..20 {
        let packet = next_control_packet(&h.ds_udp).await;
        if packet[3] & STATUS_ENABLED != 0 {
            enabled_auto = Some(packet);
            break;
        }
    }
    let packet = enabled_auto.expect("robot was never enabled");
    assert_ne!(packet[3] & STATUS_AUTO, 0);
    assert_eq!(u16::from_be_bytes([packet[7], packet[8]]), 7);
    let seconds_remaining = u16::from_be_bytes([packet[20], packet[21]]);
    assert!(seconds_remaining <= 2);

    let snapshot = station(&field, AllianceStation::R1);
    assert!(snapshot.auto && snapshot.enabled);

    h.field.abort().unwrap();
    assert!(wait_until(|| !station(&field, AllianceStation::R1).enabled).await);

    h.field.shutdown().await;
}

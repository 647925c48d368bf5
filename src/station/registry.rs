//! Alliance station registry
//!
//! The single table of station assignments and live connections shared by
//! the listeners, the control scheduler and the match clock. Entries are
//! locked individually, so traffic for one station never waits on another.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::codec::decoder::Telemetry;
use crate::error::ProtocolError;
use crate::protocol::{AllianceStation, StationFlags, StationSnapshot};
use crate::station::connection::StationConnection;

/// One station's assignment, overrides and optional live link
#[derive(Debug, Default)]
pub struct StationEntry {
    /// Assigned team, 0 when unassigned
    pub team: u16,
    pub flags: StationFlags,
    pub connection: Option<StationConnection>,
}

impl StationEntry {
    fn snapshot(&self, station: AllianceStation) -> StationSnapshot {
        let mut snapshot = match &self.connection {
            Some(connection) => connection.snapshot(),
            None => StationSnapshot::default(),
        };
        snapshot.station = Some(station);
        snapshot.team = self.team;
        snapshot.estop = self.flags.estop;
        snapshot.astop = self.flags.astop;
        snapshot.bypass = self.flags.bypass;
        snapshot
    }

    fn detach(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
    }
}

/// What the match clock is currently commanding every robot to do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchCommand {
    pub auto: bool,
    pub enabled: bool,
}

/// Station table
#[derive(Debug, Default)]
pub struct StationRegistry {
    entries: DashMap<AllianceStation, StationEntry>,
    command: RwLock<MatchCommand>,
}

impl StationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or update entries; stations not mentioned are left alone
    ///
    /// A live connection belonging to a team that no longer holds the
    /// station is closed.
    pub fn assign_teams(&self, mapping: &BTreeMap<AllianceStation, u16>) {
        for (&station, &team) in mapping {
            let mut entry = self.entries.entry(station).or_default();
            if entry.team != team {
                tracing::info!(%station, from = entry.team, to = team, "Reassigning station");
            }
            entry.team = team;
            let stale = entry
                .connection
                .as_ref()
                .is_some_and(|connection| connection.team_id() != team);
            if stale {
                entry.detach();
            }
        }
    }

    /// Close every connection and drop every entry
    pub fn reset_all(&self) {
        for mut entry in self.entries.iter_mut() {
            entry.detach();
        }
        self.entries.clear();
        tracing::info!("Alliance stations reset");
    }

    /// Latch the emergency stop for a station
    pub fn estop(&self, station: AllianceStation) {
        let Some(mut entry) = self.entries.get_mut(&station) else {
            tracing::warn!(%station, "Ignoring emergency stop for unassigned station");
            return;
        };
        entry.flags.estop = true;
        if let Some(connection) = entry.connection.as_mut() {
            let (auto, _, _) = connection.command();
            connection.set_command(auto, false, true);
        }
        tracing::warn!(%station, team = entry.team, "Emergency stop");
    }

    pub fn set_astop(&self, station: AllianceStation, astop: bool) {
        match self.entries.get_mut(&station) {
            Some(mut entry) => entry.flags.astop = astop,
            None => tracing::warn!(%station, "Ignoring astop for unassigned station"),
        }
    }

    pub fn set_bypass(&self, station: AllianceStation, bypass: bool) {
        match self.entries.get_mut(&station) {
            Some(mut entry) => entry.flags.bypass = bypass,
            None => tracing::warn!(%station, "Ignoring bypass for unassigned station"),
        }
    }

    /// Release estop and astop latches
    pub fn clear_latched_stops(&self) {
        for mut entry in self.entries.iter_mut() {
            entry.flags.estop = false;
            entry.flags.astop = false;
        }
    }

    pub fn flags(&self, station: AllianceStation) -> StationFlags {
        self.entries
            .get(&station)
            .map(|entry| entry.flags)
            .unwrap_or_default()
    }

    /// Per-station link statistics in station order
    pub fn connection_snapshot(&self) -> Vec<StationSnapshot> {
        let mut snapshots: Vec<StationSnapshot> = self
            .entries
            .iter()
            .map(|entry| entry.value().snapshot(*entry.key()))
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.station);
        snapshots
    }

    /// Station position to assigned team
    pub fn team_numbers(&self) -> BTreeMap<AllianceStation, u16> {
        self.entries
            .iter()
            .map(|entry| (*entry.key(), entry.team))
            .collect()
    }

    /// Station a team is assigned to, first in R1..B3 order
    pub fn station_for_team(&self, team: u16) -> Option<AllianceStation> {
        if team == 0 {
            return None;
        }
        AllianceStation::ALL.into_iter().find(|station| {
            self.entries
                .get(station)
                .is_some_and(|entry| entry.team == team)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn live_connections(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.connection.is_some())
            .count()
    }

    /// Attach a handshaken connection, replacing any previous one
    ///
    /// Returns the connection back if its team no longer holds the station.
    pub fn attach(&self, connection: StationConnection) -> Result<(), StationConnection> {
        let station = connection.station();
        let Some(mut entry) = self.entries.get_mut(&station) else {
            return Err(connection);
        };
        if entry.team != connection.team_id() {
            return Err(connection);
        }
        entry.detach();

        let mut connection = connection;
        let command = *self.command.read();
        connection.set_command(
            command.auto,
            command.enabled && !entry.flags.blocks_enable(),
            entry.flags.estop,
        );
        entry.connection = Some(connection);
        Ok(())
    }

    /// Detach a connection if it is still the one attached to the station
    pub fn detach(&self, station: AllianceStation, id: Uuid) -> bool {
        match self.entries.get_mut(&station) {
            Some(mut entry) if entry.connection.as_ref().is_some_and(|c| c.id() == id) => {
                entry.detach();
                true
            }
            _ => false,
        }
    }

    /// Close every live connection, keeping assignments
    pub fn disconnect_all(&self) {
        for mut entry in self.entries.iter_mut() {
            entry.detach();
        }
    }

    /// Run `f` against a specific connection session
    pub fn with_connection<R>(
        &self,
        station: AllianceStation,
        id: Uuid,
        f: impl FnOnce(&mut StationConnection) -> R,
    ) -> Option<R> {
        let mut entry = self.entries.get_mut(&station)?;
        match entry.connection.as_mut() {
            Some(connection) if connection.id() == id => Some(f(connection)),
            _ => None,
        }
    }

    /// Hand telemetry to the connection of the team it came from
    pub fn route_telemetry(&self, telemetry: &Telemetry) -> bool {
        if telemetry.team_id == 0 {
            return false;
        }
        for mut entry in self.entries.iter_mut() {
            if let Some(connection) = entry.connection.as_mut() {
                if connection.apply_telemetry(telemetry) {
                    return true;
                }
            }
        }
        false
    }

    /// Apply a status frame to the given session
    pub fn ingest_status_frame(
        &self,
        station: AllianceStation,
        id: Uuid,
        raw: &[u8],
    ) -> Option<Result<(), ProtocolError>> {
        self.with_connection(station, id, |connection| connection.ingest_status_frame(raw))
    }

    pub fn command(&self) -> MatchCommand {
        *self.command.read()
    }

    /// Command every connected robot, honouring per-station overrides
    pub fn command_all(&self, auto: bool, enabled: bool) {
        *self.command.write() = MatchCommand { auto, enabled };
        for mut entry in self.entries.iter_mut() {
            let blocked = entry.flags.blocks_enable();
            let estop = entry.flags.estop;
            if let Some(connection) = entry.connection.as_mut() {
                connection.set_command(auto, enabled && !blocked, estop);
            }
        }
    }

    pub fn reset_missed_packet_baselines(&self) {
        for mut entry in self.entries.iter_mut() {
            if let Some(connection) = entry.connection.as_mut() {
                connection.reset_missed_packet_baseline();
            }
        }
    }

    /// Send one control packet to every connected, assigned station
    ///
    /// Returns the number of packets sent successfully.
    pub fn tick_all(&self, match_number: u16, seconds_remaining: u16) -> usize {
        let command = *self.command.read();
        let mut sent = 0;
        for mut entry in self.entries.iter_mut() {
            if entry.team == 0 {
                continue;
            }
            let flags = entry.flags;
            let Some(connection) = entry.connection.as_mut() else {
                continue;
            };
            connection.set_command(
                command.auto,
                command.enabled && !flags.blocks_enable(),
                flags.estop,
            );
            match connection.tick(match_number, seconds_remaining) {
                Ok(()) => sent += 1,
                Err(e) => tracing::warn!(
                    team = connection.team_id(),
                    station = %connection.station(),
                    "Unable to send driver station packet: {}",
                    e
                ),
            }
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decoder::TELEMETRY_PACKET_LEN;
    use crate::station::connection::tests::loopback_connection;

    fn mapping(pairs: &[(AllianceStation, u16)]) -> BTreeMap<AllianceStation, u16> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_assign_updates_without_removing() {
        let registry = StationRegistry::new();
        registry.assign_teams(&mapping(&[(AllianceStation::R1, 254), (AllianceStation::B1, 1114)]));
        registry.assign_teams(&mapping(&[(AllianceStation::R1, 971)]));

        let teams = registry.team_numbers();
        assert_eq!(teams.get(&AllianceStation::R1), Some(&971));
        assert_eq!(teams.get(&AllianceStation::B1), Some(&1114));
        assert_eq!(registry.station_for_team(1114), Some(AllianceStation::B1));
        assert_eq!(registry.station_for_team(254), None);
    }

    #[test]
    fn test_team_zero_never_matches() {
        let registry = StationRegistry::new();
        registry.assign_teams(&mapping(&[(AllianceStation::R2, 0)]));
        assert_eq!(registry.station_for_team(0), None);
    }

    #[test]
    fn test_reset_then_empty_assign() {
        let registry = StationRegistry::new();
        registry.assign_teams(&mapping(&[(AllianceStation::R1, 254)]));
        registry.estop(AllianceStation::R1);

        registry.reset_all();
        registry.assign_teams(&BTreeMap::new());
        assert!(registry.is_empty());
        assert_eq!(registry.live_connections(), 0);
        assert!(registry.connection_snapshot().is_empty());
    }

    #[test]
    fn test_estop_latch_until_cleared() {
        let registry = StationRegistry::new();
        registry.assign_teams(&mapping(&[(AllianceStation::R1, 254)]));
        registry.estop(AllianceStation::R1);
        registry.command_all(false, true);
        assert!(registry.flags(AllianceStation::R1).estop);

        registry.clear_latched_stops();
        assert!(!registry.flags(AllianceStation::R1).estop);
    }

    #[tokio::test]
    async fn test_attach_requires_assignment() {
        let registry = StationRegistry::new();
        let (conn, _close, _client, _udp) = loopback_connection(254, AllianceStation::R1).await;
        assert!(registry.attach(conn).is_err());

        registry.assign_teams(&mapping(&[(AllianceStation::R1, 254)]));
        let (conn, _close, _client, _udp) = loopback_connection(254, AllianceStation::R1).await;
        assert!(registry.attach(conn).is_ok());
        assert_eq!(registry.live_connections(), 1);
    }

    #[tokio::test]
    async fn test_attach_replaces_previous_connection() {
        let registry = StationRegistry::new();
        registry.assign_teams(&mapping(&[(AllianceStation::R1, 254)]));

        let (first, first_close, _c1, _u1) = loopback_connection(254, AllianceStation::R1).await;
        let first_id = first.id();
        registry.attach(first).unwrap();

        let (second, _second_close, _c2, _u2) = loopback_connection(254, AllianceStation::R1).await;
        let second_id = second.id();
        registry.attach(second).unwrap();

        assert!(first_close.await.is_ok());
        assert_eq!(registry.live_connections(), 1);
        // A stale session cannot detach the new one
        assert!(!registry.detach(AllianceStation::R1, first_id));
        assert!(registry.detach(AllianceStation::R1, second_id));
        assert_eq!(registry.live_connections(), 0);
    }

    #[tokio::test]
    async fn test_tick_all_folds_overrides() {
        let registry = StationRegistry::new();
        registry.assign_teams(&mapping(&[(AllianceStation::R1, 254), (AllianceStation::R2, 1678)]));
        let (r1, _c1, _t1, ds_r1) = loopback_connection(254, AllianceStation::R1).await;
        let (r2, _c2, _t2, ds_r2) = loopback_connection(1678, AllianceStation::R2).await;
        registry.attach(r1).unwrap();
        registry.attach(r2).unwrap();

        registry.command_all(true, true);
        registry.set_bypass(AllianceStation::R2, true);
        assert_eq!(registry.tick_all(3, 10), 2);

        let mut buf = [0u8; 32];
        ds_r1.recv(&mut buf).await.unwrap();
        assert_eq!(buf[3], 0x06);
        ds_r2.recv(&mut buf).await.unwrap();
        assert_eq!(buf[3], 0x02);

        registry.estop(AllianceStation::R1);
        registry.tick_all(3, 9);
        ds_r1.recv(&mut buf).await.unwrap();
        assert_eq!(buf[3], 0x82);
        assert!(registry.flags(AllianceStation::R1).estop);
    }

    #[tokio::test]
    async fn test_astop_blocks_enable_until_released() {
        let registry = StationRegistry::new();
        registry.assign_teams(&mapping(&[(AllianceStation::B1, 2056)]));
        let (conn, _close, _client, ds) = loopback_connection(2056, AllianceStation::B1).await;
        registry.attach(conn).unwrap();

        registry.command_all(true, true);
        registry.set_astop(AllianceStation::B1, true);
        assert!(registry.flags(AllianceStation::B1).astop);
        registry.tick_all(1, 15);

        let mut buf = [0u8; 32];
        ds.recv(&mut buf).await.unwrap();
        assert_eq!(buf[3], 0x02);

        registry.clear_latched_stops();
        assert!(!registry.flags(AllianceStation::B1).astop);
        registry.tick_all(1, 14);
        ds.recv(&mut buf).await.unwrap();
        assert_eq!(buf[3], 0x06);
    }

    #[tokio::test]
    async fn test_reset_all_keeps_match_command() {
        let registry = StationRegistry::new();
        registry.assign_teams(&mapping(&[(AllianceStation::R1, 254)]));
        registry.command_all(true, true);

        registry.reset_all();
        assert_eq!(registry.command(), MatchCommand { auto: true, enabled: true });

        registry.assign_teams(&mapping(&[(AllianceStation::R1, 254)]));
        let (conn, _close, _client, _ds) = loopback_connection(254, AllianceStation::R1).await;
        registry.attach(conn).unwrap();
        let snapshot = registry.connection_snapshot();
        assert!(snapshot[0].auto);
        assert!(snapshot[0].enabled);
    }

    #[test]
    fn test_overrides_ignore_unassigned_station() {
        let registry = StationRegistry::new();
        registry.assign_teams(&mapping(&[(AllianceStation::R1, 254)]));

        registry.estop(AllianceStation::B3);
        registry.set_astop(AllianceStation::B2, true);
        registry.set_bypass(AllianceStation::R3, true);

        assert_eq!(registry.team_numbers().len(), 1);
        assert_eq!(registry.connection_snapshot().len(), 1);
        assert!(!registry.flags(AllianceStation::B3).estop);
    }

    #[tokio::test]
    async fn test_route_telemetry_by_team() {
        let registry = StationRegistry::new();
        registry.assign_teams(&mapping(&[(AllianceStation::B3, 4414)]));
        let (conn, _close, _client, _udp) = loopback_connection(4414, AllianceStation::B3).await;
        registry.attach(conn).unwrap();

        let mut raw = [0u8; TELEMETRY_PACKET_LEN];
        raw[3] = 0x10;
        raw[4..6].copy_from_slice(&4414u16.to_be_bytes());
        let telemetry = crate::codec::decode_telemetry(&raw).unwrap();
        assert!(registry.route_telemetry(&telemetry));

        let snapshot = registry.connection_snapshot();
        assert!(snapshot[0].ds_linked);
        assert!(snapshot[0].radio_linked);

        let stranger = Telemetry { team_id: 9999, ..telemetry };
        assert!(!registry.route_telemetry(&stranger));
        let nobody = Telemetry { team_id: 0, ..telemetry };
        assert!(!registry.route_telemetry(&nobody));
    }

    #[tokio::test]
    async fn test_reassignment_closes_stale_connection() {
        let registry = StationRegistry::new();
        registry.assign_teams(&mapping(&[(AllianceStation::R3, 118)]));
        let (conn, close_rx, _client, _udp) = loopback_connection(118, AllianceStation::R3).await;
        registry.attach(conn).unwrap();

        registry.assign_teams(&mapping(&[(AllianceStation::R3, 148)]));
        assert!(close_rx.await.is_ok());
        assert_eq!(registry.live_connections(), 0);
    }
}

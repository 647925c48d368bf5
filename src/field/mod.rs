//! The field: match clock, station registry and driver station comms
//!
//! [`Field`] is the whole surface the front end talks to. It never hands
//! out sockets; callers get snapshots.

pub mod clock;
pub mod sounds;

pub use clock::{format_timer, MatchController};
pub use sounds::{
    announcer_from_config, LogAnnouncer, PhaseAnnouncer, PlayerAnnouncer, SilentAnnouncer, SoundCue,
};

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::{ConfigError, ConnectionError, MatchError};
use crate::network::{DriverStationComms, MatchInfo};
use crate::protocol::{AllianceStation, FieldStatus};
use crate::station::StationRegistry;

/// One field, set up once per event
pub struct Field {
    registry: Arc<StationRegistry>,
    clock: Arc<MatchController>,
    comms: Option<DriverStationComms>,
    announcer: Arc<dyn PhaseAnnouncer>,
}

impl Field {
    /// Build a field with the announcer described by the config
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Self::new(config, announcer_from_config(&config.sounds))
    }

    /// Build a field; fails on invalid match timing
    ///
    /// Comms are created but not started, see [`Field::start_comms`].
    pub fn new(
        config: &AppConfig,
        announcer: Arc<dyn PhaseAnnouncer>,
    ) -> Result<Self, ConfigError> {
        let timing = config.timing.match_timing()?;
        let registry = Arc::new(StationRegistry::new());
        let clock = Arc::new(MatchController::new(
            timing,
            config.timing.abort_disables_robots,
            registry.clone(),
            announcer.clone(),
        ));

        let comms = if config.network.enabled {
            let match_info: Arc<dyn MatchInfo> = clock.clone();
            Some(DriverStationComms::new(config.network.clone(), registry.clone(), match_info))
        } else {
            tracing::warn!("Driver station communication disabled");
            None
        };

        Ok(Self {
            registry,
            clock,
            comms,
            announcer,
        })
    }

    pub async fn start_comms(&self) -> Result<(), ConnectionError> {
        match &self.comms {
            Some(comms) => comms.start().await,
            None => Ok(()),
        }
    }

    /// Stop comms and any running match
    pub async fn shutdown(&self) {
        let _ = self.clock.abort();
        if let Some(comms) = &self.comms {
            comms.stop().await;
        }
    }

    pub fn start(&self, match_number: u16) -> Result<(), MatchError> {
        self.clock.start(match_number)
    }

    pub fn abort(&self) -> Result<(), MatchError> {
        self.clock.abort()
    }

    pub fn status(&self) -> FieldStatus {
        self.clock.status()
    }

    pub fn assign_teams(&self, mapping: &BTreeMap<AllianceStation, u16>) {
        self.registry.assign_teams(mapping);
    }

    pub fn estop(&self, station: AllianceStation) {
        self.registry.estop(station);
    }

    pub fn set_bypass(&self, station: AllianceStation, bypass: bool) {
        self.registry.set_bypass(station, bypass);
    }

    pub fn set_astop(&self, station: AllianceStation, astop: bool) {
        self.registry.set_astop(station, astop);
    }

    /// Drop every connection and restart the listeners after the cooldown
    pub async fn reset_comms(&self) -> Result<(), ConnectionError> {
        match &self.comms {
            Some(comms) => comms.reset().await,
            None => Ok(()),
        }
    }

    pub fn reset_alliances(&self) {
        self.registry.reset_all();
    }

    pub fn set_match_name(&self, name: impl Into<String>) {
        self.clock.set_match_name(name);
    }

    pub fn test_sounds(&self) {
        self.announcer.test_sounds();
    }

    pub fn registry(&self) -> &Arc<StationRegistry> {
        &self.registry
    }

    pub fn clock(&self) -> &Arc<MatchController> {
        &self.clock
    }

    pub fn comms(&self) -> Option<&DriverStationComms> {
        self.comms.as_ref()
    }
}

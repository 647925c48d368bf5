//! Application configuration
//!
//! Loaded from a TOML file; every section falls back to its defaults so a
//! partial file is valid.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::ConfigError;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub timing: TimingConfig,
    pub ui: UiConfig,
    pub sounds: SoundConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.timing.match_timing()?;
        Ok(config)
    }

    /// Load from the given path, else the platform config file, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::info!("Loading config from {}", path.display());
                Self::load(path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Platform config file location
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "field-fms", "fms")
            .map(|dirs| dirs.config_dir().join("fms.toml"))
    }
}

/// Driver station network settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Start driver station communication at all
    pub enabled: bool,
    /// Field network address the driver stations expect
    pub tcp_bind_address: IpAddr,
    pub tcp_port: u16,
    pub udp_receive_port: u16,
    pub udp_send_port: u16,
    pub tcp_read_timeout_ms: u64,
    pub udp_link_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    pub reject_delay_ms: u64,
    pub reset_cooldown_ms: u64,
    pub control_period_ms: u64,
    /// Compare the DS address against its team number
    pub check_station_ip: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tcp_bind_address: IpAddr::V4(FMS_ADDRESS),
            tcp_port: DS_TCP_LISTEN_PORT,
            udp_receive_port: DS_UDP_RECEIVE_PORT,
            udp_send_port: DS_UDP_SEND_PORT,
            tcp_read_timeout_ms: 5000,
            udp_link_timeout_ms: 1000,
            handshake_timeout_ms: 5000,
            reject_delay_ms: 1000,
            reset_cooldown_ms: 5000,
            control_period_ms: 1000,
            check_station_ip: false,
        }
    }
}

impl NetworkConfig {
    /// Loopback configuration on the given ports, used by tests and demos
    pub fn local(tcp_port: u16, udp_receive_port: u16, udp_send_port: u16) -> Self {
        Self {
            tcp_bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            tcp_port,
            udp_receive_port,
            udp_send_port,
            ..Self::default()
        }
    }

    pub fn tcp_listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.tcp_bind_address, self.tcp_port)
    }

    pub fn udp_listen_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.udp_receive_port)
    }

    pub fn tcp_read_timeout(&self) -> Duration {
        Duration::from_millis(self.tcp_read_timeout_ms)
    }

    pub fn udp_link_timeout(&self) -> Duration {
        Duration::from_millis(self.udp_link_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn reject_delay(&self) -> Duration {
        Duration::from_millis(self.reject_delay_ms)
    }

    pub fn reset_cooldown(&self) -> Duration {
        Duration::from_millis(self.reset_cooldown_ms)
    }

    pub fn control_period(&self) -> Duration {
        Duration::from_millis(self.control_period_ms)
    }
}

/// Match phase durations as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub auto: String,
    pub teleop: String,
    pub endgame: String,
    /// Command every robot disabled when a match is aborted
    pub abort_disables_robots: bool,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            auto: "10s".into(),
            teleop: "2m20s".into(),
            endgame: "30s".into(),
            abort_disables_robots: true,
        }
    }
}

impl TimingConfig {
    /// Parse and validate the phase durations
    pub fn match_timing(&self) -> Result<MatchTiming, ConfigError> {
        let timing = MatchTiming {
            auto: parse_duration("auto", &self.auto)?,
            teleop: parse_duration("teleop", &self.teleop)?,
            endgame: parse_duration("endgame", &self.endgame)?,
        };
        if timing.endgame > timing.teleop {
            return Err(ConfigError::Inconsistent(format!(
                "endgame ({:?}) is longer than teleop ({:?})",
                timing.endgame, timing.teleop
            )));
        }
        Ok(timing)
    }
}

/// Parsed phase durations
///
/// Teleop includes the endgame: endgame starts `teleop - endgame` after
/// teleop starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchTiming {
    pub auto: Duration,
    pub teleop: Duration,
    pub endgame: Duration,
}

impl MatchTiming {
    pub fn new(auto: Duration, teleop: Duration, endgame: Duration) -> Self {
        Self { auto, teleop, endgame }
    }

    /// Teleop time before the endgame begins
    pub fn teleop_before_endgame(&self) -> Duration {
        self.teleop.saturating_sub(self.endgame)
    }
}

impl Default for MatchTiming {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(140), Duration::from_secs(30))
    }
}

/// Front end listen addresses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub admin_address: SocketAddr,
    pub viewer_address: SocketAddr,
    pub static_dir: PathBuf,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            admin_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_ADMIN_PORT),
            viewer_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_VIEWER_PORT),
            static_dir: PathBuf::from("static"),
        }
    }
}

/// Game sound settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    /// External player invoked as `<player> <file>`
    pub player: Option<String>,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("sounds"),
            player: None,
        }
    }
}

/// Parse a duration such as `"10s"`, `"2m20s"`, `"1.5s"` or `"250ms"`
pub fn parse_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    };

    let mut rest = value.trim();
    if rest.is_empty() {
        return Err(invalid());
    }
    if rest == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_nanos = 0f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let number: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "h" => 3600e9,
            "m" => 60e9,
            "s" => 1e9,
            "ms" => 1e6,
            "us" | "µs" => 1e3,
            "ns" => 1.0,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        total_nanos += number * scale;
    }

    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

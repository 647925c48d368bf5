//! HTTP API handlers and operator command dispatch

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::field::Field;
use crate::protocol::{AllianceStation, FieldStatus};

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Get field status
pub async fn get_state(State(field): State<Arc<Field>>) -> Json<ApiResponse<FieldStatus>> {
    Json(ApiResponse::ok(field.status()))
}

/// Operator command, as sent over the admin websocket
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum OperatorCommand {
    Ping,
    Start {
        #[serde(default)]
        match_number: Option<u16>,
    },
    Stop,
    DsReconnect,
    Estop {
        alliance_station: String,
    },
    TestSounds,
    UpdateAlliances {
        alliances: BTreeMap<String, u16>,
    },
    MatchName {
        name: String,
    },
    ResetAlliances,
}

/// Parse a position→team map keyed by station names
pub fn parse_alliances(
    alliances: &BTreeMap<String, u16>,
) -> Result<BTreeMap<AllianceStation, u16>, String> {
    alliances
        .iter()
        .map(|(position, team)| {
            position
                .parse::<AllianceStation>()
                .map(|station| (station, *team))
                .map_err(|e| e.to_string())
        })
        .collect()
}

/// Apply an operator command; `Ping` answers with the field status
pub fn dispatch(
    field: &Arc<Field>,
    command: OperatorCommand,
) -> Result<Option<FieldStatus>, String> {
    match command {
        OperatorCommand::Ping => return Ok(Some(field.status())),
        OperatorCommand::Start { match_number } => {
            tracing::debug!("Starting match");
            field.start(match_number.unwrap_or(1)).map_err(|e| e.to_string())?;
        }
        OperatorCommand::Stop => {
            tracing::debug!("Stopping match");
            field.abort().map_err(|e| e.to_string())?;
        }
        OperatorCommand::DsReconnect => {
            tracing::debug!("Reconnecting to driver stations");
            let field = field.clone();
            tokio::spawn(async move {
                if let Err(e) = field.reset_comms().await {
                    tracing::error!("Driver station comms failed to restart: {}", e);
                }
            });
        }
        OperatorCommand::Estop { alliance_station } => {
            tracing::debug!("Estopping {}", alliance_station);
            let station = alliance_station
                .parse::<AllianceStation>()
                .map_err(|e| e.to_string())?;
            field.estop(station);
        }
        OperatorCommand::TestSounds => {
            tracing::debug!("Playing all sounds");
            field.test_sounds();
        }
        OperatorCommand::UpdateAlliances { alliances } => {
            tracing::debug!("Updating alliances to {:?}", alliances);
            field.assign_teams(&parse_alliances(&alliances)?);
        }
        OperatorCommand::MatchName { name } => {
            tracing::debug!("Updating match name to {}", name);
            field.set_match_name(name);
        }
        OperatorCommand::ResetAlliances => {
            tracing::debug!("Resetting alliances");
            field.reset_alliances();
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::field::SilentAnnouncer;

    fn offline_field() -> Arc<Field> {
        let mut config = AppConfig::default();
        config.network.enabled = false;
        Arc::new(Field::new(&config, Arc::new(SilentAnnouncer)).unwrap())
    }

    #[test]
    fn test_command_parsing() {
        let raw = r#"{"message":"estop","alliance_station":"B2","name":""}"#;
        let cmd: OperatorCommand = serde_json::from_str(raw).unwrap();
        assert_eq!(cmd, OperatorCommand::Estop { alliance_station: "B2".into() });

        let cmd: OperatorCommand = serde_json::from_str(r#"{"message":"start"}"#).unwrap();
        assert_eq!(cmd, OperatorCommand::Start { match_number: None });

        assert!(serde_json::from_str::<OperatorCommand>(r#"{"message":"explode"}"#).is_err());
    }

    #[test]
    fn test_parse_alliances() {
        let raw: BTreeMap<String, u16> = [("R1".to_string(), 254), ("b3".to_string(), 1678)].into();
        let parsed = parse_alliances(&raw).unwrap();
        assert_eq!(parsed.get(&AllianceStation::B3), Some(&1678));

        let bad: BTreeMap<String, u16> = [("R9".to_string(), 1)].into();
        assert!(parse_alliances(&bad).is_err());
    }

    #[tokio::test]
    async fn test_dispatch_updates_field() {
        let field = offline_field();
        let alliances = [("R1".to_string(), 254)].into();
        dispatch(&field, OperatorCommand::UpdateAlliances { alliances }).unwrap();
        dispatch(&field, OperatorCommand::MatchName { name: "Final 1".into() }).unwrap();
        dispatch(&field, OperatorCommand::Estop { alliance_station: "R1".into() }).unwrap();

        let status = dispatch(&field, OperatorCommand::Ping).unwrap().unwrap();
        assert_eq!(status.match_name, "Final 1");
        assert_eq!(status.alliances.get(&AllianceStation::R1), Some(&254));
        assert!(status.stations[0].estop);

        assert!(dispatch(&field, OperatorCommand::Stop).is_err());
        assert!(dispatch(&field, OperatorCommand::Estop { alliance_station: "X".into() }).is_err());
    }
}

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::types::{ActivityName, FanSpeed, Mode, WireEnum};
use crate::{Error, Result};

pub const DEFAULT_APP_ID: &str = "infinity_zones";

pub fn config_path(system_id: &str) -> String {
    format!("/systems/{system_id}/config")
}

pub fn status_path(system_id: &str) -> String {
    format!("/systems/{system_id}/status")
}

pub fn commands_path(system_id: &str) -> String {
    format!("/systems/{system_id}/commands")
}

pub fn command_message(app_id: &str, system_id: &str, data: Value) -> Value {
    json!({
        "MessageType": "Command",
        "SenderID": app_id,
        "MessageID": Uuid::new_v4().to_string(),
        "TargetID": system_id,
        "Data": data
    })
}

pub fn set_mode_data(mode: Mode) -> Value {
    json!({
        "config": { "mode": mode.as_wire_str() }
    })
}

/// `activity: None` clears the hold and resumes the schedule.
pub fn set_zone_hold_data(
    zone_id: u8,
    activity: Option<ActivityName>,
    until: Option<DateTime<Utc>>,
) -> Value {
    json!({
        "zones": [{
            "id": zone_id,
            "hold": activity.is_some(),
            "holdActivity": activity.map(|a| a.as_wire_str()),
            "otmr": until.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        }]
    })
}

pub fn set_zone_temperature_data(
    zone_id: u8,
    activity: ActivityName,
    cooling: f64,
    heating: f64,
) -> Value {
    json!({
        "zones": [{
            "id": zone_id,
            "activities": [{
                "id": activity.as_wire_str(),
                "clsp": cooling,
                "htsp": heating
            }]
        }]
    })
}

pub fn set_zone_fan_data(zone_id: u8, activity: ActivityName, fan: FanSpeed) -> Value {
    json!({
        "zones": [{
            "id": zone_id,
            "activities": [{
                "id": activity.as_wire_str(),
                "fan": fan.as_wire_str()
            }]
        }]
    })
}

/// Acknowledgements are an empty body or a JSON object; an `error` member is a rejection.
pub fn check_command_response(body: &str) -> Result<()> {
    if body.trim().is_empty() {
        return Ok(());
    }
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return Ok(()),
    };
    match parsed.get("error") {
        Some(Value::Null) | None => Ok(()),
        Some(Value::String(msg)) => Err(Error::Protocol(msg.clone())),
        Some(other) => Err(Error::Protocol(other.to_string())),
    }
}

use serde_json::Value;

use crate::types::*;

const CONFIGURATION: &str = include_str!("../tests/fixtures/configuration.json");
const STATUS: &str = include_str!("../tests/fixtures/status.json");

pub(crate) fn config_json(mode: &str) -> Value {
    let mut doc: Value = serde_json::from_str(CONFIGURATION).unwrap();
    doc["mode"] = mode.into();
    doc
}

pub(crate) fn status_json(units: &str) -> Value {
    let mut doc: Value = serde_json::from_str(STATUS).unwrap();
    doc["temperature_units"] = units.into();
    doc
}

/// Two-zone system: zone 1 follows its schedule on Home (heat 68 / cool 76).
pub(crate) fn snapshot(mode: &str, units: &str) -> SystemSnapshot {
    let config: Configuration = serde_json::from_value(config_json(mode)).unwrap();
    let status: Status = serde_json::from_value(status_json(units)).unwrap();
    SystemSnapshot::new("sys-1", config, status)
}

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// An enum carried on the wire as a lowercase string.
pub trait WireEnum: Sized + Copy + 'static {
    /// Name used in unmapped-value errors.
    const KIND: &'static str;

    fn as_wire_str(&self) -> &'static str;
    fn from_wire_str(s: &str) -> Option<Self>;
}

/// System-wide operating mode as stored in the configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Off,
    Cool,
    Heat,
    Auto,
    FanOnly,
}

impl WireEnum for Mode {
    const KIND: &'static str = "mode";

    fn as_wire_str(&self) -> &'static str {
        match self {
            Mode::Off => "off",
            Mode::Cool => "cool",
            Mode::Heat => "heat",
            Mode::Auto => "auto",
            Mode::FanOnly => "fanonly",
        }
    }

    fn from_wire_str(s: &str) -> Option<Self> {
        match s {
            "off" => Some(Mode::Off),
            "cool" => Some(Mode::Cool),
            "heat" => Some(Mode::Heat),
            "auto" => Some(Mode::Auto),
            "fanonly" => Some(Mode::FanOnly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FanSpeed {
    Off,
    Low,
    Med,
    High,
}

impl WireEnum for FanSpeed {
    const KIND: &'static str = "fan speed";

    fn as_wire_str(&self) -> &'static str {
        match self {
            FanSpeed::Off => "off",
            FanSpeed::Low => "low",
            FanSpeed::Med => "med",
            FanSpeed::High => "high",
        }
    }

    fn from_wire_str(s: &str) -> Option<Self> {
        match s {
            "off" => Some(FanSpeed::Off),
            "low" => Some(FanSpeed::Low),
            "med" => Some(FanSpeed::Med),
            "high" => Some(FanSpeed::High),
            _ => None,
        }
    }
}

/// A named operating profile. `Manual` is the synthetic activity used for
/// direct temperature overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActivityName {
    Home,
    Away,
    Sleep,
    Wake,
    Manual,
    Vacation,
}

impl ActivityName {
    pub const ALL: [ActivityName; 6] = [
        ActivityName::Home,
        ActivityName::Away,
        ActivityName::Sleep,
        ActivityName::Wake,
        ActivityName::Manual,
        ActivityName::Vacation,
    ];

    /// Presentation label.
    pub fn label(&self) -> &'static str {
        match self {
            ActivityName::Home => "Home",
            ActivityName::Away => "Away",
            ActivityName::Sleep => "Sleep",
            ActivityName::Wake => "Wake",
            ActivityName::Manual => "Manual",
            ActivityName::Vacation => "Vacation",
        }
    }
}

impl WireEnum for ActivityName {
    const KIND: &'static str = "activity";

    fn as_wire_str(&self) -> &'static str {
        match self {
            ActivityName::Home => "home",
            ActivityName::Away => "away",
            ActivityName::Sleep => "sleep",
            ActivityName::Wake => "wake",
            ActivityName::Manual => "manual",
            ActivityName::Vacation => "vacation",
        }
    }

    fn from_wire_str(s: &str) -> Option<Self> {
        match s {
            "home" => Some(ActivityName::Home),
            "away" => Some(ActivityName::Away),
            "sleep" => Some(ActivityName::Sleep),
            "wake" => Some(ActivityName::Wake),
            "manual" => Some(ActivityName::Manual),
            "vacation" => Some(ActivityName::Vacation),
            _ => None,
        }
    }
}

impl fmt::Display for ActivityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for ActivityName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemperatureUnits {
    Celsius,
    Fahrenheit,
}

impl WireEnum for TemperatureUnits {
    const KIND: &'static str = "temperature units";

    fn as_wire_str(&self) -> &'static str {
        match self {
            TemperatureUnits::Celsius => "C",
            TemperatureUnits::Fahrenheit => "F",
        }
    }

    fn from_wire_str(s: &str) -> Option<Self> {
        match s {
            "C" => Some(TemperatureUnits::Celsius),
            "F" => Some(TemperatureUnits::Fahrenheit),
            _ => None,
        }
    }
}

/// A value as the controller reported it. Unknown strings are kept so that
/// derivation, not the fetch, rejects them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reported<T> {
    Known(T),
    Unknown(String),
}

impl<T: WireEnum> Reported<T> {
    /// The known variant, or an `UnmappedEnum` error.
    pub fn known(&self) -> Result<T> {
        match self {
            Reported::Known(v) => Ok(*v),
            Reported::Unknown(raw) => Err(Error::unmapped(T::KIND, raw.as_str())),
        }
    }

    pub fn as_wire_str(&self) -> &str {
        match self {
            Reported::Known(v) => v.as_wire_str(),
            Reported::Unknown(raw) => raw,
        }
    }

    pub fn is(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        matches!(self, Reported::Known(v) if *v == value)
    }
}

impl<T> From<T> for Reported<T> {
    fn from(value: T) -> Self {
        Reported::Known(value)
    }
}

impl<T: WireEnum> Serialize for Reported<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire_str())
    }
}

impl<'de, T: WireEnum> Deserialize<'de> for Reported<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match T::from_wire_str(&raw) {
            Some(v) => Reported::Known(v),
            None => Reported::Unknown(raw),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityTarget {
    pub activity: Reported<ActivityName>,
    pub target_heating_temperature: f64,
    pub target_cooling_temperature: f64,
    pub fan_speed: Reported<FanSpeed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    #[serde(default)]
    pub activities: Vec<ActivityTarget>,
    #[serde(default)]
    pub hold_activity: Option<Reported<ActivityName>>,
    #[serde(default)]
    pub hold_until: Option<DateTime<Utc>>,
}

impl ZoneConfig {
    pub fn activity(&self, name: ActivityName) -> Option<&ActivityTarget> {
        self.activities.iter().find(|a| a.activity.is(name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub mode: Reported<Mode>,
    #[serde(default)]
    pub zones: BTreeMap<u8, ZoneConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneStatus {
    pub temperature: f64,
    pub relative_humidity: f64,
    pub activity: Reported<ActivityName>,
    pub target_heating_temperature: f64,
    pub target_cooling_temperature: f64,
    pub fan_speed: Reported<FanSpeed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub temperature_units: Reported<TemperatureUnits>,
    pub current_indoor_operation: String,
    pub current_outdoor_operation: String,
    pub outside_temperature: f64,
    pub airflow: f64,
    pub humidifier_active: bool,
    #[serde(default)]
    pub zones: BTreeMap<u8, ZoneStatus>,
}

/// Configuration and status fetched together. Never mutated once published.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemSnapshot {
    pub system_id: String,
    pub config: Configuration,
    pub status: Status,
    pub fetched_at: DateTime<Utc>,
}

impl SystemSnapshot {
    pub fn new(system_id: impl Into<String>, config: Configuration, status: Status) -> Self {
        Self {
            system_id: system_id.into(),
            config,
            status,
            fetched_at: Utc::now(),
        }
    }

    pub fn zone_config(&self, zone_id: u8) -> Result<&ZoneConfig> {
        self.config.zones.get(&zone_id).ok_or(Error::InvalidZone(zone_id))
    }

    pub fn zone_status(&self, zone_id: u8) -> Result<&ZoneStatus> {
        self.status.zones.get(&zone_id).ok_or(Error::InvalidZone(zone_id))
    }

    /// Zones present in the configuration document.
    pub fn zone_ids(&self) -> Vec<u8> {
        self.config.zones.keys().copied().collect()
    }

    /// Earliest timed-hold expiry that is still in the future.
    pub fn next_hold_expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.config
            .zones
            .values()
            .filter_map(|z| z.hold_until)
            .filter(|until| *until > now)
            .min()
    }
}

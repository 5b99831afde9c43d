use serde::Serialize;

use crate::Result;
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

/// Setpoint bounds the controller accepts in a given unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UnitLimits {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl UnitLimits {
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

impl TemperatureUnit {
    pub fn from_units(units: TemperatureUnits) -> Self {
        match units {
            TemperatureUnits::Celsius => TemperatureUnit::Celsius,
            TemperatureUnits::Fahrenheit => TemperatureUnit::Fahrenheit,
        }
    }

    pub fn limits(&self) -> UnitLimits {
        match self {
            TemperatureUnit::Celsius => UnitLimits {
                min: 12.0,
                max: 30.0,
                step: 0.5,
            },
            TemperatureUnit::Fahrenheit => UnitLimits {
                min: 52.0,
                max: 88.0,
                step: 1.0,
            },
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "\u{00b0}C",
            TemperatureUnit::Fahrenheit => "\u{00b0}F",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Off,
    Cool,
    Heat,
    HeatCool,
    FanOnly,
}

impl HvacMode {
    pub const ALL: [HvacMode; 5] = [
        HvacMode::Off,
        HvacMode::Cool,
        HvacMode::Heat,
        HvacMode::HeatCool,
        HvacMode::FanOnly,
    ];

    pub fn from_mode(mode: Mode) -> Self {
        match mode {
            Mode::Off => HvacMode::Off,
            Mode::Cool => HvacMode::Cool,
            Mode::Heat => HvacMode::Heat,
            Mode::Auto => HvacMode::HeatCool,
            Mode::FanOnly => HvacMode::FanOnly,
        }
    }

    pub fn to_mode(self) -> Mode {
        match self {
            HvacMode::Off => Mode::Off,
            HvacMode::Cool => Mode::Cool,
            HvacMode::Heat => Mode::Heat,
            HvacMode::HeatCool => Mode::Auto,
            HvacMode::FanOnly => Mode::FanOnly,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HvacMode::Off => "off",
            HvacMode::Cool => "cool",
            HvacMode::Heat => "heat",
            HvacMode::HeatCool => "heat_cool",
            HvacMode::FanOnly => "fan_only",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FanMode {
    Off,
    Low,
    Medium,
    High,
}

impl FanMode {
    pub const ALL: [FanMode; 4] = [FanMode::Off, FanMode::Low, FanMode::Medium, FanMode::High];

    pub fn from_speed(speed: FanSpeed) -> Self {
        match speed {
            FanSpeed::Off => FanMode::Off,
            FanSpeed::Low => FanMode::Low,
            FanSpeed::Med => FanMode::Medium,
            FanSpeed::High => FanMode::High,
        }
    }

    pub fn to_speed(self) -> FanSpeed {
        match self {
            FanMode::Off => FanSpeed::Off,
            FanMode::Low => FanSpeed::Low,
            FanMode::Medium => FanSpeed::Med,
            FanMode::High => FanSpeed::High,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FanMode::Off => "off",
            FanMode::Low => "low",
            FanMode::Medium => "medium",
            FanMode::High => "high",
        }
    }
}

/// Target temperature(s) meaningful for the current mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Setpoint {
    None,
    Single { target: f64 },
    Range { low: f64, high: f64 },
}

impl Setpoint {
    pub fn for_mode(mode: HvacMode, heating: f64, cooling: f64) -> Self {
        match mode {
            HvacMode::Off | HvacMode::FanOnly => Setpoint::None,
            HvacMode::Cool => Setpoint::Single { target: cooling },
            HvacMode::Heat => Setpoint::Single { target: heating },
            HvacMode::HeatCool => Setpoint::Range {
                low: heating,
                high: cooling,
            },
        }
    }
}

/// A preset as selected by the user. `Schedule` hands the zone back to its program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Schedule,
    Activity(ActivityName),
}

impl Preset {
    pub const SCHEDULE_LABEL: &'static str = "per schedule";

    pub fn label(&self) -> &'static str {
        match self {
            Preset::Schedule => Self::SCHEDULE_LABEL,
            Preset::Activity(a) => a.label(),
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        if label.eq_ignore_ascii_case(Self::SCHEDULE_LABEL) {
            return Some(Preset::Schedule);
        }
        ActivityName::ALL
            .into_iter()
            .find(|a| a.label().eq_ignore_ascii_case(label))
            .map(Preset::Activity)
    }
}

impl From<ActivityName> for Preset {
    fn from(activity: ActivityName) -> Self {
        Preset::Activity(activity)
    }
}

/// Presentation state of one zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneView {
    pub zone_id: u8,
    pub name: String,
    pub hvac_mode: HvacMode,
    pub setpoint: Setpoint,
    pub temperature_unit: TemperatureUnit,
    pub limits: UnitLimits,
    pub current_temperature: f64,
    pub current_humidity: f64,
    pub preset: ActivityName,
    pub fan_mode: FanMode,
    pub hvac_action: String,
}

impl ZoneView {
    pub fn target_temperature(&self) -> Option<f64> {
        match self.setpoint {
            Setpoint::Single { target } => Some(target),
            _ => None,
        }
    }

    pub fn target_temperature_low(&self) -> Option<f64> {
        match self.setpoint {
            Setpoint::Range { low, .. } => Some(low),
            _ => None,
        }
    }

    pub fn target_temperature_high(&self) -> Option<f64> {
        match self.setpoint {
            Setpoint::Range { high, .. } => Some(high),
            _ => None,
        }
    }
}

/// System-level readings with the unit they are reported in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemSensors {
    pub outside_temperature: f64,
    pub temperature_unit: TemperatureUnit,
    pub airflow: f64,
    pub humidifier_active: bool,
}

/// The outdoor unit may be running while the indoor unit reports "off".
pub fn hvac_action(status: &Status) -> &str {
    if status.current_indoor_operation != "off" {
        &status.current_indoor_operation
    } else {
        &status.current_outdoor_operation
    }
}

pub fn derive(snapshot: &SystemSnapshot, zone_id: u8) -> Result<ZoneView> {
    let zone_config = snapshot.zone_config(zone_id)?;
    let zone_status = snapshot.zone_status(zone_id)?;

    let temperature_unit = TemperatureUnit::from_units(snapshot.status.temperature_units.known()?);
    let hvac_mode = HvacMode::from_mode(snapshot.config.mode.known()?);
    let fan_mode = FanMode::from_speed(zone_status.fan_speed.known()?);
    let preset = zone_status.activity.known()?;

    Ok(ZoneView {
        zone_id,
        name: zone_config.name.clone(),
        hvac_mode,
        setpoint: Setpoint::for_mode(
            hvac_mode,
            zone_status.target_heating_temperature,
            zone_status.target_cooling_temperature,
        ),
        temperature_unit,
        limits: temperature_unit.limits(),
        current_temperature: zone_status.temperature,
        current_humidity: zone_status.relative_humidity,
        preset,
        fan_mode,
        hvac_action: hvac_action(&snapshot.status).to_string(),
    })
}

pub fn derive_sensors(snapshot: &SystemSnapshot) -> Result<SystemSensors> {
    let status = &snapshot.status;
    Ok(SystemSensors {
        outside_temperature: status.outside_temperature,
        temperature_unit: TemperatureUnit::from_units(status.temperature_units.known()?),
        airflow: status.airflow,
        humidifier_active: status.humidifier_active,
    })
}

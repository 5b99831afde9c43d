//! Maps zone commands onto the remote hold/temperature/fan/mode writes and the
//! view to show until the next poll confirms them.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::types::*;
use crate::view::{FanMode, HvacMode, Preset, Setpoint, ZoneView};
use crate::{Error, Result};

/// Hold state of a zone, read from its configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldState {
    Scheduled,
    Held(ActivityName),
    /// Reverts to `Scheduled` remotely once `until` passes.
    TimedHold {
        activity: ActivityName,
        until: DateTime<Utc>,
    },
}

impl HoldState {
    pub fn of(zone: &ZoneConfig) -> Result<Self> {
        let Some(activity) = &zone.hold_activity else {
            return Ok(HoldState::Scheduled);
        };
        let activity = activity.known()?;
        Ok(match zone.hold_until {
            Some(until) => HoldState::TimedHold { activity, until },
            None => HoldState::Held(activity),
        })
    }
}

/// Requested target temperature(s). Which fields apply depends on the zone's mode:
/// `target` for cool/heat, `low`/`high` for heat-cool.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TemperatureRequest {
    pub target: Option<f64>,
    pub low: Option<f64>,
    pub high: Option<f64>,
}

impl TemperatureRequest {
    pub fn single(target: f64) -> Self {
        Self {
            target: Some(target),
            ..Default::default()
        }
    }

    pub fn range(low: f64, high: f64) -> Self {
        Self {
            low: Some(low),
            high: Some(high),
            ..Default::default()
        }
    }

    pub fn low(low: f64) -> Self {
        Self {
            low: Some(low),
            ..Default::default()
        }
    }

    pub fn high(high: f64) -> Self {
        Self {
            high: Some(high),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoneCommand {
    SetMode(HvacMode),
    SetPreset(Preset),
    SetTemperature(TemperatureRequest),
    SetFanSpeed(FanMode),
}

/// One remote write, in the order it must be issued.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteWrite {
    SetMode(Mode),
    SetZoneHold {
        zone: u8,
        activity: Option<ActivityName>,
        until: Option<DateTime<Utc>>,
    },
    SetZoneTemperature {
        zone: u8,
        activity: ActivityName,
        cooling: f64,
        heating: f64,
    },
    SetZoneFan {
        zone: u8,
        activity: ActivityName,
        fan: FanSpeed,
    },
}

impl RemoteWrite {
    pub fn action(&self) -> &'static str {
        match self {
            RemoteWrite::SetMode(_) => "set_mode",
            RemoteWrite::SetZoneHold { .. } => "set_zone_hold",
            RemoteWrite::SetZoneTemperature { .. } => "set_zone_temperature",
            RemoteWrite::SetZoneFan { .. } => "set_zone_fan",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandPlan {
    pub writes: Vec<RemoteWrite>,
    /// Applied only after every write succeeded.
    pub optimistic: Option<ZoneView>,
    /// Fetch a fresh snapshot once the writes are acknowledged.
    pub refresh: bool,
}

pub fn plan(
    command: &ZoneCommand,
    view: &ZoneView,
    snapshot: &SystemSnapshot,
) -> Result<CommandPlan> {
    let zone = snapshot.zone_config(view.zone_id)?;
    match *command {
        ZoneCommand::SetPreset(Preset::Schedule) => plan_resume_schedule(view, zone),
        ZoneCommand::SetPreset(Preset::Activity(activity)) => plan_hold(view, zone, activity),
        ZoneCommand::SetTemperature(request) => plan_temperature(view, zone, snapshot, request),
        ZoneCommand::SetMode(mode) => plan_mode(view, zone, snapshot, mode),
        ZoneCommand::SetFanSpeed(fan) => Ok(CommandPlan {
            writes: vec![RemoteWrite::SetZoneFan {
                zone: view.zone_id,
                activity: view.preset,
                fan: fan.to_speed(),
            }],
            optimistic: Some(ZoneView {
                fan_mode: fan,
                ..view.clone()
            }),
            refresh: false,
        }),
    }
}

fn plan_resume_schedule(view: &ZoneView, zone: &ZoneConfig) -> Result<CommandPlan> {
    if let Ok(HoldState::TimedHold { activity, until }) = HoldState::of(zone) {
        debug!(
            zone = view.zone_id,
            %activity,
            %until,
            "resuming schedule while a timed hold is active, deferring to next poll"
        );
    }
    Ok(CommandPlan {
        writes: vec![RemoteWrite::SetZoneHold {
            zone: view.zone_id,
            activity: None,
            until: None,
        }],
        optimistic: None,
        refresh: true,
    })
}

fn plan_hold(view: &ZoneView, zone: &ZoneConfig, activity: ActivityName) -> Result<CommandPlan> {
    let target = zone.activity(activity).ok_or_else(|| {
        Error::InvalidCommand(format!(
            "activity {activity} is not configured for zone {}",
            view.zone_id
        ))
    })?;
    let fan_mode = FanMode::from_speed(target.fan_speed.known()?);

    Ok(CommandPlan {
        writes: vec![RemoteWrite::SetZoneHold {
            zone: view.zone_id,
            activity: Some(activity),
            until: None,
        }],
        optimistic: Some(ZoneView {
            preset: activity,
            setpoint: Setpoint::for_mode(
                view.hvac_mode,
                target.target_heating_temperature,
                target.target_cooling_temperature,
            ),
            fan_mode,
            ..view.clone()
        }),
        refresh: false,
    })
}

fn plan_temperature(
    view: &ZoneView,
    zone: &ZoneConfig,
    snapshot: &SystemSnapshot,
    request: TemperatureRequest,
) -> Result<CommandPlan> {
    let status = snapshot.zone_status(view.zone_id)?;
    let mut cooling = status.target_cooling_temperature;
    let mut heating = status.target_heating_temperature;

    let setpoint = match view.hvac_mode {
        HvacMode::Cool => {
            cooling = within_limits(view, required(request.target, "target temperature")?)?;
            Setpoint::Single { target: cooling }
        }
        HvacMode::Heat => {
            heating = within_limits(view, required(request.target, "target temperature")?)?;
            Setpoint::Single { target: heating }
        }
        HvacMode::HeatCool => {
            if request.low.is_none() && request.high.is_none() {
                return Err(Error::InvalidCommand(
                    "heat/cool mode needs a low or high target".to_string(),
                ));
            }
            if let Some(low) = request.low {
                heating = within_limits(view, low)?;
            }
            if let Some(high) = request.high {
                cooling = within_limits(view, high)?;
            }
            Setpoint::Range {
                low: heating,
                high: cooling,
            }
        }
        HvacMode::Off | HvacMode::FanOnly => {
            return Err(Error::InvalidCommand(format!(
                "no target temperature applies in {} mode",
                view.hvac_mode.label()
            )));
        }
    };

    let mut writes = Vec::with_capacity(2);
    if HoldState::of(zone)? != HoldState::Held(ActivityName::Manual) {
        writes.push(RemoteWrite::SetZoneHold {
            zone: view.zone_id,
            activity: Some(ActivityName::Manual),
            until: None,
        });
    }
    writes.push(RemoteWrite::SetZoneTemperature {
        zone: view.zone_id,
        activity: ActivityName::Manual,
        cooling,
        heating,
    });

    Ok(CommandPlan {
        writes,
        optimistic: Some(ZoneView {
            preset: ActivityName::Manual,
            setpoint,
            ..view.clone()
        }),
        refresh: false,
    })
}

fn plan_mode(
    view: &ZoneView,
    zone: &ZoneConfig,
    snapshot: &SystemSnapshot,
    mode: HvacMode,
) -> Result<CommandPlan> {
    let (heating, cooling) = match zone.activity(view.preset) {
        Some(target) => (
            target.target_heating_temperature,
            target.target_cooling_temperature,
        ),
        None => {
            let status = snapshot.zone_status(view.zone_id)?;
            warn!(
                zone = view.zone_id,
                activity = %view.preset,
                "active activity has no configured targets, using reported setpoints"
            );
            (
                status.target_heating_temperature,
                status.target_cooling_temperature,
            )
        }
    };

    Ok(CommandPlan {
        writes: vec![RemoteWrite::SetMode(mode.to_mode())],
        optimistic: Some(ZoneView {
            hvac_mode: mode,
            setpoint: Setpoint::for_mode(mode, heating, cooling),
            ..view.clone()
        }),
        refresh: false,
    })
}

fn required(value: Option<f64>, what: &str) -> Result<f64> {
    value.ok_or_else(|| Error::InvalidCommand(format!("missing {what}")))
}

// Only requested values are checked; the other half is resent as reported.
fn within_limits(view: &ZoneView, value: f64) -> Result<f64> {
    if view.limits.contains(value) {
        Ok(value)
    } else {
        Err(Error::InvalidCommand(format!(
            "{value}{} outside {}..={}",
            view.temperature_unit.symbol(),
            view.limits.min,
            view.limits.max
        )))
    }
}

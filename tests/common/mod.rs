#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use infinity_zones::{
    ActivityName, Configuration, Error, FanSpeed, Mode, Result, Status, SystemClient,
};
use serde_json::Value;

pub const SYSTEM: &str = "sys-1";

const CONFIGURATION: &str = include_str!("../fixtures/configuration.json");
const STATUS: &str = include_str!("../fixtures/status.json");

/// Two-zone configuration document with the given system mode.
pub fn config_json(mode: &str) -> Value {
    let mut doc: Value = serde_json::from_str(CONFIGURATION).unwrap();
    doc["mode"] = mode.into();
    doc
}

pub fn status_json(units: &str) -> Value {
    let mut doc: Value = serde_json::from_str(STATUS).unwrap();
    doc["temperature_units"] = units.into();
    doc
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
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

/// In-memory controller that serves JSON documents and records writes.
pub struct FakeClient {
    config: Mutex<Value>,
    status: Mutex<Value>,
    calls: Mutex<Vec<Call>>,
    fetches: AtomicUsize,
    fail_fetches: AtomicBool,
    fail_writes: AtomicBool,
    fetch_delay: Mutex<Option<Duration>>,
}

impl FakeClient {
    pub fn new(mode: &str, units: &str) -> Arc<Self> {
        Arc::new(Self {
            config: Mutex::new(config_json(mode)),
            status: Mutex::new(status_json(units)),
            calls: Mutex::new(vec![]),
            fetches: AtomicUsize::new(0),
            fail_fetches: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fetch_delay: Mutex::new(None),
        })
    }

    /// Number of configuration fetches, i.e. snapshots attempted.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    pub fn edit_config(&self, f: impl FnOnce(&mut Value)) {
        f(&mut self.config.lock().unwrap());
    }

    pub fn edit_status(&self, f: impl FnOnce(&mut Value)) {
        f(&mut self.status.lock().unwrap());
    }

    fn record(&self, call: Call) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Protocol("write rejected".to_string()));
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }

    async fn pause(&self) {
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl SystemClient for FakeClient {
    async fn fetch_configuration(&self, _system_id: &str) -> Result<Configuration> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        // The response reflects the document as of the request, not its arrival.
        let doc = self.config.lock().unwrap().clone();
        self.pause().await;
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(Error::Protocol("controller unreachable".to_string()));
        }
        serde_json::from_value(doc).map_err(|e| Error::Protocol(e.to_string()))
    }

    async fn fetch_status(&self, _system_id: &str) -> Result<Status> {
        let doc = self.status.lock().unwrap().clone();
        self.pause().await;
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(Error::Protocol("controller unreachable".to_string()));
        }
        serde_json::from_value(doc).map_err(|e| Error::Protocol(e.to_string()))
    }

    async fn set_mode(&self, _system_id: &str, mode: Mode) -> Result<()> {
        self.record(Call::SetMode(mode))
    }

    async fn set_zone_hold(
        &self,
        _system_id: &str,
        zone: u8,
        activity: Option<ActivityName>,
        until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.record(Call::SetZoneHold {
            zone,
            activity,
            until,
        })
    }

    async fn set_zone_temperature(
        &self,
        _system_id: &str,
        zone: u8,
        activity: ActivityName,
        cooling: f64,
        heating: f64,
    ) -> Result<()> {
        self.record(Call::SetZoneTemperature {
            zone,
            activity,
            cooling,
            heating,
        })
    }

    async fn set_zone_fan(
        &self,
        _system_id: &str,
        zone: u8,
        activity: ActivityName,
        fan: FanSpeed,
    ) -> Result<()> {
        self.record(Call::SetZoneFan {
            zone,
            activity,
            fan,
        })
    }
}

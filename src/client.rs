use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};

use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::{
    DEFAULT_APP_ID, check_command_response, command_message, commands_path, config_path,
    status_path,
};
use crate::types::*;
use crate::{Error, Result};

/// Remote operations the controller exposes for one system.
#[async_trait]
pub trait SystemClient: Send + Sync {
    async fn fetch_configuration(&self, system_id: &str) -> Result<Configuration>;

    async fn fetch_status(&self, system_id: &str) -> Result<Status>;

    async fn set_mode(&self, system_id: &str, mode: Mode) -> Result<()>;

    /// `activity: None` clears the hold.
    async fn set_zone_hold(
        &self,
        system_id: &str,
        zone_id: u8,
        activity: Option<ActivityName>,
        until: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn set_zone_temperature(
        &self,
        system_id: &str,
        zone_id: u8,
        activity: ActivityName,
        cooling: f64,
        heating: f64,
    ) -> Result<()>;

    async fn set_zone_fan(
        &self,
        system_id: &str,
        zone_id: u8,
        activity: ActivityName,
        fan: FanSpeed,
    ) -> Result<()>;
}

pub struct HttpSystemClientBuilder {
    base_url: String,
    app_id: Option<String>,
    timeout: Option<Duration>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl HttpSystemClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            app_id: None,
            timeout: None,
            log_mode: None,
            log_path: None,
        }
    }

    pub fn app_id(mut self, id: impl Into<String>) -> Self {
        self.app_id = Some(id.into());
        self
    }

    /// Per-request timeout. A timed-out fetch counts as a failed fetch.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<HttpSystemClient> {
        let mut http = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            http = http.timeout(timeout);
        }
        let http = http.build()?;

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(MessageLogger::new(mode, &path)?),
            _ => None,
        };

        Ok(HttpSystemClient {
            http,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            app_id: self.app_id.unwrap_or_else(|| DEFAULT_APP_ID.to_string()),
            logger: Mutex::new(logger),
        })
    }
}

/// JSON-over-HTTP implementation of [`SystemClient`].
pub struct HttpSystemClient {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    logger: Mutex<Option<MessageLogger>>,
}

impl HttpSystemClient {
    pub fn builder(base_url: impl Into<String>) -> HttpSystemClientBuilder {
        HttpSystemClientBuilder::new(base_url)
    }

    fn with_logger(&self, f: impl FnOnce(&mut MessageLogger)) {
        let mut guard = self.logger.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(logger) = guard.as_mut() {
            f(logger);
        }
    }

    async fn get_document<T: DeserializeOwned>(&self, path: &str, document: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "fetching {document}");
        self.with_logger(|l| l.log_request("GET", path, None));

        let body: Value = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        self.with_logger(|l| l.log_fetch(path, &body));

        serde_json::from_value(body)
            .map_err(|e| Error::Protocol(format!("malformed {document} document: {e}")))
    }

    async fn publish_command(
        &self,
        system_id: &str,
        action: &str,
        zone: Option<u8>,
        data: Value,
    ) -> Result<()> {
        self.with_logger(|l| l.log_command(action, zone, &data));

        let msg = command_message(&self.app_id, system_id, data);
        let url = format!("{}{}", self.base_url, commands_path(system_id));
        trace!(url = %url, action, "publishing command");
        let body = self
            .http
            .post(&url)
            .json(&msg)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        check_command_response(&body)
    }
}

#[async_trait]
impl SystemClient for HttpSystemClient {
    async fn fetch_configuration(&self, system_id: &str) -> Result<Configuration> {
        self.get_document(&config_path(system_id), "configuration").await
    }

    async fn fetch_status(&self, system_id: &str) -> Result<Status> {
        self.get_document(&status_path(system_id), "status").await
    }

    async fn set_mode(&self, system_id: &str, mode: Mode) -> Result<()> {
        let data = crate::protocol::set_mode_data(mode);
        self.publish_command(system_id, "set_mode", None, data).await
    }

    async fn set_zone_hold(
        &self,
        system_id: &str,
        zone_id: u8,
        activity: Option<ActivityName>,
        until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let data = crate::protocol::set_zone_hold_data(zone_id, activity, until);
        self.publish_command(system_id, "set_zone_hold", Some(zone_id), data)
            .await
    }

    async fn set_zone_temperature(
        &self,
        system_id: &str,
        zone_id: u8,
        activity: ActivityName,
        cooling: f64,
        heating: f64,
    ) -> Result<()> {
        let data = crate::protocol::set_zone_temperature_data(zone_id, activity, cooling, heating);
        self.publish_command(system_id, "set_zone_temperature", Some(zone_id), data)
            .await
    }

    async fn set_zone_fan(
        &self,
        system_id: &str,
        zone_id: u8,
        activity: ActivityName,
        fan: FanSpeed,
    ) -> Result<()> {
        let data = crate::protocol::set_zone_fan_data(zone_id, activity, fan);
        self.publish_command(system_id, "set_zone_fan", Some(zone_id), data)
            .await
    }
}

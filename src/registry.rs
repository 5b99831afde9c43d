use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheHandle, DEFAULT_POLL_INTERVAL};
use crate::client::SystemClient;
use crate::view::{SystemSensors, derive_sensors};
use crate::zone::ClimateZone;
use crate::{Error, Result};

/// Polling caches keyed by system id, all sharing one remote client.
pub struct SystemRegistry {
    client: Arc<dyn SystemClient>,
    interval: Duration,
    refresh_at_hold_expiry: bool,
    caches: BTreeMap<String, CacheHandle>,
}

impl SystemRegistry {
    pub fn new(client: Arc<dyn SystemClient>) -> Self {
        Self {
            client,
            interval: DEFAULT_POLL_INTERVAL,
            refresh_at_hold_expiry: false,
            caches: BTreeMap::new(),
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn refresh_at_hold_expiry(mut self, enabled: bool) -> Self {
        self.refresh_at_hold_expiry = enabled;
        self
    }

    /// Starts polling `system_id` and returns its configured zone ids. Nothing is
    /// registered if the first fetch fails.
    pub async fn add_system(&mut self, system_id: &str) -> Result<Vec<u8>> {
        if let Some(cache) = self.caches.get(system_id) {
            return Ok(cache.get_latest().zone_ids());
        }
        let cache = CacheHandle::builder(self.client.clone(), system_id)
            .interval(self.interval)
            .refresh_at_hold_expiry(self.refresh_at_hold_expiry)
            .start()
            .await?;
        let zones = cache.get_latest().zone_ids();
        debug!(system = system_id, zones = zones.len(), "system registered");
        self.caches.insert(system_id.to_string(), cache);
        Ok(zones)
    }

    /// Stops the system's polling loop and forgets it.
    pub fn remove_system(&mut self, system_id: &str) -> bool {
        match self.caches.remove(system_id) {
            Some(cache) => {
                cache.shutdown();
                true
            }
            None => false,
        }
    }

    pub fn system_ids(&self) -> impl Iterator<Item = &str> {
        self.caches.keys().map(String::as_str)
    }

    pub fn cache(&self, system_id: &str) -> Result<&CacheHandle> {
        self.caches
            .get(system_id)
            .ok_or_else(|| Error::UnknownSystem(system_id.to_string()))
    }

    /// One [`ClimateZone`] per zone in the system's latest configuration.
    pub fn climate_zones(&self, system_id: &str) -> Result<Vec<ClimateZone>> {
        let cache = self.cache(system_id)?;
        cache
            .get_latest()
            .zone_ids()
            .into_iter()
            .map(|zone_id| ClimateZone::attach(cache, zone_id))
            .collect()
    }

    pub fn sensors(&self, system_id: &str) -> Result<SystemSensors> {
        derive_sensors(&self.cache(system_id)?.get_latest())
    }
}

impl Drop for SystemRegistry {
    fn drop(&mut self) {
        for cache in self.caches.values() {
            cache.shutdown();
        }
    }
}

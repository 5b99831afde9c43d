use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::cache::CacheHandle;
use crate::client::SystemClient;
use crate::diff::changed_paths;
use crate::translate::{RemoteWrite, TemperatureRequest, ZoneCommand, plan};
use crate::types::{ActivityName, SystemSnapshot};
use crate::view::{FanMode, HvacMode, Preset, ZoneView, derive};
use crate::{Error, Result};

/// One climate zone bound to its system's polling cache.
///
/// The view is recomputed from every new snapshot and replaced optimistically
/// after a successful command, until the next snapshot overwrites it.
pub struct ClimateZone {
    cache: CacheHandle,
    zone_id: u8,
    updates: watch::Receiver<Arc<SystemSnapshot>>,
    snapshot: Arc<SystemSnapshot>,
    view: ZoneView,
}

impl ClimateZone {
    pub fn attach(cache: &CacheHandle, zone_id: u8) -> Result<Self> {
        let mut updates = cache.subscribe();
        let snapshot = updates.borrow_and_update().clone();
        let view = derive(&snapshot, zone_id)?;
        Ok(Self {
            cache: cache.clone(),
            zone_id,
            updates,
            snapshot,
            view,
        })
    }

    pub fn zone_id(&self) -> u8 {
        self.zone_id
    }

    pub fn name(&self) -> &str {
        &self.view.name
    }

    pub fn view(&self) -> &ZoneView {
        &self.view
    }

    /// Snapshot the current view was last derived from.
    pub fn snapshot(&self) -> &Arc<SystemSnapshot> {
        &self.snapshot
    }

    pub fn hvac_modes(&self) -> &'static [HvacMode] {
        &HvacMode::ALL
    }

    pub fn fan_modes(&self) -> &'static [FanMode] {
        &FanMode::ALL
    }

    pub fn preset_modes(&self) -> Vec<Preset> {
        std::iter::once(Preset::Schedule)
            .chain(ActivityName::ALL.into_iter().map(Preset::Activity))
            .collect()
    }

    /// Re-derives the view if a newer snapshot was published. Returns whether it did.
    pub fn sync(&mut self) -> Result<bool> {
        if !self.updates.has_changed().map_err(|_| Error::Stopped)? {
            return Ok(false);
        }
        let snapshot = self.updates.borrow_and_update().clone();
        self.apply(snapshot)?;
        Ok(true)
    }

    /// Waits for the next snapshot and re-derives the view from it.
    pub async fn changed(&mut self) -> Result<&ZoneView> {
        tokio::select! {
            result = self.updates.changed() => result.map_err(|_| Error::Stopped)?,
            _ = self.cache.stopped() => return Err(Error::Stopped),
        }
        let snapshot = self.updates.borrow_and_update().clone();
        self.apply(snapshot)?;
        Ok(&self.view)
    }

    pub async fn set_mode(&mut self, mode: HvacMode) -> Result<()> {
        self.execute(ZoneCommand::SetMode(mode)).await
    }

    pub async fn set_preset(&mut self, preset: Preset) -> Result<()> {
        self.execute(ZoneCommand::SetPreset(preset)).await
    }

    pub async fn set_temperature(&mut self, request: TemperatureRequest) -> Result<()> {
        self.execute(ZoneCommand::SetTemperature(request)).await
    }

    pub async fn set_fan_mode(&mut self, fan: FanMode) -> Result<()> {
        self.execute(ZoneCommand::SetFanSpeed(fan)).await
    }

    /// Issues the command's writes in order. The optimistic view is applied only
    /// if all of them succeed. A requested refresh always uses a fetch started
    /// after the writes.
    pub async fn execute(&mut self, command: ZoneCommand) -> Result<()> {
        self.sync()?;
        let plan = plan(&command, &self.view, &self.snapshot)?;
        debug!(zone = self.zone_id, ?command, writes = plan.writes.len(), "executing command");

        let client = self.cache.client();
        for write in &plan.writes {
            send(client.as_ref(), self.cache.system_id(), write)
                .await
                .map_err(|e| Error::command(write.action(), e))?;
        }

        if let Some(view) = plan.optimistic {
            self.replace_view(view);
        }

        if plan.refresh {
            match self.cache.force_refresh_since_now().await {
                Ok(_) => {
                    let snapshot = self.updates.borrow_and_update().clone();
                    self.apply(snapshot)?;
                }
                Err(e) => {
                    warn!(zone = self.zone_id, "refresh after command failed: {e}");
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, snapshot: Arc<SystemSnapshot>) -> Result<()> {
        let view = derive(&snapshot, self.zone_id)?;
        self.snapshot = snapshot;
        self.replace_view(view);
        Ok(())
    }

    fn replace_view(&mut self, view: ZoneView) {
        let changed = changed_paths(&self.view, &view);
        if !changed.is_empty() {
            trace!(zone = self.zone_id, paths = ?changed, "zone view changed");
        }
        self.view = view;
    }
}

async fn send(client: &dyn SystemClient, system_id: &str, write: &RemoteWrite) -> Result<()> {
    match *write {
        RemoteWrite::SetMode(mode) => client.set_mode(system_id, mode).await,
        RemoteWrite::SetZoneHold {
            zone,
            activity,
            until,
        } => client.set_zone_hold(system_id, zone, activity, until).await,
        RemoteWrite::SetZoneTemperature {
            zone,
            activity,
            cooling,
            heating,
        } => {
            client
                .set_zone_temperature(system_id, zone, activity, cooling, heating)
                .await
        }
        RemoteWrite::SetZoneFan {
            zone,
            activity,
            fan,
        } => client.set_zone_fan(system_id, zone, activity, fan).await,
    }
}

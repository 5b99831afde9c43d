//! One polling loop per system. Every fetch produces a fresh [`SystemSnapshot`]
//! that is fanned out to all subscribers of that system.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, trace, warn};

use crate::client::SystemClient;
use crate::diff::changed_paths;
use crate::types::SystemSnapshot;
use crate::{Error, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Delay after a timed hold's expiry before fetching, so the remote has reverted.
const HOLD_EXPIRY_GRACE: Duration = Duration::from_secs(5);

type SnapshotCallback = Box<dyn Fn(&SystemSnapshot) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum CacheHealth {
    Fresh,
    /// The latest snapshot predates `failures` consecutive failed fetches.
    Stale {
        since: DateTime<Utc>,
        failures: u32,
        last_error: String,
    },
}

pub struct CacheBuilder {
    client: Arc<dyn SystemClient>,
    system_id: String,
    interval: Duration,
    snapshot_callbacks: Vec<SnapshotCallback>,
    refresh_at_hold_expiry: bool,
}

impl CacheBuilder {
    pub fn new(client: Arc<dyn SystemClient>, system_id: impl Into<String>) -> Self {
        Self {
            client,
            system_id: system_id.into(),
            interval: DEFAULT_POLL_INTERVAL,
            snapshot_callbacks: Vec::new(),
            refresh_at_hold_expiry: false,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn on_snapshot(mut self, f: impl Fn(&SystemSnapshot) + Send + Sync + 'static) -> Self {
        self.snapshot_callbacks.push(Box::new(f));
        self
    }

    /// Also fetch shortly after the earliest timed hold in the latest snapshot expires.
    pub fn refresh_at_hold_expiry(mut self, enabled: bool) -> Self {
        self.refresh_at_hold_expiry = enabled;
        self
    }

    /// Fetches the first snapshot, then spawns the polling loop.
    /// Fails without spawning anything if the first fetch fails.
    pub async fn start(self) -> Result<CacheHandle> {
        debug!(system = %self.system_id, interval = ?self.interval, "starting polling cache");
        let first = fetch_snapshot(self.client.as_ref(), &self.system_id)
            .await
            .map_err(|e| fetch_error(&self.system_id, &e))?;
        let first = Arc::new(first);
        for cb in &self.snapshot_callbacks {
            cb(&first);
        }

        let (snapshots, _) = watch::channel(first);
        let inner = Arc::new(Inner {
            system_id: self.system_id,
            client: self.client,
            snapshots,
            fetch_guard: tokio::sync::Mutex::new(()),
            started_fetches: AtomicU64::new(0),
            finished_fetches: AtomicU64::new(0),
            health: Mutex::new(CacheHealth::Fresh),
            snapshot_callbacks: self.snapshot_callbacks,
            cancel: CancellationToken::new(),
        });

        tokio::spawn(run(
            Arc::downgrade(&inner),
            inner.cancel.clone(),
            self.interval,
            self.refresh_at_hold_expiry,
        ));

        Ok(CacheHandle { inner })
    }
}

struct Inner {
    system_id: String,
    client: Arc<dyn SystemClient>,
    snapshots: watch::Sender<Arc<SystemSnapshot>>,
    fetch_guard: tokio::sync::Mutex<()>,
    /// Generation of the most recently started fetch. Only bumped under `fetch_guard`.
    started_fetches: AtomicU64,
    /// Generation of the most recently finished fetch.
    finished_fetches: AtomicU64,
    health: Mutex<CacheHealth>,
    snapshot_callbacks: Vec<SnapshotCallback>,
    cancel: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Inner {
    fn latest(&self) -> Arc<SystemSnapshot> {
        self.snapshots.borrow().clone()
    }

    fn health(&self) -> CacheHealth {
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the outcome of the last finished fetch if its generation is above
    /// `after`. Otherwise fetches.
    async fn refresh(&self, after: u64) -> Result<Arc<SystemSnapshot>> {
        if self.cancel.is_cancelled() {
            return Err(Error::Stopped);
        }
        let _guard = self.fetch_guard.lock().await;
        if self.cancel.is_cancelled() {
            return Err(Error::Stopped);
        }
        if self.finished_fetches.load(Ordering::Acquire) > after {
            trace!(system = %self.system_id, after, "joined in-flight fetch");
            return self.last_outcome();
        }

        let generation = self.started_fetches.fetch_add(1, Ordering::AcqRel) + 1;
        let result = fetch_snapshot(self.client.as_ref(), &self.system_id).await;
        self.finished_fetches.store(generation, Ordering::Release);

        if self.cancel.is_cancelled() {
            debug!(system = %self.system_id, "discarding fetch completed after teardown");
            return Err(Error::Stopped);
        }

        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.publish(snapshot.clone());
                Ok(snapshot)
            }
            Err(e) => {
                self.record_failure(&e);
                Err(fetch_error(&self.system_id, &e))
            }
        }
    }

    fn last_outcome(&self) -> Result<Arc<SystemSnapshot>> {
        match self.health() {
            CacheHealth::Fresh => Ok(self.latest()),
            CacheHealth::Stale { last_error, .. } => Err(Error::Fetch {
                system: self.system_id.clone(),
                reason: last_error,
            }),
        }
    }

    fn publish(&self, snapshot: Arc<SystemSnapshot>) {
        {
            let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
            if let CacheHealth::Stale { failures, .. } = &*health {
                debug!(system = %self.system_id, failures, "fetch recovered");
            }
            *health = CacheHealth::Fresh;
        }

        if tracing::enabled!(Level::DEBUG) {
            let previous = self.latest();
            let changed = changed_paths(
                &(&previous.config, &previous.status),
                &(&snapshot.config, &snapshot.status),
            );
            debug!(system = %self.system_id, changes = changed.len(), "publishing snapshot");
            trace!(system = %self.system_id, paths = ?changed, "snapshot changes");
        }

        self.snapshots.send_replace(snapshot.clone());
        for cb in &self.snapshot_callbacks {
            cb(&snapshot);
        }
    }

    fn record_failure(&self, error: &Error) {
        let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
        let failures = match &*health {
            CacheHealth::Fresh => 1,
            CacheHealth::Stale { failures, .. } => failures + 1,
        };
        let since = match &*health {
            CacheHealth::Stale { since, .. } => *since,
            CacheHealth::Fresh => Utc::now(),
        };
        warn!(system = %self.system_id, failures, "fetch failed, keeping last snapshot: {error}");
        *health = CacheHealth::Stale {
            since,
            failures,
            last_error: error.to_string(),
        };
    }
}

/// Shared handle to one system's polling cache. Cloning shares the cache;
/// the polling loop stops once [`CacheHandle::shutdown`] is called or every
/// handle is dropped.
#[derive(Clone)]
pub struct CacheHandle {
    inner: Arc<Inner>,
}

impl CacheHandle {
    pub fn builder(client: Arc<dyn SystemClient>, system_id: impl Into<String>) -> CacheBuilder {
        CacheBuilder::new(client, system_id)
    }

    /// Starts a cache with the default interval.
    pub async fn start(
        client: Arc<dyn SystemClient>,
        system_id: impl Into<String>,
    ) -> Result<Self> {
        CacheBuilder::new(client, system_id).start().await
    }

    pub fn system_id(&self) -> &str {
        &self.inner.system_id
    }

    pub fn client(&self) -> Arc<dyn SystemClient> {
        self.inner.client.clone()
    }

    /// Most recent successful snapshot. Never waits on a fetch.
    pub fn get_latest(&self) -> Arc<SystemSnapshot> {
        self.inner.latest()
    }

    /// Fetches now, or waits for the fetch already in flight.
    pub async fn force_refresh(&self) -> Result<Arc<SystemSnapshot>> {
        let finished = self.inner.finished_fetches.load(Ordering::Acquire);
        self.inner.refresh(finished).await
    }

    /// Like [`force_refresh`](Self::force_refresh), but only accepts a fetch that
    /// started after this call. A fetch already in flight is waited out and
    /// followed by a new one, so writes made just before are observed.
    pub async fn force_refresh_since_now(&self) -> Result<Arc<SystemSnapshot>> {
        let started = self.inner.started_fetches.load(Ordering::Acquire);
        self.inner.refresh(started).await
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<SystemSnapshot>> {
        self.inner.snapshots.subscribe()
    }

    pub fn health(&self) -> CacheHealth {
        self.inner.health()
    }

    pub fn is_stale(&self) -> bool {
        matches!(self.health(), CacheHealth::Stale { .. })
    }

    pub fn shutdown(&self) {
        debug!(system = %self.inner.system_id, "shutting down polling cache");
        self.inner.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Completes once the cache has been shut down.
    pub async fn stopped(&self) {
        self.inner.cancel.cancelled().await
    }
}

async fn fetch_snapshot(client: &dyn SystemClient, system_id: &str) -> Result<SystemSnapshot> {
    let (config, status) = tokio::try_join!(
        client.fetch_configuration(system_id),
        client.fetch_status(system_id)
    )?;
    Ok(SystemSnapshot::new(system_id, config, status))
}

fn fetch_error(system_id: &str, error: &Error) -> Error {
    let reason = match error {
        Error::Fetch { reason, .. } => reason.clone(),
        other => other.to_string(),
    };
    Error::Fetch {
        system: system_id.to_string(),
        reason,
    }
}

async fn run(
    inner: Weak<Inner>,
    cancel: CancellationToken,
    interval: Duration,
    refresh_at_hold_expiry: bool,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let hold_deadline = match inner.upgrade() {
            Some(inner) if refresh_at_hold_expiry => hold_expiry_deadline(&inner.latest()),
            Some(_) => None,
            None => break,
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            _ = sleep_until(hold_deadline) => {
                debug!("timed hold expired, refreshing");
                ticker.reset();
            }
        }

        let Some(inner) = inner.upgrade() else { break };
        let finished = inner.finished_fetches.load(Ordering::Acquire);
        match inner.refresh(finished).await {
            Ok(_) | Err(Error::Fetch { .. }) => {}
            Err(Error::Stopped) => break,
            Err(e) => warn!(system = %inner.system_id, "poll failed: {e}"),
        }
    }
    trace!("polling loop exited");
}

fn hold_expiry_deadline(snapshot: &SystemSnapshot) -> Option<Instant> {
    let now = Utc::now();
    let until = snapshot.next_hold_expiry(now)?;
    let wait = (until - now).to_std().ok()? + HOLD_EXPIRY_GRACE;
    Some(Instant::now() + wait)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

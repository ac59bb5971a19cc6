use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use warden_core::engine::SnapshotReader;
use warden_core::permission::Permission;
use warden_core::resource::Resource;
use warden_core::snapshot::AuthSnapshot;
use warden_storage::{PermissionStore, StorageError};

use crate::metrics::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A newer snapshot was installed at this generation.
    Swapped { generation: u64, version: u64 },
    /// The store has not advanced past the cached version.
    Unchanged { version: u64 },
}

/// Per-node view of the permission store. Readers load the current snapshot
/// without locking; a background task replaces it on every tick.
pub struct PermissionCache<S: PermissionStore> {
    store: Arc<S>,
    current: ArcSwapOption<AuthSnapshot>,
    refresh_lock: Mutex<()>,
    metrics: Option<Arc<Metrics>>,
}

impl<S: PermissionStore + 'static> PermissionCache<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            current: ArcSwapOption::empty(),
            refresh_lock: Mutex::new(()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn is_populated(&self) -> bool {
        self.current.load().is_some()
    }

    /// Hierarchy lookup against the current snapshot. False while empty.
    pub fn query(&self, role: &str, resource: &Resource, permission: Permission) -> bool {
        self.current
            .load_full()
            .is_some_and(|snapshot| snapshot.query(role, resource, permission))
    }

    /// Loads one snapshot from the store and installs it if it is newer than
    /// the cached one. Refreshes are serialized so the view never regresses.
    pub async fn refresh_once(&self) -> Result<RefreshOutcome, StorageError> {
        let _guard = self.refresh_lock.lock().await;

        let fetched = self.store.load_snapshot().await?;
        let cached = self.current.load_full();

        if let Some(cached) = &cached
            && fetched.version() <= cached.version()
        {
            return Ok(RefreshOutcome::Unchanged {
                version: cached.version(),
            });
        }

        let generation = cached.map_or(0, |c| c.generation() + 1);
        let version = fetched.version();
        self.current
            .store(Some(Arc::new(fetched.with_generation(generation))));

        if let Some(metrics) = &self.metrics {
            metrics.record_refresh(generation, version);
        }
        tracing::debug!(generation, version, "permission snapshot installed");

        Ok(RefreshOutcome::Swapped {
            generation,
            version,
        })
    }

    /// Like `refresh_once`, but failures are logged and counted instead of
    /// returned. The previous snapshot stays in place.
    pub async fn refresh(&self) {
        if let Err(e) = self.refresh_once().await {
            if let Some(metrics) = &self.metrics {
                metrics.record_refresh_failure();
            }
            tracing::warn!(error = %e, "permission cache refresh failed");
        }
    }

    /// Ticks every `interval` until the returned handle is aborted.
    pub fn spawn_refresh_task(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.refresh().await;
            }
        })
    }
}

impl<S: PermissionStore> SnapshotReader for PermissionCache<S> {
    fn current(&self) -> Option<Arc<AuthSnapshot>> {
        self.current.load_full()
    }
}

// ABOUTME: Multi-tenant bot supervisor: start, stop, restart, bulk shutdown, and status.
// ABOUTME: Guarantees at most one live worker per tenant and releases each session once.

mod registry;
mod shutdown;
mod status;
mod worker;

pub use registry::{Handle, Registry};
pub use shutdown::{terminate, Termination};
pub use status::{
    FleetStats, RestartOutcome, StartOutcome, StopOutcome, TenantStatus, WorkerState,
    WorkerSummary,
};
pub use worker::{Launch, Session, WorkerFactory};

use crate::config::{TenantConfig, TenantId};
use crate::error::StoreError;
use crate::store::ConfigStore;
use futures::future::join_all;
use futures::FutureExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use worker::SessionSlot;

/// Timing knobs for the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    /// How long a worker gets to honour its stop signal before it is aborted.
    #[serde(with = "duration_secs", rename = "stop_timeout_secs")]
    pub stop_timeout: Duration,
    /// Pause between stopping and starting during a restart.
    #[serde(with = "duration_millis", rename = "settle_interval_ms")]
    pub settle_interval: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(10),
            settle_interval: Duration::from_millis(500),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Outcome of the boot-time auto start.
#[derive(Debug, Clone, Default)]
pub struct BootReport {
    pub outcomes: Vec<(TenantId, StartOutcome)>,
}

impl BootReport {
    pub fn started(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == StartOutcome::Started)
            .count()
    }
}

/// Owns the registry and drives worker lifecycles for every tenant.
///
/// Operations on different tenants run independently. Operations on the same
/// tenant are serialised by a per-tenant lock.
pub struct Supervisor<F: WorkerFactory> {
    factory: F,
    registry: Arc<Registry>,
    settings: SupervisorSettings,
    tenant_locks: Arc<TenantLocks>,
}

type TenantLocks = Mutex<HashMap<TenantId, Arc<tokio::sync::Mutex<()>>>>;

impl<F: WorkerFactory> Supervisor<F> {
    pub fn new(factory: F, settings: SupervisorSettings) -> Self {
        Self::with_registry(factory, settings, Arc::new(Registry::new()))
    }

    pub fn with_registry(factory: F, settings: SupervisorSettings, registry: Arc<Registry>) -> Self {
        Self {
            factory,
            registry,
            settings,
            tenant_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Start every enabled tenant from the store, concurrently.
    ///
    /// Returns once every start has been issued; workers may still be
    /// connecting.
    pub async fn boot(&self, store: &dyn ConfigStore) -> Result<BootReport, StoreError> {
        let configs = store.list_enabled().await?;
        info!(count = configs.len(), "Starting enabled bots");

        let outcomes = join_all(configs.into_iter().map(|config| async move {
            let tenant_id = config.tenant_id.clone();
            let outcome = self.start(config).await;
            (tenant_id, outcome)
        }))
        .await;

        let report = BootReport { outcomes };
        info!(started = report.started(), "Boot-time start issued");
        Ok(report)
    }

    /// Start a worker for `config` unless one is already running.
    pub async fn start(&self, config: TenantConfig) -> StartOutcome {
        if config.usable_token().is_none() {
            warn!(tenant_id = %config.tenant_id, "No bot token configured, not starting");
            return StartOutcome::NoToken;
        }

        let _guard = self.lock_tenant(&config.tenant_id).await;
        self.start_locked(config).await
    }

    /// Stop a tenant's worker, escalating to abort after the stop timeout.
    pub async fn stop(&self, tenant_id: &TenantId) -> StopOutcome {
        let _guard = self.lock_tenant(tenant_id).await;
        self.stop_locked(tenant_id).await
    }

    /// Stop the tenant's worker, wait the settle interval, then start it
    /// again if the new config is enabled.
    pub async fn restart(&self, config: TenantConfig) -> RestartOutcome {
        let tenant_id = config.tenant_id.clone();
        info!(tenant_id = %tenant_id, "Restarting bot");

        let _guard = self.lock_tenant(&tenant_id).await;

        let stopped = self.stop_locked(&tenant_id).await;
        debug!(tenant_id = %tenant_id, outcome = %stopped, "Stop phase of restart finished");

        tokio::time::sleep(self.settings.settle_interval).await;

        if !config.is_enabled {
            info!(tenant_id = %tenant_id, "Bot is disabled, leaving it stopped");
            return RestartOutcome::StoppedDisabled;
        }

        let outcome = if config.usable_token().is_none() {
            warn!(tenant_id = %tenant_id, "No bot token configured, not starting");
            StartOutcome::NoToken
        } else {
            self.start_locked(config).await
        };
        info!(tenant_id = %tenant_id, outcome = %outcome, "Restart finished");
        outcome.into()
    }

    /// Stop every registered worker concurrently.
    ///
    /// One tenant's failure is logged and does not hold up the others.
    pub async fn stop_all(&self) {
        let tenant_ids: Vec<TenantId> = self
            .registry
            .snapshot()
            .iter()
            .map(|handle| handle.tenant_id().clone())
            .collect();

        if tenant_ids.is_empty() {
            info!("No bots to stop");
            return;
        }
        info!(count = tenant_ids.len(), "Stopping all bots");

        let results = join_all(tenant_ids.iter().map(|tenant_id| {
            AssertUnwindSafe(self.stop(tenant_id)).catch_unwind()
        }))
        .await;

        for (tenant_id, result) in tenant_ids.iter().zip(results) {
            match result {
                Ok(outcome) => info!(tenant_id = %tenant_id, outcome = %outcome, "Bot stopped"),
                Err(_) => error!(tenant_id = %tenant_id, "Stopping bot panicked"),
            }
        }

        info!("All bots stopped");
    }

    /// Running/stopped partition of every registered worker. Never reaps.
    pub fn get_stats(&self) -> FleetStats {
        let mut stats = FleetStats::default();
        for handle in self.registry.snapshot() {
            let summary = WorkerSummary {
                tenant_id: handle.tenant_id().clone(),
                name: handle.config().display_name.clone(),
                started_at: handle.started_at(),
            };
            if handle.is_finished() {
                stats.stopped.push(summary);
            } else {
                stats.running.push(summary);
            }
        }
        stats.running_count = stats.running.len();
        stats.stopped_count = stats.stopped.len();
        stats.total = stats.running_count + stats.stopped_count;
        stats
    }

    /// Status of one tenant's worker. Never reaps.
    pub fn get_status(&self, tenant_id: &TenantId) -> TenantStatus {
        match self.registry.lookup(tenant_id) {
            None => TenantStatus {
                tenant_id: tenant_id.clone(),
                status: WorkerState::NotFound,
                name: None,
            },
            Some(handle) => TenantStatus {
                tenant_id: tenant_id.clone(),
                status: if handle.is_finished() {
                    WorkerState::Stopped
                } else {
                    WorkerState::Running
                },
                name: Some(handle.config().display_name.clone()),
            },
        }
    }

    async fn start_locked(&self, config: TenantConfig) -> StartOutcome {
        let tenant_id = config.tenant_id.clone();

        if let Some(existing) = self.registry.lookup(&tenant_id) {
            if !existing.is_finished() {
                info!(tenant_id = %tenant_id, "Bot already running");
                return StartOutcome::AlreadyRunning;
            }
            debug!(tenant_id = %tenant_id, "Reaping finished worker before start");
            self.reap(&existing).await;
        }

        info!(tenant_id = %tenant_id, name = %config.display_name, "Starting bot");

        let config = Arc::new(config);
        let stop = CancellationToken::new();
        let launched = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.factory.launch(config.clone(), stop.clone())
        }));
        let launch = match launched {
            Ok(Ok(launch)) => launch,
            Ok(Err(e)) => {
                error!(tenant_id = %tenant_id, error = %e, "Failed to launch bot");
                return StartOutcome::LaunchFailed;
            }
            Err(_) => {
                error!(tenant_id = %tenant_id, "Worker factory panicked");
                return StartOutcome::LaunchFailed;
            }
        };

        let task = tokio::spawn(run_worker(tenant_id.clone(), launch.worker));
        let session = SessionSlot::new(tenant_id.clone(), launch.session);
        let handle = Arc::new(Handle::new(config, stop, session, task));

        match self.registry.register(handle.clone()) {
            Ok(replaced) => {
                if let Some(replaced) = replaced {
                    replaced.release_session().await;
                }
                info!(tenant_id = %tenant_id, "Bot started");
                StartOutcome::Started
            }
            Err(e) => {
                // Only reachable if the registry is shared with something
                // outside this supervisor's tenant locks.
                warn!(tenant_id = %tenant_id, error = %e, "Discarding duplicate worker");
                if let Some(mut task) = handle.take_task() {
                    terminate(&mut task, handle.stop_token(), self.settings.stop_timeout).await;
                }
                handle.release_session().await;
                StartOutcome::AlreadyRunning
            }
        }
    }

    async fn stop_locked(&self, tenant_id: &TenantId) -> StopOutcome {
        let Some(handle) = self.registry.lookup(tenant_id) else {
            debug!(tenant_id = %tenant_id, "No bot registered");
            return StopOutcome::NotFound;
        };

        if handle.is_finished() {
            info!(tenant_id = %tenant_id, "Bot already stopped, reaping");
            self.reap(&handle).await;
            return StopOutcome::AlreadyStopped;
        }

        info!(tenant_id = %tenant_id, "Stopping bot");
        let mut cleanup =
            CleanupGuard::new(self.registry.clone(), handle.clone(), handle.take_task());

        if let Some(task) = cleanup.task.as_mut() {
            let termination =
                terminate(task, handle.stop_token(), self.settings.stop_timeout).await;
            cleanup.task = None;
            match termination {
                Termination::Forced => {
                    warn!(tenant_id = %tenant_id, "Bot did not stop in time and was aborted")
                }
                other => debug!(tenant_id = %tenant_id, termination = ?other, "Bot task ended"),
            }
        }

        handle.release_session().await;
        cleanup.disarm();
        self.registry.remove_handle(&handle);
        info!(tenant_id = %tenant_id, "Bot stopped and removed");
        StopOutcome::Stopped
    }

    /// Release a finished handle's session and drop it from the registry.
    async fn reap(&self, handle: &Arc<Handle>) {
        handle.release_session().await;
        self.registry.remove_handle(handle);
    }

    async fn lock_tenant(&self, tenant_id: &TenantId) -> TenantGuard {
        let lock = {
            let mut locks = self
                .tenant_locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks
                .entry(tenant_id.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        TenantGuard {
            locks: self.tenant_locks.clone(),
            tenant_id: tenant_id.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }
}

/// Holds one tenant's lock. Drops the map entry once nobody else wants it.
struct TenantGuard {
    locks: Arc<TenantLocks>,
    tenant_id: TenantId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TenantGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Waiters clone the Arc under this map lock, so a count of one is final.
        if locks
            .get(&self.tenant_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.tenant_id);
        }
    }
}

/// Run one worker future to completion, containing errors and panics.
async fn run_worker(
    tenant_id: TenantId,
    worker: futures::future::BoxFuture<'static, anyhow::Result<()>>,
) {
    info!(tenant_id = %tenant_id, "Polling loop started");
    match AssertUnwindSafe(worker).catch_unwind().await {
        Ok(Ok(())) => info!(tenant_id = %tenant_id, "Polling loop finished"),
        Ok(Err(e)) => error!(tenant_id = %tenant_id, error = %e, "Polling loop failed"),
        Err(_) => error!(tenant_id = %tenant_id, "Polling loop panicked"),
    }
}

/// Finishes an abandoned stop: aborts the task, waits for it to end, then
/// releases the session and drops the registry entry.
struct CleanupGuard {
    registry: Arc<Registry>,
    handle: Option<Arc<Handle>>,
    /// Still running until `terminate` returns.
    task: Option<JoinHandle<()>>,
}

impl CleanupGuard {
    fn new(registry: Arc<Registry>, handle: Arc<Handle>, task: Option<JoinHandle<()>>) -> Self {
        Self {
            registry,
            handle: Some(handle),
            task,
        }
    }

    fn disarm(&mut self) {
        self.handle = None;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        warn!(tenant_id = %handle.tenant_id(), "Stop abandoned, aborting worker");
        handle.abort();

        let task = self.task.take();
        let registry = self.registry.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Some(task) = task {
                        let _ = task.await;
                    }
                    handle.release_session().await;
                    registry.remove_handle(&handle);
                    debug!(tenant_id = %handle.tenant_id(), "Abandoned stop cleaned up");
                });
            }
            // No runtime left to wait on; the abort has been requested.
            Err(_) => {
                registry.remove_handle(&handle);
            }
        }
    }
}

// ABOUTME: In-memory registry of live worker handles, keyed by tenant.
// ABOUTME: Single source of truth for which tenants have a worker right now.

use super::worker::SessionSlot;
use crate::config::{TenantConfig, TenantId};
use crate::error::RegistryError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Bookkeeping record for one worker run.
///
/// Never updated after creation: a new configuration means a new handle.
pub struct Handle {
    tenant_id: TenantId,
    config: Arc<TenantConfig>,
    started_at: DateTime<Utc>,
    stop: CancellationToken,
    session: SessionSlot,
    abort: AbortHandle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Handle {
    pub(crate) fn new(
        config: Arc<TenantConfig>,
        stop: CancellationToken,
        session: SessionSlot,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            tenant_id: config.tenant_id.clone(),
            config,
            started_at: Utc::now(),
            stop,
            session,
            abort: task.abort_handle(),
            task: Mutex::new(Some(task)),
        }
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// The configuration snapshot this worker was started with.
    pub fn config(&self) -> &Arc<TenantConfig> {
        &self.config
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whether the worker task has ended, for any reason.
    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }

    pub(crate) fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// Take the join handle. Only the stop path calls this, once.
    pub(crate) fn take_task(&self) -> Option<JoinHandle<()>> {
        match self.task.lock() {
            Ok(mut task) => task.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Abort the task without waiting for it.
    pub(crate) fn abort(&self) {
        self.stop.cancel();
        self.abort.abort();
    }

    pub(crate) async fn release_session(&self) {
        self.session.release().await;
    }

    pub fn session_released(&self) -> bool {
        self.session.is_released()
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("tenant_id", &self.tenant_id)
            .field("started_at", &self.started_at)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Map from tenant id to its current handle.
///
/// Locks are never held across an await, so a reader always sees either the
/// old map or the new one.
#[derive(Default)]
pub struct Registry {
    entries: RwLock<HashMap<TenantId, Arc<Handle>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle for its tenant.
    ///
    /// Fails if a handle whose task is still running is registered. A finished
    /// handle is replaced and returned so the caller can release it.
    pub fn register(&self, handle: Arc<Handle>) -> Result<Option<Arc<Handle>>, RegistryError> {
        let mut entries = self.write();
        if let Some(existing) = entries.get(handle.tenant_id()) {
            if !existing.is_finished() {
                return Err(RegistryError::AlreadyLive(handle.tenant_id().clone()));
            }
        }
        Ok(entries.insert(handle.tenant_id().clone(), handle))
    }

    pub fn lookup(&self, tenant_id: &TenantId) -> Option<Arc<Handle>> {
        self.read().get(tenant_id).cloned()
    }

    pub fn remove(&self, tenant_id: &TenantId) -> Option<Arc<Handle>> {
        self.write().remove(tenant_id)
    }

    /// Remove the entry only if it still points at `handle`.
    pub(crate) fn remove_handle(&self, handle: &Arc<Handle>) -> bool {
        let mut entries = self.write();
        match entries.get(handle.tenant_id()) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                entries.remove(handle.tenant_id());
                true
            }
            _ => false,
        }
    }

    /// Point-in-time listing of every entry, ordered by tenant id.
    pub fn snapshot(&self) -> Vec<Arc<Handle>> {
        let mut handles: Vec<Arc<Handle>> = self.read().values().cloned().collect();
        handles.sort_by(|a, b| a.tenant_id().cmp(b.tenant_id()));
        handles
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<TenantId, Arc<Handle>>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<TenantId, Arc<Handle>>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

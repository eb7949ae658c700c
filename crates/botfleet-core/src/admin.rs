// ABOUTME: Administrative facade tying the config store to the supervisor.
// ABOUTME: Persist first, then restart with the stored snapshot.

use crate::config::{TenantConfig, TenantId, TenantUpdate};
use crate::error::StoreResult;
use crate::store::ConfigStore;
use crate::supervisor::{RestartOutcome, Supervisor, WorkerFactory};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Result of an admin config edit.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateResult {
    pub config: TenantConfig,
    pub restart_status: RestartOutcome,
}

/// What an administrative frontend needs: config reads and edits that
/// always go through the store before touching a running worker.
pub struct Admin<S: ConfigStore, F: WorkerFactory> {
    store: Arc<S>,
    supervisor: Arc<Supervisor<F>>,
}

impl<S: ConfigStore, F: WorkerFactory> Admin<S, F> {
    pub fn new(store: Arc<S>, supervisor: Arc<Supervisor<F>>) -> Self {
        Self { store, supervisor }
    }

    pub fn supervisor(&self) -> &Arc<Supervisor<F>> {
        &self.supervisor
    }

    /// Stored config for a tenant, creating a default row on first access.
    pub async fn get_or_create(&self, tenant_id: &TenantId) -> StoreResult<TenantConfig> {
        match self.store.get(tenant_id).await? {
            Some(config) => Ok(config),
            None => {
                info!(tenant_id = %tenant_id, "Creating default bot config");
                self.store.upsert(tenant_id, TenantUpdate::default()).await
            }
        }
    }

    /// Save an edit and restart the tenant's bot with the saved snapshot.
    ///
    /// Waits for the restart to finish before returning.
    pub async fn update(&self, tenant_id: &TenantId, update: TenantUpdate) -> StoreResult<UpdateResult> {
        let config = self.store.upsert(tenant_id, update).await?;
        let restart_status = self.supervisor.restart(config.clone()).await;
        info!(tenant_id = %tenant_id, outcome = %restart_status, "Bot config updated");
        Ok(UpdateResult {
            config,
            restart_status,
        })
    }
}

// ABOUTME: The seam between the supervisor and a concrete bot worker implementation.
// ABOUTME: Defines WorkerFactory, Launch, Session, and the close-once SessionSlot.

use crate::config::{TenantConfig, TenantId};
use crate::error::LaunchError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Network session owned by one worker run.
///
/// `close` is called at most once per session by the supervisor.
#[async_trait]
pub trait Session: Send + Sync {
    async fn close(&self) -> anyhow::Result<()>;
}

/// Everything a worker run needs, built synchronously before the task is spawned.
pub struct Launch {
    /// Session owned by the handle; released on the tenant's stop path.
    pub session: Box<dyn Session>,
    /// The polling loop. Must return soon after the stop token is cancelled.
    pub worker: BoxFuture<'static, anyhow::Result<()>>,
}

/// Builds worker runs for tenants.
pub trait WorkerFactory: Send + Sync + 'static {
    /// Construct a fresh session and polling loop for one run of `config`.
    ///
    /// Must not block. The returned worker is spawned as its own task.
    fn launch(
        &self,
        config: Arc<TenantConfig>,
        stop: CancellationToken,
    ) -> Result<Launch, LaunchError>;
}

/// Holds a session until it is released. Releasing twice is a no-op.
pub(crate) struct SessionSlot {
    tenant_id: TenantId,
    session: Mutex<Option<Box<dyn Session>>>,
}

impl SessionSlot {
    pub(crate) fn new(tenant_id: TenantId, session: Box<dyn Session>) -> Self {
        Self {
            tenant_id,
            session: Mutex::new(Some(session)),
        }
    }

    /// Close the session if it has not been closed yet.
    ///
    /// Errors and panics from the session are logged and swallowed.
    pub(crate) async fn release(&self) {
        let session = match self.session.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(session) = session else {
            debug!(tenant_id = %self.tenant_id, "Session already released");
            return;
        };

        match AssertUnwindSafe(session.close()).catch_unwind().await {
            Ok(Ok(())) => debug!(tenant_id = %self.tenant_id, "Session closed"),
            Ok(Err(e)) => {
                error!(tenant_id = %self.tenant_id, error = %e, "Failed to close session")
            }
            Err(_) => error!(tenant_id = %self.tenant_id, "Session close panicked"),
        }
    }

    pub(crate) fn is_released(&self) -> bool {
        match self.session.lock() {
            Ok(slot) => slot.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

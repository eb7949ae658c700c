// ABOUTME: Graceful-then-forced task termination primitive.
// ABOUTME: Signal a cancellation token, wait a bounded time, then abort and await.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How a supervised task came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The task returned on its own within the grace period.
    Graceful,
    /// The grace period expired and the task was aborted.
    Forced,
    /// The task panicked before or during the grace period.
    Panicked,
    /// The task had already been aborted elsewhere.
    Cancelled,
}

/// Ask a task to stop through `token`, wait up to `grace`, then abort it.
///
/// Returns only once the task is no longer running. The task must reach an
/// `.await` point for the abort to take effect. If this future is dropped
/// early the caller still holds `task` and can finish the job.
pub async fn terminate<T>(
    task: &mut JoinHandle<T>,
    token: &CancellationToken,
    grace: Duration,
) -> Termination {
    token.cancel();

    match tokio::time::timeout(grace, &mut *task).await {
        Ok(Ok(_)) => Termination::Graceful,
        Ok(Err(e)) if e.is_panic() => Termination::Panicked,
        Ok(Err(_)) => Termination::Cancelled,
        Err(_) => {
            warn!(grace_ms = grace.as_millis() as u64, "Task ignored stop signal, aborting");
            task.abort();
            match task.await {
                Err(e) if e.is_panic() => Termination::Panicked,
                Ok(_) => {
                    debug!("Task finished while being aborted");
                    Termination::Graceful
                }
                Err(_) => Termination::Forced,
            }
        }
    }
}

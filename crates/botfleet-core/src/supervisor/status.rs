// ABOUTME: Result values returned by supervisor operations.
// ABOUTME: All serialize to the snake_case names the admin surface reports.

use crate::config::TenantId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Result of starting a tenant's worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
    NoToken,
    /// The worker factory could not build a session; nothing was registered.
    LaunchFailed,
}

/// Result of stopping a tenant's worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped,
    NotFound,
    AlreadyStopped,
}

/// Result of restarting a tenant's worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartOutcome {
    Started,
    AlreadyRunning,
    NoToken,
    LaunchFailed,
    StoppedDisabled,
}

impl From<StartOutcome> for RestartOutcome {
    fn from(outcome: StartOutcome) -> Self {
        match outcome {
            StartOutcome::Started => RestartOutcome::Started,
            StartOutcome::AlreadyRunning => RestartOutcome::AlreadyRunning,
            StartOutcome::NoToken => RestartOutcome::NoToken,
            StartOutcome::LaunchFailed => RestartOutcome::LaunchFailed,
        }
    }
}

macro_rules! impl_display {
    ($ty:ty { $($variant:ident => $name:literal),* $(,)? }) => {
        impl $ty {
            /// Wire name of this value.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_display!(StartOutcome {
    Started => "started",
    AlreadyRunning => "already_running",
    NoToken => "no_token",
    LaunchFailed => "launch_failed",
});

impl_display!(StopOutcome {
    Stopped => "stopped",
    NotFound => "not_found",
    AlreadyStopped => "already_stopped",
});

impl_display!(RestartOutcome {
    Started => "started",
    AlreadyRunning => "already_running",
    NoToken => "no_token",
    LaunchFailed => "launch_failed",
    StoppedDisabled => "stopped_disabled",
});

impl_display!(WorkerState {
    Running => "running",
    Stopped => "stopped",
    NotFound => "not_found",
});

/// Observed state of a tenant's worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Running,
    /// Registered but the task has ended and has not been reaped yet.
    Stopped,
    NotFound,
}

/// Answer to a single-tenant status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantStatus {
    pub tenant_id: TenantId,
    pub status: WorkerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One registered worker in a fleet listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    pub tenant_id: TenantId,
    pub name: String,
    pub started_at: DateTime<Utc>,
}

/// Fleet-wide counts, partitioned by whether each task is still running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FleetStats {
    pub total: usize,
    pub running_count: usize,
    pub stopped_count: usize,
    pub running: Vec<WorkerSummary>,
    pub stopped: Vec<WorkerSummary>,
}

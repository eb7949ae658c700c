// ABOUTME: Core of botfleet: tenant configs, the config store, and the bot supervisor.
// ABOUTME: Worker implementations plug in through supervisor::WorkerFactory.

pub mod admin;
pub mod config;
pub mod error;
pub mod store;
pub mod supervisor;

pub use admin::{Admin, UpdateResult};
pub use config::{TenantConfig, TenantId, TenantUpdate, Templates};
pub use error::{LaunchError, RegistryError, StoreError, StoreResult};
pub use store::{ConfigStore, SqliteConfigStore};
pub use supervisor::{
    BootReport, FleetStats, Launch, RestartOutcome, Session, StartOutcome, StopOutcome,
    Supervisor, SupervisorSettings, TenantStatus, WorkerFactory, WorkerState,
};

// ABOUTME: Integration tests for the bot supervisor using scripted fake workers.
// ABOUTME: Covers start/stop/restart/stop_all semantics, timeouts, and status.

use async_trait::async_trait;
use botfleet_core::supervisor::{Launch, Session, WorkerFactory};
use botfleet_core::{
    Admin, ConfigStore, LaunchError, RestartOutcome, SqliteConfigStore, StartOutcome, StopOutcome,
    Supervisor, SupervisorSettings, TenantConfig, TenantId, TenantUpdate, WorkerState,
};
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Fake worker factory
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Behavior {
    /// Polls until the stop token fires.
    Cooperative,
    /// Never looks at the stop token.
    Stubborn,
    /// Fails right after starting.
    Crash,
    /// Cooperative, but its session close panics.
    PanickyClose,
    /// The factory refuses to build a session.
    Unlaunchable,
    /// The factory itself panics.
    PanickyLaunch,
}

#[derive(Default)]
struct Recorder {
    behaviors: Mutex<HashMap<TenantId, Behavior>>,
    launches: AtomicUsize,
    closes: Mutex<HashMap<TenantId, usize>>,
    /// Welcome texts seen on each simulated poll cycle, per tenant.
    polls: Mutex<HashMap<TenantId, Vec<String>>>,
    live: Mutex<HashMap<TenantId, usize>>,
    max_live: Mutex<HashMap<TenantId, usize>>,
}

impl Recorder {
    fn behave(&self, id: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(TenantId::from(id), behavior);
    }

    fn behavior(&self, id: &TenantId) -> Behavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(id)
            .copied()
            .unwrap_or(Behavior::Cooperative)
    }

    fn closes(&self, id: &str) -> usize {
        self.closes
            .lock()
            .unwrap()
            .get(&TenantId::from(id))
            .copied()
            .unwrap_or(0)
    }

    fn live(&self, id: &str) -> usize {
        self.live
            .lock()
            .unwrap()
            .get(&TenantId::from(id))
            .copied()
            .unwrap_or(0)
    }

    fn max_live(&self, id: &str) -> usize {
        self.max_live
            .lock()
            .unwrap()
            .get(&TenantId::from(id))
            .copied()
            .unwrap_or(0)
    }

    fn last_poll(&self, id: &str) -> Option<String> {
        self.polls
            .lock()
            .unwrap()
            .get(&TenantId::from(id))
            .and_then(|polls| polls.last().cloned())
    }

    fn enter(&self, id: &TenantId) {
        let mut live = self.live.lock().unwrap();
        let count = live.entry(id.clone()).or_insert(0);
        *count += 1;
        let mut max_live = self.max_live.lock().unwrap();
        let max = max_live.entry(id.clone()).or_insert(0);
        *max = (*max).max(*count);
    }

    fn leave(&self, id: &TenantId) {
        if let Some(count) = self.live.lock().unwrap().get_mut(id) {
            *count -= 1;
        }
    }
}

/// Decrements the live count even when the worker task is aborted.
struct LiveGuard {
    recorder: Arc<Recorder>,
    tenant_id: TenantId,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.recorder.leave(&self.tenant_id);
    }
}

struct FakeSession {
    recorder: Arc<Recorder>,
    tenant_id: TenantId,
    panics: bool,
}

#[async_trait]
impl Session for FakeSession {
    async fn close(&self) -> anyhow::Result<()> {
        *self
            .recorder
            .closes
            .lock()
            .unwrap()
            .entry(self.tenant_id.clone())
            .or_insert(0) += 1;
        if self.panics {
            panic!("session close failed hard");
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
struct FakeFactory {
    recorder: Arc<Recorder>,
}

impl WorkerFactory for FakeFactory {
    fn launch(
        &self,
        config: Arc<TenantConfig>,
        stop: CancellationToken,
    ) -> Result<Launch, LaunchError> {
        let behavior = self.recorder.behavior(&config.tenant_id);
        if behavior == Behavior::Unlaunchable {
            return Err(LaunchError::Session("proxy unreachable".into()));
        }
        if behavior == Behavior::PanickyLaunch {
            panic!("factory bug");
        }
        self.recorder.launches.fetch_add(1, Ordering::SeqCst);

        let recorder = self.recorder.clone();
        let session = FakeSession {
            recorder: recorder.clone(),
            tenant_id: config.tenant_id.clone(),
            panics: behavior == Behavior::PanickyClose,
        };

        let worker = async move {
            recorder.enter(&config.tenant_id);
            let _live = LiveGuard {
                recorder: recorder.clone(),
                tenant_id: config.tenant_id.clone(),
            };

            match behavior {
                Behavior::Crash => anyhow::bail!("bad credentials"),
                Behavior::Stubborn => loop {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                },
                _ => {
                    while !stop.is_cancelled() {
                        recorder
                            .polls
                            .lock()
                            .unwrap()
                            .entry(config.tenant_id.clone())
                            .or_default()
                            .push(config.templates.welcome_message.clone());
                        tokio::select! {
                            _ = stop.cancelled() => {}
                            _ = tokio::time::sleep(Duration::from_millis(5)) => {}
                        }
                    }
                    Ok(())
                }
            }
        }
        .boxed();

        Ok(Launch {
            session: Box::new(session),
            worker,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn fast_settings() -> SupervisorSettings {
    SupervisorSettings {
        stop_timeout: Duration::from_millis(200),
        settle_interval: Duration::from_millis(10),
    }
}

fn supervisor() -> (Supervisor<FakeFactory>, Arc<Recorder>) {
    let factory = FakeFactory::default();
    let recorder = factory.recorder.clone();
    (Supervisor::new(factory, fast_settings()), recorder)
}

fn config(id: &str) -> TenantConfig {
    TenantConfig {
        is_enabled: true,
        secret_token: Some("123456:ABC".to_string()),
        display_name: format!("Bot {id}"),
        ..TenantConfig::new(TenantId::from(id))
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}

// ============================================================================
// Start
// ============================================================================

#[tokio::test]
async fn test_start_registers_running_worker() {
    let (supervisor, recorder) = supervisor();

    assert_eq!(supervisor.start(config("t1")).await, StartOutcome::Started);

    let status = supervisor.get_status(&TenantId::from("t1"));
    assert_eq!(status.status, WorkerState::Running);
    assert_eq!(status.name.as_deref(), Some("Bot t1"));
    wait_until(|| recorder.live("t1") == 1).await;

    supervisor.stop_all().await;
}

#[tokio::test]
async fn test_start_without_token_allocates_nothing() {
    let (supervisor, recorder) = supervisor();

    for token in [None, Some(""), Some("  ")] {
        let cfg = TenantConfig {
            secret_token: token.map(str::to_string),
            ..config("t1")
        };
        assert_eq!(supervisor.start(cfg).await, StartOutcome::NoToken);
    }

    assert!(supervisor.registry().is_empty());
    assert_eq!(recorder.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_starts_yield_one_worker() {
    let (supervisor, recorder) = supervisor();

    let (a, b) = tokio::join!(supervisor.start(config("t1")), supervisor.start(config("t1")));

    let mut outcomes = vec![a, b];
    outcomes.sort_by_key(|o| o.as_str());
    assert_eq!(
        outcomes,
        vec![StartOutcome::AlreadyRunning, StartOutcome::Started]
    );
    assert_eq!(recorder.launches.load(Ordering::SeqCst), 1);
    assert_eq!(supervisor.registry().len(), 1);

    supervisor.stop_all().await;
    assert!(recorder.max_live("t1") <= 1);
}

#[tokio::test]
async fn test_start_reports_launch_failure() {
    let (supervisor, recorder) = supervisor();
    recorder.behave("t1", Behavior::Unlaunchable);

    assert_eq!(supervisor.start(config("t1")).await, StartOutcome::LaunchFailed);
    assert!(supervisor.registry().is_empty());
}

#[tokio::test]
async fn test_start_survives_panicking_factory() {
    let (supervisor, recorder) = supervisor();
    recorder.behave("t1", Behavior::PanickyLaunch);

    assert_eq!(supervisor.start(config("t1")).await, StartOutcome::LaunchFailed);
    assert!(supervisor.registry().is_empty());

    recorder.behave("t1", Behavior::Cooperative);
    assert_eq!(supervisor.start(config("t1")).await, StartOutcome::Started);
    supervisor.stop_all().await;
}

#[tokio::test]
async fn test_start_reaps_crashed_worker() {
    let (supervisor, recorder) = supervisor();
    recorder.behave("t1", Behavior::Crash);

    assert_eq!(supervisor.start(config("t1")).await, StartOutcome::Started);
    wait_until(|| supervisor.get_status(&TenantId::from("t1")).status == WorkerState::Stopped)
        .await;

    recorder.behave("t1", Behavior::Cooperative);
    assert_eq!(supervisor.start(config("t1")).await, StartOutcome::Started);
    assert_eq!(recorder.closes("t1"), 1);
    assert_eq!(
        supervisor.get_status(&TenantId::from("t1")).status,
        WorkerState::Running
    );

    supervisor.stop_all().await;
    assert_eq!(recorder.closes("t1"), 2);
}

// ============================================================================
// Stop
// ============================================================================

#[tokio::test]
async fn test_stop_then_stop_again() {
    let (supervisor, recorder) = supervisor();
    let id = TenantId::from("t1");
    supervisor.start(config("t1")).await;

    assert_eq!(supervisor.stop(&id).await, StopOutcome::Stopped);
    assert_eq!(supervisor.stop(&id).await, StopOutcome::NotFound);

    assert_eq!(recorder.closes("t1"), 1);
    assert_eq!(recorder.live("t1"), 0);
    assert_eq!(supervisor.get_status(&id).status, WorkerState::NotFound);
}

#[tokio::test]
async fn test_stop_unknown_tenant() {
    let (supervisor, _) = supervisor();
    assert_eq!(
        supervisor.stop(&TenantId::from("ghost")).await,
        StopOutcome::NotFound
    );
}

#[tokio::test]
async fn test_stale_worker_is_reported_then_reaped() {
    let (supervisor, recorder) = supervisor();
    let id = TenantId::from("t1");
    recorder.behave("t1", Behavior::Crash);
    supervisor.start(config("t1")).await;

    wait_until(|| supervisor.get_status(&id).status == WorkerState::Stopped).await;

    // Status queries never reap.
    let stats = supervisor.get_stats();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.stopped_count, 1);
    assert_eq!(stats.running_count, 0);
    assert_eq!(stats.stopped[0].name, "Bot t1");
    assert_eq!(supervisor.registry().len(), 1);
    assert_eq!(recorder.closes("t1"), 0);

    assert_eq!(supervisor.stop(&id).await, StopOutcome::AlreadyStopped);
    assert!(supervisor.registry().is_empty());
    assert_eq!(recorder.closes("t1"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stubborn_worker_is_aborted_within_timeout() {
    let factory = FakeFactory::default();
    let recorder = factory.recorder.clone();
    let supervisor = Supervisor::new(factory, SupervisorSettings::default());
    let id = TenantId::from("t1");
    recorder.behave("t1", Behavior::Stubborn);
    supervisor.start(config("t1")).await;
    tokio::task::yield_now().await;

    let started = Instant::now();
    assert_eq!(supervisor.stop(&id).await, StopOutcome::Stopped);
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(10));
    assert!(elapsed < Duration::from_secs(11));
    assert!(supervisor.registry().is_empty());
    assert_eq!(recorder.closes("t1"), 1);
    assert_eq!(recorder.live("t1"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_stop_still_cleans_up() {
    let factory = FakeFactory::default();
    let recorder = factory.recorder.clone();
    let supervisor = Supervisor::new(factory, SupervisorSettings::default());
    let id = TenantId::from("t1");
    recorder.behave("t1", Behavior::Stubborn);
    supervisor.start(config("t1")).await;
    tokio::task::yield_now().await;
    let handle = supervisor.registry().lookup(&id).unwrap();

    // Give up long before the 10 s stop timeout.
    let stop = tokio::time::timeout(Duration::from_secs(1), supervisor.stop(&id)).await;
    assert!(stop.is_err());

    wait_until(|| supervisor.registry().is_empty()).await;
    assert!(handle.is_finished());
    assert!(handle.session_released());
    assert_eq!(recorder.closes("t1"), 1);
    assert_eq!(recorder.live("t1"), 0);

    assert_eq!(supervisor.start(config("t1")).await, StartOutcome::Started);
    assert_eq!(supervisor.registry().len(), 1);
}

#[tokio::test]
async fn test_failing_tenant_does_not_affect_neighbour() {
    let (supervisor, recorder) = supervisor();
    recorder.behave("bad", Behavior::Crash);
    supervisor.start(config("bad")).await;
    supervisor.start(config("good")).await;

    wait_until(|| supervisor.get_status(&TenantId::from("bad")).status == WorkerState::Stopped)
        .await;
    assert_eq!(
        supervisor.get_status(&TenantId::from("good")).status,
        WorkerState::Running
    );

    supervisor.stop_all().await;
}

// ============================================================================
// Restart
// ============================================================================

#[tokio::test]
async fn test_restart_replaces_worker_with_new_config() {
    let (supervisor, recorder) = supervisor();
    supervisor.start(config("t1")).await;
    wait_until(|| recorder.last_poll("t1").is_some()).await;
    assert_eq!(
        recorder.last_poll("t1").as_deref(),
        Some(botfleet_core::config::DEFAULT_WELCOME_MESSAGE)
    );

    let mut updated = config("t1");
    updated.templates.welcome_message = "Welcome back!".to_string();
    assert_eq!(supervisor.restart(updated).await, RestartOutcome::Started);

    wait_until(|| recorder.last_poll("t1").as_deref() == Some("Welcome back!")).await;
    assert_eq!(supervisor.registry().len(), 1);
    assert_eq!(recorder.closes("t1"), 1);
    assert_eq!(recorder.max_live("t1"), 1);

    supervisor.stop_all().await;
}

#[tokio::test]
async fn test_restart_disabled_stops_without_starting() {
    let (supervisor, recorder) = supervisor();
    supervisor.start(config("t1")).await;

    let disabled = TenantConfig {
        is_enabled: false,
        ..config("t1")
    };
    assert_eq!(
        supervisor.restart(disabled).await,
        RestartOutcome::StoppedDisabled
    );

    assert!(supervisor.registry().is_empty());
    assert_eq!(recorder.launches.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.closes("t1"), 1);
}

#[tokio::test]
async fn test_restart_of_stopped_tenant_starts_it() {
    let (supervisor, _) = supervisor();
    assert_eq!(supervisor.restart(config("t1")).await, RestartOutcome::Started);
    supervisor.stop_all().await;
}

#[tokio::test]
async fn test_restart_without_token_reports_no_token() {
    let (supervisor, _) = supervisor();
    supervisor.start(config("t1")).await;

    let tokenless = TenantConfig {
        secret_token: None,
        ..config("t1")
    };
    assert_eq!(supervisor.restart(tokenless).await, RestartOutcome::NoToken);
    assert!(supervisor.registry().is_empty());
}

#[tokio::test]
async fn test_concurrent_restarts_never_overlap() {
    let (supervisor, recorder) = supervisor();
    supervisor.start(config("t1")).await;

    let restarts = (0..4).map(|_| supervisor.restart(config("t1")));
    let outcomes = futures::future::join_all(restarts).await;

    assert!(outcomes.iter().all(|o| *o == RestartOutcome::Started));
    assert_eq!(supervisor.registry().len(), 1);
    assert_eq!(recorder.max_live("t1"), 1);

    supervisor.stop_all().await;
}

// ============================================================================
// Stop all
// ============================================================================

#[tokio::test]
async fn test_stop_all_drains_registry() {
    let (supervisor, recorder) = supervisor();
    for id in ["a", "b", "c"] {
        supervisor.start(config(id)).await;
    }

    supervisor.stop_all().await;

    assert!(supervisor.registry().is_empty());
    for id in ["a", "b", "c"] {
        assert_eq!(recorder.closes(id), 1);
    }
}

#[tokio::test]
async fn test_stop_all_survives_faulty_tenant() {
    let (supervisor, recorder) = supervisor();
    recorder.behave("faulty", Behavior::PanickyClose);
    recorder.behave("crashed", Behavior::Crash);
    for id in ["faulty", "crashed", "fine"] {
        supervisor.start(config(id)).await;
    }

    supervisor.stop_all().await;

    assert!(supervisor.registry().is_empty());
    assert_eq!(recorder.closes("faulty"), 1);
    assert_eq!(recorder.closes("crashed"), 1);
    assert_eq!(recorder.closes("fine"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_all_stops_tenants_concurrently() {
    let factory = FakeFactory::default();
    let recorder = factory.recorder.clone();
    let supervisor = Supervisor::new(factory, SupervisorSettings::default());
    for id in ["a", "b", "c"] {
        recorder.behave(id, Behavior::Stubborn);
        supervisor.start(config(id)).await;
    }

    let started = Instant::now();
    supervisor.stop_all().await;

    assert!(started.elapsed() < Duration::from_secs(11));
    assert!(supervisor.registry().is_empty());
}

#[tokio::test]
async fn test_stop_all_with_nothing_running() {
    let (supervisor, _) = supervisor();
    supervisor.stop_all().await;
    assert!(supervisor.registry().is_empty());
}

// ============================================================================
// Boot and admin facade
// ============================================================================

async fn store() -> (Arc<SqliteConfigStore>, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = SqliteConfigStore::open(&dir.path().join("tenants.db"))
        .await
        .unwrap();
    (Arc::new(store), dir)
}

#[tokio::test]
async fn test_boot_starts_enabled_tenants_only() {
    let (store, _dir) = store().await;
    let (supervisor, _) = supervisor();

    store
        .upsert(
            &TenantId::from("on"),
            TenantUpdate::default().enabled(true).secret_token("1:A"),
        )
        .await
        .unwrap();
    store
        .upsert(&TenantId::from("tokenless"), TenantUpdate::default().enabled(true))
        .await
        .unwrap();
    store
        .upsert(
            &TenantId::from("off"),
            TenantUpdate::default().enabled(false).secret_token("1:B"),
        )
        .await
        .unwrap();

    let report = supervisor.boot(store.as_ref()).await.unwrap();

    assert_eq!(report.started(), 1);
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(
        supervisor.get_status(&TenantId::from("on")).status,
        WorkerState::Running
    );
    assert_eq!(
        supervisor.get_status(&TenantId::from("off")).status,
        WorkerState::NotFound
    );

    supervisor.stop_all().await;
}

#[tokio::test]
async fn test_admin_update_persists_then_restarts() {
    let (store, _dir) = store().await;
    let (supervisor, recorder) = supervisor();
    let supervisor = Arc::new(supervisor);
    let admin = Admin::new(store, supervisor.clone());
    let id = TenantId::from("school-1");

    let created = admin.get_or_create(&id).await.unwrap();
    assert!(!created.is_enabled);

    let result = admin
        .update(
            &id,
            TenantUpdate::default()
                .enabled(true)
                .secret_token("123:XYZ")
                .welcome_message("Hi from school"),
        )
        .await
        .unwrap();
    assert_eq!(result.restart_status, RestartOutcome::Started);
    assert_eq!(result.config.templates.welcome_message, "Hi from school");
    wait_until(|| recorder.last_poll("school-1").as_deref() == Some("Hi from school")).await;

    let result = admin
        .update(&id, TenantUpdate::default().enabled(false))
        .await
        .unwrap();
    assert_eq!(result.restart_status, RestartOutcome::StoppedDisabled);
    assert!(supervisor.registry().is_empty());
    assert!(!admin.get_or_create(&id).await.unwrap().is_enabled);
}

//! Engine lifecycle integration tests.
//!
//! These drive the real engine against the mock collaborators:
//! start -> units purchase -> reconcile on change -> stop

use std::sync::Arc;
use std::time::Duration;

use sniper_core::{
    clock::now_ms,
    testing::{fixtures, MockNotifier, MockProvider, MockSolver, MockStore},
    AutoRunAction, CaptchaConfig, CaptchaSolver, Engine, EngineConfig, EngineError, LogBus,
    NeedCaptcha, Notifier, Provider, Store, TaskState,
};

/// Test helper holding the engine and every mock it talks to.
struct TestHarness {
    store: Arc<MockStore>,
    provider: Arc<MockProvider>,
    solver: Arc<MockSolver>,
    notifier: Arc<MockNotifier>,
    bus: LogBus,
    engine: Engine,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_configs(fast_engine_config(), fast_captcha_config())
    }

    fn with_configs(engine_config: EngineConfig, captcha_config: CaptchaConfig) -> Self {
        let store = Arc::new(MockStore::new());
        let provider = Arc::new(MockProvider::new());
        let solver = Arc::new(MockSolver::new());
        let notifier = Arc::new(MockNotifier::new());
        let bus = LogBus::new(256, 256);

        let engine = Engine::new(
            engine_config,
            captcha_config,
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&provider) as Arc<dyn Provider>,
            Arc::clone(&solver) as Arc<dyn CaptchaSolver>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            bus.clone(),
        );

        Self {
            store,
            provider,
            solver,
            notifier,
            bus,
            engine,
        }
    }

    async fn with_account(self) -> Self {
        self.store.set_accounts(vec![fixtures::account("a1")]).await;
        self
    }

    /// Poll a target's state until `predicate` holds or `timeout` elapses.
    async fn wait_for_task<F>(&self, target_id: &str, timeout: Duration, predicate: F) -> TaskState
    where
        F: Fn(&TaskState) -> bool,
    {
        let start = std::time::Instant::now();
        loop {
            if let Some(state) = self.engine.task_state(target_id).await {
                if predicate(&state) {
                    return state;
                }
                if start.elapsed() > timeout {
                    panic!("Timed out waiting for {}: last state {:?}", target_id, state);
                }
            } else if start.elapsed() > timeout {
                panic!("Timed out waiting for {}: no state", target_id);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn shutdown(&self) {
        self.engine
            .stop_all(Duration::from_secs(2))
            .await
            .expect("stop_all failed");
    }
}

fn fast_engine_config() -> EngineConfig {
    EngineConfig {
        scan_interval_ms: 20,
        rush_retry_interval_ms: 20,
        restart_drain_timeout_ms: 500,
        ..Default::default()
    }
}

fn fast_captcha_config() -> CaptchaConfig {
    CaptchaConfig {
        pool_tick_ms: 20,
        acquire_timeout_ms: 50,
        solve_timeout_ms: 1000,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_scan_target_purchases_until_quota() {
    let h = TestHarness::new().with_account().await;
    let mut target = fixtures::scan_target("t1");
    target.target_qty = 3;
    h.store.set_targets(vec![target]).await;

    let report = h.engine.start_all().await.unwrap();
    assert_eq!(report.started, vec!["t1".to_string()]);
    assert!(h.engine.is_running());

    let state = h
        .wait_for_task("t1", Duration::from_secs(3), |s| !s.running)
        .await;
    assert_eq!(state.purchased_qty, 3);
    assert_eq!(state.need_captcha, NeedCaptcha::NotRequired);
    assert!(state.last_success_ms.is_some());
    assert!(state.last_error.is_none());

    assert_eq!(h.provider.orders().await.len(), 3);
    let events = h.notifier.events();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].target_id, "t1");
    assert_eq!(events[0].account_mobile, "138****5678");

    h.shutdown().await;
}

#[tokio::test]
async fn test_failed_attempts_keep_the_unit_alive() {
    let h = TestHarness::new().with_account().await;
    h.provider
        .set_preflight_error(Some("HTTP 503".to_string()))
        .await;
    h.store.set_targets(vec![fixtures::scan_target("t1")]).await;

    h.engine.start_all().await.unwrap();
    let state = h
        .wait_for_task("t1", Duration::from_secs(2), |s| s.last_error.is_some())
        .await;
    assert!(state.running);
    assert!(state.last_error.unwrap().contains("HTTP 503"));

    h.provider.set_preflight_error(None).await;
    let state = h
        .wait_for_task("t1", Duration::from_secs(2), |s| s.purchased_qty == 1)
        .await;
    assert!(state.last_error.is_none());

    h.shutdown().await;
}

#[tokio::test]
async fn test_no_accounts_is_retryable() {
    let h = TestHarness::new();
    h.store.set_targets(vec![fixtures::scan_target("t1")]).await;

    h.engine.start_all().await.unwrap();
    let state = h
        .wait_for_task("t1", Duration::from_secs(2), |s| s.last_error.is_some())
        .await;
    assert_eq!(state.last_error.as_deref(), Some("no accounts available"));
    assert!(state.running);
    assert!(h.engine.is_running());

    h.store.set_accounts(vec![fixtures::account("a1")]).await;
    h.wait_for_task("t1", Duration::from_secs(2), |s| s.purchased_qty == 1)
        .await;

    h.shutdown().await;
}

#[tokio::test]
async fn test_restart_on_updated_at_change() {
    let h = TestHarness::new().with_account().await;
    h.provider.set_can_buy(false).await;
    h.store.set_targets(vec![fixtures::scan_target("t1")]).await;

    h.engine.start_all().await.unwrap();
    let first = h.engine.unit_generation("t1").await.unwrap();

    // Same updated_at: nothing to do.
    let report = h
        .engine
        .sync_enabled_targets(vec![fixtures::scan_target("t1")])
        .await
        .unwrap();
    assert!(report.is_empty());
    assert_eq!(h.engine.unit_generation("t1").await, Some(first));

    let mut edited = fixtures::scan_target("t1");
    edited.updated_at = 2;
    edited.target_qty = 4;
    let report = h.engine.sync_enabled_targets(vec![edited]).await.unwrap();
    assert_eq!(report.restarted, vec!["t1".to_string()]);
    assert!(report.started.is_empty());

    let second = h.engine.unit_generation("t1").await.unwrap();
    assert!(second > first);
    assert_eq!(h.engine.unit_count().await, 1);

    let state = h.engine.task_state("t1").await.unwrap();
    assert!(state.running);
    assert_eq!(state.target_qty, 4);

    h.shutdown().await;
}

#[tokio::test]
async fn test_disabled_target_is_stopped_and_retained() {
    let h = TestHarness::new().with_account().await;
    h.provider.set_can_buy(false).await;
    h.store
        .set_targets(vec![fixtures::scan_target("t1"), fixtures::scan_target("t2")])
        .await;

    h.engine.start_all().await.unwrap();
    assert_eq!(h.engine.unit_count().await, 2);
    let t2_generation = h.engine.unit_generation("t2").await;

    let report = h
        .engine
        .sync_enabled_targets(vec![fixtures::scan_target("t2")])
        .await
        .unwrap();
    assert_eq!(report.stopped, vec!["t1".to_string()]);
    assert_eq!(h.engine.unit_count().await, 1);
    assert_eq!(h.engine.unit_generation("t2").await, t2_generation);

    let t1 = h.engine.task_state("t1").await.unwrap();
    assert!(!t1.running);
    assert!(h.engine.task_state("t2").await.unwrap().running);

    h.shutdown().await;
}

#[tokio::test]
async fn test_restart_mid_order_counts_at_most_once() {
    let h = TestHarness::new().with_account().await;
    h.provider
        .set_order_delay(Duration::from_millis(300))
        .await;
    h.store.set_targets(vec![fixtures::scan_target("t1")]).await;

    h.engine.start_all().await.unwrap();

    // Let the first unit get into create_order, then edit the target.
    let start = std::time::Instant::now();
    while h.provider.order_calls() == 0 {
        assert!(start.elapsed() < Duration::from_secs(2), "no order started");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let mut edited = fixtures::scan_target("t1");
    edited.updated_at = 2;
    h.store.set_targets(vec![edited]).await;

    let action = h.engine.auto_run_by_store().await.unwrap();
    match action {
        AutoRunAction::Synced(report) => assert_eq!(report.restarted, vec!["t1".to_string()]),
        other => panic!("unexpected action: {:?}", other),
    }

    let state = h
        .wait_for_task("t1", Duration::from_secs(3), |s| !s.running)
        .await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    // The abandoned call never completed, the replacement bought the quota.
    assert_eq!(h.provider.order_calls(), 2);
    assert_eq!(h.provider.orders().await.len(), 1);
    assert_eq!(state.purchased_qty, 1);
    assert_eq!(
        h.engine.task_state("t1").await.unwrap().purchased_qty,
        1
    );

    h.shutdown().await;
}

#[tokio::test]
async fn test_restart_starts_a_fresh_job() {
    let h = TestHarness::new().with_account().await;
    let mut target = fixtures::scan_target("t1");
    h.store.set_targets(vec![target.clone()]).await;

    h.engine.start_all().await.unwrap();
    let first = h
        .wait_for_task("t1", Duration::from_secs(2), |s| !s.running)
        .await;
    assert_eq!(first.purchased_qty, 1);
    assert_eq!(h.provider.orders().await.len(), 1);

    // An edited target is a new job: the new sku gets bought too.
    target.updated_at = 2;
    target.sku_id = "other-sku".to_string();
    h.engine.sync_enabled_targets(vec![target]).await.unwrap();
    let state = h
        .wait_for_task("t1", Duration::from_secs(2), |s| {
            !s.running && s.purchased_qty == 1
        })
        .await;
    assert!(state.last_success_ms >= first.last_success_ms);

    let orders = h.provider.orders().await;
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[1].sku_id, "other-sku");

    h.shutdown().await;
}

#[tokio::test]
async fn test_invalid_target_never_enters_the_loop() {
    let h = TestHarness::new().with_account().await;
    let mut broken = fixtures::scan_target("t1");
    broken.per_order_qty = 0;
    h.store
        .set_targets(vec![broken.clone(), fixtures::scan_target("t2")])
        .await;

    let report = h.engine.start_all().await.unwrap();
    assert_eq!(report.rejected, vec!["t1".to_string()]);
    assert_eq!(report.started, vec!["t2".to_string()]);
    assert_eq!(h.engine.unit_count().await, 1);

    let state = h.engine.task_state("t1").await.unwrap();
    assert!(!state.running);
    assert!(state.last_error.unwrap().contains("per_order_qty"));

    h.wait_for_task("t2", Duration::from_secs(2), |s| s.purchased_qty == 1)
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    let orders = h.provider.orders().await;
    assert_eq!(orders.len(), 1);
    assert!(orders.iter().all(|o| o.target_id == "t2"));

    // Rejection is reported once, not on every pass.
    let report = h
        .engine
        .sync_enabled_targets(vec![broken.clone(), fixtures::scan_target("t2")])
        .await
        .unwrap();
    assert!(report.is_empty());

    // Fixing the target starts it.
    broken.per_order_qty = 1;
    broken.updated_at = 2;
    let report = h
        .engine
        .sync_enabled_targets(vec![broken, fixtures::scan_target("t2")])
        .await
        .unwrap();
    assert_eq!(report.started, vec!["t1".to_string()]);
    h.wait_for_task("t1", Duration::from_secs(2), |s| s.purchased_qty == 1)
        .await;

    h.shutdown().await;
}

#[tokio::test]
async fn test_target_turning_invalid_stops_its_unit() {
    let h = TestHarness::new().with_account().await;
    h.provider.set_can_buy(false).await;
    h.store.set_targets(vec![fixtures::scan_target("t1")]).await;
    h.engine.start_all().await.unwrap();

    let mut broken = fixtures::scan_target("t1");
    broken.target_qty = 0;
    broken.updated_at = 2;
    let report = h.engine.sync_enabled_targets(vec![broken]).await.unwrap();
    assert_eq!(report.stopped, vec!["t1".to_string()]);
    assert_eq!(report.rejected, vec!["t1".to_string()]);
    assert_eq!(h.engine.unit_count().await, 0);

    let state = h.engine.task_state("t1").await.unwrap();
    assert!(!state.running);
    assert!(state.last_error.unwrap().contains("target_qty"));

    h.shutdown().await;
}

#[tokio::test]
async fn test_stop_all_is_idempotent() {
    let h = TestHarness::new().with_account().await;
    h.provider.set_can_buy(false).await;
    h.store.set_targets(vec![fixtures::scan_target("t1")]).await;

    // Stopping an idle engine is a no-op.
    h.engine.stop_all(Duration::from_secs(1)).await.unwrap();

    h.engine.start_all().await.unwrap();
    h.engine.stop_all(Duration::from_secs(1)).await.unwrap();
    h.engine.stop_all(Duration::from_secs(1)).await.unwrap();

    assert!(!h.engine.is_running());
    assert_eq!(h.engine.unit_count().await, 0);
    assert!(!h.engine.task_state("t1").await.unwrap().running);

    // The engine can be started again after a stop.
    h.engine.start_all().await.unwrap();
    assert!(h.engine.is_running());
    assert!(h.engine.task_state("t1").await.unwrap().running);
    h.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_start_and_stop_settle_stopped() {
    let h = TestHarness::new().with_account().await;
    h.provider.set_can_buy(false).await;
    h.store.set_targets(vec![fixtures::scan_target("t1")]).await;

    for _ in 0..20 {
        let (started, stopped) = tokio::join!(
            h.engine.start_all(),
            h.engine.stop_all(Duration::from_secs(1))
        );
        // The stop can win the race after start installed its root.
        match started {
            Ok(_) | Err(EngineError::NotRunning) => {}
            Err(e) => panic!("unexpected start error: {}", e),
        }
        stopped.unwrap();
        assert_eq!(h.engine.is_running(), h.engine.unit_count().await > 0);

        h.engine.stop_all(Duration::from_secs(1)).await.unwrap();
        assert!(!h.engine.is_running());
        assert_eq!(h.engine.unit_count().await, 0);
    }

    // No unit outlives the stop.
    let calls = h.provider.preflight_calls();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.provider.preflight_calls(), calls);
}

#[tokio::test]
async fn test_auto_run_follows_store() {
    let h = TestHarness::new().with_account().await;
    h.provider.set_can_buy(false).await;

    assert_eq!(
        h.engine.auto_run_by_store().await.unwrap(),
        AutoRunAction::Idle
    );

    h.store.set_targets(vec![fixtures::scan_target("t1")]).await;
    assert_eq!(
        h.engine.auto_run_by_store().await.unwrap(),
        AutoRunAction::Started
    );
    assert!(h.engine.is_running());

    // Enabling a second target leaves the first unit untouched.
    let t1_generation = h.engine.unit_generation("t1").await;
    h.store.upsert_target(fixtures::scan_target("t2")).await;
    match h.engine.auto_run_by_store().await.unwrap() {
        AutoRunAction::Synced(report) => {
            assert_eq!(report.started, vec!["t2".to_string()]);
            assert!(report.stopped.is_empty());
        }
        other => panic!("unexpected action: {:?}", other),
    }
    assert_eq!(h.engine.unit_generation("t1").await, t1_generation);

    h.store.set_targets(Vec::new()).await;
    assert_eq!(
        h.engine.auto_run_by_store().await.unwrap(),
        AutoRunAction::Stopped
    );
    assert!(!h.engine.is_running());
}

#[tokio::test]
async fn test_rush_target_waits_for_deadline() {
    let h = TestHarness::new().with_account().await;
    let rush_at = now_ms() + 150;
    h.store
        .set_targets(vec![fixtures::rush_target("r1", rush_at)])
        .await;

    h.engine.start_all().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.provider.preflight_calls(), 0);

    let state = h
        .wait_for_task("r1", Duration::from_secs(2), |s| !s.running)
        .await;
    assert_eq!(state.purchased_qty, 1);
    assert!(state.last_success_ms.unwrap() >= rush_at);

    h.shutdown().await;
}

#[tokio::test]
async fn test_rush_window_elapsed() {
    let h = TestHarness::new().with_account().await;
    h.store
        .set_targets(vec![fixtures::rush_target("r1", now_ms() - 200_000)])
        .await;

    h.engine.start_all().await.unwrap();
    let state = h
        .wait_for_task("r1", Duration::from_secs(2), |s| !s.running)
        .await;
    assert_eq!(state.last_error.as_deref(), Some("rush window elapsed"));
    assert_eq!(h.provider.preflight_calls(), 0);

    h.shutdown().await;
}

#[tokio::test]
async fn test_empty_pool_falls_back_to_direct_solve() {
    let h = TestHarness::new().with_account().await;
    h.provider.set_need_captcha(true).await;
    h.store.set_targets(vec![fixtures::scan_target("t1")]).await;

    h.engine.start_all().await.unwrap();
    let state = h
        .wait_for_task("t1", Duration::from_secs(3), |s| !s.running)
        .await;
    assert_eq!(state.need_captcha, NeedCaptcha::Required);

    let orders = h.provider.orders().await;
    assert_eq!(orders.len(), 1);
    let token = orders[0].request.captcha_verify_param.clone().unwrap();
    assert!(token.starts_with("tok-"));
    assert!(h
        .solver
        .session_tokens()
        .await
        .contains(&"token-a1".to_string()));

    h.shutdown().await;
}

#[tokio::test]
async fn test_pinned_verify_param_bypasses_pool() {
    let h = TestHarness::new().with_account().await;
    h.provider.set_need_captcha(true).await;
    let mut target = fixtures::scan_target("t1");
    target.captcha_verify_param = Some("  pinned-token ".to_string());
    h.store.set_targets(vec![target]).await;

    h.engine.start_all().await.unwrap();
    h.wait_for_task("t1", Duration::from_secs(2), |s| !s.running)
        .await;

    let orders = h.provider.orders().await;
    assert_eq!(
        orders[0].request.captcha_verify_param.as_deref(),
        Some("pinned-token")
    );
    assert_eq!(h.solver.calls(), 0);

    h.shutdown().await;
}

#[tokio::test]
async fn test_pooled_token_is_used_before_solving() {
    let h = TestHarness::new().with_account().await;
    h.provider.set_need_captcha(true).await;
    h.engine
        .add_captcha_verify_param_manual("manual-token")
        .await
        .unwrap();
    h.store.set_targets(vec![fixtures::scan_target("t1")]).await;

    h.engine.start_all().await.unwrap();
    h.wait_for_task("t1", Duration::from_secs(2), |s| !s.running)
        .await;

    let orders = h.provider.orders().await;
    assert_eq!(
        orders[0].request.captcha_verify_param.as_deref(),
        Some("manual-token")
    );

    h.shutdown().await;
}

#[tokio::test]
async fn test_pool_stays_dormant_until_warmup() {
    let h = TestHarness::new().with_account().await;
    h.provider.set_can_buy(false).await;
    let now = now_ms();
    h.store
        .set_targets(vec![fixtures::rush_target("r1", now + 60_000)])
        .await;

    h.engine.start_all().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = h.engine.captcha_pool_status().unwrap();
    let activate_at = status.activate_at_ms.unwrap();
    assert!((activate_at - (now + 30_000)).abs() < 1_000);
    assert!(!status.activated);
    assert_eq!(status.size, 0);
    assert_eq!(h.solver.calls(), 0);

    h.shutdown().await;
}

#[tokio::test]
async fn test_pool_activates_immediately_and_fills() {
    let h = TestHarness::new().with_account().await;
    h.provider.set_can_buy(false).await;
    let now = now_ms();
    h.store
        .set_targets(vec![
            fixtures::rush_target("early", now + 10_000),
            fixtures::rush_target("late", now + 50_000),
        ])
        .await;

    h.engine.start_all().await.unwrap();
    let status = h.engine.captcha_pool_status().unwrap();
    assert!(status.activated);
    assert_eq!(status.activate_at_ms, Some(now + 10_000 - 30_000));

    let start = std::time::Instant::now();
    loop {
        let status = h.engine.captcha_pool_status().unwrap();
        if status.size == status.desired {
            break;
        }
        assert!(start.elapsed() < Duration::from_secs(2), "pool never filled");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Stopping returns the pool to dormant but keeps the tokens.
    h.shutdown().await;
    let status = h.engine.captcha_pool_status().unwrap();
    assert!(!status.activated);
    assert_eq!(status.size, 2);
}

#[tokio::test]
async fn test_updated_account_is_persisted() {
    let h = TestHarness::new().with_account().await;
    let mut refreshed = fixtures::account("a1");
    refreshed.token = "token-refreshed".to_string();
    h.provider.set_updated_account(Some(refreshed)).await;
    h.store.set_targets(vec![fixtures::scan_target("t1")]).await;

    h.engine.start_all().await.unwrap();
    h.wait_for_task("t1", Duration::from_secs(2), |s| !s.running)
        .await;

    let saved = h.store.saved_accounts().await;
    assert!(!saved.is_empty());
    assert_eq!(saved[0].token, "token-refreshed");

    h.shutdown().await;
}

#[tokio::test]
async fn test_state_changes_are_published() {
    let h = TestHarness::new().with_account().await;
    let mut rx = h.bus.subscribe();
    h.store.set_targets(vec![fixtures::scan_target("t1")]).await;

    h.engine.start_all().await.unwrap();
    h.wait_for_task("t1", Duration::from_secs(2), |s| !s.running)
        .await;
    h.shutdown().await;

    let mut kinds = Vec::new();
    while let Ok(entry) = rx.try_recv() {
        kinds.push(entry.kind);
    }
    assert_eq!(kinds.first().map(String::as_str), Some("engine_status"));
    assert!(kinds.iter().any(|k| k == "task_state"));
    assert!(kinds.iter().any(|k| k == "order_created"));
    assert_eq!(kinds.last().map(String::as_str), Some("engine_status"));
}

#[tokio::test]
async fn test_close_stops_everything() {
    let h = TestHarness::new().with_account().await;
    h.provider.set_can_buy(false).await;
    h.store.set_targets(vec![fixtures::scan_target("t1")]).await;

    h.engine.start_all().await.unwrap();
    h.engine.close().await;

    assert!(!h.engine.is_running());
    assert!(h.engine.auto_run_by_store().await.is_err());
    assert!(h.engine.fill_captcha_pool(1).await.is_err());
}

//! Engine coordinator.
//!
//! Owns the set of execution units and reconciles it against the enabled
//! targets:
//! - One unit per enabled target, each with its own stop source under the root
//! - A changed `updated_at` restarts the unit instead of patching it
//! - One pool maintainer per running period
//!
//! Bookkeeping happens under a single short-held lock. Units are spawned
//! under it so their join handles are never missing from the books, but each
//! one waits for a start signal sent after the lock is released. Cancellation
//! also happens after release.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::captcha::{
    activation_time, CaptchaConfig, CaptchaPool, CaptchaPoolItem, CaptchaPoolSettings,
    CaptchaPoolStatus, CaptchaSolver, FillMode, FillReport, SolverGate,
};
use crate::clock::now_ms;
use crate::logbus::LogBus;
use crate::notify::Notifier;
use crate::provider::Provider;
use crate::store::{Account, Settings, Store, Target};

use super::config::EngineConfig;
use super::events::EngineEvent;
use super::maintainer::run_maintainer;
use super::selection::{fill_session_token, pick_account};
use super::stop::StopSource;
use super::types::{AutoRunAction, EngineError, SyncReport, TaskState};
use super::unit::ExecutionUnit;

/// Join handle of a spawned unit. Whoever joins it first takes it.
pub(crate) type TaskSlot = Arc<StdMutex<Option<JoinHandle<()>>>>;

fn take_slot(slot: &TaskSlot) -> Option<JoinHandle<()>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

/// Spawn `unit` held on a start signal. The unit does nothing until the
/// returned sender fires; dropping the sender makes it exit.
fn spawn_held(unit: ExecutionUnit) -> (TaskSlot, oneshot::Sender<()>) {
    let (go_tx, go_rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        if go_rx.await.is_ok() {
            unit.run().await;
        }
    });
    (Arc::new(StdMutex::new(Some(handle))), go_tx)
}

/// Wait for a previous unit of the same target to exit, aborting it after
/// `timeout`.
pub(crate) async fn drain_predecessor(target_id: &str, slot: &TaskSlot, timeout: Duration) {
    let Some(mut handle) = take_slot(slot) else {
        return;
    };
    if tokio::time::timeout(timeout, &mut handle).await.is_err() {
        warn!(target_id = %target_id, "Previous unit did not exit in time, aborting it");
        handle.abort();
    }
}

struct UnitHandle {
    stop: StopSource,
    generation: u64,
    join: TaskSlot,
}

#[derive(Default)]
struct EngineState {
    root: Option<StopSource>,
    units: HashMap<String, UnitHandle>,
    /// Units cancelled by reconciliation that may still be winding down.
    retired: HashMap<String, TaskSlot>,
    /// Target snapshot each live unit was started with.
    applied: HashMap<String, Target>,
    tasks: HashMap<String, TaskState>,
    accounts: Vec<Account>,
    maintainer: Option<JoinHandle<()>>,
    next_generation: u64,
}

/// Everything units and the maintainer share with the coordinator.
pub(crate) struct Shared {
    pub(crate) config: EngineConfig,
    pub(crate) captcha: CaptchaConfig,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) provider: Arc<dyn Provider>,
    pub(crate) solver: Arc<dyn CaptchaSolver>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) bus: LogBus,
    pub(crate) pool: CaptchaPool,
    pub(crate) gate: SolverGate,
    state: Mutex<EngineState>,
    running: AtomicBool,
    closed: AtomicBool,
}

impl Shared {
    /// Apply `update` to a target's state if `generation` still owns it and
    /// publish the result. Returns `None` for a stale generation.
    pub(crate) async fn update_task<F>(
        &self,
        target_id: &str,
        generation: u64,
        update: F,
    ) -> Option<TaskState>
    where
        F: FnOnce(&mut TaskState),
    {
        let mut state = self.state.lock().await;
        let task = state.tasks.get_mut(target_id)?;
        if task.generation != generation {
            return None;
        }
        update(task);
        let updated = task.clone();
        // Published under the lock so subscribers see updates in state order.
        EngineEvent::TaskState {
            state: updated.clone(),
        }
        .publish(&self.bus);
        Some(updated)
    }

    pub(crate) async fn task_state(&self, target_id: &str) -> Option<TaskState> {
        self.state.lock().await.tasks.get(target_id).cloned()
    }

    /// Random logged-in account from the snapshot, loading it from the Store
    /// when the snapshot is empty.
    pub(crate) async fn select_account(&self) -> Result<Account, EngineError> {
        {
            let state = self.state.lock().await;
            if !state.accounts.is_empty() {
                return pick_account(&state.accounts)
                    .cloned()
                    .ok_or(EngineError::NoAccounts);
            }
        }

        let accounts = self.store.list_accounts().await?;
        let picked = pick_account(&accounts).cloned();
        self.state.lock().await.accounts = accounts;
        picked.ok_or(EngineError::NoAccounts)
    }

    /// Persist a session snapshot handed back by the Provider.
    pub(crate) async fn save_account(&self, account: Account) {
        if let Err(e) = self.store.save_account(&account).await {
            warn!(account_id = %account.id, error = %e, "Failed to persist updated account");
        }
        let mut state = self.state.lock().await;
        if let Some(existing) = state.accounts.iter_mut().find(|a| a.id == account.id) {
            *existing = account;
        }
    }

    pub(crate) async fn fill_session_token(&self) -> String {
        let state = self.state.lock().await;
        fill_session_token(&state.accounts)
    }

    pub(crate) fn publish_pool_status(&self) {
        let status = self.pool.status(now_ms());
        EngineEvent::CaptchaPool {
            size: status.size,
            desired: status.desired,
            activated: status.activated,
        }
        .publish(&self.bus);
    }

    fn apply_settings(&self, settings: &Settings) {
        self.pool.set_settings(settings.captcha_pool);
        self.gate.resize(settings.max_concurrent_solvers);
    }

    fn refresh_activation(&self, targets: &[Target]) {
        let at = activation_time(targets, &self.pool.settings());
        self.pool.set_activate_at(at, now_ms());
        debug!(activate_at_ms = ?at, "Captcha pool activation recomputed");
    }
}

/// The engine. Cheap to clone; all clones drive the same state.
///
/// Lifecycle: `new`, then `start_all`/`stop_all` any number of times, then
/// `close`.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

impl Engine {
    /// Create an engine. Nothing runs until `start_all`.
    pub fn new(
        config: EngineConfig,
        captcha: CaptchaConfig,
        store: Arc<dyn Store>,
        provider: Arc<dyn Provider>,
        solver: Arc<dyn CaptchaSolver>,
        notifier: Arc<dyn Notifier>,
        bus: LogBus,
    ) -> Self {
        let settings = Settings::default();
        Self {
            shared: Arc::new(Shared {
                config,
                captcha,
                store,
                provider,
                solver,
                notifier,
                bus,
                pool: CaptchaPool::new(settings.captcha_pool),
                gate: SolverGate::new(settings.max_concurrent_solvers),
                state: Mutex::new(EngineState::default()),
                running: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Start the engine with every enabled target in the Store.
    ///
    /// Settings and accounts are re-read first. Calling this while running
    /// only reconciles.
    pub async fn start_all(&self) -> Result<SyncReport, EngineError> {
        self.ensure_open()?;
        let targets = self.shared.store.list_enabled_targets().await?;
        self.start_with(targets).await
    }

    async fn start_with(&self, targets: Vec<Target>) -> Result<SyncReport, EngineError> {
        let settings = self.shared.store.get_settings().await?;
        self.shared.apply_settings(&settings);
        let accounts = self.shared.store.list_accounts().await?;

        let started = {
            let mut state = self.shared.state.lock().await;
            state.accounts = accounts;
            if state.root.is_some() {
                false
            } else {
                // `running` only changes under the lock, together with `root`.
                let root = StopSource::new();
                let token = root.token();
                state.root = Some(root);
                state.maintainer = Some(tokio::spawn(run_maintainer(
                    Arc::clone(&self.shared),
                    token,
                )));
                self.shared.running.store(true, Ordering::SeqCst);
                true
            }
        };

        if started {
            info!(targets = targets.len(), "Engine started");
            EngineEvent::EngineStatus { running: true }.publish(&self.shared.bus);
        }

        self.sync_enabled_targets(targets).await
    }

    /// Stop every unit and the pool maintainer, waiting up to `timeout` for
    /// them to exit. A no-op when not running.
    pub async fn stop_all(&self, timeout: Duration) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.stop_inner(timeout).await;
        Ok(())
    }

    async fn stop_inner(&self, timeout: Duration) {
        let (root, units, retired, maintainer, stopped_tasks) = {
            let mut state = self.shared.state.lock().await;
            let Some(root) = state.root.take() else {
                self.shared.running.store(false, Ordering::SeqCst);
                debug!("Engine not running, stop is a no-op");
                return;
            };
            let units: Vec<UnitHandle> = state.units.drain().map(|(_, h)| h).collect();
            let retired: Vec<TaskSlot> = state.retired.drain().map(|(_, s)| s).collect();
            state.applied.clear();
            let maintainer = state.maintainer.take();
            let stopped_tasks: Vec<TaskState> = state
                .tasks
                .values_mut()
                .filter(|t| t.running)
                .map(|t| {
                    t.running = false;
                    t.clone()
                })
                .collect();
            (root, units, retired, maintainer, stopped_tasks)
        };

        info!(units = units.len(), "Stopping engine");
        root.stop();
        for unit in &units {
            unit.stop.stop();
        }

        let mut handles: Vec<JoinHandle<()>> = units
            .iter()
            .map(|u| &u.join)
            .chain(retired.iter())
            .filter_map(take_slot)
            .collect();
        handles.extend(maintainer);
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        if tokio::time::timeout(timeout, join_all(handles)).await.is_err() {
            warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Units did not exit in time, aborting"
            );
            for abort in aborts {
                abort.abort();
            }
        }

        {
            // A start may have installed a new root while we were waiting.
            let state = self.shared.state.lock().await;
            if state.root.is_none() {
                self.shared.pool.reset_activation();
                self.shared.running.store(false, Ordering::SeqCst);
            }
        }

        for task in stopped_tasks {
            EngineEvent::TaskState { state: task }.publish(&self.shared.bus);
        }
        EngineEvent::EngineStatus { running: false }.publish(&self.shared.bus);
        info!("Engine stopped");
    }

    /// Reconcile against the Store: stop when nothing is enabled, start when
    /// something is and the engine is idle, otherwise sync units in place.
    pub async fn auto_run_by_store(&self) -> Result<AutoRunAction, EngineError> {
        self.ensure_open()?;
        let targets = self.shared.store.list_enabled_targets().await?;
        let running = self.shared.state.lock().await.root.is_some();

        if targets.is_empty() {
            if running {
                info!("No enabled targets, stopping engine");
                self.stop_inner(self.shared.config.stop_timeout()).await;
                return Ok(AutoRunAction::Stopped);
            }
            return Ok(AutoRunAction::Idle);
        }

        if !running {
            self.start_with(targets).await?;
            return Ok(AutoRunAction::Started);
        }

        let accounts = self.shared.store.list_accounts().await?;
        self.shared.state.lock().await.accounts = accounts;
        let report = self.sync_enabled_targets(targets).await?;
        Ok(AutoRunAction::Synced(report))
    }

    /// Bring the live units in line with `enabled`.
    ///
    /// Units whose target is gone are cancelled. Units whose target changed
    /// `updated_at` are cancelled and started again with the new snapshot.
    /// Targets with no unit get one.
    pub async fn sync_enabled_targets(
        &self,
        enabled: Vec<Target>,
    ) -> Result<SyncReport, EngineError> {
        self.ensure_open()?;
        let mut report = SyncReport::default();
        let mut to_cancel: Vec<StopSource> = Vec::new();
        let mut to_start: Vec<oneshot::Sender<()>> = Vec::new();
        let mut published: Vec<TaskState> = Vec::new();

        let applied_targets = {
            let mut state = self.shared.state.lock().await;
            if state.root.is_none() {
                return Err(EngineError::NotRunning);
            }

            let mut desired: HashMap<String, Target> = HashMap::new();
            let mut invalid: Vec<(Target, String)> = Vec::new();
            for target in enabled.into_iter().filter(|t| t.enabled) {
                match target.validate() {
                    Ok(()) => {
                        desired.insert(target.id.clone(), target);
                    }
                    Err(reason) => invalid.push((target, reason)),
                }
            }

            let live: Vec<String> = state.units.keys().cloned().collect();
            for id in live {
                let changed = match (desired.get(&id), state.applied.get(&id)) {
                    (None, _) => false,
                    (Some(next), Some(prev)) => next.updated_at != prev.updated_at,
                    (Some(_), None) => true,
                };
                if desired.contains_key(&id) && !changed {
                    continue;
                }

                state.applied.remove(&id);
                if let Some(handle) = state.units.remove(&id) {
                    to_cancel.push(handle.stop);
                    state.retired.insert(id.clone(), handle.join);
                }
                if changed {
                    report.restarted.push(id);
                } else {
                    if let Some(task) = state.tasks.get_mut(&id) {
                        task.running = false;
                        published.push(task.clone());
                    }
                    report.stopped.push(id);
                }
            }

            // Invalid targets never get a unit. A live one was stopped above.
            for (target, reason) in invalid {
                let unchanged = state.tasks.get(&target.id).is_some_and(|t| {
                    !t.running && t.last_error.as_deref() == Some(reason.as_str())
                });
                if unchanged {
                    continue;
                }
                warn!(target_id = %target.id, reason = %reason, "Target rejected");
                state.next_generation += 1;
                let generation = state.next_generation;
                let task = TaskState::rejected(
                    &target,
                    generation,
                    reason,
                    state.tasks.get(&target.id),
                );
                state.tasks.insert(target.id.clone(), task.clone());
                published.push(task);
                report.rejected.push(target.id);
            }

            let mut new_ids: Vec<&String> = desired
                .keys()
                .filter(|id| !state.units.contains_key(*id))
                .collect();
            new_ids.sort();

            for id in new_ids {
                let target = desired[id].clone();
                let Some(stop) = state.root.as_ref().map(StopSource::child) else {
                    break;
                };
                state.next_generation += 1;
                let generation = state.next_generation;

                let task = TaskState::starting(&target, generation, state.tasks.get(id));
                state.tasks.insert(id.clone(), task.clone());
                published.push(task);

                let predecessor = state.retired.remove(id);
                let (join, go) = spawn_held(ExecutionUnit::new(
                    Arc::clone(&self.shared),
                    target.clone(),
                    generation,
                    stop.token(),
                    predecessor,
                ));
                state.units.insert(
                    id.clone(),
                    UnitHandle {
                        stop,
                        generation,
                        join,
                    },
                );
                state.applied.insert(id.clone(), target);
                to_start.push(go);

                if !report.restarted.contains(id) {
                    report.started.push(id.clone());
                }
            }

            state.applied.values().cloned().collect::<Vec<_>>()
        };

        for stop in to_cancel {
            stop.stop();
        }
        for task in published {
            EngineEvent::TaskState { state: task }.publish(&self.shared.bus);
        }
        for go in to_start {
            // A unit aborted in the meantime has dropped its receiver.
            let _ = go.send(());
        }

        self.shared.refresh_activation(&applied_targets);

        if !report.is_empty() {
            info!(
                started = ?report.started,
                stopped = ?report.stopped,
                restarted = ?report.restarted,
                rejected = ?report.rejected,
                "Targets reconciled"
            );
        }
        Ok(report)
    }

    /// Run up to `count` solves and add the results to the pool.
    pub async fn fill_captcha_pool(&self, count: usize) -> Result<FillReport, EngineError> {
        self.ensure_open()?;
        let session_token = self.shared.fill_session_token().await;
        let report = self
            .shared
            .pool
            .fill(
                self.shared.solver.as_ref(),
                &self.shared.gate,
                &session_token,
                count,
                self.shared.captcha.solve_timeout(),
                FillMode::Manual,
            )
            .await;
        self.shared.publish_pool_status();
        Ok(report)
    }

    /// Add a token solved out of band.
    pub async fn add_captcha_verify_param_manual(
        &self,
        verify_param: &str,
    ) -> Result<CaptchaPoolItem, EngineError> {
        self.ensure_open()?;
        let item = self.shared.pool.add(verify_param, now_ms())?;
        info!(solved_at_ms = item.solved_at_ms, "Captcha token added manually");
        self.shared.publish_pool_status();
        Ok(item)
    }

    pub fn captcha_pool_status(&self) -> Result<CaptchaPoolStatus, EngineError> {
        self.ensure_open()?;
        Ok(self.shared.pool.status(now_ms()))
    }

    /// Normalize, apply, and persist pool settings, then recompute activation.
    pub async fn set_captcha_pool_settings(
        &self,
        settings: CaptchaPoolSettings,
    ) -> Result<CaptchaPoolSettings, EngineError> {
        self.ensure_open()?;
        let normalized = self.shared.pool.set_settings(settings);

        let mut stored = self.shared.store.get_settings().await?;
        stored.captcha_pool = normalized;
        self.shared.store.save_settings(&stored).await?;

        let applied: Vec<Target> = {
            let state = self.shared.state.lock().await;
            state.applied.values().cloned().collect()
        };
        if self.is_running() {
            self.shared.refresh_activation(&applied);
        }
        self.shared.publish_pool_status();
        Ok(normalized)
    }

    /// Resize the shared solver budget and persist it.
    pub async fn set_max_concurrent_solvers(&self, limit: usize) -> Result<usize, EngineError> {
        self.ensure_open()?;
        let applied = self.shared.gate.resize(limit);

        let mut stored = self.shared.store.get_settings().await?;
        stored.max_concurrent_solvers = applied;
        self.shared.store.save_settings(&stored).await?;
        Ok(applied)
    }

    pub async fn task_state(&self, target_id: &str) -> Option<TaskState> {
        self.shared.task_state(target_id).await
    }

    /// Every known task state, ordered by target id.
    pub async fn task_states(&self) -> Vec<TaskState> {
        let state = self.shared.state.lock().await;
        let mut tasks: Vec<TaskState> = state.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.target_id.cmp(&b.target_id));
        tasks
    }

    /// Generation of the live unit for `target_id`, if any.
    pub async fn unit_generation(&self, target_id: &str) -> Option<u64> {
        let state = self.shared.state.lock().await;
        state.units.get(target_id).map(|u| u.generation)
    }

    /// Number of live execution units.
    pub async fn unit_count(&self) -> usize {
        self.shared.state.lock().await.units.len()
    }

    pub fn log_bus(&self) -> &LogBus {
        &self.shared.bus
    }

    /// Stop everything and refuse further calls. Idempotent.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_inner(self.shared.config.stop_timeout()).await;
        info!("Engine closed");
    }
}

//! The long-running health worker.
//!
//! One scheduler task ticks at the configured interval; each tick drains a
//! bounded batch of due checks and due repair notifications into a shared
//! worker pool. Cycles never overlap: a tick that lands while the previous
//! cycle is still draining is skipped. All retry state lives in the store,
//! so the worker can stop and start (or crash) at any point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crossbeam_channel::bounded;
use log::{debug, error, info, Level};
use logging_timer::timer;
use serde::{Deserialize, Serialize};
use threadpool::ThreadPool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::checker::HealthChecker;
use crate::config::{HealthConfig, MANUAL_CHECK_TIMEOUT_SECONDS};
use crate::error::HealthPulseError;
use crate::probe::{Notifier, ProbeOutcome, Prober, Rescanner};
use crate::record::FileHealthRecord;
use crate::registry::{ActiveChecks, InterruptToken};
use crate::state_machine::HealthStateMachine;
use crate::status::HealthStatus;
use crate::store::HealthStore;
use crate::utils::Utils;

/// Lifecycle state of the worker.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkerStatus::Stopped => "stopped",
            WorkerStatus::Starting => "starting",
            WorkerStatus::Running => "running",
            WorkerStatus::Stopping => "stopping",
        };
        write!(f, "{}", name)
    }
}

/// Statistics about the health worker. Readers get a snapshot copy.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorkerStats {
    pub status: WorkerStatus,
    pub last_run_time: Option<i64>,
    pub next_run_time: Option<i64>,
    pub total_runs_completed: i64,
    pub total_files_checked: i64,
    pub total_files_healthy: i64,
    pub total_files_corrupted: i64,
    pub current_run_start_time: Option<i64>,
    pub current_run_files_checked: i64,
    pub last_error: Option<String>,
    pub error_count: i64,
}

struct Lifecycle {
    running: bool,
    stop_tx: Option<watch::Sender<bool>>,
    scheduler: Option<JoinHandle<()>>,
}

/// One unit of cycle work; check and repair items share the same pool.
enum WorkItem {
    Check(FileHealthRecord),
    Repair(FileHealthRecord),
}

/// The health worker: periodic cycles plus the operator-facing manual API.
pub struct HealthWorker {
    store: Arc<dyn HealthStore>,
    checker: Arc<HealthChecker>,
    state_machine: Arc<HealthStateMachine>,
    active_checks: Arc<ActiveChecks>,
    config: HealthConfig,

    lifecycle: Mutex<Lifecycle>,
    cycle_running: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    stats: Mutex<WorkerStats>,

    /// Handle back to the owning Arc, for spawning tasks that outlive the
    /// current borrow. Always upgradable while any caller holds the worker.
    weak_self: Weak<HealthWorker>,
}

impl HealthWorker {
    /// Assemble a worker from its collaborators. Nothing runs until
    /// [`start`](Self::start) is called.
    pub fn new(
        store: Arc<dyn HealthStore>,
        prober: Arc<dyn Prober>,
        rescanner: Arc<dyn Rescanner>,
        notifier: Arc<dyn Notifier>,
        config: HealthConfig,
    ) -> Arc<Self> {
        let active_checks = Arc::new(ActiveChecks::new());
        let state_machine = Arc::new(HealthStateMachine::new(Arc::clone(&store), rescanner));
        let checker = Arc::new(HealthChecker::new(
            prober,
            notifier,
            Arc::clone(&state_machine),
            Arc::clone(&active_checks),
        ));

        Arc::new_cyclic(|weak_self| Self {
            store,
            checker,
            state_machine,
            active_checks,
            config,
            lifecycle: Mutex::new(Lifecycle {
                running: false,
                stop_tx: None,
                scheduler: None,
            }),
            cycle_running: Arc::new(AtomicBool::new(false)),
            stopping: Arc::new(AtomicBool::new(false)),
            stats: Mutex::new(WorkerStats::default()),
            weak_self: weak_self.clone(),
        })
    }

    fn arc(&self) -> Arc<Self> {
        self.weak_self
            .upgrade()
            .expect("HealthWorker arc is alive while its methods run")
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the background scheduler task. Must be called from within a
    /// tokio runtime. `outer` is an optional parent cancellation scope; when
    /// it fires the tick loop winds down after the in-flight cycle drains.
    pub fn start(&self, outer: Option<InterruptToken>) -> Result<(), HealthPulseError> {
        let mut lifecycle = self.lifecycle.lock().unwrap();
        if lifecycle.running {
            return Err(HealthPulseError::AlreadyRunning);
        }
        lifecycle.running = true;
        self.stopping.store(false, Ordering::Release);
        self.update_stats(|s| {
            s.status = WorkerStatus::Starting;
            s.last_error = None;
        });

        // Reset any records stuck in Checking from a previous process.
        // Best effort: log and continue on failure.
        if let Err(err) = self.store.reset_all_checking() {
            error!("Failed to reset checking files during initialization: {err}");
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = self.arc();
        let handle = tokio::spawn(async move { worker.run(stop_rx, outer).await });

        lifecycle.stop_tx = Some(stop_tx);
        lifecycle.scheduler = Some(handle);

        self.update_stats(|s| s.status = WorkerStatus::Running);
        info!(
            "Health worker started (check_interval {:?}, max_concurrent_jobs {})",
            self.config.check_interval(),
            self.config.max_concurrent()
        );
        Ok(())
    }

    /// Stop the scheduler task and wait for the in-flight cycle (and thus
    /// all of its tasks) to drain. Does not cancel individual active checks;
    /// operator cancellation is [`cancel_active_check`](Self::cancel_active_check).
    pub async fn stop(&self) -> Result<(), HealthPulseError> {
        let (stop_tx, scheduler) = {
            let mut lifecycle = self.lifecycle.lock().unwrap();
            if !lifecycle.running {
                return Err(HealthPulseError::NotRunning);
            }
            lifecycle.running = false;
            (lifecycle.stop_tx.take(), lifecycle.scheduler.take())
        };

        self.stopping.store(true, Ordering::Release);
        self.update_stats(|s| s.status = WorkerStatus::Stopping);
        info!("Stopping health worker...");

        if let Some(stop_tx) = stop_tx {
            let _ = stop_tx.send(true);
        }
        if let Some(scheduler) = scheduler {
            let _ = scheduler.await;
        }

        self.update_stats(|s| {
            s.status = WorkerStatus::Stopped;
            s.current_run_start_time = None;
            s.current_run_files_checked = 0;
        });
        info!("Health worker stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.lock().unwrap().running
    }

    pub fn is_cycle_running(&self) -> bool {
        self.cycle_running.load(Ordering::Acquire)
    }

    /// Snapshot of the worker statistics.
    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().unwrap().clone()
    }

    fn update_stats<F>(&self, update: F)
    where
        F: FnOnce(&mut WorkerStats),
    {
        let mut stats = self.stats.lock().unwrap();
        update(&mut stats);
    }

    // ========================================================================
    // Tick loop
    // ========================================================================

    async fn run(
        self: Arc<Self>,
        mut stop_rx: watch::Receiver<bool>,
        outer: Option<InterruptToken>,
    ) {
        let mut ticker = tokio::time::interval(self.config.check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut cycle_handle: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(token) = &outer {
                        if token.is_interrupted() {
                            info!("Health worker stopped by outer cancellation");
                            break;
                        }
                    }

                    // Never overlap cycles
                    if self.cycle_running.swap(true, Ordering::AcqRel) {
                        debug!("Skipping health check cycle - previous cycle still running");
                        continue;
                    }

                    let worker = self.arc();
                    cycle_handle = Some(tokio::task::spawn_blocking(move || {
                        if let Err(err) = worker.run_cycle() {
                            error!("Health check cycle failed: {err}");
                            worker.update_stats(|s| {
                                s.error_count += 1;
                                s.last_error = Some(err.to_string());
                            });
                        }
                        worker.cycle_running.store(false, Ordering::Release);
                    }));
                }
                _ = stop_rx.changed() => {
                    info!("Health worker stopped by stop signal");
                    break;
                }
            }
        }

        // Let the in-flight cycle drain before the scheduler task exits
        if let Some(handle) = cycle_handle.take() {
            let _ = handle.await;
        }
    }

    /// One pass over the due work. Runs on the blocking pool; returns an
    /// error only for whole-store outages (per-file failures are persisted
    /// into their records and logged).
    fn run_cycle(&self) -> Result<(), HealthPulseError> {
        let _tmr = timer!(Level::Debug; "HealthWorker::run_cycle");

        let now = Utils::now_ts();
        let interval_seconds = self.config.check_interval().as_secs() as i64;
        let max_concurrent = self.config.max_concurrent();

        self.update_stats(|s| {
            s.current_run_start_time = Some(now);
            s.current_run_files_checked = 0;
        });

        let finish_cycle = |worker: &HealthWorker| {
            worker.update_stats(|s| {
                s.current_run_start_time = None;
                s.current_run_files_checked = 0;
                s.total_runs_completed += 1;
                s.last_run_time = Some(now);
                s.next_run_time = Some(now + interval_seconds);
            });
        };

        let due_checks = self.store.fetch_due_for_check(max_concurrent)?;
        let due_repairs = self.store.fetch_due_for_repair(max_concurrent)?;

        let total = due_checks.len() + due_repairs.len();
        if total == 0 {
            finish_cycle(self);
            return Ok(());
        }

        info!(
            "Found {} file(s) due for health check and {} for repair (max concurrent {})",
            due_checks.len(),
            due_repairs.len(),
            max_concurrent
        );

        // Both work kinds share one bounded pool: in-flight work never
        // exceeds max_concurrent even when both batches are full.
        let workers = total.min(max_concurrent).max(1);
        let pool = ThreadPool::new(workers);
        let (sender, receiver) = bounded::<WorkItem>(workers);

        for _ in 0..workers {
            let receiver = receiver.clone();
            let worker = self.arc();
            pool.execute(move || {
                while let Ok(item) = receiver.recv() {
                    match item {
                        WorkItem::Check(record) => worker.process_check_item(&record),
                        WorkItem::Repair(record) => worker.process_repair_item(&record),
                    }
                    worker.update_stats(|s| s.current_run_files_checked += 1);
                }
            });
        }

        for record in due_checks {
            sender
                .send(WorkItem::Check(record))
                .expect("cycle worker pool hung up unexpectedly");
        }
        for record in due_repairs {
            sender
                .send(WorkItem::Repair(record))
                .expect("cycle worker pool hung up unexpectedly");
        }

        // Close the channel and wait for every task in this cycle
        drop(sender);
        pool.join();

        finish_cycle(self);

        info!(
            "Health check cycle completed ({} item(s) in {}s)",
            total,
            Utils::now_ts() - now
        );
        Ok(())
    }

    fn process_check_item(&self, record: &FileHealthRecord) {
        debug!("Checking unhealthy file '{}'", record.file_path);

        if let Err(err) = self.store.set_checking(&record.file_path) {
            error!(
                "Failed to set checking status for '{}': {}",
                record.file_path, err
            );
            return;
        }

        if let Err(err) = self.run_check(&record.file_path, None) {
            error!("Health check failed for '{}': {}", record.file_path, err);
        }
    }

    fn process_repair_item(&self, record: &FileHealthRecord) {
        if self.stopping.load(Ordering::Acquire) {
            return;
        }

        debug!("Processing repair for '{}'", record.file_path);
        if let Err(err) = self.state_machine.run_repair(&record.file_path) {
            error!("Repair trigger failed for '{}': {}", record.file_path, err);
        }
    }

    /// Run one orchestrated check and fold its outcome into the totals.
    fn run_check(
        &self,
        file_path: &str,
        outer: Option<&InterruptToken>,
    ) -> Result<ProbeOutcome, HealthPulseError> {
        let outcome = self.checker.run(file_path, outer)?;
        self.update_stats(|s| {
            s.total_files_checked += 1;
            match outcome {
                ProbeOutcome::Healthy => s.total_files_healthy += 1,
                ProbeOutcome::Corrupted(_) => s.total_files_corrupted += 1,
                ProbeOutcome::CheckFailed(_) => {}
            }
        });
        Ok(outcome)
    }

    // ========================================================================
    // Manual API
    // ========================================================================

    /// Put a file on the health watchlist (or re-arm an existing record).
    /// Used by upstream importers.
    pub fn add_to_check(
        &self,
        file_path: &str,
        source_ref: Option<&str>,
    ) -> Result<(), HealthPulseError> {
        self.store.upsert_pending(file_path, source_ref)?;
        info!("Added '{}' to the health check list", file_path);
        Ok(())
    }

    /// Kick off a detached single-file check with a hard deadline. Returns
    /// immediately; failures (including the deadline) reset the record to
    /// Pending so the regular cycle retries later.
    pub fn perform_background_check(&self, file_path: &str) -> Result<(), HealthPulseError> {
        if !self.is_running() {
            return Err(HealthPulseError::NotRunning);
        }

        let worker = self.arc();
        let file_path = file_path.to_string();

        tokio::spawn(async move {
            let deadline = std::time::Duration::from_secs(MANUAL_CHECK_TIMEOUT_SECONDS);
            let token = InterruptToken::new();

            let probe_worker = Arc::clone(&worker);
            let probe_path = file_path.clone();
            let probe_token = token.clone();
            let check = tokio::task::spawn_blocking(move || {
                probe_worker
                    .run_check(&probe_path, Some(&probe_token))
                    .map(|_| ())
            });

            let result = match tokio::time::timeout(deadline, check).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => Err(HealthPulseError::Error(format!(
                    "background check aborted: {join_err}"
                ))),
                Err(_elapsed) => {
                    // Fire the scope so the probe unwinds; its state updates
                    // were already skipped by the orchestrator's checkpoints.
                    token.interrupt();
                    Err(HealthPulseError::Timeout)
                }
            };

            if let Err(check_err) = result {
                match &check_err {
                    HealthPulseError::AlreadyActive(_) => {
                        // Another check owns the record right now; leave it be
                        debug!(
                            "Skipping background check for '{}': {}",
                            file_path, check_err
                        );
                        return;
                    }
                    HealthPulseError::Timeout => {
                        error!(
                            "Background health check timed out after {} minutes: '{}'",
                            MANUAL_CHECK_TIMEOUT_SECONDS / 60,
                            file_path
                        );
                    }
                    _ => {
                        error!(
                            "Background health check failed for '{}': {}",
                            file_path, check_err
                        );
                    }
                }

                // Back to Pending so the cycle retries later. source_ref and
                // the counters are preserved by the store's update semantics.
                let message = check_err.to_string();
                if let Err(update_err) = worker.store.update(
                    &file_path,
                    HealthStatus::Pending,
                    Some(&message),
                    None,
                    Some(Utils::now_ts()),
                    false,
                ) {
                    error!(
                        "Failed to update status after failed check '{}': {}",
                        file_path, update_err
                    );
                }
            }
        });

        Ok(())
    }

    /// Cancel an in-flight check for `file_path`: fire its token, drop the
    /// registry entry, and reset the record to Pending with its counters
    /// preserved so the file simply retries on the next cycle.
    pub fn cancel_active_check(&self, file_path: &str) -> Result<(), HealthPulseError> {
        self.active_checks.cancel(file_path)?;

        if let Err(err) = self.store.update(
            file_path,
            HealthStatus::Pending,
            None,
            None,
            Some(Utils::now_ts()),
            false,
        ) {
            error!(
                "Failed to update file status after cancellation '{}': {}",
                file_path, err
            );
            return Err(err);
        }

        info!("Health check cancelled for '{}'", file_path);
        Ok(())
    }

    pub fn is_check_active(&self, file_path: &str) -> bool {
        self.active_checks.is_active(file_path)
    }
}

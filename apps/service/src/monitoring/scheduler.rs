use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use super::executor::MonitoringExecutor;
use super::transition::TransitionTracker;
use super::types::{CheckResult, Target};

/// A target plus its in-flight flag
struct Slot {
    target: Target,
    busy: AtomicBool,
}

/// Clears the in-flight flag when the check task ends, however it ends
struct BusyGuard(Arc<Slot>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.busy.store(false, Ordering::Release);
    }
}

/// Handle to a running schedule
pub struct MonitorHandle {
    ticker: JoinHandle<()>,
}

impl MonitorHandle {
    /// Cancel future ticks; checks already in flight still complete and report
    pub fn stop(&self) {
        self.ticker.abort();
    }
}

/// Monitoring scheduler - fires one check per target on every tick
pub struct MonitoringScheduler {
    executor: Arc<MonitoringExecutor>,
    tracker: Arc<TransitionTracker>,
    result_tx: mpsc::Sender<CheckResult>,
    period: Duration,
}

impl MonitoringScheduler {
    pub fn new(
        executor: Arc<MonitoringExecutor>,
        tracker: Arc<TransitionTracker>,
        result_tx: mpsc::Sender<CheckResult>,
        period: Duration,
    ) -> Self {
        Self { executor, tracker, result_tx, period }
    }

    /// Run one pass immediately, then one per period until stopped
    ///
    /// A target whose previous check is still running is skipped for that
    /// tick rather than probed twice.
    pub fn start(&self, targets: Vec<Target>) -> MonitorHandle {
        info!(
            "Starting checks for {} targets every {}s",
            targets.len(),
            self.period.as_secs_f64()
        );

        let slots: Vec<Arc<Slot>> = targets
            .into_iter()
            .map(|target| Arc::new(Slot { target, busy: AtomicBool::new(false) }))
            .collect();

        let executor = self.executor.clone();
        let tracker = self.tracker.clone();
        let result_tx = self.result_tx.clone();
        let period = self.period;

        let ticker = tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                timer.tick().await;

                for slot in &slots {
                    if slot.busy.swap(true, Ordering::AcqRel) {
                        debug!(monitor = %slot.target.name, "Previous check still running, skipping tick");
                        continue;
                    }

                    let guard = BusyGuard(slot.clone());
                    let executor = executor.clone();
                    let tracker = tracker.clone();
                    let result_tx = result_tx.clone();

                    tokio::spawn(async move {
                        let result = run_check(&executor, &tracker, &guard.0.target).await;

                        // The target stays busy until its result is handed off
                        if let Err(e) = result_tx.send(result).await {
                            error!("Failed to send check result: {}", e);
                        }
                        drop(guard);
                    });
                }
            }
        });

        MonitorHandle { ticker }
    }

    /// Check every target once, concurrently, and collect the results
    pub async fn run_once(&self, targets: &[Target]) -> Vec<CheckResult> {
        let checks = targets.iter().map(|target| run_check(&self.executor, &self.tracker, target));
        futures::future::join_all(checks).await
    }
}

async fn run_check(
    executor: &MonitoringExecutor,
    tracker: &TransitionTracker,
    target: &Target,
) -> CheckResult {
    let (check, certificate) = executor.execute_check(target).await;
    let transition = tracker.observe(target.id, check.is_up);

    if transition.changed {
        info!(monitor = %target.name, url = %target.url, "Status changed to {}", check.status());
    }

    CheckResult {
        check,
        certificate,
        previous_status: transition.previous,
        status_changed: transition.changed,
    }
}

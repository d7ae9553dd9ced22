/// Orchestrator module - coordinates all components
///
/// The orchestrator is the core coordinator that:
/// - Syncs configured targets into the database
/// - Drives the scheduler and consumes its results
/// - Persists every check, publishes live snapshots, and hands
///   status changes to the alerter


use anyhow::{Result, anyhow};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::alerts::{Alerter, NotifyOutcome};
use crate::broadcast::{LiveBus, LiveUpdate};
use crate::config::Config;
use crate::database::{Database, DatabaseImpl, Summary, TargetStatus, initialize_database};
use crate::monitoring::{
    Check, CheckResult, MonitoringExecutor, MonitoringScheduler, Target, TransitionTracker,
};
use crate::pool::LibsqlPool;

const RESULT_CHANNEL_CAPACITY: usize = 100;

/// Targets with their latest state plus the aggregate counts
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub targets: Vec<TargetStatus>,
    pub summary: Summary,
}

/// Main orchestrator for the NetPulse service
pub struct Orchestrator {
    config: Arc<Config>,
    database: Arc<dyn Database>,
    executor: Arc<MonitoringExecutor>,
    tracker: Arc<TransitionTracker>,
    alerter: Arc<Alerter>,
    bus: LiveBus,
}

impl Orchestrator {
    /// Create an orchestrator over a pooled database with real probes and sinks
    pub async fn new(config: Config, pool: LibsqlPool) -> Result<Self> {
        let conn = pool.get().await?;
        info!("Initializing database schema...");
        initialize_database(&conn).await?;
        drop(conn);

        let database = Arc::new(DatabaseImpl::new_from_pool(pool));
        let executor = Arc::new(MonitoringExecutor::new()?);
        let alerter = Alerter::from_config(&config.alerts)?;

        if config.alerts.enabled {
            info!("Alerts enabled with {} sinks", alerter.sink_count());
        }

        Ok(Self::with_parts(config, database, executor, alerter))
    }

    pub fn with_parts(
        config: Config,
        database: Arc<dyn Database>,
        executor: Arc<MonitoringExecutor>,
        alerter: Alerter,
    ) -> Self {
        Self {
            config: Arc::new(config),
            database,
            executor,
            tracker: Arc::new(TransitionTracker::new()),
            alerter: Arc::new(alerter),
            bus: LiveBus::new(),
        }
    }

    /// Live updates published after every persisted check
    pub fn bus(&self) -> &LiveBus {
        &self.bus
    }

    /// Monitor until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
    }

    /// Monitor until `shutdown` resolves
    ///
    /// Checks in flight at shutdown still run to completion and are handled,
    /// and every alert they raise is delivered, before this returns.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!("Starting NetPulse orchestrator...");

        let targets = self.sync_targets().await?;
        if targets.is_empty() {
            warn!("No targets configured");
        }
        let by_id: HashMap<Uuid, Target> = targets.iter().map(|t| (t.id, t.clone())).collect();

        let (result_tx, mut result_rx) = mpsc::channel::<CheckResult>(RESULT_CHANNEL_CAPACITY);
        let scheduler = self.scheduler(result_tx);
        let handle = scheduler.start(targets);

        info!("Orchestrator started successfully - processing monitoring results");

        let mut alerts = JoinSet::new();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                Some(result) = result_rx.recv() => {
                    let Some(target) = by_id.get(&result.check.target_id) else {
                        warn!("Result for unknown target {}", result.check.target_id);
                        continue;
                    };
                    self.handle_result(target, result, &mut alerts).await;
                }
                Some(joined) = alerts.join_next(), if !alerts.is_empty() => {
                    log_alert_task(joined);
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping scheduler");
                    break;
                }
            }
        }

        handle.stop();
        drop(scheduler);

        // Senders left are held by in-flight checks only
        while let Some(result) = result_rx.recv().await {
            if let Some(target) = by_id.get(&result.check.target_id) {
                self.handle_result(target, result, &mut alerts).await;
            }
        }

        if !alerts.is_empty() {
            info!("Waiting for {} alert deliveries", alerts.len());
        }
        while let Some(joined) = alerts.join_next().await {
            log_alert_task(joined);
        }

        info!("Orchestrator stopped");
        Ok(())
    }

    /// Check every target once and return the checks in target order
    ///
    /// Alerts raised by the pass are awaited before returning.
    pub async fn run_once(&self) -> Result<Vec<Check>> {
        let targets = self.sync_targets().await?;
        let (result_tx, _result_rx) = mpsc::channel::<CheckResult>(1);
        let results = self.scheduler(result_tx).run_once(&targets).await;

        let mut alerts = JoinSet::new();
        let mut checks = Vec::with_capacity(results.len());
        for (target, result) in targets.iter().zip(results) {
            checks.push(result.check.clone());
            self.handle_result(target, result, &mut alerts).await;
        }

        while let Some(joined) = alerts.join_next().await {
            log_alert_task(joined);
        }

        Ok(checks)
    }

    /// Current state as stored, without probing anything
    pub async fn status(&self) -> Result<StatusReport> {
        let targets = self.database.get_targets().await?;
        let summary = Summary::from_statuses(&targets);
        Ok(StatusReport { targets, summary })
    }

    /// Stored checks for the active target with `url`, oldest first
    pub async fn history(&self, url: &str, hours: u32) -> Result<Vec<Check>> {
        let targets = self.database.get_targets().await?;
        let target = targets
            .iter()
            .find(|status| status.target.url == url)
            .ok_or_else(|| anyhow!("no active target with url {}", url))?;

        self.database.get_target_history(target.target.id, hours).await
    }

    async fn sync_targets(&self) -> Result<Vec<Target>> {
        let targets = self.database.sync_targets(&self.config.targets).await?;
        info!("Loaded {} targets", targets.len());
        Ok(targets)
    }

    fn scheduler(&self, result_tx: mpsc::Sender<CheckResult>) -> MonitoringScheduler {
        MonitoringScheduler::new(
            self.executor.clone(),
            self.tracker.clone(),
            result_tx,
            Duration::from_millis(self.config.check_interval_ms),
        )
    }

    /// Persist, publish, and alert on a single result
    ///
    /// A status change spawns its alert into `alerts`.
    async fn handle_result(
        &self,
        target: &Target,
        result: CheckResult,
        alerts: &mut JoinSet<NotifyOutcome>,
    ) {
        let check = result.check;

        info!(
            monitor = %target.name,
            status_code = ?check.status_code,
            latency_ms = check.response_time_ms,
            "Check completed: {}",
            check.status()
        );

        if let Err(e) = self.database.insert_check(&check).await {
            error!(monitor = %target.name, "Failed to save check to database: {}", e);
        }

        match self.database.get_targets().await {
            Ok(targets) => {
                let summary = Summary::from_statuses(&targets);
                self.bus.publish(LiveUpdate { check: check.clone(), targets, summary });
            }
            Err(e) => warn!("Failed to load targets for live update: {}", e),
        }

        if !result.status_changed {
            return;
        }

        let alerter = self.alerter.clone();
        let target = target.clone();
        alerts.spawn(async move {
            let outcome = alerter.notify(&target, &check).await;
            debug!(monitor = %target.name, "Alert outcome: {:?}", outcome);
            outcome
        });
    }
}

fn log_alert_task(joined: Result<NotifyOutcome, JoinError>) {
    if let Err(e) = joined {
        error!("Alert task failed: {}", e);
    }
}

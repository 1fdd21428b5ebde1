use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use alertwatch_core::{Result, RuleKey, RuleStateConfig};

use crate::backend::SearchBackend;
use crate::registry::RemovalReceiver;
use crate::state::RuleState;

use super::registrar::{PeriodicJob, PeriodicRegistrar, SWEEP_JOB_NAME};
use super::report::SweepReport;

/// Shortest sweep period accepted; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Keeps every rule-state store bounded by the set of live rules.
pub struct MaintenanceCoordinator<B: SearchBackend> {
    state: RuleState<B>,
    interval: Duration,
    hit_buffer: chrono::Duration,
}

impl<B: SearchBackend> MaintenanceCoordinator<B> {
    pub fn new(state: RuleState<B>, config: &RuleStateConfig) -> Self {
        let hit_buffer =
            chrono::Duration::from_std(config.hit_buffer()).unwrap_or(chrono::Duration::MAX);
        Self {
            state,
            interval: config.sweep_interval().max(MIN_INTERVAL),
            hit_buffer,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> &RuleState<B> {
        &self.state
    }

    /// Run one sweep against the wall clock.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Run one sweep as of `now`.
    ///
    /// Expired entries are dropped from every time-bounded store, and state
    /// of rules that left the active set is dropped from every store, so a
    /// missed removal notification is caught here. The active set is read
    /// once, up front; if it cannot be read, only the time-based steps run.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let active = match self.state.registry.active_snapshot() {
            Ok(active) => Some(active),
            Err(e) => {
                warn!(error = %e, "could not read active rules, skipping membership eviction");
                report.failed_steps += 1;
                None
            }
        };

        let is_stale = |rule: &RuleKey| active.as_ref().is_some_and(|a| a.is_stale(rule));

        report.silences = tally(
            &mut report.failed_steps,
            "silence cache",
            self.state.silences.sweep_expired(now),
        );
        if active.is_some() {
            report.silences += tally(
                &mut report.failed_steps,
                "silence cache",
                self.state.silences.evict_where(is_stale),
            );
            report.clients = tally(
                &mut report.failed_steps,
                "client pool",
                self.state.clients.evict_where(is_stale).await,
            );
        }
        report.windows = tally(
            &mut report.failed_steps,
            "aggregation windows",
            self.state.windows.sweep_expired(now),
        );
        if active.is_some() {
            report.windows += tally(
                &mut report.failed_steps,
                "aggregation windows",
                self.state.windows.evict_where(is_stale),
            );
        }
        report.hits = tally(
            &mut report.failed_steps,
            "processed hits",
            self.state.hits.forget_older_than(now, self.hit_buffer),
        );
        if active.is_some() {
            report.hits += tally(
                &mut report.failed_steps,
                "processed hits",
                self.state.hits.evict_where(is_stale),
            );
        }

        if report.removed() > 0 || !report.is_clean() {
            info!(
                silences = report.silences,
                clients = report.clients,
                windows = report.windows,
                hits = report.hits,
                failed = report.failed_steps,
                "rule-state sweep finished"
            );
        } else {
            debug!("rule-state sweep found nothing to remove");
        }
        report
    }

    /// Forget everything held for `rule` in every store.
    pub async fn on_rule_removed(&self, rule: &RuleKey) -> SweepReport {
        let mut report = SweepReport::default();

        report.silences = tally(
            &mut report.failed_steps,
            "silence cache",
            self.state.silences.evict(rule),
        );
        report.clients = tally(
            &mut report.failed_steps,
            "client pool",
            self.state.clients.evict(rule).await.map(usize::from),
        );
        report.windows = tally(
            &mut report.failed_steps,
            "aggregation windows",
            self.state.windows.evict_rule(rule),
        );
        report.cursors = tally(
            &mut report.failed_steps,
            "cursor tracker",
            self.state.cursors.close(rule).await.map(usize::from),
        );
        report.hits = tally(
            &mut report.failed_steps,
            "processed hits",
            self.state.hits.evict_rule(rule),
        );

        info!(
            rule = %rule,
            removed = report.removed(),
            failed = report.failed_steps,
            "evicted rule state"
        );
        report
    }

    /// Drive sweeps and removal evictions until `cancel` fires.
    ///
    /// The first sweep runs one interval after start. Cancellation is only
    /// observed between iterations, so a sweep or eviction in progress always
    /// completes.
    pub async fn run(self: Arc<Self>, mut removals: RemovalReceiver, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut removals_open = true;

        info!(interval_secs = self.interval.as_secs(), "rule-state maintenance started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                removed = removals.recv(), if removals_open => match removed {
                    Some(rule) => {
                        self.on_rule_removed(&rule).await;
                    }
                    None => {
                        debug!("removal channel closed, continuing with periodic sweeps only");
                        removals_open = false;
                    }
                },
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }
        info!("rule-state maintenance stopped");
    }

    /// Spawn [`run`](Self::run) onto the current runtime.
    pub fn spawn(
        self: Arc<Self>,
        removals: RemovalReceiver,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(removals, cancel))
    }

    /// Register the sweep with an external scheduler instead of spawning a loop.
    ///
    /// The scheduler only drives the periodic sweep, so removal notifications
    /// are drained by a separate task that evicts each departed rule as soon
    /// as it is reported. That task stops when `cancel` fires or the registry
    /// is dropped; its handle is returned.
    pub fn register(
        self: &Arc<Self>,
        registrar: &dyn PeriodicRegistrar,
        removals: RemovalReceiver,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let job: PeriodicJob = Arc::new(move || {
            let coordinator = Arc::clone(&coordinator);
            async move {
                coordinator.sweep().await;
            }
            .boxed()
        });
        registrar.register_periodic(SWEEP_JOB_NAME, self.interval, job);
        info!(
            job = SWEEP_JOB_NAME,
            interval_secs = self.interval.as_secs(),
            "registered periodic sweep"
        );

        tokio::spawn(Arc::clone(self).drain_removals(removals, cancel))
    }

    /// Evict each removed rule until `cancel` fires or the channel closes.
    async fn drain_removals(
        self: Arc<Self>,
        mut removals: RemovalReceiver,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                removed = removals.recv() => match removed {
                    Some(rule) => {
                        self.on_rule_removed(&rule).await;
                    }
                    None => break,
                },
            }
        }
        debug!("removal drain stopped");
    }
}

/// Unwrap one cleanup step's count, logging and counting a failure.
fn tally(failed_steps: &mut usize, step: &'static str, result: Result<usize>) -> usize {
    match result {
        Ok(removed) => removed,
        Err(e) => {
            warn!(step, error = %e, "rule-state cleanup step failed");
            *failed_steps += 1;
            0
        }
    }
}

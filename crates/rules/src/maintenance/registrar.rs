//! Hook for hosts that run their own periodic job scheduler.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

/// Name under which the sweep is registered.
pub const SWEEP_JOB_NAME: &str = "rule-state-sweep";

/// A job invoked once per period.
pub type PeriodicJob = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Something that can run a job on a fixed interval.
///
/// Implemented by the host's scheduler when it prefers to own timing instead
/// of letting [`MaintenanceCoordinator::spawn`](super::MaintenanceCoordinator::spawn)
/// run its own loop.
pub trait PeriodicRegistrar {
    fn register_periodic(&self, name: &str, interval: Duration, job: PeriodicJob);
}

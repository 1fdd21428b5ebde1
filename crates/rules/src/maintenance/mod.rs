//! Background cleanup of per-rule state.
//!
//! Two triggers keep the stores bounded by the set of live rules:
//!
//! - **Periodic sweep**: expired silences, expired aggregation windows and
//!   old processed hits are dropped, and connections of rules that left the
//!   active set are closed.
//! - **Rule removal**: when the registry reports a removed or disabled rule,
//!   every store forgets it straight away.
//!
//! Each store is cleaned independently; a failure in one is logged and
//! counted, and the others are still cleaned.

mod coordinator;
mod registrar;
mod report;


pub use coordinator::MaintenanceCoordinator;
pub use registrar::{PeriodicJob, PeriodicRegistrar, SWEEP_JOB_NAME};
pub use report::SweepReport;

//! Bounded-memory rule state for the alert evaluation loop.
//!
//! This crate provides:
//! - A registry that is the source of truth for which rules exist
//! - Per-rule stores: silences, backend connections, aggregation windows,
//!   pagination cursors and processed-hit ids
//! - A paginated query driver that always releases its cursor
//! - A maintenance coordinator that keeps the stores proportional to the
//!   set of active rules

mod sync;

pub mod aggregation;
pub mod backend;
pub mod clients;
pub mod cursors;
pub mod hits;
pub mod maintenance;
pub mod query;
pub mod registry;
pub mod silence;
pub mod state;

pub use aggregation::{AggregateId, AggregationWindow, AggregationWindowStore};
pub use backend::{CursorToken, Hit, Page, SearchBackend};
pub use clients::ClientPool;
pub use cursors::{CursorGuard, CursorHandle, CursorState, CursorTracker};
pub use hits::ProcessedHitLedger;
pub use maintenance::{MaintenanceCoordinator, PeriodicJob, PeriodicRegistrar, SweepReport};
pub use query::{PageFlow, PaginatedQuery, QueryOutcome};
pub use registry::{ActiveRules, RemovalReceiver, RuleEvent, RuleRegistry};
pub use silence::{SilenceCache, SilenceEntry};
pub use state::RuleState;

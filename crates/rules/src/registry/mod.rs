//! Rule registry and rule-source lifecycle events.
//!
//! The registry is the source of truth for which rules exist. Every cache is
//! keyed by the [`RuleKey`](alertwatch_core::RuleKey) it hands out, and the
//! maintenance coordinator reconciles the caches against its active set.

mod core;
mod events;


pub use self::core::{ActiveRules, RemovalReceiver, RuleRegistry};
pub use self::events::RuleEvent;

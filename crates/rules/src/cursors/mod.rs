//! Open pagination cursors, one per rule.
//!
//! A cursor moves `Open -> Closed` exactly once. The tracker makes redundant
//! and out-of-order closes harmless; [`CursorGuard`] gives the query side a
//! scoped handle that closes on every exit path.

mod guard;
mod tracker;

pub use self::guard::CursorGuard;
pub use self::tracker::{CursorHandle, CursorState, CursorTracker};

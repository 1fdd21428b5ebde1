//! Lock acquisition shared by the rule-state stores.

use std::sync::{Mutex, MutexGuard};

use alertwatch_core::{Result, RuleStateError};

/// Lock a store's mutex, surfacing poisoning as [`RuleStateError::LockPoisoned`].
pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, store: &'static str) -> Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| RuleStateError::LockPoisoned(store))
}

/// Poison `mutex` by panicking on another thread while holding it.
#[cfg(test)]
pub(crate) fn poison<T: Send>(mutex: &Mutex<T>) {
    std::thread::scope(|scope| {
        let _ = scope
            .spawn(|| {
                let _guard = mutex.lock();
                panic!("poisoning lock for test");
            })
            .join();
    });
}

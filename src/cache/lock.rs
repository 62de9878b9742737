use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Lock the cache state, recovering the guard if a previous holder panicked.
///
/// Every critical section that mutates the snapshot restores its invariants
/// before returning, so the recovered state is at worst one step behind.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                target_module = target,
                lock_kind = "mutex.lock",
                result = "poisoned_recovered",
                hint = "snapshot may miss the change that was being applied",
                "Recovered from poisoned post cache lock"
            );
            poisoned.into_inner()
        }
    }
}

/// Mutex acquisition shared by every cross-task lock in the station
///
/// Critical sections in this crate are whole-value swaps, so a long wait
/// should never happen. A lock still held after `LOCK_WAIT_BOUND` is
/// reported while the caller keeps waiting, not after the fact.
use log::warn;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Waiting longer than this for a lock is reported as contention.
pub const LOCK_WAIT_BOUND: Duration = Duration::from_millis(50);

static CONTENDED_LOCKS: AtomicU64 = AtomicU64::new(0);

/// Number of lock acquisitions that exceeded `LOCK_WAIT_BOUND` so far.
pub fn contended_locks() -> u64 {
    CONTENDED_LOCKS.load(Ordering::Relaxed)
}

pub fn lock_bounded<'a, T>(mutex: &'a Mutex<T>, name: &str) -> MutexGuard<'a, T> {
    if let Some(guard) = mutex.try_lock_for(LOCK_WAIT_BOUND) {
        return guard;
    }

    CONTENDED_LOCKS.fetch_add(1, Ordering::Relaxed);
    warn!(
        "Lock {} not acquired within {} ms, still waiting",
        name,
        LOCK_WAIT_BOUND.as_millis()
    );

    let started = Instant::now();
    let guard = mutex.lock();
    warn!(
        "Lock {} acquired {} ms after the bound expired",
        name,
        started.elapsed().as_millis()
    );
    guard
}

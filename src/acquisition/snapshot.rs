use parking_lot::Mutex;
use std::sync::Arc;

use crate::models::Reading;
use crate::sync::lock_bounded;

/// Holder of the most recent [`Reading`].
///
/// Publishing swaps in a new `Arc`; readers clone the `Arc` they find. The
/// critical section is a pointer swap, so a reader sees either the previous
/// complete reading or the new one, and can never delay the writer for
/// longer than that swap.
#[derive(Debug, Default)]
pub struct SharedSnapshot {
    latest: Mutex<Option<Arc<Reading>>>,
}

impl SharedSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held reading. The previous one is dropped once its last
    /// reader lets go of it.
    pub fn publish(&self, reading: Arc<Reading>) {
        let previous = lock_bounded(&self.latest, "snapshot").replace(reading);
        drop(previous);
    }

    /// The latest published reading, `None` before the first publish.
    pub fn read(&self) -> Option<Arc<Reading>> {
        lock_bounded(&self.latest, "snapshot").clone()
    }
}

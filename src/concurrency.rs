use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A writer-preferring read/write lock (spec §5): once a writer is waiting,
/// new readers queue behind it rather than continuing to starve it. Built on
/// `parking_lot::RwLock`, which alone only guarantees eventual fairness, plus
/// a pending-writer counter that new readers check before acquiring.
pub struct WriterPreferringLock<T> {
    inner: RwLock<T>,
    pending_writers: AtomicUsize,
}

impl<T> WriterPreferringLock<T> {
    pub fn new(value: T) -> Self {
        WriterPreferringLock {
            inner: RwLock::new(value),
            pending_writers: AtomicUsize::new(0),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        loop {
            if self.pending_writers.load(Ordering::Acquire) == 0 {
                return self.inner.read();
            }
            // a writer is queued: yield so it gets a chance to acquire
            // before we try again, instead of racing it for the lock.
            std::thread::yield_now();
        }
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.pending_writers.fetch_add(1, Ordering::AcqRel);
        let guard = self.inner.write();
        self.pending_writers.fetch_sub(1, Ordering::AcqRel);
        guard
    }
}

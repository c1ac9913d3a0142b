//! Latest-reading store shared between the poller and HTTP readers.
//!
//! One writer (the poller), many readers. Every write happens under the
//! write lock, so a snapshot is always some update's complete post-state.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::types::{now, Reading, ReadingPatch, Source};

#[derive(Debug, Default)]
pub struct ReadingStore {
    inner: RwLock<Reading>,
}

impl ReadingStore {
    /// Store holding the idle startup reading.
    pub fn new() -> Self {
        ReadingStore {
            inner: RwLock::new(Reading::idle()),
        }
    }

    /// Merge `patch` into the held reading and stamp it.
    pub fn update(&self, patch: &ReadingPatch) {
        let mut held = self.write();
        held.apply(patch);
        held.last_update = now();
    }

    /// Replace every field and the source tag with `reading`, stamped now.
    pub fn publish(&self, reading: Reading) {
        let mut held = self.write();
        *held = reading;
        held.last_update = now();
    }

    /// Liveness marker: only `source` and `last_update` change.
    pub fn mark_unavailable(&self) {
        self.update(&ReadingPatch::source_only(Source::Unavailable));
    }

    /// Copy of the current reading. Holds the read lock only for the clone.
    pub fn snapshot(&self) -> Reading {
        self.read().clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Reading> {
        // A panicking writer cannot leave a half-applied reading behind:
        // apply() only does plain field stores.
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Reading> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Field;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_starts_idle() {
        let store = ReadingStore::new();
        let snap = store.snapshot();
        assert_eq!(snap.source, Source::Idle);
        assert_eq!(snap.altitude_ft, 0.0);
    }

    #[test]
    fn test_update_merges_and_stamps() {
        let store = ReadingStore::new();
        let before = store.snapshot().last_update;
        store.update(&ReadingPatch::default().with(Field::HeadingDeg, 270.0));
        let snap = store.snapshot();
        assert_eq!(snap.heading_deg, 270.0);
        assert_eq!(snap.altitude_ft, 0.0);
        assert!(snap.last_update >= before);
    }

    #[test]
    fn test_unavailable_keeps_numbers() {
        let store = ReadingStore::new();
        let mut r = Reading::zeroed(Source::Fsuipc);
        r.altitude_ft = 3500.0;
        r.latitude = 31.25;
        store.publish(r);

        store.mark_unavailable();
        let snap = store.snapshot();
        assert_eq!(snap.source, Source::Unavailable);
        assert_eq!(snap.altitude_ft, 3500.0);
        assert_eq!(snap.latitude, 31.25);
    }

    #[test]
    fn test_no_torn_snapshots() {
        let store = Arc::new(ReadingStore::new());
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let store = Arc::clone(&store);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for i in 1..=2000 {
                    let v = i as f64;
                    let mut patch = ReadingPatch::source_only(Source::Mock);
                    for f in Field::ALL {
                        patch.fields.insert(f, v);
                    }
                    store.update(&patch);
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    while !done.load(Ordering::SeqCst) {
                        let snap = store.snapshot();
                        let first = snap.get(Field::ALL[0]);
                        for f in Field::ALL {
                            assert_eq!(snap.get(f), first, "torn snapshot");
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(store.snapshot().altitude_ft, 2000.0);
    }
}

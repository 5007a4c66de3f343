//! Per-key mutual exclusion.
//!
//! Entries live only while someone holds or waits on them, so a map keyed by
//! message id stays as small as the number of calls in flight.

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// A lazily populated map of one mutex per key.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Copy> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

/// Holds the lock for one key. Dropping it unlocks, and removes the entry
/// when nobody else is waiting on it.
#[must_use = "the key is unlocked as soon as the guard is dropped"]
pub struct KeyGuard<'a, K: Eq + Hash + Copy> {
    locks: &'a KeyedLocks<K>,
    key: K,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl<K: Eq + Hash + Copy> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            let handle = Arc::clone(ArcMutexGuard::mutex(&guard));
            drop(guard);
            self.locks.release(self.key, &handle);
        }
    }
}

impl<K: Eq + Hash + Copy> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `key` is free and hold it for the guard's lifetime.
    pub fn lock(&self, key: K) -> KeyGuard<'_, K> {
        let handle = self.locks.lock().entry(key).or_default().clone();
        KeyGuard {
            locks: self,
            key,
            guard: Some(handle.lock_arc()),
        }
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with<T>(&self, key: K, f: impl FnOnce() -> T) -> T {
        let _guard = self.lock(key);
        f()
    }

    /// Handles are only cloned under the map lock, so a count of two (the
    /// map and the releasing caller) means no one else holds or awaits it.
    fn release(&self, key: K, handle: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock();
        let idle = locks
            .get(&key)
            .is_some_and(|held| Arc::ptr_eq(held, handle) && Arc::strong_count(handle) == 2);
        if idle {
            locks.remove(&key);
        }
    }

    /// Keys currently held or awaited.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_lock_is_released_and_forgotten() {
        let locks = KeyedLocks::new();
        {
            let _first = locks.lock(1u32);
            let _second = locks.lock(2u32);
            assert_eq!(locks.len(), 2);
        }
        assert!(locks.is_empty());

        locks.with(3u32, || assert_eq!(locks.len(), 1));
        assert!(locks.is_empty());
    }

    #[test]
    fn test_with_serializes_critical_sections() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let (locks, inside, overlaps) = (locks.clone(), inside.clone(), overlaps.clone());
                thread::spawn(move || {
                    for _ in 0..100 {
                        locks.with(7u8, || {
                            if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                                overlaps.fetch_add(1, Ordering::SeqCst);
                            }
                            inside.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert!(locks.is_empty());
    }

    #[test]
    fn test_waiter_keeps_the_entry_alive() {
        let locks = Arc::new(KeyedLocks::new());
        let held = Arc::new(Barrier::new(2));

        let guard = locks.lock(5u16);
        let waiter = {
            let (locks, held) = (locks.clone(), held.clone());
            thread::spawn(move || {
                held.wait();
                locks.with(5u16, || locks.len())
            })
        };
        held.wait();
        drop(guard);

        assert_eq!(waiter.join().unwrap(), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn test_many_keys_do_not_accumulate() {
        let locks = KeyedLocks::new();
        for key in 0..1_000u32 {
            locks.with(key, || ());
        }
        assert!(locks.is_empty());
    }
}

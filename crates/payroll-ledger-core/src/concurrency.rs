//! Per-key serialization.
//!
//! Payroll generation is serialized per employee and withhold updates per
//! ledger key. A slot is a `parking_lot::Mutex<()>` created on first use and
//! dropped from the table once no caller holds or waits on it. Acquisition is
//! bounded by a timeout so a stuck holder surfaces as
//! [`PayrollError::ConcurrencyConflict`] instead of blocking the caller forever.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::error::PayrollError;
use crate::PayrollResult;

#[derive(Debug)]
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<Mutex<()>>>>,
    timeout: Duration,
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone + Display,
{
    pub fn new(timeout: Duration) -> Self {
        KeyedLocks {
            slots: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    fn slot(&self, key: &K) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock();
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with_lock<R>(
        &self,
        key: &K,
        f: impl FnOnce() -> PayrollResult<R>,
    ) -> PayrollResult<R> {
        let slot = self.slot(key);
        let outcome = match slot.try_lock_for(self.timeout) {
            Some(_guard) => f(),
            None => Err(PayrollError::ConcurrencyConflict {
                key: key.to_string(),
                attempts: 1,
            }),
        };
        self.release(key, &slot);
        outcome
    }

    // Clones are only taken under the table lock, so a count of two (table
    // plus caller) means nobody else is holding or waiting.
    fn release(&self, key: &K, slot: &Arc<Mutex<()>>) {
        let mut slots = self.slots.lock();
        let idle = slots
            .get(key)
            .is_some_and(|s| Arc::ptr_eq(s, slot) && Arc::strong_count(s) == 2);
        if idle {
            slots.remove(key);
        }
    }

    /// Number of keys with a live slot.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Re-run `op` while it fails with a retryable conflict, up to `max_retries`
/// extra attempts with linear backoff.
pub fn retry_on_conflict<R>(
    max_retries: u32,
    mut op: impl FnMut() -> PayrollResult<R>,
) -> PayrollResult<R> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op() {
            Err(e) if e.is_retryable() && attempt <= max_retries => {
                tracing::warn!(attempt, error = %e, "conflict, retrying");
                std::thread::sleep(Duration::from_millis(5 * u64::from(attempt)));
            }
            Err(PayrollError::ConcurrencyConflict { key, .. }) => {
                return Err(PayrollError::ConcurrencyConflict {
                    key,
                    attempts: attempt,
                });
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_lock_is_exclusive_per_key() {
        let locks: Arc<KeyedLocks<String>> = Arc::new(KeyedLocks::new(Duration::from_secs(2)));
        let counter = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let counter = Arc::clone(&counter);
                let max_seen = Arc::clone(&max_seen);
                std::thread::spawn(move || {
                    locks
                        .with_lock(&"E1".to_string(), || {
                            let inside = counter.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(inside, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(2));
                            counter.fetch_sub(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn test_idle_slots_are_dropped() {
        let locks: KeyedLocks<String> = KeyedLocks::new(Duration::from_secs(1));
        for i in 0..100 {
            locks.with_lock(&format!("E{}", i), || Ok(())).unwrap();
        }
        assert!(locks.is_empty());

        // The held slot survives while its holder runs
        locks
            .with_lock(&"E1".to_string(), || {
                assert_eq!(locks.len(), 1);
                Ok(())
            })
            .unwrap();
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn test_timeout_surfaces_conflict() {
        let locks: KeyedLocks<String> = KeyedLocks::new(Duration::from_millis(5));
        let key = "E1".to_string();
        let result = locks.with_lock(&key, || locks.with_lock(&key, || Ok(())));
        match result.unwrap_err() {
            PayrollError::ConcurrencyConflict { key, .. } => assert_eq!(key, "E1"),
            other => panic!("Expected ConcurrencyConflict, got {:?}", other),
        }
        assert!(locks.is_empty());
    }

    #[test]
    fn test_retry_counts_attempts() {
        let mut calls = 0;
        let result: PayrollResult<()> = retry_on_conflict(2, || {
            calls += 1;
            Err(PayrollError::ConcurrencyConflict {
                key: "k".to_string(),
                attempts: 1,
            })
        });
        assert_eq!(calls, 3);
        match result.unwrap_err() {
            PayrollError::ConcurrencyConflict { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("Expected ConcurrencyConflict, got {:?}", other),
        }
    }

    #[test]
    fn test_retry_passes_through_other_errors() {
        let mut calls = 0;
        let result: PayrollResult<()> = retry_on_conflict(5, || {
            calls += 1;
            Err(PayrollError::invalid("gross_pay", "negative"))
        });
        assert_eq!(calls, 1);
        assert!(result.unwrap_err().is_validation());
    }
}

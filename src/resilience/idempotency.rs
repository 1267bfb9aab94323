//! Idempotency key tracking.
//!
//! # Responsibilities
//! - Remember recently seen tracking keys for a bounded time
//! - Report duplicates so the dispatcher never resends them
//!
//! # Design Decisions
//! - Each key carries its own expiry deadline (one timer per key, never coalesced)
//! - Expired keys are dropped lazily on lookup and by a periodic sweeper task
//! - Check-then-insert is a single critical section
//! - Empty keys are never deduplicated

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::observability::metrics;

#[derive(Debug)]
pub struct IdempotencyTracker {
    ttl: Duration,
    keys: Mutex<HashMap<String, Instant>>,
}

impl IdempotencyTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if `key` was already seen and has not expired.
    ///
    /// A fresh key is recorded with its own expiry and `false` is returned.
    /// Looking up a duplicate does not extend its expiry.
    pub fn check_and_add(&self, key: &str) -> bool {
        if key.is_empty() {
            return false;
        }

        let now = Instant::now();
        let mut keys = self.lock();
        match keys.get(key) {
            Some(&expires_at) if expires_at > now => true,
            _ => {
                keys.insert(key.to_owned(), now + self.ttl);
                metrics::set_idempotency_keys(keys.len());
                false
            }
        }
    }

    /// Whether `key` is currently considered seen.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock().get(key).is_some_and(|&expires_at| expires_at > now)
    }

    /// Number of unexpired keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|&&expires_at| expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired key, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut keys = self.lock();
        let before = keys.len();
        keys.retain(|_, expires_at| *expires_at > now);
        metrics::set_idempotency_keys(keys.len());
        before - keys.len()
    }

    /// Periodically purge expired keys until shutdown is signalled.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = tracker.purge_expired();
                        if evicted > 0 {
                            tracing::debug!(evicted, "Evicted expired idempotency keys");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Idempotency sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_is_never_duplicate() {
        let tracker = IdempotencyTracker::new(Duration::from_secs(60));
        assert!(!tracker.check_and_add(""));
        assert!(!tracker.check_and_add(""));
        assert!(tracker.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_sighting_is_duplicate() {
        let tracker = IdempotencyTracker::new(Duration::from_secs(60));
        assert!(!tracker.check_and_add("order-1"));
        assert!(tracker.check_and_add("order-1"));
        assert!(!tracker.check_and_add("order-2"));
        assert_eq!(tracker.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_expires_after_ttl() {
        let tracker = IdempotencyTracker::new(Duration::from_secs(60));
        assert!(!tracker.check_and_add("order-1"));

        time::advance(Duration::from_secs(59)).await;
        assert!(tracker.check_and_add("order-1"));

        // Duplicate lookups do not extend the original expiry.
        time::advance(Duration::from_secs(1)).await;
        assert!(!tracker.contains("order-1"));
        assert!(!tracker.check_and_add("order-1"));
        assert!(tracker.check_and_add("order-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let tracker = IdempotencyTracker::new(Duration::from_secs(10));
        tracker.check_and_add("a");
        time::advance(Duration::from_secs(5)).await;
        tracker.check_and_add("b");
        time::advance(Duration::from_secs(5)).await;

        assert_eq!(tracker.purge_expired(), 1);
        assert!(tracker.contains("b"));
        assert_eq!(tracker.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_shutdown() {
        let tracker = Arc::new(IdempotencyTracker::new(Duration::from_secs(1)));
        tracker.check_and_add("a");

        let (tx, rx) = broadcast::channel(1);
        let handle = tracker.spawn_sweeper(Duration::from_secs(2), rx);

        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(tracker.lock().len(), 0);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}

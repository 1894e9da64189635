//! Request coalescing.
//!
//! Ensures at most one in-flight operation per key. The first caller for a
//! key becomes the leader and performs the work; every caller that arrives
//! while the work is running subscribes to the leader's result instead of
//! starting a duplicate.
//!
//! ```text
//! get("ui/icons.pkg") A ─┐
//!                        │                          load task
//! get("ui/icons.pkg") B ─┼──► RequestCoalescer ───► (one per key)
//!                        │         │                     │
//! get("ui/icons.pkg") C ─┘         ▼                     ▼
//!                          [A, B, C all receive ◄── broadcast result]
//! ```
//!
//! Registration uses the `DashMap` entry API so the check-then-insert is a
//! single atomic step. Waiters that give up simply drop their receiver,
//! which removes them from the broadcast wait-list.
//!
//! If a leader is dropped without completing, its [`InFlight`] guard cancels
//! the entry and waiters observe a closed channel.

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Channel capacity per key. Only one value is ever sent.
const CHANNEL_CAPACITY: usize = 16;

/// Statistics for monitoring coalescing effectiveness.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CoalescerStats {
    /// Total registrations
    pub total_requests: u64,
    /// Registrations that waited for existing work
    pub coalesced_requests: u64,
    /// Registrations that started new work
    pub new_requests: u64,
}

impl CoalescerStats {
    /// Returns the coalescing ratio (0.0 to 1.0)
    pub fn coalescing_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.coalesced_requests as f64 / self.total_requests as f64
        }
    }
}

/// Tracks in-flight operations keyed by `K`, broadcasting results of type `V`.
pub struct RequestCoalescer<K, V> {
    in_flight: DashMap<K, broadcast::Sender<V>>,
    total_requests: AtomicU64,
    coalesced_requests: AtomicU64,
    new_requests: AtomicU64,
}

impl<K, V> RequestCoalescer<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    /// Creates a new request coalescer.
    pub fn new() -> Self {
        Self {
            in_flight: DashMap::new(),
            total_requests: AtomicU64::new(0),
            coalesced_requests: AtomicU64::new(0),
            new_requests: AtomicU64::new(0),
        }
    }

    /// Registers interest in `key`.
    ///
    /// Returns [`Registration::Leader`] if no operation is in flight for the
    /// key; the caller must perform the work and call [`InFlight::complete`].
    /// Otherwise returns [`Registration::Follower`] with a receiver for the
    /// leader's result.
    pub fn register(self: &Arc<Self>, key: K) -> Registration<K, V> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let rx = entry.get().subscribe();
                self.coalesced_requests.fetch_add(1, Ordering::Relaxed);
                debug!(key = ?key, "Coalescing request - waiting for in-flight work");
                Registration::Follower(rx)
            }
            Entry::Vacant(entry) => {
                let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
                entry.insert(tx);
                self.new_requests.fetch_add(1, Ordering::Relaxed);
                debug!(
                    key = ?key,
                    in_flight_count = self.in_flight.len(),
                    "New request - starting work"
                );
                Registration::Leader(InFlight {
                    coalescer: Arc::clone(self),
                    key: Some(key),
                })
            }
        }
    }

    /// Removes `key` and broadcasts `value` to its waiters.
    ///
    /// Returns the number of waiters that were subscribed.
    fn complete(&self, key: &K, value: V) -> usize {
        match self.in_flight.remove(key) {
            Some((_, tx)) => {
                let waiters = tx.receiver_count();
                // Receivers may have been dropped
                let _ = tx.send(value);
                if waiters > 0 {
                    debug!(key = ?key, waiters, "Broadcast result to coalesced waiters");
                }
                waiters
            }
            None => 0,
        }
    }

    /// Removes `key` without a result; waiters observe a closed channel.
    fn cancel(&self, key: &K) {
        if self.in_flight.remove(key).is_some() {
            debug!(key = ?key, "Cancelled in-flight request - waiters will receive error");
        }
    }

    /// Returns true if an operation for `key` is in flight.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Returns the number of in-flight operations.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Returns a snapshot of the current statistics.
    pub fn stats(&self) -> CoalescerStats {
        CoalescerStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            coalesced_requests: self.coalesced_requests.load(Ordering::Relaxed),
            new_requests: self.new_requests.load(Ordering::Relaxed),
        }
    }

    /// Logs current statistics.
    pub fn log_stats(&self, name: &str) {
        let stats = self.stats();
        info!(
            coalescer = name,
            total_requests = stats.total_requests,
            coalesced = stats.coalesced_requests,
            new_requests = stats.new_requests,
            in_flight = self.in_flight_count(),
            coalescing_ratio = format!("{:.1}%", stats.coalescing_ratio() * 100.0),
            "Request coalescing statistics"
        );
    }
}

impl<K, V> Default for RequestCoalescer<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Result of registering a request.
pub enum Registration<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    /// First request for the key: do the work and complete it.
    Leader(InFlight<K, V>),
    /// Work is already running: wait on this receiver.
    Follower(broadcast::Receiver<V>),
}

impl<K, V> Registration<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    /// Returns true if this registration must perform the work.
    pub fn is_leader(&self) -> bool {
        matches!(self, Self::Leader(_))
    }
}

/// Leader side of an in-flight operation.
///
/// Dropping the guard without calling [`InFlight::complete`] cancels the
/// operation so waiters are not left hanging.
pub struct InFlight<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    coalescer: Arc<RequestCoalescer<K, V>>,
    key: Option<K>,
}

impl<K, V> InFlight<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    /// Subscribe to this operation's result.
    ///
    /// Used when the leader hands the work to a spawned task and waits like
    /// any other caller.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<V>> {
        let key = self.key.as_ref()?;
        self.coalescer.in_flight.get(key).map(|tx| tx.subscribe())
    }

    /// Broadcast the result and release the key.
    ///
    /// Returns the number of waiters that received it.
    pub fn complete(mut self, value: V) -> usize {
        match self.key.take() {
            Some(key) => self.coalescer.complete(&key, value),
            None => 0,
        }
    }
}

impl<K, V> Drop for InFlight<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.coalescer.cancel(&key);
        }
    }
}

//! Keyed counter store.
//!
//! [`CounterStore`] maps keys to one cache-padded [`AtomicI64`] each. The map
//! is a [`DashMap`], so lookups only take a shared lock on one map shard, and
//! the counter itself is updated with a single atomic add.
//!
//! # Concurrency
//!
//! - Increments of the same key are never lost. The first touch of a key
//!   inserts a zeroed counter under the map shard's write lock
//!   (`entry().or_insert_with()`), then adds to it; existence check and insert
//!   are one step.
//! - [`CounterStore::get`] is a single atomic load, so it always returns a
//!   value the key actually held at some instant.
//! - A map shard's lock is held only for one key's lookup-and-add, never across
//!   operations, so no call blocks for longer than a single update.
//! - No ordering is guaranteed between different keys.
//! - [`CounterStore::initialize`] races with in-flight increments: each one
//!   is applied either before the clear (and discarded with everything else)
//!   or after it (and kept). Use [`CounterStore::drain`] when no increment may
//!   be discarded.
//!
//! # Examples
//!
//! ```rust
//! use registro::store::CounterStore;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let store = Arc::new(CounterStore::<String>::new());
//! let mut handles = vec![];
//!
//! for _ in 0..4 {
//!     let store = Arc::clone(&store);
//!     handles.push(thread::spawn(move || {
//!         for _ in 0..1000 {
//!             store.increment("get.called", 1);
//!         }
//!     }));
//! }
//!
//! for h in handles {
//!     h.join().unwrap();
//! }
//!
//! assert_eq!(store.get("get.called"), 4000);
//! assert_eq!(store.get("never-touched"), 0);
//! ```

use std::borrow::Borrow;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use dashmap::DashMap;

use crate::snapshot::{CounterSnapshot, StoreSnapshot};

/// A concurrency-safe map from keys to signed 64-bit counters.
///
/// Share it between threads with an [`Arc`]. Every method takes `&self`.
pub struct CounterStore<K = String> {
    counters: DashMap<K, Counter>,
}

/// Hot keys sharing a map shard do not share a cache line.
type Counter = CachePadded<AtomicI64>;

fn new_counter() -> Counter {
    CachePadded::new(AtomicI64::new(0))
}

impl<K: Eq + Hash> CounterStore<K> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }

    /// Creates an empty store with room for `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            counters: DashMap::with_capacity(capacity),
        }
    }

    /// Resets the store to a fresh, empty state.
    ///
    /// All keys and values are discarded. Calling it repeatedly has the same
    /// effect as calling it once. Increments running concurrently may land on
    /// either side of the reset.
    ///
    /// ```rust
    /// use registro::store::CounterStore;
    ///
    /// let store: CounterStore = CounterStore::new();
    /// store.increment("a", 1);
    /// store.initialize();
    /// assert_eq!(store.get("a"), 0);
    /// assert!(store.is_empty());
    /// ```
    pub fn initialize(&self) {
        self.counters.clear();
        tracing::trace!("counter store reset");
    }

    /// Adds `delta` to the counter under `key`.
    ///
    /// An absent key starts from zero. `delta` may be zero or negative, and
    /// arithmetic wraps on overflow. Never fails.
    ///
    /// ```rust
    /// use registro::store::CounterStore;
    ///
    /// let store: CounterStore = CounterStore::new();
    /// store.increment("get.called", 123);
    /// store.increment("get.called", 456);
    /// store.increment("in.flight", -2);
    ///
    /// assert_eq!(store.get("get.called"), 579);
    /// assert_eq!(store.get("in.flight"), -2);
    /// ```
    #[inline]
    pub fn increment<Q>(&self, key: &Q, delta: i64)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        if let Some(counter) = self.counters.get(key) {
            counter.fetch_add(delta, Ordering::Relaxed);
            return;
        }
        self.counters
            .entry(key.to_owned())
            .or_insert_with(new_counter)
            .fetch_add(delta, Ordering::Relaxed);
    }

    /// Adds one to the counter under `key`.
    #[inline]
    pub fn inc<Q>(&self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        self.increment(key, 1);
    }

    /// Returns the current value under `key`, or `0` if the key was never
    /// incremented since the last reset.
    ///
    /// The value is read with one atomic load: under concurrent increments it
    /// is whatever the counter held at that instant, never a mix of updates.
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> i64
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.counters
            .get(key)
            .map_or(0, |counter| counter.load(Ordering::Relaxed))
    }

    /// Returns `true` if `key` has been incremented since the last reset.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.counters.contains_key(key)
    }

    /// Number of keys currently present.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Returns `true` if no key is present.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

impl<K: Eq + Hash + Clone> CounterStore<K> {
    /// Copies every counter without resetting anything.
    ///
    /// Keys are read one map shard at a time, so the copy is not a consistent
    /// cut across keys under concurrent updates.
    pub fn snapshot(&self) -> StoreSnapshot<K> {
        let counters = self
            .counters
            .iter()
            .map(|entry| CounterSnapshot {
                key: entry.key().clone(),
                value: entry.value().load(Ordering::Relaxed),
            })
            .collect();
        StoreSnapshot::now(counters)
    }

    /// Takes every counter out of the store and returns it.
    ///
    /// This is snapshot-and-reset in one step: each map shard is emptied under
    /// its write lock, so a concurrent increment ends up either in the returned
    /// snapshot or in the store afterwards. Nothing is discarded.
    ///
    /// ```rust
    /// use registro::store::CounterStore;
    ///
    /// let store: CounterStore = CounterStore::new();
    /// store.increment("a", 1);
    /// store.increment("b", 2);
    ///
    /// let snapshot = store.drain();
    /// assert_eq!(snapshot.total(), 3);
    /// assert_eq!(store.get("a"), 0);
    /// ```
    pub fn drain(&self) -> StoreSnapshot<K> {
        let mut counters = Vec::with_capacity(self.counters.len());
        self.counters.retain(|key, counter| {
            counters.push(CounterSnapshot {
                key: key.clone(),
                value: counter.swap(0, Ordering::Relaxed),
            });
            false
        });
        tracing::trace!(keys = counters.len(), "counter store drained");
        StoreSnapshot::now(counters)
    }
}

impl<K> CounterStore<K>
where
    K: Eq + Hash + Send + Sync + 'static,
{
    /// Returns a callback that resets this store each time it runs.
    ///
    /// Hand it to [`start_periodic_flush`](crate::scheduler::start_periodic_flush)
    /// to clear the counters on every tick.
    pub fn reset_callback(self: &Arc<Self>) -> impl FnMut() + Send + 'static {
        let store = Arc::clone(self);
        move || store.initialize()
    }
}

impl<K> CounterStore<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    /// Returns a callback that drains this store and passes the snapshot to
    /// `sink` each time it runs.
    ///
    /// Where the snapshot goes is up to `sink`.
    ///
    /// ```rust
    /// use registro::store::CounterStore;
    /// use std::sync::{mpsc, Arc};
    ///
    /// let store = Arc::new(CounterStore::<String>::new());
    /// let (tx, rx) = mpsc::channel();
    /// let mut flush = store.flush_callback(move |snapshot| {
    ///     let _ = tx.send(snapshot);
    /// });
    ///
    /// store.increment("hits", 7);
    /// flush();
    ///
    /// assert_eq!(rx.recv().unwrap().get("hits"), Some(7));
    /// assert!(store.is_empty());
    /// ```
    pub fn flush_callback<F>(self: &Arc<Self>, mut sink: F) -> impl FnMut() + Send + 'static
    where
        F: FnMut(StoreSnapshot<K>) + Send + 'static,
    {
        let store = Arc::clone(self);
        move || sink(store.drain())
    }
}

impl<K: Eq + Hash> Default for CounterStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Debug> Debug for CounterStore<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for entry in self.counters.iter() {
            map.entry(entry.key(), &entry.value().load(Ordering::Relaxed));
        }
        map.finish()
    }
}

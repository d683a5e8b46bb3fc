//! Owned, point-in-time captures of a [`CounterStore`](crate::store::CounterStore).
//!
//! A [`StoreSnapshot`] is what a flush hands to the export step. It owns its
//! keys, so it can be sent to another thread, logged, or serialized after the
//! store has moved on.
//!
//! # Feature Flags
//!
//! - `serde` derives `Serialize` / `Deserialize` for both snapshot types.
//! - `json` adds `StoreSnapshot::to_json` and `StoreSnapshot::to_json_pretty`.
//!
//! # Examples
//!
//! ```rust
//! use registro::store::CounterStore;
//!
//! let store: CounterStore = CounterStore::new();
//! store.increment("requests", 42);
//! store.increment("errors", 1);
//!
//! let snapshot = store.drain();
//! assert_eq!(snapshot.get("requests"), Some(42));
//! assert_eq!(snapshot.total(), 43);
//! assert!(store.is_empty());
//! ```

use std::borrow::Borrow;
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single key and the value it held when the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CounterSnapshot<K = String> {
    /// The counter key.
    pub key: K,
    /// The counter value.
    pub value: i64,
}

impl<K> CounterSnapshot<K> {
    /// Creates a new counter snapshot.
    pub fn new(key: impl Into<K>, value: i64) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Every counter of a store, captured together.
///
/// Entries come in map iteration order, which is unspecified; use
/// [`sorted`](Self::sorted) when a stable order matters.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StoreSnapshot<K = String> {
    /// Milliseconds since the Unix epoch at capture time, if recorded.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none", default))]
    pub timestamp_ms: Option<u64>,
    /// The captured counters.
    pub counters: Vec<CounterSnapshot<K>>,
}

impl<K> StoreSnapshot<K> {
    /// Creates a snapshot without a timestamp.
    pub fn new(counters: Vec<CounterSnapshot<K>>) -> Self {
        Self {
            timestamp_ms: None,
            counters,
        }
    }

    /// Creates a snapshot with an explicit timestamp.
    pub fn with_timestamp(counters: Vec<CounterSnapshot<K>>, timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms: Some(timestamp_ms),
            counters,
        }
    }

    /// Creates a snapshot stamped with the current wall-clock time.
    pub(crate) fn now(counters: Vec<CounterSnapshot<K>>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .ok();
        Self {
            timestamp_ms,
            counters,
        }
    }

    /// Returns the value captured for `key`, if the key was present.
    pub fn get<Q>(&self, key: &Q) -> Option<i64>
    where
        K: Borrow<Q>,
        Q: PartialEq + ?Sized,
    {
        self.counters
            .iter()
            .find(|c| c.key.borrow() == key)
            .map(|c| c.value)
    }

    /// Sum of all captured values (wrapping).
    pub fn total(&self) -> i64 {
        self.counters
            .iter()
            .fold(0i64, |acc, c| acc.wrapping_add(c.value))
    }

    /// Number of captured counters.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Returns `true` if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Iterates over the captured counters.
    pub fn iter(&self) -> std::slice::Iter<'_, CounterSnapshot<K>> {
        self.counters.iter()
    }

    /// Returns the snapshot with counters ordered by key.
    pub fn sorted(mut self) -> Self
    where
        K: Ord,
    {
        self.counters.sort_by(|a, b| a.key.cmp(&b.key));
        self
    }
}

impl<K> IntoIterator for StoreSnapshot<K> {
    type Item = CounterSnapshot<K>;
    type IntoIter = std::vec::IntoIter<CounterSnapshot<K>>;

    fn into_iter(self) -> Self::IntoIter {
        self.counters.into_iter()
    }
}

impl<'a, K> IntoIterator for &'a StoreSnapshot<K> {
    type Item = &'a CounterSnapshot<K>;
    type IntoIter = std::slice::Iter<'a, CounterSnapshot<K>>;

    fn into_iter(self) -> Self::IntoIter {
        self.counters.iter()
    }
}

#[cfg(feature = "json")]
impl<K: Serialize> StoreSnapshot<K> {
    /// Serializes the snapshot to compact JSON.
    ///
    /// ```rust
    /// use registro::snapshot::{CounterSnapshot, StoreSnapshot};
    ///
    /// let snapshot: StoreSnapshot = StoreSnapshot::new(vec![CounterSnapshot::new("hits", 3)]);
    /// assert_eq!(snapshot.to_json()?, r#"{"counters":[{"key":"hits","value":3}]}"#);
    /// # Ok::<(), registro::Error>(())
    /// ```
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serializes the snapshot to indented JSON.
    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_snapshot_new() {
        let snapshot: CounterSnapshot = CounterSnapshot::new("requests", 100);
        assert_eq!(snapshot.key, "requests");
        assert_eq!(snapshot.value, 100);
    }

    #[test]
    fn test_store_snapshot_new() {
        let snapshot: StoreSnapshot = StoreSnapshot::new(vec![
            CounterSnapshot::new("a", 1),
            CounterSnapshot::new("b", 2),
        ]);

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.timestamp_ms.is_none());
    }

    #[test]
    fn test_store_snapshot_with_timestamp() {
        let snapshot: StoreSnapshot = StoreSnapshot::with_timestamp(
            vec![CounterSnapshot::new("test", 1)],
            1234567890,
        );

        assert_eq!(snapshot.timestamp_ms, Some(1234567890));
    }

    #[test]
    fn test_store_snapshot_now_has_timestamp() {
        let snapshot: StoreSnapshot = StoreSnapshot::now(Vec::new());
        assert!(snapshot.timestamp_ms.is_some());
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_store_snapshot_get() {
        let snapshot: StoreSnapshot = StoreSnapshot::new(vec![
            CounterSnapshot::new("foo", 1),
            CounterSnapshot::new("bar", -2),
        ]);

        assert_eq!(snapshot.get("foo"), Some(1));
        assert_eq!(snapshot.get("bar"), Some(-2));
        assert_eq!(snapshot.get("baz"), None);
    }

    #[test]
    fn test_store_snapshot_total() {
        let snapshot: StoreSnapshot = StoreSnapshot::new(vec![
            CounterSnapshot::new("a", 10),
            CounterSnapshot::new("b", -3),
        ]);
        assert_eq!(snapshot.total(), 7);
    }

    #[test]
    fn test_store_snapshot_sorted() {
        let snapshot = StoreSnapshot::<String>::new(vec![
            CounterSnapshot::new("c", 3),
            CounterSnapshot::new("a", 1),
            CounterSnapshot::new("b", 2),
        ])
        .sorted();

        let keys: Vec<&str> = snapshot.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_store_snapshot_into_iter() {
        let snapshot: StoreSnapshot = StoreSnapshot::new(vec![CounterSnapshot::new("x", 5)]);
        let entries: Vec<CounterSnapshot> = snapshot.into_iter().collect();
        assert_eq!(entries, vec![CounterSnapshot::<String>::new("x", 5)]);
    }

    #[test]
    fn test_non_string_keys() {
        let snapshot: StoreSnapshot<u32> =
            StoreSnapshot::new(vec![CounterSnapshot::new(7u32, 70), CounterSnapshot::new(1u32, 10)]);
        assert_eq!(snapshot.get(&7u32), Some(70));
        assert_eq!(snapshot.sorted().counters[0].key, 1);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serialize_store_snapshot() {
        let snapshot: StoreSnapshot = StoreSnapshot::with_timestamp(
            vec![CounterSnapshot::new("a", 1)],
            1234567890,
        );
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("timestamp_ms"));
        assert!(json.contains("1234567890"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_store_snapshot() {
        let json = r#"{"counters":[{"key":"a","value":-1}]}"#;
        let snapshot: StoreSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.timestamp_ms, None);
        assert_eq!(snapshot.get("a"), Some(-1));
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_to_json_pretty() {
        let snapshot: StoreSnapshot = StoreSnapshot::new(vec![CounterSnapshot::new("hits", 3)]);
        let json = snapshot.to_json_pretty().unwrap();
        assert!(json.contains('\n'));
        assert!(json.contains("\"hits\""));
    }
}

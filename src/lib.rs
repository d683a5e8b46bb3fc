//! # Registro - Keyed Atomic Counters with Periodic Flush
//!
//! An in-process metrics counter: many threads increment named integer
//! counters, anyone can read them at any time, and a background scheduler
//! periodically runs a flush callback (typically snapshot-and-reset) for a
//! bounded amount of time.
//!
//! Nothing leaves the process. Where flushed values go is up to the callback.
//!
//! ## Components
//!
//! | Module | Type | Role |
//! |--------|------|------|
//! | [`store`] | [`CounterStore`] | Key → `i64` map, safe for concurrent increments |
//! | [`scheduler`] | [`FlushConfig`], [`FlushHandle`] | Bounded periodic callback on a background thread |
//! | [`snapshot`] | [`StoreSnapshot`] | Owned capture of a store, optionally serializable |
//!
//! ## Design
//!
//! 1. **No lost updates**: a key's counter is created under the map shard's
//!    write lock and updated with an atomic add, so the check for an existing
//!    key and the store of a new one can never interleave with another thread.
//!
//! 2. **One atomic per key**: each counter is a single cache-padded
//!    `AtomicI64`. A read is one load, so it always returns a value the key
//!    held, and neighbouring hot keys do not share a cache line.
//!
//! 3. **Decoupled flushing**: the scheduler only runs an opaque callback. The
//!    store provides ready-made ones ([`CounterStore::reset_callback`],
//!    [`CounterStore::flush_callback`]) but the scheduler can drive any
//!    periodic task.
//!
//! 4. **Bounded by default, stoppable always**: a flush stops by itself after
//!    [`DEFAULT_FLUSH_LIFETIME`](scheduler::DEFAULT_FLUSH_LIFETIME) (60 s) unless
//!    configured otherwise, and [`FlushHandle::stop`] ends it early.
//!
//! ## Quick Start
//!
//! ```rust
//! use registro::{CounterStore, FlushConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! // Share one store between subsystems by passing the Arc around.
//! let store = Arc::new(CounterStore::<String>::new());
//!
//! // Drain the store every 5 seconds for at most 10 minutes.
//! let flush = FlushConfig::new(Duration::from_secs(5))
//!     .with_lifetime(Duration::from_secs(600))
//!     .start(store.flush_callback(|snapshot| {
//!         for counter in &snapshot {
//!             println!("{} = {}", counter.key, counter.value);
//!         }
//!     }))?;
//!
//! store.increment("get.called", 123);
//! store.increment("get.called", 456);
//! assert_eq!(store.get("get.called"), 579);
//!
//! flush.shutdown()?;
//! # Ok::<(), registro::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | `Serialize` / `Deserialize` for snapshots |
//! | `json` | `StoreSnapshot::to_json` and `to_json_pretty` |
//! | `full` | All of the above |
//! | `demo` | Builds the `flush_demo` example |

pub mod error;
pub mod scheduler;
pub mod snapshot;
pub mod store;

pub use error::{Error, Result};
pub use scheduler::{start_periodic_flush, FlushConfig, FlushHandle};
pub use snapshot::{CounterSnapshot, StoreSnapshot};
pub use store::CounterStore;

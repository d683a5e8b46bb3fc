//! Bounded periodic flush scheduler.
//!
//! [`start_periodic_flush`] runs a callback on a dedicated background thread
//! once per interval. The scheduler stops on its own once its lifetime has
//! elapsed (60 seconds unless configured otherwise), or earlier when
//! [`FlushHandle::stop`] is called.
//!
//! The scheduler knows nothing about counters: it only runs the callback it
//! was given. [`CounterStore::reset_callback`](crate::store::CounterStore::reset_callback)
//! and [`CounterStore::flush_callback`](crate::store::CounterStore::flush_callback)
//! build the usual ones.
//!
//! # Ticking
//!
//! Ticks come from a [`crossbeam_channel::tick`] channel, which holds at most
//! one pending tick. A callback that runs longer than the interval therefore
//! delays the next invocation and drops the ticks it missed; ticks are never
//! queued up and replayed. Invocations of one scheduler never overlap.
//!
//! # Examples
//!
//! ```rust
//! use registro::scheduler::FlushConfig;
//! use registro::store::CounterStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let store = Arc::new(CounterStore::<String>::new());
//! store.increment("get.called", 123);
//!
//! let handle = FlushConfig::new(Duration::from_millis(10))
//!     .with_lifetime(Duration::from_millis(100))
//!     .start(store.reset_callback())?;
//!
//! handle.join()?;
//! assert_eq!(store.get("get.called"), 0);
//! # Ok::<(), registro::Error>(())
//! ```

use std::fmt::{self, Debug};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use atomic_time::AtomicOptionInstant;
use crossbeam_channel::{select, Receiver, Sender};

use crate::error::{Error, Result};

/// Lifetime applied by [`start_periodic_flush`] and [`FlushConfig::new`].
pub const DEFAULT_FLUSH_LIFETIME: Duration = Duration::from_secs(60);

const DEFAULT_THREAD_NAME: &str = "registro-flush";

/// Starts a periodic flush with the default 60 second lifetime.
///
/// `callback` runs once per `interval` on a background thread. The call
/// returns immediately. A zero `interval` is rejected with
/// [`Error::ZeroInterval`].
///
/// ```rust
/// use registro::scheduler::start_periodic_flush;
/// use std::time::Duration;
///
/// let handle = start_periodic_flush(Duration::from_secs(5), || println!("flush"))?;
/// handle.stop();
/// handle.join()?;
/// # Ok::<(), registro::Error>(())
/// ```
pub fn start_periodic_flush<F>(interval: Duration, callback: F) -> Result<FlushHandle>
where
    F: FnMut() + Send + 'static,
{
    FlushConfig::new(interval).start(callback)
}

/// Settings of a periodic flush.
///
/// Built with `const` methods, so a configuration can live in a `const` or
/// `static`:
///
/// ```rust
/// use registro::scheduler::FlushConfig;
/// use std::time::Duration;
///
/// const EXPORT: FlushConfig = FlushConfig::new(Duration::from_secs(5))
///     .with_lifetime(Duration::from_secs(600))
///     .with_name("metrics-export");
///
/// assert_eq!(EXPORT.lifetime(), Some(Duration::from_secs(600)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushConfig {
    interval: Duration,
    lifetime: Option<Duration>,
    name: &'static str,
}

impl FlushConfig {
    /// Creates a configuration ticking every `interval` for
    /// [`DEFAULT_FLUSH_LIFETIME`].
    pub const fn new(interval: Duration) -> Self {
        FlushConfig {
            interval,
            lifetime: Some(DEFAULT_FLUSH_LIFETIME),
            name: DEFAULT_THREAD_NAME,
        }
    }

    /// Stops ticking once `lifetime` has elapsed since start.
    ///
    /// A lifetime too large to represent as a deadline behaves like
    /// [`unbounded`](Self::unbounded).
    pub const fn with_lifetime(self, lifetime: Duration) -> Self {
        Self {
            lifetime: Some(lifetime),
            ..self
        }
    }

    /// Ticks until [`FlushHandle::stop`] is called.
    pub const fn unbounded(self) -> Self {
        Self {
            lifetime: None,
            ..self
        }
    }

    /// Sets the name of the background thread.
    pub const fn with_name(self, name: &'static str) -> Self {
        Self { name, ..self }
    }

    /// Time between two ticks.
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Maximum running time, `None` when unbounded.
    pub const fn lifetime(&self) -> Option<Duration> {
        self.lifetime
    }

    /// Name of the background thread.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Checks the configuration without starting anything.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::ZeroInterval);
        }
        if self.lifetime.is_some_and(|lifetime| lifetime.is_zero()) {
            return Err(Error::ZeroLifetime);
        }
        Ok(())
    }

    /// Spawns the background thread and starts ticking.
    ///
    /// Fails synchronously if the configuration is invalid or the thread
    /// cannot be spawned.
    pub fn start<F>(&self, callback: F) -> Result<FlushHandle>
    where
        F: FnMut() + Send + 'static,
    {
        self.validate()?;

        if let Some(lifetime) = self.lifetime {
            if lifetime < self.interval {
                tracing::warn!(
                    interval = ?self.interval,
                    lifetime = ?lifetime,
                    "flush lifetime is shorter than its interval, callback will never run"
                );
            }
        }

        let state = Arc::new(FlushState {
            started_at: Instant::now(),
            ticks: AtomicU64::new(0),
            last_flush: AtomicOptionInstant::none(),
            running: AtomicBool::new(true),
            stop_requested: AtomicBool::new(false),
        });

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);

        let config = *self;
        let thread_state = Arc::clone(&state);
        let thread_stop_tx = stop_tx.clone();
        let thread = thread::Builder::new()
            .name(self.name.to_string())
            .spawn(move || {
                // Holding a sender keeps the stop channel connected after the
                // handle is dropped.
                let _stop_tx = thread_stop_tx;
                let _running = RunningGuard(&thread_state.running);
                run(config, callback, stop_rx, &thread_state)
            })?;

        tracing::debug!(
            name = self.name,
            interval = ?self.interval,
            lifetime = ?self.lifetime,
            "periodic flush started"
        );

        Ok(FlushHandle {
            config: *self,
            state,
            stop_tx,
            thread,
        })
    }
}

struct FlushState {
    started_at: Instant,
    ticks: AtomicU64,
    last_flush: AtomicOptionInstant,
    running: AtomicBool,
    stop_requested: AtomicBool,
}

/// Clears the running flag however the scheduler thread exits.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn run<F: FnMut()>(
    config: FlushConfig,
    mut callback: F,
    stop_rx: Receiver<()>,
    state: &FlushState,
) -> Result<()> {
    let ticker = crossbeam_channel::tick(config.interval);
    // A lifetime past the representable range of `Instant` never expires.
    let deadline = config
        .lifetime
        .and_then(|lifetime| state.started_at.checked_add(lifetime));
    let expired = match deadline {
        Some(at) => crossbeam_channel::at(at),
        None => crossbeam_channel::never(),
    };

    loop {
        select! {
            recv(ticker) -> _ => {
                if state.stop_requested.load(Ordering::Acquire) {
                    tracing::debug!(name = config.name, "periodic flush stopped");
                    return Ok(());
                }
                if deadline.is_some_and(|at| Instant::now() >= at) {
                    tracing::debug!(name = config.name, "periodic flush lifetime elapsed");
                    return Ok(());
                }

                tracing::trace!(name = config.name, interval = ?config.interval, "flushing");
                if panic::catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                    tracing::error!(name = config.name, "flush callback panicked, stopping");
                    return Err(Error::CallbackPanicked);
                }

                state.ticks.fetch_add(1, Ordering::Relaxed);
                state.last_flush.store(Some(Instant::now()), Ordering::Relaxed);
            }
            recv(expired) -> _ => {
                tracing::debug!(name = config.name, "periodic flush lifetime elapsed");
                return Ok(());
            }
            recv(stop_rx) -> _ => {
                tracing::debug!(name = config.name, "periodic flush stopped");
                return Ok(());
            }
        }
    }
}

/// Handle to a running periodic flush.
///
/// Dropping the handle detaches the scheduler: it keeps ticking until its
/// lifetime elapses. Call [`stop`](Self::stop) to end it early.
pub struct FlushHandle {
    config: FlushConfig,
    state: Arc<FlushState>,
    stop_tx: Sender<()>,
    thread: JoinHandle<Result<()>>,
}

impl FlushHandle {
    /// Asks the scheduler to stop.
    ///
    /// Returns immediately. A callback already running finishes; no new
    /// invocation starts afterwards. Calling it more than once is harmless.
    pub fn stop(&self) {
        self.state.stop_requested.store(true, Ordering::Release);
        let _ = self.stop_tx.try_send(());
    }

    /// Returns `true` until the background thread has exited.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    /// Number of completed callback invocations.
    pub fn ticks(&self) -> u64 {
        self.state.ticks.load(Ordering::Relaxed)
    }

    /// When the last callback invocation completed, if any.
    pub fn last_flush(&self) -> Option<Instant> {
        self.state.last_flush.load(Ordering::Relaxed)
    }

    /// Time since the scheduler started.
    pub fn elapsed(&self) -> Duration {
        self.state.started_at.elapsed()
    }

    /// The configuration the scheduler was started with.
    pub fn config(&self) -> &FlushConfig {
        &self.config
    }

    /// Waits for the background thread to exit.
    ///
    /// Blocks until the lifetime elapses or [`stop`](Self::stop) takes
    /// effect; an unbounded scheduler that is never stopped never returns.
    /// Returns [`Error::CallbackPanicked`] if the callback panicked.
    pub fn join(self) -> Result<()> {
        self.thread
            .join()
            .unwrap_or(Err(Error::CallbackPanicked))
    }

    /// Stops the scheduler and waits for it to exit.
    pub fn shutdown(self) -> Result<()> {
        self.stop();
        self.join()
    }
}

impl Debug for FlushHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlushHandle")
            .field("name", &self.config.name)
            .field("interval", &self.config.interval)
            .field("lifetime", &self.config.lifetime)
            .field("ticks", &self.ticks())
            .field("running", &self.is_running())
            .finish()
    }
}

//! # Callboard Runtime
//!
//! Runtime implementation for the callboard scheduling engine.
//!
//! This crate provides the [`store::Store`] that coordinates reducer
//! execution and effect handling:
//!
//! - **Store**: owns state, serializes reducer execution, executes effects
//! - **Cancellation registry**: scheduled effects are registered under an
//!   [`EffectId`](callboard_core::effect::EffectId) and can be preempted by
//!   a later `Effect::Cancel` (a dispute report cancelling a pending
//!   clearing timer, for example)
//! - **Action broadcast**: actions produced by effects are broadcast to
//!   observers, enabling request/response waits over the feedback loop
//! - **Retry**: [`retry`] implements exponential backoff for transient
//!   collaborator failures
//!
//! ## Example
//!
//! ```ignore
//! use callboard_runtime::store::Store;
//!
//! let store = Store::new(initial_state, my_reducer, environment);
//!
//! // Send an action and wait for its effect cascade to settle
//! let mut handle = store.send(Action::DoSomething).await?;
//! handle.wait().await;
//!
//! // Read state
//! let value = store.state(|s| s.some_field).await;
//! ```

pub mod retry;

pub use retry::RetryPolicy;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for a matching action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is received.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Handle for tracking effect completion
///
/// Returned by [`store::Store::send`] to allow waiting for the action's
/// effect cascade (effects, and the effects of the actions they feed back)
/// to settle.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(Action::Start).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, Tracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = Tracking {
            counter,
            notifier: tx,
        };

        (handle, tracking)
    }

    /// Create a handle that is already complete
    ///
    /// Useful for initialization in loops that accumulate a `last_handle`.
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(());
        let _ = tx.send(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Wait for the effect cascade to settle
    ///
    /// Note that a long-lived scheduled effect (a clearing timer hours in
    /// the future) keeps the cascade open until it fires or is cancelled;
    /// prefer [`EffectHandle::wait_with_timeout`] when such timers may be
    /// in flight.
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for the effect cascade to settle, with a timeout
    ///
    /// # Errors
    ///
    /// Returns `Err(StoreError::Timeout)` if the timeout expires first.
    pub async fn wait_with_timeout(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: per-send effect tracking shared by the whole cascade
struct Tracking {
    counter: Arc<AtomicUsize>,
    notifier: watch::Sender<()>,
}

impl Tracking {
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

impl Clone for Tracking {
    fn clone(&self) -> Self {
        Self {
            counter: Arc::clone(&self.counter),
            notifier: self.notifier.clone(),
        }
    }
}

/// Internal: RAII guard so counters are decremented even if an effect
/// panics or is cancelled mid-flight
struct EffectGuard {
    tracking: Tracking,
    pending: Arc<AtomicUsize>,
}

impl Drop for EffectGuard {
    fn drop(&mut self) {
        self.tracking.decrement();
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store module - the runtime for reducers
pub mod store {
    use super::{Arc, AtomicUsize, EffectGuard, EffectHandle, Ordering, StoreError, Tracking};
    use callboard_core::effect::{Effect, EffectId};
    use callboard_core::reducer::Reducer;
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU64};
    use std::time::Duration;
    use tokio::sync::{RwLock, broadcast, watch};

    /// Registry of preemptable scheduled effects.
    ///
    /// Registering an id that is already live replaces the previous
    /// registration (the superseded effect observes its channel closing and
    /// stops). Completion deregisters only when the generation still
    /// matches, so a replacement is never torn down by its predecessor.
    struct Cancellations {
        map: Mutex<HashMap<EffectId, CancelEntry>>,
        next_generation: AtomicU64,
    }

    struct CancelEntry {
        generation: u64,
        tx: watch::Sender<bool>,
    }

    impl Cancellations {
        fn new() -> Self {
            Self {
                map: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }
        }

        fn register(&self, id: &EffectId) -> (u64, watch::Receiver<bool>) {
            let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = watch::channel(false);
            let mut map = self
                .map
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            map.insert(id.clone(), CancelEntry { generation, tx });
            (generation, rx)
        }

        fn complete(&self, id: &EffectId, generation: u64) {
            let mut map = self
                .map
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if map.get(id).is_some_and(|e| e.generation == generation) {
                map.remove(id);
            }
        }

        fn cancel(&self, id: &EffectId) -> bool {
            let entry = {
                let mut map = self
                    .map
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                map.remove(id)
            };
            match entry {
                Some(entry) => {
                    let _ = entry.tx.send(true);
                    true
                },
                None => false,
            }
        }

        fn cancel_all(&self) -> usize {
            let entries: Vec<_> = {
                let mut map = self
                    .map
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                map.drain().collect()
            };
            let count = entries.len();
            for (_, entry) in entries {
                let _ = entry.tx.send(true);
            }
            count
        }
    }

    struct Inner<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: RwLock<S>,
        reducer: R,
        environment: E,
        shutdown: AtomicBool,
        pending_effects: Arc<AtomicUsize>,
        /// Actions produced by effects are broadcast to observers. This
        /// enables request/response waits over the feedback loop.
        action_broadcast: broadcast::Sender<A>,
        cancellations: Cancellations,
    }

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind an async `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop and cancellation)
    ///
    /// Cloning a Store is cheap and yields a handle to the same state.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        inner: Arc<Inner<S, A, E, R>>,
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        S: Send + Sync + 'static,
        A: Clone + Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// The action broadcast capacity defaults to 16; use
        /// [`Store::with_broadcast_capacity`] when many slow observers are
        /// expected.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(initial_state, reducer, environment, 16)
        }

        /// Create a new store with a custom action broadcast capacity
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity);

            Self {
                inner: Arc::new(Inner {
                    state: RwLock::new(initial_state),
                    reducer,
                    environment,
                    shutdown: AtomicBool::new(false),
                    pending_effects: Arc::new(AtomicUsize::new(0)),
                    action_broadcast,
                    cancellations: Cancellations::new(),
                }),
            }
        }

        /// Send an action to the store
        ///
        /// Acquires the state write lock, runs the reducer, then starts the
        /// returned effects on spawned tasks. Effects may produce further
        /// actions, which re-enter the reducer (and are broadcast to
        /// observers).
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is
        /// shutting down.
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.inner.shutdown.load(Ordering::Acquire) {
                return Err(StoreError::ShutdownInProgress);
            }

            let (handle, tracking) = EffectHandle::new();

            let effects = {
                let mut state = self.inner.state.write().await;
                self.inner
                    .reducer
                    .reduce(&mut state, action, &self.inner.environment)
            };

            for effect in effects {
                self.spawn_effect(effect, &tracking);
            }

            Ok(handle)
        }

        /// Send an action and wait for a matching result action
        ///
        /// Designed for request/response over the feedback loop: subscribe
        /// to the action broadcast *before* sending (avoiding the race),
        /// send, then wait for the first effect-produced action matching
        /// the predicate.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: no matching action within `timeout`
        /// - [`StoreError::ChannelClosed`]: broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let mut rx = self.inner.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "action observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to actions produced by effects
        #[must_use]
        pub fn subscribe(&self) -> broadcast::Receiver<A> {
            self.inner.action_broadcast.subscribe()
        }

        /// Read state through a closure
        pub async fn state<T>(&self, f: impl FnOnce(&S) -> T) -> T {
            let state = self.inner.state.read().await;
            f(&state)
        }

        /// Number of effects currently in flight (including scheduled ones)
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.inner.pending_effects.load(Ordering::Acquire)
        }

        /// Initiate graceful shutdown
        ///
        /// Sets the shutdown flag (rejecting new actions), preempts every
        /// registered scheduled effect — their durable records survive in
        /// storage, so they are re-armed on recovery — then waits for the
        /// remaining in-flight effects to drain.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if effects are still
        /// running when the timeout expires.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("initiating graceful shutdown");

            self.inner.shutdown.store(true, Ordering::Release);

            let cancelled = self.inner.cancellations.cancel_all();
            if cancelled > 0 {
                tracing::info!(cancelled, "preempted scheduled effects for shutdown");
            }

            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(50);

            loop {
                let pending = self.inner.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("all effects completed, shutdown successful");
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(pending, "shutdown timed out with effects still running");
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        fn spawn_effect(&self, effect: Effect<A>, tracking: &Tracking) {
            tracking.increment();
            self.inner.pending_effects.fetch_add(1, Ordering::SeqCst);

            let guard = EffectGuard {
                tracking: tracking.clone(),
                pending: Arc::clone(&self.inner.pending_effects),
            };

            let store = self.clone();
            let tracking = tracking.clone();
            tokio::spawn(async move {
                let _guard = guard;
                store.run_effect(effect, &tracking).await;
            });
        }

        fn run_effect<'a>(
            &'a self,
            effect: Effect<A>,
            tracking: &'a Tracking,
        ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
            Box::pin(async move {
                match effect {
                    Effect::None => {},

                    Effect::Parallel(effects) => {
                        for effect in effects {
                            self.spawn_effect(effect, tracking);
                        }
                    },

                    Effect::Sequential(effects) => {
                        for effect in effects {
                            self.run_effect(effect, tracking).await;
                        }
                    },

                    Effect::Delay { duration, action } => {
                        tokio::time::sleep(duration).await;
                        self.feedback(*action, tracking).await;
                    },

                    Effect::Future(future) => {
                        if let Some(action) = future.await {
                            self.feedback(action, tracking).await;
                        }
                    },

                    Effect::Cancellable { id, effect } => {
                        let (generation, mut cancelled) = self.inner.cancellations.register(&id);
                        tokio::select! {
                            _ = cancelled.changed() => {
                                tracing::debug!(effect_id = %id, "scheduled effect preempted");
                            },
                            () = self.run_effect(*effect, tracking) => {
                                self.inner.cancellations.complete(&id, generation);
                            },
                        }
                    },

                    Effect::Cancel { id } => {
                        let cancelled = self.inner.cancellations.cancel(&id);
                        tracing::debug!(effect_id = %id, cancelled, "cancel requested");
                    },
                }
            })
        }

        /// Dispatch an action produced by an effect back into the reducer.
        async fn feedback(&self, action: A, tracking: &Tracking) {
            if self.inner.shutdown.load(Ordering::Acquire) {
                tracing::debug!("dropping feedback action during shutdown");
                return;
            }

            let _ = self.inner.action_broadcast.send(action.clone());

            let effects = {
                let mut state = self.inner.state.write().await;
                self.inner
                    .reducer
                    .reduce(&mut state, action, &self.inner.environment)
            };

            for effect in effects {
                self.spawn_effect(effect, tracking);
            }
        }
    }
}

pub use store::Store;

//! # Callboard Core
//!
//! Core traits and types for the callboard scheduling engine.
//!
//! This crate provides the fundamental abstractions the engine is built
//! on: pure reducers over domain state, effect values describing deferred
//! I/O, and the injected-dependency seams (starting with [`environment::Clock`]).
//!
//! ## Core Concepts
//!
//! - **State**: domain state for one feature (owned, `Clone`-able data)
//! - **Action**: all possible inputs to a reducer (commands and events)
//! - **Reducer**: pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: side effect descriptions (values, not execution)
//! - **Environment**: injected dependencies via traits
//!
//! ## Architecture Principles
//!
//! - Functional core, imperative shell
//! - Unidirectional data flow
//! - Explicit effects (no hidden I/O)
//! - Dependency injection via the environment

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};

/// Reducer module - the core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// They contain all business logic and are deterministic and testable;
/// every suspension point lives in the effects they return, never inline.
pub mod reducer {
    use super::effect::{Effect, Effects};

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: the domain state this reducer operates on
    /// - `Action`: the action type this reducer processes
    /// - `Environment`: the injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for BookingReducer {
    ///     type State = SettlementState;
    ///     type Action = LifecycleAction;
    ///     type Environment = EngineEnvironment<S, P, E>;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut SettlementState,
    ///         action: LifecycleAction,
    ///         env: &Self::Environment,
    ///     ) -> Effects<LifecycleAction> {
    ///         match action {
    ///             LifecycleAction::ReportDispute { gig_id } => {
    ///                 // Business logic here
    ///                 smallvec![Effect::Cancel { id: clearing_effect_id(gig_id) }]
    ///             }
    ///             _ => Effects::new(),
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action against current state
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed by the runtime
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Effects<Self::Action>;
    }
}

/// Effect module - side effect descriptions
///
/// Effects describe side effects to be performed by the runtime store.
/// They are values (not execution) and are composable and cancellable.
pub mod effect {
    use std::fmt;
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Effects returned from a single reducer invocation.
    ///
    /// Most transitions produce at most a handful of effects, so these are
    /// kept inline on the stack.
    pub type Effects<Action> = smallvec::SmallVec<[Effect<Action>; 4]>;

    /// Identifier for a cancellable effect.
    ///
    /// Scheduled effects (delayed clearing checks, timeout timers) are
    /// registered under an id so that a later action can preempt them via
    /// [`Effect::Cancel`]. Ids are plain strings derived from the domain,
    /// typically `"{concern}:{aggregate id}"`, so the same logical timer
    /// always maps to the same id.
    #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct EffectId(String);

    impl EffectId {
        /// Create an effect id from a domain-derived key.
        #[must_use]
        pub fn new(key: impl Into<String>) -> Self {
            Self(key.into())
        }

        /// The underlying key.
        #[must_use]
        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl fmt::Display for EffectId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what
    /// should happen, returned from reducers and executed by the Store
    /// runtime. Futures resolve to an optional follow-up action, which the
    /// runtime feeds back into the reducer.
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Delayed action (for timers, retries, clearing deadlines)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after the delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if `Some`, the action is fed back
        /// into the reducer.
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),

        /// An effect that can be preempted by a later [`Effect::Cancel`]
        /// carrying the same id.
        ///
        /// Scheduling a new cancellable effect under an id that is already
        /// registered replaces the previous registration.
        Cancellable {
            /// Registration key
            id: EffectId,
            /// The effect to run under that key
            effect: Box<Effect<Action>>,
        },

        /// Cancel a previously registered [`Effect::Cancellable`].
        ///
        /// Cancelling an id with no live registration is a no-op.
        Cancel {
            /// Registration key to cancel
            id: EffectId,
        },
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> fmt::Debug for Effect<Action>
    where
        Action: fmt::Debug,
    {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
                Effect::Cancellable { id, effect } => f
                    .debug_struct("Effect::Cancellable")
                    .field("id", id)
                    .field("effect", effect)
                    .finish(),
                Effect::Cancel { id } => {
                    f.debug_struct("Effect::Cancel").field("id", id).finish()
                },
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Wrap this effect so it can be preempted via `id`
        #[must_use]
        pub fn cancellable(self, id: EffectId) -> Effect<Action> {
            Effect::Cancellable {
                id,
                effect: Box::new(self),
            }
        }
    }
}

/// Environment module - dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the environment parameter. The one universal dependency is the
/// clock; domain-specific providers (storage, payments, event publishing)
/// live with the crate that owns the domain.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Production code uses [`SystemClock`]; tests pin time with
    /// [`FixedClock`] so deadline arithmetic is deterministic.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Clock pinned to a fixed instant, for deterministic tests.
    #[derive(Debug, Clone, Copy)]
    pub struct FixedClock {
        /// The instant this clock always reports.
        pub time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a clock pinned at `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::effect::{Effect, EffectId};
    use super::environment::{Clock, FixedClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn effect_id_is_stable_for_same_key() {
        let a = EffectId::new("clearing:1234");
        let b = EffectId::new(String::from("clearing:1234"));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "clearing:1234");
    }

    #[test]
    fn cancellable_wraps_effect_under_id() {
        let effect: Effect<u32> = Effect::None.cancellable(EffectId::new("t:1"));
        match effect {
            Effect::Cancellable { id, effect } => {
                assert_eq!(id, EffectId::new("t:1"));
                assert!(matches!(*effect, Effect::None));
            },
            other => panic!("expected cancellable, got {other:?}"),
        }
    }

    #[test]
    fn fixed_clock_reports_pinned_instant() {
        let instant = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single();
        let instant = instant.expect("valid timestamp");
        let clock = FixedClock::new(instant);
        assert_eq!(clock.now(), instant);
        assert_eq!(clock.now(), clock.now());
    }
}

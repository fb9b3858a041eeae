//! # Booking Core
//!
//! The functional core of the venue booking service.
//!
//! Every account and booking rule is a reducer: it receives a snapshot of the
//! rows one command touches plus the command itself, mutates the snapshot and
//! answers with effects (database writes, emails). Effects are values. The
//! runtime crate awaits them and hands their outcome back to the reducer as
//! the next action, until nothing is left to do.
//!
//! - **State**: the snapshot, e.g. the user being logged in
//! - **Action**: a command, or the reported outcome of an effect
//! - **Effect**: `None`, or a future that may yield the next action
//! - **Environment**: stores, mailer and clock behind traits
//!
//! ## Example
//!
//! ```
//! use booking_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
//!
//! #[derive(Default)]
//! struct Slot {
//!     available: bool,
//!     holder: Option<String>,
//! }
//!
//! enum SlotAction {
//!     Claim { email: String },
//!     Release,
//! }
//!
//! struct SlotReducer;
//!
//! impl Reducer for SlotReducer {
//!     type State = Slot;
//!     type Action = SlotAction;
//!     type Environment = ();
//!
//!     fn reduce(&self, slot: &mut Slot, action: SlotAction, _env: &()) -> SmallVec<[Effect<SlotAction>; 4]> {
//!         match action {
//!             SlotAction::Claim { email } if slot.available => {
//!                 slot.available = false;
//!                 slot.holder = Some(email);
//!             }
//!             SlotAction::Claim { .. } => {}
//!             SlotAction::Release => {
//!                 slot.available = true;
//!                 slot.holder = None;
//!             }
//!         }
//!         smallvec![]
//!     }
//! }
//!
//! let mut slot = Slot { available: true, holder: None };
//! SlotReducer.reduce(&mut slot, SlotAction::Claim { email: "siti@graduate.utm.my".into() }, &());
//! SlotReducer.reduce(&mut slot, SlotAction::Claim { email: "amin@graduate.utm.my".into() }, &());
//! assert_eq!(slot.holder.as_deref(), Some("siti@graduate.utm.my"));
//! ```

pub use chrono::{DateTime, Utc};
pub use smallvec::{smallvec, SmallVec};

/// The reducer trait
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Business rules for one kind of command.
    ///
    /// `reduce` must not perform I/O itself. Anything that touches the outside
    /// world is returned as an [`Effect`], and its result comes back as a later
    /// action.
    pub trait Reducer {
        /// Snapshot the reducer works on
        type State;

        /// Commands and effect outcomes
        type Action;

        /// Injected collaborators
        type Environment;

        /// Apply `action` to `state` and describe the follow-up work.
        ///
        /// Workflows here emit at most one or two effects per step, so the
        /// inline capacity of four keeps the common case off the heap.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Side effect descriptions
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Work a reducer asks the runtime to do.
    pub enum Effect<Action> {
        /// Nothing to do
        None,

        /// Await the future; a `Some` output is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    impl<Action> std::fmt::Debug for Effect<Action> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::None => f.write_str("Effect::None"),
                Self::Future(_) => f.write_str("Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Box an async block whose output becomes the next action
        pub fn future<F>(fut: F) -> Self
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Self::Future(Box::pin(fut))
        }

        /// Whether this effect does nothing
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Self::None)
        }
    }
}

/// Injected time
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Source of "now" for expiries, lockouts and session tokens
    pub trait Clock: Send + Sync {
        /// Current instant
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::effect::Effect;
    use super::environment::{Clock, SystemClock};

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        assert!(clock.now() >= first);
    }

    #[test]
    fn effect_debug_hides_future_body() {
        let effect: Effect<u8> = Effect::future(async { Some(1) });
        assert_eq!(format!("{effect:?}"), "Effect::Future(<future>)");
        assert!(!effect.is_none());
        assert!(Effect::<u8>::None.is_none());
    }
}

//! Execution side of the venue booking service.
//!
//! [`EffectRunner`] takes one command through a reducer. It awaits the effects
//! the reducer returns and feeds their actions back in until nothing is left.
//! [`PeriodicJob`] runs background work on an interval until shutdown, and
//! [`HealthCheck`] is what readiness probes report.
//!
//! ## Example
//!
//! ```ignore
//! use booking_runtime::EffectRunner;
//!
//! let mut state = AccountState::for_user(user);
//! EffectRunner::new()
//!     .run(&AccountReducer::new(), &mut state, AccountAction::Login { .. }, &env)
//!     .await;
//!
//! let outcome = state.into_result()?;
//! ```

use booking_core::{effect::Effect, reducer::Reducer};
use std::collections::VecDeque;

/// Dependency health reporting
pub mod health;
/// Supervised periodic jobs and shutdown signalling
pub mod job;

pub use health::{HealthCheck, HealthStatus};
pub use job::{Job, JobStats, PeriodicJob, Shutdown, ShutdownListener};

/// Upper bound on actions processed for one command.
///
/// Reducers here settle in a handful of steps; hitting the bound means a
/// feedback loop between effects and actions.
pub const DEFAULT_MAX_STEPS: usize = 64;

/// Executes reducer effects and feeds their actions back into the reducer.
///
/// The runner is request-scoped: it works on a borrowed state snapshot and
/// returns once no effect produces a further action. Effects returned from a
/// single `reduce` call run concurrently; ordering between steps is expressed
/// by the reducer itself, which only emits the next effect after the
/// previous one has reported back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectRunner {
    max_steps: usize,
}

impl EffectRunner {
    /// Creates a runner with [`DEFAULT_MAX_STEPS`]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Overrides the step bound
    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Dispatch `action` and run the resulting workflow to completion.
    ///
    /// Returns the number of actions the reducer processed, including the
    /// initial one.
    pub async fn run<R>(
        &self,
        reducer: &R,
        state: &mut R::State,
        action: R::Action,
        env: &R::Environment,
    ) -> usize
    where
        R: Reducer + Sync,
        R::State: Send,
        R::Action: Send + 'static,
        R::Environment: Sync,
    {
        let mut queue = VecDeque::from([action]);
        let mut steps = 0;

        while let Some(action) = queue.pop_front() {
            if steps == self.max_steps {
                tracing::warn!(
                    max_steps = self.max_steps,
                    dropped = queue.len() + 1,
                    "Effect runner step limit reached, dropping remaining actions"
                );
                metrics::counter!("runtime.step_limit_reached").increment(1);
                break;
            }
            steps += 1;

            let effects = reducer.reduce(state, action, env);
            let produced =
                futures::future::join_all(effects.into_iter().map(execute_effect)).await;
            queue.extend(produced.into_iter().flatten());
        }

        tracing::trace!(steps, "Workflow settled");
        steps
    }
}

impl Default for EffectRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Execute a single effect and collect the action it produces, if any.
pub async fn execute_effect<A>(effect: Effect<A>) -> Option<A>
where
    A: Send + 'static,
{
    match effect {
        Effect::None => {
            metrics::counter!("runtime.effects.executed", "type" => "none").increment(1);
            None
        }
        Effect::Future(fut) => {
            metrics::counter!("runtime.effects.executed", "type" => "future").increment(1);
            fut.await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use booking_core::{smallvec, SmallVec};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Step {
        Start,
        Ping(u32),
        Done,
    }

    #[derive(Default)]
    struct Trace {
        seen: Vec<Step>,
    }

    struct PingReducer;

    impl Reducer for PingReducer {
        type State = Trace;
        type Action = Step;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Trace,
            action: Step,
            _env: &(),
        ) -> SmallVec<[Effect<Step>; 4]> {
            state.seen.push(action.clone());
            match action {
                Step::Start => smallvec![Effect::future(async { Some(Step::Ping(1)) })],
                Step::Ping(n) if n < 3 => smallvec![Effect::future(async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    Some(Step::Ping(n + 1))
                })],
                Step::Ping(_) => smallvec![Effect::future(async { Some(Step::Done) })],
                Step::Done => smallvec![Effect::None],
            }
        }
    }

    /// Emits two effects at once; only one reports back
    struct FanOutReducer;

    impl Reducer for FanOutReducer {
        type State = Vec<u8>;
        type Action = u8;
        type Environment = ();

        fn reduce(&self, seen: &mut Vec<u8>, action: u8, _env: &()) -> SmallVec<[Effect<u8>; 4]> {
            seen.push(action);
            if action == 0 {
                smallvec![
                    Effect::future(async { None }),
                    Effect::future(async { Some(1) }),
                ]
            } else {
                smallvec![]
            }
        }
    }

    #[tokio::test]
    async fn run_feeds_actions_back_until_settled() {
        let mut state = Trace::default();
        let steps = EffectRunner::new()
            .run(&PingReducer, &mut state, Step::Start, &())
            .await;

        assert_eq!(steps, 5);
        assert_eq!(
            state.seen,
            vec![Step::Start, Step::Ping(1), Step::Ping(2), Step::Ping(3), Step::Done]
        );
    }

    #[tokio::test]
    async fn run_stops_at_step_limit() {
        let mut state = Trace::default();
        let steps = EffectRunner::new()
            .with_max_steps(2)
            .run(&PingReducer, &mut state, Step::Start, &())
            .await;

        assert_eq!(steps, 2);
        assert_eq!(state.seen, vec![Step::Start, Step::Ping(1)]);
    }

    #[tokio::test]
    async fn silent_effects_produce_no_actions() {
        let mut seen = Vec::new();
        let steps = EffectRunner::new().run(&FanOutReducer, &mut seen, 0, &()).await;

        assert_eq!(steps, 2);
        assert_eq!(seen, vec![0, 1]);
        assert!(execute_effect(Effect::<u8>::None).await.is_none());
    }
}

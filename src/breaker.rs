//! Core circuit breaker implementation.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::error::{BreakerError, BreakerResult, FailureKind};
use crate::hook::HookRegistry;
use crate::metrics::{BreakerStats, CallOutcome, CallTotals, MetricSink};
use crate::state::{Admission, State, StateMachine, Transition};

/// Point-in-time view of a breaker, for health checks and dashboards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSnapshot {
    /// Dependency name.
    pub name: String,
    /// Current state.
    pub state: State,
    /// Failures since the breaker last closed.
    ///
    /// Half-open successes leave this untouched, so while half-open it still
    /// holds the streak that opened the breaker. It drops to zero on close.
    pub consecutive_failures: u32,
    /// Successes recorded in the current half-open period.
    pub consecutive_successes: u32,
    /// When the most recent failure was recorded.
    pub last_failure: Option<Instant>,
    /// When an open breaker will let the next trial call through.
    pub next_attempt: Option<Instant>,
    /// Lifetime call totals.
    pub totals: CallTotals,
}

/// A circuit breaker guarding calls to one named dependency.
///
/// Breakers are created and owned by a [`BreakerRegistry`](crate::BreakerRegistry);
/// call sites reach them through the registry so that every caller of a
/// dependency shares the same state.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    machine: Mutex<StateMachine>,
    stats: BreakerStats,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry>,
}

impl CircuitBreaker {
    pub(crate) fn new(
        name: impl Into<String>,
        config: BreakerConfig,
        metric_sink: Arc<dyn MetricSink>,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            machine: Mutex::new(StateMachine::new(config)),
            stats: BreakerStats::default(),
            metric_sink,
            hooks,
        }
    }

    /// Name of the protected dependency.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configuration this breaker was created with.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Gets the current state of the circuit breaker.
    ///
    /// An open breaker whose reset window has elapsed still reports `Open`
    /// until the next call moves it to half-open.
    pub fn state(&self) -> State {
        self.machine.lock().state()
    }

    /// Returns a consistent snapshot of state, counters and totals.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let machine = self.machine.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: machine.state(),
            consecutive_failures: machine.consecutive_failures(),
            consecutive_successes: machine.consecutive_successes(),
            last_failure: machine.last_failure_time(),
            next_attempt: machine.next_attempt_time(),
            totals: self.stats.totals(),
        }
    }

    /// Executes an async operation guarded by the circuit breaker.
    ///
    /// The operation is not started when the breaker is open. Otherwise it
    /// races the configured call timeout; when the timeout wins, the
    /// operation's future is dropped, which cancels it at its next `.await`.
    /// Work it already handed off elsewhere (a spawned task, a request the
    /// remote side already accepted) may still complete after the call was
    /// recorded as a failure.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.pre_call::<E>()?;

        let start = Instant::now();
        let result = tokio::time::timeout(self.config.call_timeout(), operation()).await;
        let elapsed = start.elapsed();

        match result {
            Ok(Ok(value)) => {
                self.post_call(CallOutcome::Success, elapsed);
                Ok(value)
            }
            Ok(Err(err)) => {
                tracing::debug!(
                    breaker = %self.name,
                    error = %err,
                    elapsed = ?elapsed,
                    "protected call failed"
                );
                self.post_call(CallOutcome::Failure(FailureKind::Upstream), elapsed);
                Err(BreakerError::Operation(err))
            }
            Err(_) => {
                tracing::debug!(
                    breaker = %self.name,
                    timeout = ?self.config.call_timeout(),
                    "protected call timed out"
                );
                self.post_call(CallOutcome::Failure(FailureKind::Timeout), elapsed);
                Err(BreakerError::Timeout {
                    breaker: self.name.clone(),
                    timeout: self.config.call_timeout(),
                })
            }
        }
    }

    /// Like [`call`](Self::call), but answers with `fallback` whenever the
    /// call is rejected, fails or times out.
    ///
    /// The fallback receives the error it replaces, so it can tell a
    /// rejection from an upstream failure if it needs to.
    pub async fn call_or_else<F, Fut, T, E, Fb>(&self, operation: F, fallback: Fb) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        Fb: FnOnce(BreakerError<E>) -> T,
    {
        match self.call(operation).await {
            Ok(value) => value,
            Err(err) => {
                self.note_fallback(&err);
                fallback(err)
            }
        }
    }

    /// Like [`call_or_else`](Self::call_or_else) with an async fallback.
    pub async fn call_or_else_async<F, Fut, T, E, Fb, FbFut>(
        &self,
        operation: F,
        fallback: Fb,
    ) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        Fb: FnOnce(BreakerError<E>) -> FbFut,
        FbFut: Future<Output = T>,
    {
        match self.call(operation).await {
            Ok(value) => value,
            Err(err) => {
                self.note_fallback(&err);
                fallback(err).await
            }
        }
    }

    /// Forces the breaker to closed with zeroed counters.
    ///
    /// Lifetime totals are kept.
    pub fn reset(&self) {
        let transition = self.machine.lock().reset();
        if let Some(transition) = transition {
            self.announce(transition, 0);
        }
    }

    /// Checks if a call is allowed based on the current state.
    fn pre_call<E>(&self) -> Result<(), BreakerError<E>> {
        let admission = self.machine.lock().admit(Instant::now());

        match admission {
            Admission::Permitted => Ok(()),
            Admission::Trial => {
                self.announce(
                    Transition {
                        from: State::Open,
                        to: State::HalfOpen,
                    },
                    0,
                );
                Ok(())
            }
            Admission::Rejected { retry_after } => {
                self.stats.record_rejection();
                tracing::debug!(
                    breaker = %self.name,
                    retry_after = ?retry_after,
                    "circuit open, call rejected"
                );
                self.metric_sink.record_rejection(&self.name);
                self.hooks.execute_rejected_hook(&self.name);
                Err(BreakerError::Open {
                    breaker: self.name.clone(),
                    retry_after,
                })
            }
        }
    }

    /// Records the outcome of an attempted call and applies any transition.
    fn post_call(&self, outcome: CallOutcome, duration: Duration) {
        self.stats.record(outcome);

        let (transition, failures) = {
            let mut machine = self.machine.lock();
            let transition = match outcome {
                CallOutcome::Success => machine.on_success(),
                CallOutcome::Failure(_) => machine.on_failure(Instant::now()),
            };
            (transition, machine.consecutive_failures())
        };

        // Execute hooks and metrics outside the lock path
        self.metric_sink.record_call(&self.name, outcome, duration);
        if let CallOutcome::Failure(kind) = outcome {
            self.hooks.execute_failure_hook(&self.name, kind);
        }
        if let Some(transition) = transition {
            self.announce(transition, failures);
        }
    }

    fn announce(&self, transition: Transition, consecutive_failures: u32) {
        let Transition { from, to } = transition;
        match to {
            State::Open => tracing::warn!(
                breaker = %self.name,
                from = %from,
                to = %to,
                consecutive_failures,
                reset_timeout = ?self.config.reset_timeout(),
                "circuit breaker opened"
            ),
            State::HalfOpen => tracing::info!(
                breaker = %self.name,
                from = %from,
                to = %to,
                "circuit breaker half-open, admitting trial calls"
            ),
            State::Closed => tracing::info!(
                breaker = %self.name,
                from = %from,
                to = %to,
                "circuit breaker closed"
            ),
        }

        self.metric_sink.record_state_transition(&self.name, from, to);
        self.hooks.execute_state_transition_hook(&self.name, to);
    }

    fn note_fallback<E>(&self, err: &BreakerError<E>) {
        self.stats.record_fallback();
        tracing::debug!(
            breaker = %self.name,
            open = err.is_open(),
            kind = ?err.failure_kind(),
            "serving fallback"
        );
        self.metric_sink.record_fallback(&self.name);
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

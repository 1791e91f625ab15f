//! Circuit breaker state machine implementation.
//!
//! The machine is pure bookkeeping: every method takes the current instant,
//! so it never reads a clock itself and never suspends. The owning
//! [`CircuitBreaker`](crate::CircuitBreaker) serializes access to it.

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::BreakerConfig;

/// Represents the possible states of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Circuit is closed and operations are allowed.
    Closed,

    /// Circuit is open and operations are rejected.
    Open,

    /// Circuit is letting trial calls through to test recovery.
    HalfOpen,
}

impl State {
    /// Stable lowercase label, used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            State::Closed => "closed",
            State::Open => "open",
            State::HalfOpen => "half-open",
        }
    }
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change of state produced by the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Transition {
    pub(crate) from: State,
    pub(crate) to: State,
}

/// Decision for a single call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Proceed with the call.
    Permitted,
    /// The reset window elapsed; the breaker moved to half-open and this call
    /// is a trial call.
    Trial,
    /// Reject without calling.
    Rejected { retry_after: Duration },
}

/// Consecutive-count state machine for one dependency.
#[derive(Debug)]
pub(crate) struct StateMachine {
    config: BreakerConfig,
    state: State,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_time: Option<Instant>,
    next_attempt_time: Option<Instant>,
}

impl StateMachine {
    pub(crate) fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: State::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_time: None,
            next_attempt_time: None,
        }
    }

    pub(crate) fn state(&self) -> State {
        self.state
    }

    pub(crate) fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub(crate) fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    pub(crate) fn last_failure_time(&self) -> Option<Instant> {
        self.last_failure_time
    }

    pub(crate) fn next_attempt_time(&self) -> Option<Instant> {
        self.next_attempt_time
    }

    /// Decides whether a call issued at `now` may proceed.
    pub(crate) fn admit(&mut self, now: Instant) -> Admission {
        match self.state {
            State::Closed | State::HalfOpen => Admission::Permitted,
            State::Open => match self.next_attempt_time {
                Some(next) if now < next => Admission::Rejected {
                    retry_after: next - now,
                },
                // Counters are left as they are; only the state flips.
                _ => {
                    self.state = State::HalfOpen;
                    Admission::Trial
                }
            },
        }
    }

    /// Records a successful call.
    pub(crate) fn on_success(&mut self) -> Option<Transition> {
        match self.state {
            State::Closed => {
                self.consecutive_failures = 0;
                None
            }
            State::HalfOpen => {
                self.consecutive_successes += 1;
                if self.consecutive_successes >= self.config.success_threshold() {
                    Some(self.close())
                } else {
                    None
                }
            }
            // Late result of a call admitted before the breaker opened.
            State::Open => None,
        }
    }

    /// Records a failed or timed-out call.
    pub(crate) fn on_failure(&mut self, now: Instant) -> Option<Transition> {
        self.last_failure_time = Some(now);
        match self.state {
            State::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.config.failure_threshold() {
                    Some(self.open(now))
                } else {
                    None
                }
            }
            State::HalfOpen => {
                self.consecutive_failures += 1;
                Some(self.open(now))
            }
            State::Open => None,
        }
    }

    /// Forces the machine back to closed with zeroed counters.
    pub(crate) fn reset(&mut self) -> Option<Transition> {
        let from = self.state;
        self.state = State::Closed;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
        self.last_failure_time = None;
        self.next_attempt_time = None;

        (from != State::Closed).then_some(Transition {
            from,
            to: State::Closed,
        })
    }

    fn open(&mut self, now: Instant) -> Transition {
        let from = self.state;
        self.state = State::Open;
        self.consecutive_successes = 0;
        self.next_attempt_time = Some(now + self.config.reset_timeout());
        Transition {
            from,
            to: State::Open,
        }
    }

    fn close(&mut self) -> Transition {
        let from = self.state;
        self.state = State::Closed;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
        self.next_attempt_time = None;
        Transition {
            from,
            to: State::Closed,
        }
    }
}

//! Hook registry for circuit breaker events.
//!
//! Hooks receive the name of the breaker that fired, so one registry can be
//! shared by every breaker a [`BreakerRegistry`](crate::BreakerRegistry) owns.

use crate::error::FailureKind;
use crate::state::State;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::Arc;

type HookFn = Arc<dyn Fn(&str) + Send + Sync + 'static>;
type FailureHookFn = Arc<dyn Fn(&str, FailureKind) + Send + Sync + 'static>;

type Hooks<F> = RwLock<SmallVec<[F; 2]>>;

/// A registry for circuit breaker event hooks.
#[derive(Default)]
pub struct HookRegistry {
    on_open: Hooks<HookFn>,
    on_close: Hooks<HookFn>,
    on_half_open: Hooks<HookFn>,
    on_rejected: Hooks<HookFn>,
    on_failure: Hooks<FailureHookFn>,
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a hook to call when a breaker opens.
    pub fn on_open<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_open.write().push(Arc::new(f));
    }

    /// Adds a hook to call when a breaker closes.
    pub fn on_close<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_close.write().push(Arc::new(f));
    }

    /// Adds a hook to call when a breaker half-opens.
    pub fn on_half_open<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_half_open.write().push(Arc::new(f));
    }

    /// Adds a hook to call when an open breaker rejects a call.
    pub fn on_rejected<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_rejected.write().push(Arc::new(f));
    }

    /// Adds a hook to call when a protected call fails or times out.
    pub fn on_failure<F>(&self, f: F)
    where
        F: Fn(&str, FailureKind) + Send + Sync + 'static,
    {
        self.on_failure.write().push(Arc::new(f));
    }

    /// Executes the hooks for a transition into `to`.
    pub fn execute_state_transition_hook(&self, breaker: &str, to: State) {
        let hooks = match to {
            State::Open => &self.on_open,
            State::Closed => &self.on_close,
            State::HalfOpen => &self.on_half_open,
        };
        Self::run(hooks, breaker);
    }

    /// Executes the rejection hooks.
    pub fn execute_rejected_hook(&self, breaker: &str) {
        Self::run(&self.on_rejected, breaker);
    }

    /// Executes the failure hooks.
    pub fn execute_failure_hook(&self, breaker: &str, kind: FailureKind) {
        // Clone out so a hook may register further hooks without deadlocking.
        let hooks = self.on_failure.read().clone();
        for hook in hooks {
            hook(breaker, kind);
        }
    }

    fn run(hooks: &Hooks<HookFn>, breaker: &str) {
        let hooks = hooks.read().clone();
        for hook in hooks {
            hook(breaker);
        }
    }
}

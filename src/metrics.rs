//! Call accounting and metrics for circuit breakers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::FailureKind;
use crate::state::State;

/// Outcome of a call that was actually attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallOutcome {
    /// The call returned successfully within its timeout.
    Success,
    /// The call failed or timed out.
    Failure(FailureKind),
}

impl CallOutcome {
    /// Stable lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            CallOutcome::Success => "success",
            CallOutcome::Failure(kind) => kind.as_str(),
        }
    }
}

/// Trait for metrics sinks that can receive circuit breaker events.
pub trait MetricSink: Send + Sync + 'static {
    /// Records a state transition event.
    fn record_state_transition(&self, breaker: &str, from: State, to: State);

    /// Records an attempted call and how long it ran.
    fn record_call(&self, breaker: &str, outcome: CallOutcome, duration: Duration);

    /// Records a call rejected by an open breaker.
    fn record_rejection(&self, breaker: &str);

    /// Records a fallback standing in for a failed or rejected call.
    fn record_fallback(&self, breaker: &str);
}

/// A null metrics sink that discards all events.
pub struct NullMetricSink;

impl MetricSink for NullMetricSink {
    fn record_state_transition(&self, _breaker: &str, _from: State, _to: State) {}
    fn record_call(&self, _breaker: &str, _outcome: CallOutcome, _duration: Duration) {}
    fn record_rejection(&self, _breaker: &str) {}
    fn record_fallback(&self, _breaker: &str) {}
}

/// Lifetime call totals for one breaker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallTotals {
    /// Calls that were attempted.
    pub calls: u64,
    /// Attempted calls that succeeded.
    pub successes: u64,
    /// Attempted calls that returned an error.
    pub failures: u64,
    /// Attempted calls that timed out.
    pub timeouts: u64,
    /// Calls rejected without being attempted.
    pub rejections: u64,
    /// Calls answered by a fallback.
    pub fallbacks: u64,
}

/// Monotonic counters backing [`CallTotals`]. Never reset.
#[derive(Debug, Default)]
pub(crate) struct BreakerStats {
    calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    rejections: AtomicU64,
    fallbacks: AtomicU64,
}

impl BreakerStats {
    pub(crate) fn record(&self, outcome: CallOutcome) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            CallOutcome::Success => &self.successes,
            CallOutcome::Failure(FailureKind::Upstream) => &self.failures,
            CallOutcome::Failure(FailureKind::Timeout) => &self.timeouts,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn totals(&self) -> CallTotals {
        CallTotals {
            calls: self.calls.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }
}

#[cfg(feature = "prometheus")]
pub use self::prometheus::PrometheusSink;

#[cfg(feature = "prometheus")]
mod prometheus {
    use std::time::Duration;

    use prometheus_client::encoding::EncodeLabelSet;
    use prometheus_client::metrics::counter::Counter;
    use prometheus_client::metrics::family::Family;
    use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
    use prometheus_client::registry::Registry;

    use super::{CallOutcome, MetricSink};
    use crate::state::State;

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct BreakerLabels {
        breaker: String,
    }

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct CallLabels {
        breaker: String,
        outcome: String,
    }

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct TransitionLabels {
        breaker: String,
        from: String,
        to: String,
    }

    fn call_duration_histogram() -> Histogram {
        // 5ms .. ~20s
        Histogram::new(exponential_buckets(0.005, 2.0, 13))
    }

    /// A [`MetricSink`] exporting Prometheus counter and histogram families.
    pub struct PrometheusSink {
        calls: Family<CallLabels, Counter>,
        call_duration: Family<BreakerLabels, Histogram, fn() -> Histogram>,
        transitions: Family<TransitionLabels, Counter>,
        rejections: Family<BreakerLabels, Counter>,
        fallbacks: Family<BreakerLabels, Counter>,
    }

    impl PrometheusSink {
        /// Creates the metric families and registers them in `registry`.
        pub fn register(registry: &mut Registry) -> Self {
            let sink = Self {
                calls: Family::default(),
                call_duration: Family::new_with_constructor(call_duration_histogram),
                transitions: Family::default(),
                rejections: Family::default(),
                fallbacks: Family::default(),
            };

            registry.register(
                "breaker_calls",
                "Protected calls attempted, by outcome",
                sink.calls.clone(),
            );
            registry.register(
                "breaker_call_duration_seconds",
                "Duration of attempted protected calls",
                sink.call_duration.clone(),
            );
            registry.register(
                "breaker_transitions",
                "Circuit breaker state transitions",
                sink.transitions.clone(),
            );
            registry.register(
                "breaker_rejections",
                "Calls rejected by an open breaker",
                sink.rejections.clone(),
            );
            registry.register(
                "breaker_fallbacks",
                "Calls answered by a fallback",
                sink.fallbacks.clone(),
            );

            sink
        }

        fn labels(breaker: &str) -> BreakerLabels {
            BreakerLabels {
                breaker: breaker.to_owned(),
            }
        }
    }

    impl MetricSink for PrometheusSink {
        fn record_state_transition(&self, breaker: &str, from: State, to: State) {
            self.transitions
                .get_or_create(&TransitionLabels {
                    breaker: breaker.to_owned(),
                    from: from.as_str().to_owned(),
                    to: to.as_str().to_owned(),
                })
                .inc();
        }

        fn record_call(&self, breaker: &str, outcome: CallOutcome, duration: Duration) {
            self.calls
                .get_or_create(&CallLabels {
                    breaker: breaker.to_owned(),
                    outcome: outcome.as_str().to_owned(),
                })
                .inc();
            self.call_duration
                .get_or_create(&Self::labels(breaker))
                .observe(duration.as_secs_f64());
        }

        fn record_rejection(&self, breaker: &str) {
            self.rejections.get_or_create(&Self::labels(breaker)).inc();
        }

        fn record_fallback(&self, breaker: &str) {
            self.fallbacks.get_or_create(&Self::labels(breaker)).inc();
        }
    }

}

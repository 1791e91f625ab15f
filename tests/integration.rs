use circuit_registry::{
    BreakerConfig, BreakerError, BreakerRegistry, CallOutcome, Dependency, FailureKind,
    HookRegistry, MetricSink, State,
};
use parking_lot::Mutex;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

// Custom error type that implements Error trait
#[derive(Debug)]
struct TestError(String);

impl TestError {
    fn new(msg: &str) -> Self {
        TestError(msg.to_string())
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Test error: {}", self.0)
    }
}

impl Error for TestError {}

const RESET: Duration = Duration::from_secs(30);

fn config(failures: u32, successes: u32) -> BreakerConfig {
    BreakerConfig::builder()
        .failure_threshold(failures)
        .success_threshold(successes)
        .call_timeout(Duration::from_secs(1))
        .reset_timeout(RESET)
        .build()
        .unwrap()
}

fn registry_with(name: &str, config: BreakerConfig) -> BreakerRegistry {
    BreakerRegistry::builder().register(name, config).build()
}

async fn fail(registry: &BreakerRegistry, name: &str) -> Result<String, BreakerError<TestError>> {
    registry
        .execute(name, || async { Err(TestError::new("connection reset")) })
        .await
}

async fn succeed(
    registry: &BreakerRegistry,
    name: &str,
) -> Result<String, BreakerError<TestError>> {
    registry
        .execute(name, || async { Ok("ok".to_string()) })
        .await
}

#[derive(Clone, Default)]
struct RecordingSink {
    transitions: Arc<Mutex<Vec<(String, State, State)>>>,
    calls: Arc<Mutex<Vec<CallOutcome>>>,
    fallbacks: Arc<AtomicUsize>,
}

impl MetricSink for RecordingSink {
    fn record_state_transition(&self, breaker: &str, from: State, to: State) {
        self.transitions.lock().push((breaker.to_string(), from, to));
    }

    fn record_call(&self, _breaker: &str, outcome: CallOutcome, _duration: Duration) {
        self.calls.lock().push(outcome);
    }

    fn record_rejection(&self, _breaker: &str) {}

    fn record_fallback(&self, _breaker: &str) {
        self.fallbacks.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn test_failures_open_breaker_and_block_work() {
    let registry = registry_with("database", config(3, 2));

    for _ in 0..3 {
        let err = assert_err!(fail(&registry, "database").await);
        assert!(matches!(err, BreakerError::Operation(_)));
    }
    assert_eq!(registry.resolve("database").state(), State::Open);

    let invoked = AtomicBool::new(false);
    let result = registry
        .execute("database", || {
            invoked.store(true, Ordering::SeqCst);
            async { Ok::<_, TestError>("ok") }
        })
        .await;

    let err = assert_err!(result);
    assert!(err.is_open());
    assert!(err.is_unavailable());
    assert!(!invoked.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_recovery_through_half_open() {
    let registry = registry_with("database", config(3, 2));
    for _ in 0..3 {
        let _ = fail(&registry, "database").await;
    }

    tokio::time::advance(RESET).await;

    // First call after the window is a trial call and reaches the dependency.
    assert_eq!(assert_ok!(succeed(&registry, "database").await), "ok");
    let breaker = registry.resolve("database");
    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.state, State::HalfOpen);
    assert_eq!(snapshot.consecutive_successes, 1);
    assert_eq!(snapshot.consecutive_failures, 3);

    assert_ok!(succeed(&registry, "database").await);
    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.state, State::Closed);
    assert_eq!(snapshot.consecutive_failures, 0);
    assert_eq!(snapshot.consecutive_successes, 0);
    assert_eq!(snapshot.next_attempt, None);
}

#[tokio::test(start_paused = true)]
async fn test_call_just_before_window_is_rejected() {
    let registry = registry_with("email-provider", config(1, 1));
    let _ = fail(&registry, "email-provider").await;

    tokio::time::advance(RESET - Duration::from_millis(1)).await;
    let err = assert_err!(succeed(&registry, "email-provider").await);
    match err {
        BreakerError::Open { retry_after, .. } => {
            assert_eq!(retry_after, Duration::from_millis(1))
        }
        other => panic!("expected open breaker, got {:?}", other),
    }

    tokio::time::advance(Duration::from_millis(1)).await;
    assert_ok!(succeed(&registry, "email-provider").await);
    assert_eq!(registry.resolve("email-provider").state(), State::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_failure_reopens() {
    let registry = registry_with("sms-provider", config(1, 3));
    let _ = fail(&registry, "sms-provider").await;

    tokio::time::advance(RESET).await;
    assert_ok!(succeed(&registry, "sms-provider").await);
    assert_ok!(succeed(&registry, "sms-provider").await);

    let failed_at = Instant::now();
    assert_err!(fail(&registry, "sms-provider").await);

    let snapshot = registry.resolve("sms-provider").snapshot();
    assert_eq!(snapshot.state, State::Open);
    assert_eq!(snapshot.consecutive_successes, 0);
    assert_eq!(snapshot.next_attempt, Some(failed_at + RESET));
    assert_eq!(snapshot.last_failure, Some(failed_at));
}

#[tokio::test(start_paused = true)]
async fn test_fallback_replaces_rejection_without_calling() {
    let registry = registry_with("completion-api", config(1, 1));
    let _ = fail(&registry, "completion-api").await;

    let invoked = AtomicBool::new(false);
    let value = registry
        .execute_or_else(
            "completion-api",
            || {
                invoked.store(true, Ordering::SeqCst);
                async { Ok::<_, TestError>("fresh".to_string()) }
            },
            |err| {
                assert!(err.is_open());
                "cached".to_string()
            },
        )
        .await;

    assert_eq!(value, "cached");
    assert!(!invoked.load(Ordering::SeqCst));
    let totals = registry.resolve("completion-api").snapshot().totals;
    assert_eq!(totals.rejections, 1);
    assert_eq!(totals.fallbacks, 1);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_sees_upstream_error() {
    let registry = registry_with("object-storage", config(5, 1));

    let value = registry
        .execute_or_else(
            "object-storage",
            || async { Err::<String, _>(TestError::new("bucket not found")) },
            |err| match err.into_operation() {
                Some(TestError(msg)) => format!("placeholder ({})", msg),
                None => "placeholder".to_string(),
            },
        )
        .await;

    assert_eq!(value, "placeholder (bucket not found)");
    let snapshot = registry.resolve("object-storage").snapshot();
    assert_eq!(snapshot.consecutive_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_async_fallback() {
    let registry = BreakerRegistry::new();

    let value = registry
        .execute_or_else_async(
            "geocoder",
            || async { Err::<u32, _>(TestError::new("quota exceeded")) },
            |_err| async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                7
            },
        )
        .await;

    assert_eq!(value, 7);
}

#[tokio::test(start_paused = true)]
async fn test_slow_call_counts_as_timeout() {
    let registry = registry_with("payment-processor", config(2, 1));

    let result = registry
        .execute("payment-processor", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, TestError>("charged")
        })
        .await;

    let err = assert_err!(result);
    assert!(err.is_timeout());
    assert_eq!(err.failure_kind(), Some(FailureKind::Timeout));

    let snapshot = registry.resolve("payment-processor").snapshot();
    assert_eq!(snapshot.consecutive_failures, 1);
    assert_eq!(snapshot.totals.timeouts, 1);
    assert_eq!(snapshot.totals.failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_work_is_dropped() {
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    let registry = registry_with("database", config(5, 1));
    let dropped = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));

    let flag = DropFlag(Arc::clone(&dropped));
    let done = Arc::clone(&finished);
    let result = registry
        .execute("database", || async move {
            let _flag = flag;
            tokio::time::sleep(Duration::from_secs(60)).await;
            done.store(true, Ordering::SeqCst);
            Ok::<_, TestError>(())
        })
        .await;

    assert!(assert_err!(result).is_timeout());
    assert!(dropped.load(Ordering::SeqCst));
    assert!(!finished.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_half_open_admits_concurrent_trials() {
    let registry = registry_with("completion-api", config(1, 2));
    let _ = fail(&registry, "completion-api").await;
    tokio::time::advance(RESET).await;

    let attempts = AtomicUsize::new(0);
    let calls = (0..3).map(|_| {
        registry.execute("completion-api", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, TestError>(())
            }
        })
    });
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(registry.resolve("completion-api").state(), State::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_transitions_reach_sink_and_hooks() {
    let sink = RecordingSink::default();
    let hooks = HookRegistry::new();
    let half_opened = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&half_opened);
    hooks.on_half_open(move |name| {
        assert_eq!(name, "database");
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let registry = BreakerRegistry::builder()
        .metric_sink(sink.clone())
        .hooks(hooks)
        .register("database", config(1, 1))
        .build();

    let _ = fail(&registry, "database").await;
    tokio::time::advance(RESET).await;
    let _ = succeed(&registry, "database").await;
    let _ = registry
        .execute_or_else(
            "database",
            || async { Err::<(), _>(TestError::new("x")) },
            |_| (),
        )
        .await;

    let name = "database".to_string();
    assert_eq!(
        *sink.transitions.lock(),
        vec![
            (name.clone(), State::Closed, State::Open),
            (name.clone(), State::Open, State::HalfOpen),
            (name.clone(), State::HalfOpen, State::Closed),
            (name.clone(), State::Closed, State::Open),
        ]
    );
    assert_eq!(
        *sink.calls.lock(),
        vec![
            CallOutcome::Failure(FailureKind::Upstream),
            CallOutcome::Success,
            CallOutcome::Failure(FailureKind::Upstream),
        ]
    );
    assert_eq!(sink.fallbacks.load(Ordering::SeqCst), 1);
    assert_eq!(half_opened.load(Ordering::SeqCst), 1);
}

#[test]
fn test_resolve_returns_same_instance() {
    let registry = BreakerRegistry::new();

    let first = registry.resolve("database");
    let second = registry.resolve("database");
    let other = registry.resolve("email-provider");

    assert!(Arc::ptr_eq(&first, &second));
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_config_is_fixed_at_first_resolve() {
    let registry = BreakerRegistry::new();
    let first = registry.resolve_with("geocoder", config(2, 1));
    let again = registry.resolve_with("geocoder", config(9, 9));

    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(again.config().failure_threshold(), 2);
}

#[test]
fn test_unknown_name_gets_default_config() {
    let registry = BreakerRegistry::new();
    assert!(registry.get("search-index").is_none());

    let breaker = registry.resolve("search-index");
    assert_eq!(*breaker.config(), BreakerConfig::default());
    assert_eq!(breaker.state(), State::Closed);
}

#[test]
fn test_known_dependencies_are_preregistered() {
    let registry = BreakerRegistry::with_known_dependencies();

    let expected: Vec<String> = {
        let mut names: Vec<String> = Dependency::ALL.iter().map(|d| d.to_string()).collect();
        names.sort();
        names
    };
    assert_eq!(registry.names(), expected);

    for dep in Dependency::ALL {
        let breaker = registry.get(dep).unwrap();
        assert_eq!(*breaker.config(), dep.default_config());
    }
}

#[test]
fn test_builder_register_wins_over_profile() {
    let registry = BreakerRegistry::builder()
        .register("database", config(1, 1))
        .known_dependencies()
        .build();

    let db = registry.get(Dependency::Database).unwrap();
    assert_eq!(db.config().failure_threshold(), 1);
    assert_eq!(registry.len(), Dependency::ALL.len());
}

#[tokio::test(start_paused = true)]
async fn test_all_states_and_reset_all() {
    let registry = BreakerRegistry::builder()
        .register("database", config(1, 1))
        .register("sms-provider", config(1, 1))
        .build();

    let _ = fail(&registry, "sms-provider").await;

    let states = registry.all_states();
    assert_eq!(
        states.into_iter().collect::<Vec<_>>(),
        vec![
            ("database".to_string(), State::Closed),
            ("sms-provider".to_string(), State::Open),
        ]
    );

    registry.reset_all();
    registry.reset_all();

    for snapshot in registry.snapshots() {
        assert_eq!(snapshot.state, State::Closed);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(snapshot.consecutive_successes, 0);
        assert_eq!(snapshot.next_attempt, None);
    }
    // Lifetime totals survive a reset.
    let totals = registry.resolve("sms-provider").snapshot().totals;
    assert_eq!(totals.failures, 1);
    assert_ok!(succeed(&registry, "sms-provider").await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_open_once() {
    let hooks = HookRegistry::new();
    let opened = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&opened);
    hooks.on_open(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let failing = BreakerConfig::builder()
        .failure_threshold(5)
        .reset_timeout(Duration::from_secs(600))
        .build()
        .unwrap();
    let registry = Arc::new(
        BreakerRegistry::builder()
            .hooks(hooks)
            .register("payment-processor", failing)
            .build(),
    );

    let mut handles = Vec::new();
    for i in 0..32 {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            registry
                .execute("payment-processor", || async move {
                    tokio::task::yield_now().await;
                    Err::<(), _>(TestError(format!("declined #{}", i)))
                })
                .await
        }));
    }

    let mut rejected = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap_err().is_open() {
            rejected += 1;
        }
    }

    let snapshot = registry.resolve("payment-processor").snapshot();
    assert_eq!(snapshot.state, State::Open);
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(snapshot.totals.rejections, rejected);
    assert_eq!(snapshot.totals.calls + rejected, 32);
}

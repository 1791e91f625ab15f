//! # circuit-registry
//!
//! Named circuit breakers that guard every outbound call to an unreliable
//! external dependency: the database, the payment processor, the SMS and
//! email providers, object storage and the completion API.
//!
//! ## How it works
//!
//! Each dependency name maps to exactly one breaker held by a
//! [`BreakerRegistry`]. A breaker counts consecutive outcomes:
//!
//! - **Closed**: calls go through. `failure_threshold` consecutive failures
//!   open the breaker; any success clears the streak.
//! - **Open**: calls are rejected without being attempted until
//!   `reset_timeout` has passed. The first call after that moves the breaker
//!   to half-open and goes through as a trial call.
//! - **Half-Open**: calls go through. `success_threshold` consecutive
//!   successes close the breaker; a single failure opens it again.
//!
//! Every attempted call races `call_timeout`. A timeout counts as a failure
//! just like an error returned by the call.
//!
//! ## Basic Usage
//!
//! ```rust
//! use circuit_registry::{BreakerRegistry, Dependency};
//!
//! # async fn fetch_listing(id: u64) -> Result<String, std::io::Error> {
//! #     Ok(format!("listing {}", id))
//! # }
//! # tokio_test::block_on(async {
//! // Built once at startup and shared with every call site.
//! let registry = BreakerRegistry::with_known_dependencies();
//!
//! let listing = registry
//!     .execute_or_else(
//!         Dependency::Database,
//!         || fetch_listing(42),
//!         |_err| "listing unavailable".to_string(),
//!     )
//!     .await;
//! assert_eq!(listing, "listing 42");
//! # });
//! ```
//!
//! Without a fallback the caller gets a [`BreakerError`], which tells an open
//! breaker or a timeout ([`BreakerError::is_unavailable`]) apart from an
//! error returned by the dependency.
//!
//! ## Features
//!
//! - `prometheus` - Prometheus metrics integration

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod breaker;
mod config;
mod dependencies;
mod error;
mod hook;
mod metrics;
pub mod prelude;
mod registry;
mod settings;
mod state;

// Re-exports
pub use breaker::{BreakerSnapshot, CircuitBreaker};
pub use config::{BreakerConfig, BreakerConfigBuilder};
pub use dependencies::Dependency;
pub use error::{BreakerError, BreakerResult, ConfigError, FailureKind};
pub use hook::HookRegistry;
#[cfg(feature = "prometheus")]
pub use metrics::PrometheusSink;
pub use metrics::{CallOutcome, CallTotals, MetricSink, NullMetricSink};
pub use registry::{BreakerRegistry, RegistryBuilder};
pub use settings::{BreakerOverrides, RegistrySettings, SettingsError};
pub use state::State;

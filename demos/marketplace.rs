//! Marketplace call-site example
//!
//! This example demonstrates:
//! 1. Building the registry once at startup, optionally from TOML settings
//! 2. Guarding payment and completion calls with fallbacks
//! 3. Watching transitions through hooks and `tracing`
//! 4. Reading `all_states` for a health check
//!
//! Run with `RUST_LOG=debug cargo run --example marketplace` for full logs.

use circuit_registry::prelude::*;
use circuit_registry::{HookRegistry, RegistrySettings};
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// Custom error type that implements Error trait
#[derive(Debug)]
struct ServiceError(String);

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service error: {}", self.0)
    }
}

impl Error for ServiceError {}

const SETTINGS: &str = r#"
[dependencies.payment-processor]
failure_threshold = 2
reset_timeout_ms = 2000

[dependencies.completion-api]
call_timeout_ms = 300
"#;

// Declines the first few charges, then recovers.
async fn charge_card(attempt: u32) -> Result<String, ServiceError> {
    tokio::time::sleep(Duration::from_millis(20)).await;
    if attempt < 2 {
        Err(ServiceError("card processor returned 503".to_string()))
    } else {
        Ok(format!("charge #{} captured", attempt))
    }
}

// Always slower than the configured completion timeout.
async fn draft_job_description() -> Result<String, ServiceError> {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Ok("Experienced plumber needed for bathroom refit".to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let hooks = HookRegistry::new();
    hooks.on_open(|name| println!("-> {} breaker OPENED", name));
    hooks.on_half_open(|name| println!("-> {} breaker HALF-OPEN", name));
    hooks.on_close(|name| println!("-> {} breaker CLOSED", name));

    let registry = RegistrySettings::from_toml_str(SETTINGS)?
        .into_builder()?
        .hooks(hooks)
        .build();

    println!("=== Payments ===");
    let attempts = AtomicU32::new(0);
    for round in 1..=6 {
        let result = registry
            .execute(Dependency::PaymentProcessor, || {
                charge_card(attempts.fetch_add(1, Ordering::SeqCst))
            })
            .await;

        match result {
            Ok(receipt) => println!("round {}: {}", round, receipt),
            Err(err) if err.is_unavailable() => {
                println!("round {}: payments unavailable, offer retry ({})", round, err);
                tokio::time::sleep(Duration::from_millis(800)).await;
            }
            Err(err) => println!("round {}: charge failed: {}", round, err),
        }
    }

    println!("\n=== Completion API ===");
    for _ in 0..4 {
        let text = registry
            .execute_or_else(Dependency::CompletionApi, draft_job_description, |err| {
                format!("(write your own description; assistant unavailable: {})", err)
            })
            .await;
        println!("{}", text);
    }

    println!("\n=== Health ===");
    for (name, state) in registry.all_states() {
        println!("{:<18} {}", name, state);
    }

    Ok(())
}

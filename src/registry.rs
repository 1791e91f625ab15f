//! Registry of named circuit breakers.
//!
//! The registry is the only way to obtain a breaker. It is constructed once
//! by the application's composition root and handed to every call site,
//! which guarantees one breaker per dependency name.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::breaker::{BreakerSnapshot, CircuitBreaker};
use crate::config::BreakerConfig;
use crate::dependencies::Dependency;
use crate::error::{BreakerError, BreakerResult};
use crate::hook::HookRegistry;
use crate::metrics::{MetricSink, NullMetricSink};
use crate::state::State;

/// Collection of circuit breakers keyed by dependency name.
pub struct BreakerRegistry {
    breakers: RwLock<AHashMap<String, Arc<CircuitBreaker>>>,
    default_config: BreakerConfig,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry>,
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerRegistry {
    /// Creates an empty registry using the default breaker config.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a registry with every [`Dependency`] pre-registered.
    pub fn with_known_dependencies() -> Self {
        let registry = Self::new();
        registry.register_known_dependencies();
        registry
    }

    /// Creates a builder for customizing a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Resolves a breaker for each [`Dependency`] using its profile config.
    ///
    /// Names that already have a breaker keep it.
    pub fn register_known_dependencies(&self) {
        for dep in Dependency::ALL {
            self.resolve_with(dep, dep.default_config());
        }
    }

    /// Returns the breaker for `name`, creating it with the default config
    /// on first use.
    pub fn resolve(&self, name: impl AsRef<str>) -> Arc<CircuitBreaker> {
        self.resolve_with(name, self.default_config)
    }

    /// Returns the breaker for `name`, creating it with `config` on first use.
    ///
    /// A breaker's config is fixed when it is created, so `config` is ignored
    /// if the breaker already exists.
    pub fn resolve_with(
        &self,
        name: impl AsRef<str>,
        config: BreakerConfig,
    ) -> Arc<CircuitBreaker> {
        let name = name.as_ref();
        if let Some(breaker) = self.breakers.read().get(name) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.breakers.write();
        let breaker = breakers.entry(name.to_owned()).or_insert_with(|| {
            tracing::debug!(
                breaker = name,
                failure_threshold = config.failure_threshold(),
                success_threshold = config.success_threshold(),
                call_timeout = ?config.call_timeout(),
                reset_timeout = ?config.reset_timeout(),
                "registered circuit breaker"
            );
            Arc::new(CircuitBreaker::new(
                name,
                config,
                Arc::clone(&self.metric_sink),
                Arc::clone(&self.hooks),
            ))
        });
        Arc::clone(breaker)
    }

    /// Returns the breaker for `name` if one exists, without creating it.
    pub fn get(&self, name: impl AsRef<str>) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(name.as_ref()).cloned()
    }

    /// Get all circuit breaker names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of breakers held.
    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    /// Returns true if no breaker has been created yet.
    pub fn is_empty(&self) -> bool {
        self.breakers.read().is_empty()
    }

    /// The config used for names resolved without an explicit one.
    pub fn default_config(&self) -> &BreakerConfig {
        &self.default_config
    }

    /// Snapshot of every breaker's state, keyed by name.
    pub fn all_states(&self) -> BTreeMap<String, State> {
        self.handles()
            .into_iter()
            .map(|breaker| (breaker.name().to_owned(), breaker.state()))
            .collect()
    }

    /// Detailed snapshot of every breaker, sorted by name.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self
            .handles()
            .into_iter()
            .map(|breaker| breaker.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Forces every breaker to closed with zeroed counters.
    pub fn reset_all(&self) {
        for breaker in self.handles() {
            breaker.reset();
        }
        tracing::info!(breakers = self.len(), "reset all circuit breakers");
    }

    /// Runs `operation` through the breaker for `name`.
    ///
    /// This is the entry point call sites use. See [`CircuitBreaker::call`].
    pub async fn execute<F, Fut, T, E>(
        &self,
        name: impl AsRef<str>,
        operation: F,
    ) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.resolve(name).call(operation).await
    }

    /// Runs `operation` through the breaker for `name`, answering with
    /// `fallback` when it is rejected, fails or times out.
    pub async fn execute_or_else<F, Fut, T, E, Fb>(
        &self,
        name: impl AsRef<str>,
        operation: F,
        fallback: Fb,
    ) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        Fb: FnOnce(BreakerError<E>) -> T,
    {
        self.resolve(name).call_or_else(operation, fallback).await
    }

    /// Like [`execute_or_else`](Self::execute_or_else) with an async fallback.
    pub async fn execute_or_else_async<F, Fut, T, E, Fb, FbFut>(
        &self,
        name: impl AsRef<str>,
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
        self.resolve(name)
            .call_or_else_async(operation, fallback)
            .await
    }

    // Clone the handles out so no breaker lock is taken under the map lock.
    fn handles(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers.read().values().cloned().collect()
    }
}

impl std::fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("breakers", &self.names())
            .field("default_config", &self.default_config)
            .finish()
    }
}

/// Builder for [`BreakerRegistry`].
pub struct RegistryBuilder {
    default_config: BreakerConfig,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry>,
    preregistered: Vec<(String, BreakerConfig)>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            default_config: BreakerConfig::default(),
            metric_sink: Arc::new(NullMetricSink),
            hooks: Arc::new(HookRegistry::new()),
            preregistered: Vec::new(),
        }
    }

    /// Sets the config for names resolved without an explicit one.
    pub fn default_config(mut self, config: BreakerConfig) -> Self {
        self.default_config = config;
        self
    }

    /// Sets a metric sink shared by every breaker.
    pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.metric_sink = Arc::new(sink);
        self
    }

    /// Sets a hook registry shared by every breaker.
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Creates the breaker for `name` up front with `config`.
    pub fn register(mut self, name: impl Into<String>, config: BreakerConfig) -> Self {
        self.preregistered.push((name.into(), config));
        self
    }

    /// Creates a breaker for each [`Dependency`] up front with its profile.
    ///
    /// Explicit [`register`](Self::register) calls made before this one win.
    pub fn known_dependencies(mut self) -> Self {
        for dep in Dependency::ALL {
            self.preregistered
                .push((dep.name().to_owned(), dep.default_config()));
        }
        self
    }

    /// Builds the registry and resolves every pre-registered breaker.
    pub fn build(self) -> BreakerRegistry {
        let registry = BreakerRegistry {
            breakers: RwLock::new(AHashMap::new()),
            default_config: self.default_config,
            metric_sink: self.metric_sink,
            hooks: self.hooks,
        };
        for (name, config) in self.preregistered {
            registry.resolve_with(name, config);
        }
        registry
    }
}

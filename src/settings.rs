//! Breaker settings loaded from TOML.
//!
//! ```toml
//! [defaults]
//! call_timeout_ms = 5000
//!
//! [dependencies.payment-processor]
//! failure_threshold = 2
//! reset_timeout_ms = 120000
//! ```
//!
//! Each table only lists what it changes. Overrides are applied once, when
//! the registry is built, on top of the dependency's profile (or the
//! defaults for names that are not a known [`Dependency`]).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::config::BreakerConfig;
use crate::dependencies::Dependency;
use crate::error::ConfigError;
use crate::registry::{BreakerRegistry, RegistryBuilder};

/// Error type for settings loading.
#[derive(Debug)]
pub enum SettingsError {
    /// The settings file could not be read.
    Io(std::io::Error),
    /// The settings file is not valid TOML or has unknown fields.
    Parse(toml::de::Error),
    /// A merged config is invalid.
    Invalid {
        /// `defaults` or the dependency name.
        section: String,
        /// What was wrong with it.
        source: ConfigError,
    },
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "IO error: {}", e),
            SettingsError::Parse(e) => write!(f, "Parse error: {}", e),
            SettingsError::Invalid { section, source } => {
                write!(f, "Invalid settings for '{}': {}", section, source)
            }
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SettingsError::Io(e) => Some(e),
            SettingsError::Parse(e) => Some(e),
            SettingsError::Invalid { source, .. } => Some(source),
        }
    }
}

/// Partial breaker settings; absent fields keep the base value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakerOverrides {
    /// Consecutive failures that trip the breaker.
    pub failure_threshold: Option<u32>,
    /// Consecutive half-open successes that close it.
    pub success_threshold: Option<u32>,
    /// Per-call timeout in milliseconds.
    pub call_timeout_ms: Option<u64>,
    /// Open-state cooldown in milliseconds.
    pub reset_timeout_ms: Option<u64>,
}

impl BreakerOverrides {
    /// Lays these overrides over `base` and validates the result.
    pub fn apply(&self, base: BreakerConfig) -> Result<BreakerConfig, ConfigError> {
        let mut builder = base.to_builder();
        if let Some(count) = self.failure_threshold {
            builder = builder.failure_threshold(count);
        }
        if let Some(count) = self.success_threshold {
            builder = builder.success_threshold(count);
        }
        if let Some(ms) = self.call_timeout_ms {
            builder = builder.call_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.reset_timeout_ms {
            builder = builder.reset_timeout(Duration::from_millis(ms));
        }
        builder.build()
    }
}

/// Registry-wide settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrySettings {
    /// Overrides for breakers resolved without a profile.
    #[serde(default)]
    pub defaults: BreakerOverrides,
    /// Per-dependency overrides, keyed by breaker name.
    #[serde(default)]
    pub dependencies: BTreeMap<String, BreakerOverrides>,
}

impl RegistrySettings {
    /// Parses settings from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        toml::from_str(content).map_err(SettingsError::Parse)
    }

    /// Loads settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(SettingsError::Io)?;
        Self::from_toml_str(&content)
    }

    /// The config for names with no profile and no entry of their own.
    pub fn default_config(&self) -> Result<BreakerConfig, SettingsError> {
        self.defaults
            .apply(BreakerConfig::default())
            .map_err(|source| SettingsError::Invalid {
                section: "defaults".to_owned(),
                source,
            })
    }

    /// Resolves the final config for every configured name plus every known
    /// dependency.
    pub fn resolved_configs(&self) -> Result<BTreeMap<String, BreakerConfig>, SettingsError> {
        let defaults = self.default_config()?;
        let mut configs: BTreeMap<String, BreakerConfig> = Dependency::ALL
            .into_iter()
            .map(|dep| (dep.name().to_owned(), dep.default_config()))
            .collect();

        for (name, overrides) in &self.dependencies {
            let base = Dependency::from_name(name)
                .map(Dependency::default_config)
                .unwrap_or(defaults);
            let config = overrides
                .apply(base)
                .map_err(|source| SettingsError::Invalid {
                    section: name.clone(),
                    source,
                })?;
            configs.insert(name.clone(), config);
        }

        Ok(configs)
    }

    /// Seeds a registry builder with these settings.
    pub fn into_builder(self) -> Result<RegistryBuilder, SettingsError> {
        let mut builder = BreakerRegistry::builder().default_config(self.default_config()?);
        for (name, config) in self.resolved_configs()? {
            builder = builder.register(name, config);
        }
        Ok(builder)
    }

    /// Builds a registry with every configured and known breaker resolved.
    pub fn build_registry(self) -> Result<BreakerRegistry, SettingsError> {
        Ok(self.into_builder()?.build())
    }
}

//! The external collaborators every deployment guards, with their profiles.

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use crate::config::BreakerConfig;

/// A known external dependency with a pre-registered breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    /// The hosted database.
    Database,
    /// The AI completion API.
    CompletionApi,
    /// The payment processor.
    PaymentProcessor,
    /// The SMS provider.
    SmsProvider,
    /// The email provider.
    EmailProvider,
    /// Object storage for uploads.
    ObjectStorage,
}

impl Dependency {
    /// Every known dependency, in registration order.
    pub const ALL: [Dependency; 6] = [
        Dependency::Database,
        Dependency::CompletionApi,
        Dependency::PaymentProcessor,
        Dependency::SmsProvider,
        Dependency::EmailProvider,
        Dependency::ObjectStorage,
    ];

    /// The breaker name call sites use for this dependency.
    pub fn name(self) -> &'static str {
        match self {
            Dependency::Database => "database",
            Dependency::CompletionApi => "completion-api",
            Dependency::PaymentProcessor => "payment-processor",
            Dependency::SmsProvider => "sms-provider",
            Dependency::EmailProvider => "email-provider",
            Dependency::ObjectStorage => "object-storage",
        }
    }

    /// Looks up a known dependency by breaker name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|dep| dep.name() == name)
    }

    /// Thresholds and timeouts tuned for this dependency.
    ///
    /// The completion API is slow and expensive, so it gets a long call
    /// timeout and trips after fewer failures. Payments trip early too.
    pub fn default_config(self) -> BreakerConfig {
        let secs = Duration::from_secs;
        match self {
            Dependency::Database => BreakerConfig::from_parts(5, 2, secs(10), secs(30)),
            Dependency::CompletionApi => BreakerConfig::from_parts(3, 2, secs(60), secs(60)),
            Dependency::PaymentProcessor => BreakerConfig::from_parts(3, 2, secs(30), secs(60)),
            Dependency::SmsProvider => BreakerConfig::from_parts(5, 2, secs(15), secs(60)),
            Dependency::EmailProvider => BreakerConfig::from_parts(5, 2, secs(15), secs(60)),
            Dependency::ObjectStorage => BreakerConfig::from_parts(5, 2, secs(30), secs(30)),
        }
    }
}

impl AsRef<str> for Dependency {
    fn as_ref(&self) -> &str {
        self.name()
    }
}

impl Display for Dependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

//! Re-exports the types call sites need.
//!
//! # Example
//! ```rust,no_run
//! use circuit_registry::prelude::*;
//! ```

pub use crate::{BreakerError, BreakerRegistry, BreakerResult, Dependency, State};

//! E2E test harness for reindex runs.
//!
//! This module contains test infrastructure with builders, variants and
//! methods that not every scenario uses.

#![allow(dead_code)]

pub mod scenario;
pub mod steps;

// Re-export commonly used types
pub use assertions::Assertion;
pub use database::Build;
pub use scenario::Scenario;

//! In-memory providers for testing purpose.
pub mod metrics;

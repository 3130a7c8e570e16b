//! # Utility Modules
//!
//! Supporting utilities shared by the chain and the registry.
//!
//! ## Components
//! - **Metrics**: Thread-safe observability counters and an operation timer

pub mod metrics;

pub use metrics::{Metrics, MetricsSnapshot, Timer};

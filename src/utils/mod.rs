//! # Utility Modules
//!
//! Supporting utilities for logging and metrics.
//!
//! ## Components
//! - **Logging**: Structured logging configuration
//! - **Metrics**: Thread-safe observability counters

pub mod logging;
pub mod metrics;

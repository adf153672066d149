//! Infrastructure - configuration and metrics
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults)
//! - `metrics` - Lock-free metrics collection
//! - `shutdown` - Waiting on the shutdown broadcast

pub mod config;
pub mod metrics;
pub mod shutdown;

// Re-export commonly used types
pub use config::{Config, TrackingConfig};
pub use metrics::Metrics;

//! Provider registry module.
//!
//! This module provides orchestration for data providers, including:
//! - Provider registration and priority ordering per data type
//! - Failover with bounded concurrency and optional retries
//! - Circuit breaking for fault tolerance
//! - A bounded history of provider attempts

mod breaker_registry;
mod circuit_breaker;
mod history;
mod manager;

pub use breaker_registry::CircuitBreakerRegistry;
pub use circuit_breaker::{
    BreakerPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
};
pub use history::{FetchRecord, ManagerStatistics, ProviderUsage, DEFAULT_HISTORY_CAPACITY};
pub use manager::{
    DataSourceManager, ManagerConfig, ProviderConfig, ProviderInfo, DEFAULT_MAX_CONCURRENT,
    MANAGER_SOURCE,
};

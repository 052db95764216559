//! Provider health monitoring.
//!
//! - [`HealthChecker`]: probes providers, classifies them and keeps a bounded
//!   history per provider, optionally on a background interval
//! - [`HealthCheckInterceptor`]: chooses a provider from the latest results

mod checker;
mod interceptor;
mod model;

pub use checker::HealthChecker;
pub use interceptor::HealthCheckInterceptor;
pub use model::{
    HealthCheckConfig, HealthCheckResult, HealthStatistics, HealthStatus, ProviderHealthSummary,
};

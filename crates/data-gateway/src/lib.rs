//! Data Gateway Crate
//!
//! This crate provides resilient request orchestration over redundant,
//! unreliable upstream data providers.
//!
//! # Overview
//!
//! The data gateway supports:
//! - Multiple data types: funds, stocks, bonds, commodities, crypto, news,
//!   sectors, indices, FX
//! - Automatic failover across same-purpose providers
//! - Circuit breaking per data type
//! - Hot backup racing for latency-critical requests
//! - Background health probing with rolling status classification
//! - Request statistics (success rate, average and p50/p95/p99 latency)
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |   DataRequest    |  (symbol, data type, priority, timeout)
//! +------------------+
//!          |
//!          v
//! +------------------+     +------------------+
//! |   DataGateway    | --> | CircuitBreaker   |  (per data type)
//! +------------------+     +------------------+
//!          |
//!          +-------------------------------+
//!          v                               v
//! +------------------+            +------------------+
//! | DataSourceManager|            | HotBackupManager |  (High / Critical)
//! +------------------+            +------------------+
//!          |                               |
//!          v                               v
//! +------------------------------------------------+
//! |  DataProvider (single source or aggregator)    |
//! +------------------------------------------------+
//!          |
//!          v
//! +------------------+
//! |   DataResponse   |  (+ GatewayStats)
//! +------------------+
//! ```
//!
//! [`HealthChecker`] runs alongside, probing providers on an interval, and
//! [`HealthCheckInterceptor`] picks a provider from its latest results.
//!
//! # Core Types
//!
//! - [`DataProvider`] - Trait every upstream source implements
//! - [`DataRequest`] / [`DataResponse`] - Gateway contract
//! - [`FetchParams`] / [`FetchResult`] - Provider call contract
//! - [`GatewayError`] - Usage errors; provider failures never surface as errors
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use data_gateway::{DataGateway, DataSourceManager};
//!
//! let manager = Arc::new(DataSourceManager::new());
//! manager.register(Arc::new(EastmoneyFundProvider::new()), None)?;
//! manager.register(Arc::new(SinaFundProvider::new()), None)?;
//!
//! let gateway = DataGateway::new(manager);
//! let response = gateway.get_fund("161725").await?;
//! ```

pub mod aggregator;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod health;
pub mod hot_backup;
pub mod models;
pub mod provider;
pub mod registry;

// Re-export all public types from models
pub use models::{
    BatchDataRequest, BatchDataResponse, DataRequest, DataResponse, DataType, FetchParams,
    FetchResult, RequestPriority, ResponseStatus,
};

pub use errors::{GatewayError, ProviderError, RetryClass};

// Re-export provider types
pub use provider::{DataProvider, ProviderCounters, ProviderStats};

// Re-export orchestration types
pub use aggregator::{LoadBalancedAggregator, SameSourceAggregator};
pub use config::GatewaySettings;
pub use gateway::{DataGateway, GatewayConfig, GatewayStatsReport};
pub use health::{HealthCheckConfig, HealthCheckInterceptor, HealthChecker, HealthStatus};
pub use hot_backup::{BackupCall, HotBackupConfig, HotBackupManager, HotBackupResult, RaceMode};
pub use registry::{
    BreakerPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
    DataSourceManager, ManagerConfig, ProviderConfig,
};

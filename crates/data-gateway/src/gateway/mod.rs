//! Gateway layer: [`DataGateway`] and its statistics.

mod service;
mod stats;

pub use service::{
    DataGateway, GatewayConfig, GatewayStatsReport, DEFAULT_MAX_BATCH_CONCURRENCY, META_HOT_BACKUP,
};
pub use stats::{percentile, DataTypeCounters, GatewayStats, GatewayStatsSnapshot, LATENCY_WINDOW};

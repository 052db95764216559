//! Gateway request statistics.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::models::{DataResponse, DataType, ResponseStatus};

/// Number of recent latencies kept for percentiles.
pub const LATENCY_WINDOW: usize = 1000;

/// Counters of one data type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTypeCounters {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Point-in-time view of [`GatewayStats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayStatsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub fallback_requests: u64,
    pub circuit_breaker_rejections: u64,
    pub timeouts: u64,
    pub success_rate: f64,
    /// Latency figures cover requests that reached a provider; circuit
    /// rejections are counted but not timed.
    pub avg_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub by_data_type: BTreeMap<DataType, DataTypeCounters>,
}

#[derive(Debug, Default)]
struct StatsInner {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    fallback_requests: u64,
    circuit_breaker_rejections: u64,
    timeouts: u64,
    timed_requests: u64,
    total_latency_ms: f64,
    recent_latencies: VecDeque<f64>,
    by_data_type: BTreeMap<DataType, DataTypeCounters>,
}

/// Cumulative gateway counters plus a window of recent latencies.
#[derive(Debug, Default)]
pub struct GatewayStats {
    inner: Mutex<StatsInner>,
}

impl GatewayStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_inner(&self) -> MutexGuard<'_, StatsInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("Gateway stats mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Count one finished request.
    pub fn record(&self, data_type: DataType, response: &DataResponse) {
        let mut inner = self.lock_inner();

        inner.total_requests += 1;
        if response.success {
            inner.successful_requests += 1;
        } else {
            inner.failed_requests += 1;
        }
        if response.fallback_used {
            inner.fallback_requests += 1;
        }
        if response.status == ResponseStatus::Timeout {
            inner.timeouts += 1;
        }
        if response.is_circuit_rejection() {
            inner.circuit_breaker_rejections += 1;
        } else {
            inner.timed_requests += 1;
            inner.total_latency_ms += response.latency_ms;
            if inner.recent_latencies.len() == LATENCY_WINDOW {
                inner.recent_latencies.pop_front();
            }
            inner.recent_latencies.push_back(response.latency_ms);
        }

        let counters = inner.by_data_type.entry(data_type).or_default();
        counters.requests += 1;
        if response.success {
            counters.successes += 1;
        } else {
            counters.failures += 1;
        }
    }

    pub fn snapshot(&self) -> GatewayStatsSnapshot {
        let inner = self.lock_inner();

        let mut sorted: Vec<f64> = inner.recent_latencies.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        let success_rate = if inner.total_requests == 0 {
            0.0
        } else {
            inner.successful_requests as f64 / inner.total_requests as f64
        };
        let avg_latency_ms = if inner.timed_requests == 0 {
            0.0
        } else {
            inner.total_latency_ms / inner.timed_requests as f64
        };

        GatewayStatsSnapshot {
            total_requests: inner.total_requests,
            successful_requests: inner.successful_requests,
            failed_requests: inner.failed_requests,
            fallback_requests: inner.fallback_requests,
            circuit_breaker_rejections: inner.circuit_breaker_rejections,
            timeouts: inner.timeouts,
            success_rate,
            avg_latency_ms,
            p50_latency_ms: percentile(&sorted, 50.0),
            p95_latency_ms: percentile(&sorted, 95.0),
            p99_latency_ms: percentile(&sorted, 99.0),
            by_data_type: inner.by_data_type.clone(),
        }
    }

    pub fn reset(&self) {
        *self.lock_inner() = StatsInner::default();
    }
}

/// Nearest-rank percentile of an ascending slice; 0 when empty.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    let index = rank.clamp(1, sorted.len()) - 1;
    sorted[index]
}

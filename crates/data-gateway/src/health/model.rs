//! Provider health models.
//!
//! This module contains the data structures of the health checker:
//! - Health status classification
//! - Per-check results
//! - Configuration for check thresholds
//! - Aggregated statistics

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Health Status
// =============================================================================

/// Classification of a provider after a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[derive(Default)]
pub enum HealthStatus {
    /// Probe succeeded within the response time budget.
    Healthy,
    /// Probe succeeded slowly, or reported unhealthy fewer times than the threshold.
    Degraded,
    /// Probe errored or timed out, or failed repeatedly.
    Unhealthy,
    /// Never checked.
    #[default]
    Unknown,
}

impl HealthStatus {
    /// Returns the string representation of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Degraded => "DEGRADED",
            HealthStatus::Unhealthy => "UNHEALTHY",
            HealthStatus::Unknown => "UNKNOWN",
        }
    }

    /// Whether traffic may still be routed to the provider.
    pub fn is_usable(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Check Result
// =============================================================================

/// Outcome of one probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub provider_name: String,
    pub status: HealthStatus,
    pub response_time_ms: f64,
    /// Failed probes in a row, including this one.
    pub consecutive_error_count: u32,
    pub last_check_time: DateTime<Utc>,
    pub message: Option<String>,
}

// =============================================================================
// Configuration
// =============================================================================

/// Default interval between background checks.
const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Default per-probe timeout.
const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Probes slower than this are degraded.
const DEFAULT_MAX_RESPONSE_TIME_MS: u64 = 5000;

const DEFAULT_CONSECUTIVE_FAILURE_THRESHOLD: u32 = 3;

const DEFAULT_HEALTH_HISTORY_CAPACITY: usize = 100;

/// Health checker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckConfig {
    pub check_interval: Duration,
    pub timeout: Duration,
    pub max_response_time_ms: u64,
    /// Failed probes in a row before a provider is unhealthy.
    pub consecutive_failure_threshold: u32,
    /// Results kept per provider.
    pub history_capacity: usize,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            timeout: DEFAULT_CHECK_TIMEOUT,
            max_response_time_ms: DEFAULT_MAX_RESPONSE_TIME_MS,
            consecutive_failure_threshold: DEFAULT_CONSECUTIVE_FAILURE_THRESHOLD,
            history_capacity: DEFAULT_HEALTH_HISTORY_CAPACITY,
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Health summary of one provider over its retained history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealthSummary {
    pub status: HealthStatus,
    pub avg_response_time_ms: f64,
    /// Share of retained checks that were healthy or degraded.
    pub availability: f64,
    pub checks: usize,
    pub consecutive_error_count: u32,
    pub last_check_time: Option<DateTime<Utc>>,
}

/// Health summary of every tracked provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthStatistics {
    pub total_providers: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub unknown: usize,
    pub providers: BTreeMap<String, ProviderHealthSummary>,
}

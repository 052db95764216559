//! Bounded record of provider attempts made by the manager.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::models::DataType;

/// Default number of attempts kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// One provider attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRecord {
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub data_type: DataType,
    pub success: bool,
    pub error: Option<String>,
    pub latency_ms: f64,
}

/// Usage of one provider over the retained history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub avg_latency_ms: f64,
}

/// Aggregate view over the retained history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagerStatistics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub providers: BTreeMap<String, ProviderUsage>,
    pub registered_providers: usize,
}

/// Ring of the most recent attempts. The oldest entry is dropped first.
#[derive(Debug)]
pub struct FetchHistory {
    capacity: usize,
    records: Mutex<VecDeque<FetchRecord>>,
}

impl FetchHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    fn lock_records(&self) -> MutexGuard<'_, VecDeque<FetchRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| {
            warn!("Fetch history mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn push(&self, record: FetchRecord) {
        let mut records = self.lock_records();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<FetchRecord> {
        self.lock_records().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock_records().clear();
    }

    pub fn statistics(&self, registered_providers: usize) -> ManagerStatistics {
        let records = self.lock_records();

        let mut stats = ManagerStatistics {
            registered_providers,
            ..Default::default()
        };
        let mut latency_totals: BTreeMap<String, f64> = BTreeMap::new();

        for record in records.iter() {
            stats.total_requests += 1;
            let usage = stats.providers.entry(record.provider.clone()).or_default();
            usage.requests += 1;
            if record.success {
                stats.successful_requests += 1;
                usage.successes += 1;
            } else {
                stats.failed_requests += 1;
                usage.failures += 1;
            }
            *latency_totals.entry(record.provider.clone()).or_default() += record.latency_ms;
        }

        for (name, usage) in stats.providers.iter_mut() {
            if let Some(total) = latency_totals.get(name) {
                usage.avg_latency_ms = total / usage.requests as f64;
            }
        }

        if stats.total_requests > 0 {
            stats.success_rate = stats.successful_requests as f64 / stats.total_requests as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(provider: &str, success: bool, latency_ms: f64) -> FetchRecord {
        FetchRecord {
            timestamp: Utc::now(),
            provider: provider.to_string(),
            data_type: DataType::Fund,
            success,
            error: (!success).then(|| "boom".to_string()),
            latency_ms,
        }
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let history = FetchHistory::new(3);
        for i in 0..5 {
            history.push(record(&format!("P{}", i), true, 1.0));
        }

        let names: Vec<_> = history.snapshot().into_iter().map(|r| r.provider).collect();
        assert_eq!(names, vec!["P2", "P3", "P4"]);
    }

    #[test]
    fn test_statistics() {
        let history = FetchHistory::new(DEFAULT_HISTORY_CAPACITY);
        history.push(record("P1", false, 10.0));
        history.push(record("P2", true, 20.0));
        history.push(record("P2", true, 40.0));

        let stats = history.statistics(2);
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.failed_requests, 1);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.providers["P2"].successes, 2);
        assert!((stats.providers["P2"].avg_latency_ms - 30.0).abs() < 1e-9);
        assert_eq!(stats.registered_providers, 2);
    }

    #[test]
    fn test_empty_statistics() {
        let stats = FetchHistory::new(10).statistics(0);
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.success_rate, 0.0);
    }
}

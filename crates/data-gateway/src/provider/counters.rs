use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Snapshot of a provider's request counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderStats {
    pub requests: u64,
    pub errors: u64,
    pub error_rate: f64,
}

/// Lock-free request/error counters a provider can embed.
#[derive(Debug, Default)]
pub struct ProviderCounters {
    requests: AtomicU64,
    errors: AtomicU64,
}

impl ProviderCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, success: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> ProviderStats {
        let requests = self.requests.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        ProviderStats {
            requests,
            errors,
            error_rate: if requests == 0 {
                0.0
            } else {
                errors as f64 / requests as f64
            },
        }
    }

    pub fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_error_rate() {
        let counters = ProviderCounters::new();
        assert_eq!(counters.snapshot().error_rate, 0.0);

        counters.record(true);
        counters.record(false);
        counters.record(true);
        counters.record(false);

        let stats = counters.snapshot();
        assert_eq!(stats.requests, 4);
        assert_eq!(stats.errors, 2);
        assert!((stats.error_rate - 0.5).abs() < f64::EPSILON);

        counters.reset();
        assert_eq!(counters.snapshot().requests, 0);
    }
}

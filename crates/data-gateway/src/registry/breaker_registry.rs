//! Keyed collection of circuit breakers.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{info, warn};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};

/// Registry of circuit breakers keyed by name.
///
/// A breaker is created on first use and lives as long as the registry;
/// every lookup for the same key returns the same `Arc`.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    default_config: CircuitBreakerConfig,
    overrides: HashMap<String, CircuitBreakerConfig>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerRegistry {
    /// Create a registry whose breakers use the default configuration.
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a registry whose breakers use `config` unless overridden.
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            default_config: config,
            overrides: HashMap::new(),
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Use a dedicated configuration for one key.
    ///
    /// Only affects breakers created after the call.
    pub fn with_override(mut self, key: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        self.overrides.insert(key.into(), config);
        self
    }

    pub fn default_config(&self) -> &CircuitBreakerConfig {
        &self.default_config
    }

    fn lock_breakers(&self) -> MutexGuard<'_, HashMap<String, Arc<CircuitBreaker>>> {
        self.breakers.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker registry mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Get the breaker for `key`, creating it if needed.
    pub fn get_or_create(&self, key: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.lock_breakers();
        if let Some(breaker) = breakers.get(key) {
            return Arc::clone(breaker);
        }

        let config = self
            .overrides
            .get(key)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone());
        let breaker = Arc::new(CircuitBreaker::with_config(key, config));
        breakers.insert(key.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Get the breaker for `key` if it exists.
    pub fn get(&self, key: &str) -> Option<Arc<CircuitBreaker>> {
        self.lock_breakers().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock_breakers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_breakers().is_empty()
    }

    /// Current state of every breaker.
    pub fn all_states(&self) -> BTreeMap<String, CircuitState> {
        self.snapshot()
            .into_iter()
            .map(|breaker| (breaker.name().to_string(), breaker.state()))
            .collect()
    }

    /// Stats of every breaker.
    pub fn all_stats(&self) -> BTreeMap<String, CircuitBreakerStats> {
        self.snapshot()
            .into_iter()
            .map(|breaker| (breaker.name().to_string(), breaker.stats()))
            .collect()
    }

    /// Reset every breaker to Closed.
    pub fn reset_all(&self) {
        let breakers = self.snapshot();
        info!("Circuit breaker registry: resetting {} breakers", breakers.len());
        for breaker in breakers {
            breaker.reset();
        }
    }

    // Clone the Arcs out so per-breaker locks are never taken under the map lock.
    fn snapshot(&self) -> Vec<Arc<CircuitBreaker>> {
        self.lock_breakers().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_get_or_create_returns_same_breaker() {
        let registry = CircuitBreakerRegistry::new();
        let a = registry.get_or_create("fund");
        let b = registry.get_or_create("fund");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        a.record_failure();
        assert_eq!(b.failure_count(), 1);
    }

    #[test]
    fn test_keys_are_independent() {
        let registry = CircuitBreakerRegistry::with_config(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });

        registry.get_or_create("fund").record_failure();

        let states = registry.all_states();
        assert_eq!(states.get("fund"), Some(&CircuitState::Open));
        assert!(registry.get_or_create("stock").can_execute());
        assert!(registry.get("bond").is_none());
    }

    #[test]
    fn test_override_applies_to_key() {
        let registry = CircuitBreakerRegistry::new().with_override(
            "crypto",
            CircuitBreakerConfig {
                failure_threshold: 2,
                timeout: Duration::from_secs(5),
                ..Default::default()
            },
        );

        assert_eq!(registry.get_or_create("crypto").config().failure_threshold, 2);
        assert_eq!(registry.get_or_create("fund").config().failure_threshold, 5);
    }

    #[test]
    fn test_reset_all() {
        let registry = CircuitBreakerRegistry::with_config(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        registry.get_or_create("fund").record_failure();
        registry.get_or_create("news").record_failure();

        registry.reset_all();

        let stats = registry.all_stats();
        assert_eq!(stats.len(), 2);
        assert!(stats.values().all(|s| s.state == CircuitState::Closed));
        assert_eq!(stats["fund"].times_opened, 0);
    }
}

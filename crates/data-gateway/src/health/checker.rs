//! Provider health probing.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::model::{
    HealthCheckConfig, HealthCheckResult, HealthStatistics, HealthStatus, ProviderHealthSummary,
};
use crate::errors::GatewayError;
use crate::provider::{elapsed_ms, DataProvider};

const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
struct ProviderHealth {
    consecutive_errors: u32,
    history: VecDeque<HealthCheckResult>,
}

/// Probes providers and classifies their health.
///
/// Results are kept per provider in a bounded history. A background loop can
/// re-check a fixed set of providers on an interval.
#[derive(Debug)]
pub struct HealthChecker {
    config: HealthCheckConfig,
    records: Mutex<HashMap<String, ProviderHealth>>,
    running: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(HealthCheckConfig::default())
    }
}

impl HealthChecker {
    pub fn new(config: HealthCheckConfig) -> Self {
        Self {
            config,
            records: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    fn lock_records(&self) -> MutexGuard<'_, HashMap<String, ProviderHealth>> {
        self.records.lock().unwrap_or_else(|poisoned| {
            warn!("Health records mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|poisoned| {
            warn!("Health task mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Probe one provider and record the result.
    ///
    /// - `Ok(true)` within `max_response_time_ms`: Healthy, error streak reset
    /// - `Ok(true)` but slower: Degraded, error streak unchanged
    /// - `Ok(false)`: streak + 1, Unhealthy once it reaches the threshold
    /// - error or timeout: streak + 1, Unhealthy
    pub async fn check_source(&self, provider: &dyn DataProvider) -> HealthCheckResult {
        let name = provider.name().to_string();
        let started = Instant::now();
        let probe = tokio::time::timeout(self.config.timeout, provider.health_check()).await;
        let response_time_ms = elapsed_ms(started);

        let threshold = self.config.consecutive_failure_threshold.max(1);
        let max_response_time_ms = self.config.max_response_time_ms as f64;

        let mut records = self.lock_records();
        let entry = records.entry(name.clone()).or_default();
        let previous = entry
            .history
            .back()
            .map(|result| result.status)
            .unwrap_or_default();

        let (status, message) = match probe {
            Ok(Ok(true)) if response_time_ms <= max_response_time_ms => {
                entry.consecutive_errors = 0;
                (HealthStatus::Healthy, None)
            }
            Ok(Ok(true)) => (
                HealthStatus::Degraded,
                Some(format!(
                    "Slow response: {:.0}ms exceeds {:.0}ms",
                    response_time_ms, max_response_time_ms
                )),
            ),
            Ok(Ok(false)) => {
                entry.consecutive_errors += 1;
                let status = if entry.consecutive_errors >= threshold {
                    HealthStatus::Unhealthy
                } else {
                    HealthStatus::Degraded
                };
                (status, Some("Health check reported unhealthy".to_string()))
            }
            Ok(Err(e)) => {
                entry.consecutive_errors += 1;
                (HealthStatus::Unhealthy, Some(e.to_string()))
            }
            Err(_) => {
                entry.consecutive_errors += 1;
                (
                    HealthStatus::Unhealthy,
                    Some(format!("Health check timed out after {:?}", self.config.timeout)),
                )
            }
        };

        let result = HealthCheckResult {
            provider_name: name.clone(),
            status,
            response_time_ms,
            consecutive_error_count: entry.consecutive_errors,
            last_check_time: Utc::now(),
            message,
        };

        if entry.history.len() >= self.config.history_capacity.max(1) {
            entry.history.pop_front();
        }
        entry.history.push_back(result.clone());

        if status != previous {
            info!("Health: provider '{}' changed from {} to {}", name, previous, status);
        } else {
            debug!("Health: provider '{}' is {} ({:.1}ms)", name, status, response_time_ms);
        }

        result
    }

    /// Probe every provider concurrently.
    pub async fn check_all_sources(
        &self,
        providers: &[Arc<dyn DataProvider>],
    ) -> BTreeMap<String, HealthCheckResult> {
        join_all(providers.iter().map(|provider| self.check_source(provider.as_ref())))
            .await
            .into_iter()
            .map(|result| (result.provider_name.clone(), result))
            .collect()
    }

    /// Start re-checking `providers` every `check_interval`.
    ///
    /// The first round runs immediately. Fails if a loop is already running.
    pub fn start_background_check(
        self: &Arc<Self>,
        providers: Vec<Arc<dyn DataProvider>>,
    ) -> Result<(), GatewayError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Health: background check already running, ignoring start");
            return Err(GatewayError::HealthCheckAlreadyRunning);
        }

        let checker = Arc::clone(self);
        let period = self.config.check_interval.max(MIN_CHECK_INTERVAL);
        let handle = tokio::spawn(async move {
            info!(
                "Health: background check started for {} providers ({:?} interval)",
                providers.len(),
                period
            );

            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if !checker.running.load(Ordering::SeqCst) {
                    break;
                }
                checker.check_all_sources(&providers).await;
            }
        });

        *self.lock_task() = Some(handle);
        Ok(())
    }

    /// Stop the background loop. Returns whether one was running.
    pub fn stop_background_check(&self) -> bool {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        if let Some(handle) = self.lock_task().take() {
            handle.abort();
        }
        if was_running {
            info!("Health: background check stopped");
        }
        was_running
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Latest status, `Unknown` if never checked.
    pub fn status(&self, name: &str) -> HealthStatus {
        self.latest(name)
            .map(|result| result.status)
            .unwrap_or_default()
    }

    pub fn latest(&self, name: &str) -> Option<HealthCheckResult> {
        self.lock_records()
            .get(name)
            .and_then(|entry| entry.history.back().cloned())
    }

    /// Retained results, oldest first.
    pub fn history(&self, name: &str) -> Vec<HealthCheckResult> {
        self.lock_records()
            .get(name)
            .map(|entry| entry.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn statistics(&self) -> HealthStatistics {
        let records = self.lock_records();
        let mut stats = HealthStatistics {
            total_providers: records.len(),
            ..Default::default()
        };

        for (name, entry) in records.iter() {
            let status = entry
                .history
                .back()
                .map(|result| result.status)
                .unwrap_or_default();
            match status {
                HealthStatus::Healthy => stats.healthy += 1,
                HealthStatus::Degraded => stats.degraded += 1,
                HealthStatus::Unhealthy => stats.unhealthy += 1,
                HealthStatus::Unknown => stats.unknown += 1,
            }

            let checks = entry.history.len();
            let (avg_response_time_ms, availability) = if checks == 0 {
                (0.0, 0.0)
            } else {
                let total: f64 = entry.history.iter().map(|r| r.response_time_ms).sum();
                let usable = entry.history.iter().filter(|r| r.status.is_usable()).count();
                (total / checks as f64, usable as f64 / checks as f64)
            };

            stats.providers.insert(
                name.clone(),
                ProviderHealthSummary {
                    status,
                    avg_response_time_ms,
                    availability,
                    checks,
                    consecutive_error_count: entry.consecutive_errors,
                    last_check_time: entry.history.back().map(|r| r.last_check_time),
                },
            );
        }

        stats
    }
}

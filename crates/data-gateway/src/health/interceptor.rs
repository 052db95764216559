use std::sync::Arc;

use log::debug;

use super::checker::HealthChecker;
use super::model::HealthStatus;
use crate::provider::DataProvider;

/// Picks a provider using the checker's latest results.
pub struct HealthCheckInterceptor {
    checker: Arc<HealthChecker>,
}

impl HealthCheckInterceptor {
    pub fn new(checker: Arc<HealthChecker>) -> Self {
        Self { checker }
    }

    pub fn checker(&self) -> &Arc<HealthChecker> {
        &self.checker
    }

    /// The fastest healthy candidate, else the first degraded one.
    ///
    /// Candidates never checked, or unhealthy, are never returned.
    pub fn get_healthy_source(
        &self,
        candidates: &[Arc<dyn DataProvider>],
    ) -> Option<Arc<dyn DataProvider>> {
        let mut fastest_healthy: Option<(f64, &Arc<dyn DataProvider>)> = None;
        let mut first_degraded: Option<&Arc<dyn DataProvider>> = None;

        for candidate in candidates {
            let Some(latest) = self.checker.latest(candidate.name()) else {
                continue;
            };
            match latest.status {
                HealthStatus::Healthy => {
                    let faster = fastest_healthy
                        .map(|(best, _)| latest.response_time_ms < best)
                        .unwrap_or(true);
                    if faster {
                        fastest_healthy = Some((latest.response_time_ms, candidate));
                    }
                }
                HealthStatus::Degraded => {
                    first_degraded.get_or_insert(candidate);
                }
                HealthStatus::Unhealthy | HealthStatus::Unknown => {}
            }
        }

        let chosen = fastest_healthy.map(|(_, p)| p).or(first_degraded);
        match chosen {
            Some(provider) => debug!("Health: selected provider '{}'", provider.name()),
            None => debug!(
                "Health: no usable provider among {} candidates",
                candidates.len()
            ),
        }
        chosen.cloned()
    }
}

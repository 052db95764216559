//! Environment-driven settings for every component.
//!
//! Values come from `GATEWAY_*` variables, optionally loaded from a `.env`
//! file. Missing or unparseable values fall back to the component defaults.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::gateway::{DataGateway, GatewayConfig};
use crate::health::{HealthCheckConfig, HealthChecker};
use crate::registry::{CircuitBreakerConfig, DataSourceManager, ManagerConfig};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewaySettings {
    pub manager: ManagerConfig,
    pub gateway: GatewayConfig,
    pub health: HealthCheckConfig,
}

impl GatewaySettings {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let vars = Vars(lookup);

        let manager = ManagerConfig {
            max_concurrent: vars.parse("GATEWAY_MAX_CONCURRENT", defaults.manager.max_concurrent),
            enable_load_balancing: vars.flag(
                "GATEWAY_LOAD_BALANCING",
                defaults.manager.enable_load_balancing,
            ),
            max_retries: vars.parse("GATEWAY_MAX_RETRIES", defaults.manager.max_retries),
            retry_backoff: Duration::from_millis(vars.parse(
                "GATEWAY_RETRY_BACKOFF_MS",
                defaults.manager.retry_backoff.as_millis() as u64,
            )),
            ..defaults.manager
        };

        let circuit_defaults = defaults.gateway.circuit_breaker.clone();
        let circuit_breaker = CircuitBreakerConfig {
            failure_threshold: vars.parse(
                "GATEWAY_CB_FAILURE_THRESHOLD",
                circuit_defaults.failure_threshold,
            ),
            success_threshold: vars.parse(
                "GATEWAY_CB_SUCCESS_THRESHOLD",
                circuit_defaults.success_threshold,
            ),
            timeout: Duration::from_secs(vars.parse(
                "GATEWAY_CB_TIMEOUT_SECS",
                circuit_defaults.timeout.as_secs(),
            )),
            half_open_max_calls: vars.parse(
                "GATEWAY_CB_HALF_OPEN_MAX_CALLS",
                circuit_defaults.half_open_max_calls,
            ),
        };

        let mut hot_backup = defaults.gateway.hot_backup.clone();
        hot_backup.timeout = Duration::from_millis(vars.parse(
            "GATEWAY_HOT_BACKUP_TIMEOUT_MS",
            hot_backup.timeout.as_millis() as u64,
        ));

        let gateway = GatewayConfig {
            enable_circuit_breaker: vars.flag(
                "GATEWAY_CIRCUIT_BREAKER",
                defaults.gateway.enable_circuit_breaker,
            ),
            circuit_breaker,
            enable_hot_backup: vars.flag("GATEWAY_HOT_BACKUP", defaults.gateway.enable_hot_backup),
            hot_backup,
            max_batch_concurrency: vars.parse(
                "GATEWAY_BATCH_CONCURRENCY",
                defaults.gateway.max_batch_concurrency,
            ),
        };

        let health = HealthCheckConfig {
            check_interval: Duration::from_secs(vars.parse(
                "GATEWAY_HEALTH_INTERVAL_SECS",
                defaults.health.check_interval.as_secs(),
            )),
            timeout: Duration::from_millis(vars.parse(
                "GATEWAY_HEALTH_TIMEOUT_MS",
                defaults.health.timeout.as_millis() as u64,
            )),
            max_response_time_ms: vars.parse(
                "GATEWAY_HEALTH_MAX_RESPONSE_MS",
                defaults.health.max_response_time_ms,
            ),
            consecutive_failure_threshold: vars.parse(
                "GATEWAY_HEALTH_FAILURE_THRESHOLD",
                defaults.health.consecutive_failure_threshold,
            ),
            ..defaults.health
        };

        Self {
            manager,
            gateway,
            health,
        }
    }

    /// A gateway over a fresh, empty manager.
    pub fn build_gateway(&self) -> DataGateway {
        let manager = Arc::new(DataSourceManager::with_config(self.manager.clone()));
        DataGateway::with_config(manager, self.gateway.clone())
    }

    pub fn build_health_checker(&self) -> Arc<HealthChecker> {
        Arc::new(HealthChecker::new(self.health.clone()))
    }
}

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_string())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.to_ascii_lowercase()).as_deref() {
            Some("1" | "true" | "yes" | "on") => true,
            Some("0" | "false" | "no" | "off") => false,
            _ => default,
        }
    }
}

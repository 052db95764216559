//! Unified request entry point.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;

use super::stats::{GatewayStats, GatewayStatsSnapshot};
use crate::errors::GatewayError;
use crate::hot_backup::{HotBackupConfig, HotBackupManager, HotBackupStats};
use crate::models::{
    BatchDataRequest, BatchDataResponse, DataRequest, DataResponse, DataType, RequestPriority,
    META_FALLBACK_USED,
};
use crate::provider::elapsed_ms;
use crate::registry::{
    CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerStats, DataSourceManager,
    ManagerStatistics,
};

/// Metadata key set on responses served by a hot-backup race.
pub const META_HOT_BACKUP: &str = "hot_backup";

/// Default cap on concurrent requests within one parallel batch.
pub const DEFAULT_MAX_BATCH_CONCURRENCY: usize = 50;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Guard each data type with a circuit breaker.
    pub enable_circuit_breaker: bool,
    pub circuit_breaker: CircuitBreakerConfig,
    /// Race candidates for `High` and `Critical` requests.
    pub enable_hot_backup: bool,
    pub hot_backup: HotBackupConfig,
    pub max_batch_concurrency: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enable_circuit_breaker: true,
            circuit_breaker: CircuitBreakerConfig::default(),
            enable_hot_backup: false,
            hot_backup: HotBackupConfig::default(),
            max_batch_concurrency: DEFAULT_MAX_BATCH_CONCURRENCY,
        }
    }
}

/// Everything [`DataGateway::get_stats`] reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayStatsReport {
    pub gateway: GatewayStatsSnapshot,
    /// Present when circuit breaking is enabled.
    pub circuit_breakers: Option<BTreeMap<String, CircuitBreakerStats>>,
    pub manager: ManagerStatistics,
    /// Present when hot backup is enabled.
    pub hot_backup: Option<HotBackupStats>,
}

/// Single entry point for data requests.
///
/// Wraps the [`DataSourceManager`] with per-data-type circuit breaking, an
/// overall request timeout, optional hot-backup racing and statistics.
pub struct DataGateway {
    config: GatewayConfig,
    manager: Arc<DataSourceManager>,
    breakers: Arc<CircuitBreakerRegistry>,
    hot_backup: HotBackupManager,
    stats: GatewayStats,
    batch_semaphore: Semaphore,
}

impl DataGateway {
    pub fn new(manager: Arc<DataSourceManager>) -> Self {
        Self::with_config(manager, GatewayConfig::default())
    }

    pub fn with_config(manager: Arc<DataSourceManager>, config: GatewayConfig) -> Self {
        let breakers = CircuitBreakerRegistry::with_config(config.circuit_breaker.clone());
        Self::with_breakers(manager, config, Arc::new(breakers))
    }

    /// Use an existing breaker registry, e.g. one with per-type overrides.
    pub fn with_breakers(
        manager: Arc<DataSourceManager>,
        config: GatewayConfig,
        breakers: Arc<CircuitBreakerRegistry>,
    ) -> Self {
        Self {
            hot_backup: HotBackupManager::new(config.hot_backup.clone()),
            batch_semaphore: Semaphore::new(config.max_batch_concurrency.max(1)),
            stats: GatewayStats::new(),
            config,
            manager,
            breakers,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<DataSourceManager> {
        &self.manager
    }

    pub fn circuit_breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Serve one request.
    ///
    /// Provider failures, breaker rejections and timeouts all come back as
    /// `Ok` responses with `success = false`. Only an unregistered data type
    /// is an error.
    pub async fn request(&self, request: &DataRequest) -> Result<DataResponse, GatewayError> {
        let started = Instant::now();

        let breaker = self
            .config
            .enable_circuit_breaker
            .then(|| self.breakers.get_or_create(request.data_type.as_str()));

        // Dropping this future after admission gives a half-open probe slot
        // back through the permit.
        let permit = match &breaker {
            Some(breaker) => match breaker.try_acquire() {
                Some(permit) => Some(permit),
                None => {
                    debug!(
                        "Gateway: circuit open for '{}', rejecting request {}",
                        request.data_type, request.request_id
                    );
                    let response = DataResponse::circuit_open(request);
                    self.stats.record(request.data_type, &response);
                    return Ok(response);
                }
            },
            None => None,
        };

        let response = match tokio::time::timeout(request.timeout, self.dispatch(request, started)).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                warn!(
                    "Gateway: request {} for {} '{}' timed out after {:?}",
                    request.request_id, request.data_type, request.symbol, request.timeout
                );
                DataResponse::timed_out(request, elapsed_ms(started))
            }
        };

        if let Some(permit) = permit {
            if response.success {
                permit.success();
            } else {
                permit.failure();
            }
        }
        self.stats.record(request.data_type, &response);

        Ok(response)
    }

    async fn dispatch(
        &self,
        request: &DataRequest,
        started: Instant,
    ) -> Result<DataResponse, GatewayError> {
        let params = request.to_params();

        if self.config.enable_hot_backup && request.priority >= RequestPriority::High {
            let candidates = self.manager.candidates(request.data_type)?;
            if let Some((primary, backups)) = candidates.split_first() {
                let backups = if request.allow_fallback {
                    backups.to_vec()
                } else {
                    Vec::new()
                };
                debug!(
                    "Gateway: racing '{}' against {} backups for request {}",
                    primary.name(),
                    backups.len(),
                    request.request_id
                );
                let race = self
                    .hot_backup
                    .execute(Arc::clone(primary), backups, &params)
                    .await;
                let response = DataResponse::from_fetch_result(
                    request,
                    race.primary_response,
                    elapsed_ms(started),
                    race.used_backup,
                );
                return Ok(response.with_metadata(META_HOT_BACKUP, true));
            }
        }

        let result = self
            .manager
            .fetch(request.data_type, &params, request.allow_fallback)
            .await?;
        let fallback_used = result
            .metadata
            .get(META_FALLBACK_USED)
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(DataResponse::from_fetch_result(
            request,
            result,
            elapsed_ms(started),
            fallback_used,
        ))
    }

    /// Like [`request`](Self::request), with errors turned into failed responses.
    async fn respond(&self, request: &DataRequest) -> DataResponse {
        match self.request(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Gateway: request {} failed: {}", request.request_id, e);
                let response = DataResponse::failed(request, e.to_string(), 0.0);
                self.stats.record(request.data_type, &response);
                response
            }
        }
    }

    /// Serve a batch. Responses follow the order of `batch.requests`.
    pub async fn request_batch(&self, batch: &BatchDataRequest) -> BatchDataResponse {
        let started = Instant::now();

        let responses = if batch.parallel {
            join_all(batch.requests.iter().map(|request| async move {
                let _permit = self.batch_semaphore.acquire().await.ok();
                self.respond(request).await
            }))
            .await
        } else {
            let mut responses = Vec::with_capacity(batch.requests.len());
            for request in &batch.requests {
                responses.push(self.respond(request).await);
            }
            responses
        };

        let response =
            BatchDataResponse::from_responses(batch.batch_id.clone(), responses, elapsed_ms(started));
        debug!(
            "Gateway: batch {} done, {}/{} succeeded",
            response.batch_id, response.success_count, response.total
        );
        response
    }

    // ===== Convenience =====

    async fn request_symbol(
        &self,
        symbol: impl Into<String>,
        data_type: DataType,
    ) -> Result<DataResponse, GatewayError> {
        self.request(&DataRequest::new(symbol, data_type)).await
    }

    pub async fn get_fund(&self, symbol: impl Into<String>) -> Result<DataResponse, GatewayError> {
        self.request_symbol(symbol, DataType::Fund).await
    }

    pub async fn get_stock(&self, symbol: impl Into<String>) -> Result<DataResponse, GatewayError> {
        self.request_symbol(symbol, DataType::Stock).await
    }

    pub async fn get_bond(&self, symbol: impl Into<String>) -> Result<DataResponse, GatewayError> {
        self.request_symbol(symbol, DataType::Bond).await
    }

    pub async fn get_commodity(
        &self,
        symbol: impl Into<String>,
    ) -> Result<DataResponse, GatewayError> {
        self.request_symbol(symbol, DataType::Commodity).await
    }

    pub async fn get_crypto(&self, symbol: impl Into<String>) -> Result<DataResponse, GatewayError> {
        self.request_symbol(symbol, DataType::Crypto).await
    }

    pub async fn get_news(&self, symbol: impl Into<String>) -> Result<DataResponse, GatewayError> {
        self.request_symbol(symbol, DataType::News).await
    }

    pub async fn get_sector(&self, symbol: impl Into<String>) -> Result<DataResponse, GatewayError> {
        self.request_symbol(symbol, DataType::Sector).await
    }

    pub async fn get_index(&self, symbol: impl Into<String>) -> Result<DataResponse, GatewayError> {
        self.request_symbol(symbol, DataType::Index).await
    }

    pub async fn get_forex(&self, pair: impl Into<String>) -> Result<DataResponse, GatewayError> {
        self.request_symbol(pair, DataType::Forex).await
    }

    // ===== Diagnostics =====

    pub fn get_stats(&self) -> GatewayStatsReport {
        GatewayStatsReport {
            gateway: self.stats.snapshot(),
            circuit_breakers: self
                .config
                .enable_circuit_breaker
                .then(|| self.breakers.all_stats()),
            manager: self.manager.statistics(),
            hot_backup: self.config.enable_hot_backup.then(|| self.hot_backup.stats()),
        }
    }

    /// Clear gateway counters. Breakers and manager history are untouched.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Probe every registered provider.
    pub async fn health_check(&self) -> BTreeMap<String, bool> {
        self.manager.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hot_backup::RaceMode;
    use crate::models::ResponseStatus;
    use crate::provider::testing::{Behavior, MockProvider};
    use crate::registry::{CircuitState, ManagerConfig};
    use serde_json::json;
    use std::time::Duration;

    fn gateway_with(providers: Vec<Arc<MockProvider>>, config: GatewayConfig) -> DataGateway {
        let manager = Arc::new(DataSourceManager::with_config(ManagerConfig::default()));
        for provider in providers {
            manager.register(provider, None).unwrap();
        }
        DataGateway::with_config(manager, config)
    }

    fn breaker_config(failure_threshold: u32) -> GatewayConfig {
        GatewayConfig {
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold,
                timeout: Duration::from_secs(60),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_successful_request() {
        let gateway = gateway_with(
            vec![Arc::new(MockProvider::succeeding(
                "P1",
                DataType::Stock,
                json!({"price": 12.5}),
            ))],
            GatewayConfig::default(),
        );

        let response = gateway.get_stock("600519").await.unwrap();
        assert!(response.success);
        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.source, "P1");
        assert!(!response.fallback_used);
        assert_eq!(gateway.get_stats().gateway.successful_requests, 1);
    }

    #[tokio::test]
    async fn test_fallback_is_reported() {
        let gateway = gateway_with(
            vec![
                Arc::new(MockProvider::failing("P1", DataType::Fund, "boom")),
                Arc::new(MockProvider::succeeding("P2", DataType::Fund, json!(1))),
            ],
            GatewayConfig::default(),
        );

        let response = gateway.get_fund("000001").await.unwrap();
        assert!(response.success);
        assert!(response.fallback_used);
        assert_eq!(gateway.get_stats().gateway.fallback_requests, 1);
    }

    #[tokio::test]
    async fn test_open_breaker_rejects_without_calling_providers() {
        let provider = Arc::new(MockProvider::failing("P1", DataType::Bond, "down"));
        let gateway = gateway_with(vec![provider.clone()], breaker_config(2));

        gateway.get_bond("019547").await.unwrap();
        gateway.get_bond("019547").await.unwrap();
        assert_eq!(provider.calls(), 2);

        let response = gateway.get_bond("019547").await.unwrap();
        assert!(!response.success);
        assert_eq!(response.status, ResponseStatus::Failed);
        assert!(response.is_circuit_rejection());
        assert_eq!(provider.calls(), 2);

        let stats = gateway.get_stats();
        assert_eq!(stats.gateway.circuit_breaker_rejections, 1);
        let breakers = stats.circuit_breakers.unwrap();
        assert_eq!(breakers["bond"].state, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_cancelled_half_open_request_does_not_wedge_breaker() {
        let provider = Arc::new(
            MockProvider::failing("P1", DataType::Fund, "down")
                .with_delay(Duration::from_millis(200)),
        );
        let gateway = gateway_with(
            vec![provider.clone()],
            GatewayConfig {
                circuit_breaker: CircuitBreakerConfig {
                    failure_threshold: 1,
                    success_threshold: 1,
                    timeout: Duration::from_millis(20),
                    half_open_max_calls: 1,
                },
                ..Default::default()
            },
        );

        gateway.get_fund("000001").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // The caller gives up while the half-open probe is in flight.
        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), gateway.get_fund("000001")).await;
        assert!(abandoned.is_err());

        let stats = gateway.circuit_breakers().get("fund").unwrap().stats();
        assert_eq!(stats.state, CircuitState::HalfOpen);
        assert_eq!(stats.half_open_calls, 0);

        provider.set_behavior(Behavior::Succeed(json!({"nav": 1.0})));
        let response = gateway.get_fund("000001").await.unwrap();
        assert!(response.success);
        assert!(!response.is_circuit_rejection());
        assert_eq!(
            gateway.circuit_breakers().get("fund").unwrap().state(),
            CircuitState::Closed
        );
    }

    #[tokio::test]
    async fn test_breaker_disabled() {
        let provider = Arc::new(MockProvider::failing("P1", DataType::Bond, "down"));
        let gateway = gateway_with(
            vec![provider.clone()],
            GatewayConfig {
                enable_circuit_breaker: false,
                ..breaker_config(1)
            },
        );

        for _ in 0..3 {
            gateway.get_bond("019547").await.unwrap();
        }
        assert_eq!(provider.calls(), 3);
        assert!(gateway.get_stats().circuit_breakers.is_none());
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let gateway = gateway_with(
            vec![Arc::new(
                MockProvider::succeeding("SLOW", DataType::News, json!([]))
                    .with_delay(Duration::from_millis(500)),
            )],
            GatewayConfig::default(),
        );

        let request = DataRequest::new("macro", DataType::News).with_timeout(Duration::from_millis(30));
        let response = gateway.request(&request).await.unwrap();

        assert!(!response.success);
        assert_eq!(response.status, ResponseStatus::Timeout);
        assert!(response.latency_ms < 500.0);
        assert_eq!(gateway.get_stats().gateway.timeouts, 1);
    }

    #[tokio::test]
    async fn test_unknown_data_type_propagates() {
        let gateway = gateway_with(Vec::new(), GatewayConfig::default());
        let err = gateway.get_forex("USDCNY").await.unwrap_err();
        assert_eq!(err, GatewayError::UnknownDataType(DataType::Forex));
    }

    #[tokio::test]
    async fn test_hot_backup_for_high_priority() {
        let gateway = gateway_with(
            vec![
                Arc::new(
                    MockProvider::succeeding("PRIMARY", DataType::Crypto, json!("slow"))
                        .with_delay(Duration::from_millis(500)),
                ),
                Arc::new(MockProvider::succeeding("BACKUP", DataType::Crypto, json!("fast"))),
            ],
            GatewayConfig {
                enable_hot_backup: true,
                hot_backup: HotBackupConfig {
                    timeout: Duration::from_secs(2),
                    mode: RaceMode::FirstSuccess,
                },
                ..Default::default()
            },
        );

        let request = DataRequest::new("BTC", DataType::Crypto).with_priority(RequestPriority::High);
        let response = gateway.request(&request).await.unwrap();
        assert!(response.success);
        assert_eq!(response.source, "BACKUP");
        assert!(response.fallback_used);
        assert_eq!(response.metadata[META_HOT_BACKUP], json!(true));

        // Normal priority goes through the manager in priority order.
        let response = gateway.get_crypto("BTC").await.unwrap();
        assert_eq!(response.source, "PRIMARY");
        assert_eq!(gateway.get_stats().hot_backup.unwrap().races, 1);
    }

    #[tokio::test]
    async fn test_batch_keeps_order_and_folds_errors() {
        let gateway = gateway_with(
            vec![
                Arc::new(
                    MockProvider::succeeding("FUNDS", DataType::Fund, json!(1))
                        .with_delay(Duration::from_millis(30)),
                ),
                Arc::new(MockProvider::succeeding("STOCKS", DataType::Stock, json!(2))),
            ],
            GatewayConfig::default(),
        );

        let batch = BatchDataRequest::new(vec![
            DataRequest::new("000001", DataType::Fund),
            DataRequest::new("600519", DataType::Stock),
            DataRequest::new("EURUSD", DataType::Forex),
        ]);
        let ids: Vec<_> = batch.requests.iter().map(|r| r.request_id.clone()).collect();

        for batch in [batch.clone(), batch.sequential()] {
            let response = gateway.request_batch(&batch).await;
            let got: Vec<_> = response.responses.iter().map(|r| r.request_id.clone()).collect();
            assert_eq!(got, ids);
            assert_eq!(response.total, 3);
            assert_eq!(response.success_count, 2);
            assert_eq!(response.failed_count, 1);
            assert!(response.responses[2]
                .error
                .as_deref()
                .unwrap()
                .contains("Unknown data type"));
        }
    }

    #[tokio::test]
    async fn test_reset_stats() {
        let gateway = gateway_with(
            vec![Arc::new(MockProvider::succeeding("P1", DataType::Index, json!(1)))],
            GatewayConfig::default(),
        );
        gateway.get_index("000300").await.unwrap();
        gateway.reset_stats();

        let stats = gateway.get_stats();
        assert_eq!(stats.gateway.total_requests, 0);
        assert_eq!(stats.manager.total_requests, 1);
        assert_eq!(gateway.health_check().await.get("P1"), Some(&true));
    }
}

//! Data source manager for orchestrating providers per data type.
//!
//! The manager owns the provider table and handles:
//! - Registration, priority and enable/disable bookkeeping
//! - Candidate ordering (priority, optionally rotated round-robin)
//! - Failover across candidates with bounded concurrency
//! - Retry with backoff for transient failures
//! - A bounded history of every attempt

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, SemaphorePermit};

use super::history::{FetchHistory, FetchRecord, ManagerStatistics, DEFAULT_HISTORY_CAPACITY};
use crate::errors::{GatewayError, RetryClass};
use crate::models::{DataType, FetchParams, FetchResult, META_ATTEMPTS, META_FALLBACK_USED};
use crate::provider::{call_provider, CallOutcome, DataProvider};

/// Source name used for results the manager synthesizes itself.
pub const MANAGER_SOURCE: &str = "data_source_manager";

/// Default cap on concurrent provider calls.
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Manager configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Maximum provider calls in flight across the whole manager.
    pub max_concurrent: usize,
    /// Rotate the candidate list by one on every fetch.
    pub enable_load_balancing: bool,
    /// Number of attempts kept in the history ring.
    pub history_capacity: usize,
    /// Extra tries for a candidate whose failure is worth retrying.
    pub max_retries: u32,
    /// Base delay between retries, doubled on each try.
    pub retry_backoff: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            enable_load_balancing: false,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_retries: 0,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// Per-provider registration options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Lower values are tried first. Defaults to registration order.
    pub priority: Option<i32>,
    pub enabled: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderConfig {
    pub fn new() -> Self {
        Self {
            priority: None,
            enabled: true,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Read-only view of one registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub data_type: DataType,
    pub priority: i32,
    pub enabled: bool,
}

struct ProviderEntry {
    provider: Arc<dyn DataProvider>,
    priority: i32,
    enabled: bool,
    seq: u64,
}

impl ProviderEntry {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: self.provider.name().to_string(),
            data_type: self.provider.data_type(),
            priority: self.priority,
            enabled: self.enabled,
        }
    }
}

#[derive(Default)]
struct ProviderTable {
    /// A data type stays here once seen, even if every provider is removed.
    by_type: HashMap<DataType, Vec<ProviderEntry>>,
    name_index: HashMap<String, DataType>,
    next_seq: u64,
}

impl ProviderTable {
    fn entry_mut(&mut self, name: &str) -> Option<&mut ProviderEntry> {
        let data_type = self.name_index.get(name)?;
        self.by_type
            .get_mut(data_type)?
            .iter_mut()
            .find(|entry| entry.provider.name() == name)
    }

    /// Entries of `data_type` sorted by (priority, registration order).
    fn ordered(&self, data_type: DataType) -> Option<Vec<&ProviderEntry>> {
        let entries = self.by_type.get(&data_type)?;
        let mut ordered: Vec<&ProviderEntry> = entries.iter().collect();
        ordered.sort_by_key(|entry| (entry.priority, entry.seq));
        Some(ordered)
    }
}

/// Orchestrates the providers registered for each data type.
pub struct DataSourceManager {
    config: ManagerConfig,
    table: RwLock<ProviderTable>,
    round_robin: Mutex<HashMap<DataType, usize>>,
    semaphore: OnceLock<Semaphore>,
    history: FetchHistory,
}

impl Default for DataSourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSourceManager {
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    pub fn with_config(config: ManagerConfig) -> Self {
        let history = FetchHistory::new(config.history_capacity);
        Self {
            config,
            table: RwLock::new(ProviderTable::default()),
            round_robin: Mutex::new(HashMap::new()),
            semaphore: OnceLock::new(),
            history,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    fn read_table(&self) -> RwLockReadGuard<'_, ProviderTable> {
        self.table.read().unwrap_or_else(|poisoned| {
            warn!("Provider table lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, ProviderTable> {
        self.table.write().unwrap_or_else(|poisoned| {
            warn!("Provider table lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    // ===== Registration =====

    /// Register a provider under its declared data type.
    ///
    /// Names are unique across all data types.
    pub fn register(
        &self,
        provider: Arc<dyn DataProvider>,
        config: Option<ProviderConfig>,
    ) -> Result<(), GatewayError> {
        let config = config.unwrap_or_else(ProviderConfig::new);
        let name = provider.name().to_string();
        let data_type = provider.data_type();

        let mut table = self.write_table();
        if table.name_index.contains_key(&name) {
            warn!("Provider '{}' is already registered", name);
            return Err(GatewayError::DuplicateProvider { name });
        }

        let seq = table.next_seq;
        table.next_seq += 1;

        let entries = table.by_type.entry(data_type).or_default();
        let priority = config.priority.unwrap_or(entries.len() as i32);
        entries.push(ProviderEntry {
            provider,
            priority,
            enabled: config.enabled,
            seq,
        });
        table.name_index.insert(name.clone(), data_type);

        info!(
            "Registered provider '{}' for {} (priority {}, enabled {})",
            name, data_type, priority, config.enabled
        );
        Ok(())
    }

    /// Remove a provider and return it.
    pub fn unregister(&self, name: &str) -> Result<Arc<dyn DataProvider>, GatewayError> {
        let mut table = self.write_table();
        let data_type = table
            .name_index
            .remove(name)
            .ok_or_else(|| GatewayError::ProviderNotFound {
                name: name.to_string(),
            })?;

        let entries = table.by_type.entry(data_type).or_default();
        let position = entries
            .iter()
            .position(|entry| entry.provider.name() == name)
            .ok_or_else(|| GatewayError::ProviderNotFound {
                name: name.to_string(),
            })?;
        let entry = entries.remove(position);

        info!("Unregistered provider '{}' from {}", name, data_type);
        Ok(entry.provider)
    }

    pub fn set_priority(&self, name: &str, priority: i32) -> Result<(), GatewayError> {
        let mut table = self.write_table();
        let entry = table
            .entry_mut(name)
            .ok_or_else(|| GatewayError::ProviderNotFound {
                name: name.to_string(),
            })?;
        entry.priority = priority;
        debug!("Provider '{}' priority set to {}", name, priority);
        Ok(())
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), GatewayError> {
        let mut table = self.write_table();
        let entry = table
            .entry_mut(name)
            .ok_or_else(|| GatewayError::ProviderNotFound {
                name: name.to_string(),
            })?;
        entry.enabled = enabled;
        info!(
            "Provider '{}' {}",
            name,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    // ===== Lookup =====

    pub fn provider(&self, name: &str) -> Option<Arc<dyn DataProvider>> {
        let table = self.read_table();
        let data_type = table.name_index.get(name)?;
        table
            .by_type
            .get(data_type)?
            .iter()
            .find(|entry| entry.provider.name() == name)
            .map(|entry| Arc::clone(&entry.provider))
    }

    /// All registrations of `data_type` in priority order, disabled included.
    pub fn providers(&self, data_type: DataType) -> Vec<ProviderInfo> {
        self.read_table()
            .ordered(data_type)
            .map(|entries| entries.into_iter().map(ProviderEntry::info).collect())
            .unwrap_or_default()
    }

    /// Data types that have ever had a provider registered.
    pub fn data_types(&self) -> Vec<DataType> {
        let mut types: Vec<DataType> = self.read_table().by_type.keys().copied().collect();
        types.sort();
        types
    }

    /// Enabled providers of `data_type` in priority order.
    ///
    /// Does not advance the round-robin rotation.
    pub fn candidates(&self, data_type: DataType) -> Result<Vec<Arc<dyn DataProvider>>, GatewayError> {
        self.ordered_candidates(data_type, false)
    }

    fn ordered_candidates(
        &self,
        data_type: DataType,
        rotate: bool,
    ) -> Result<Vec<Arc<dyn DataProvider>>, GatewayError> {
        let mut candidates: Vec<Arc<dyn DataProvider>> = {
            let table = self.read_table();
            let entries = table
                .ordered(data_type)
                .ok_or(GatewayError::UnknownDataType(data_type))?;
            entries
                .into_iter()
                .filter(|entry| entry.enabled)
                .map(|entry| Arc::clone(&entry.provider))
                .collect()
        };

        if rotate && self.config.enable_load_balancing && !candidates.is_empty() {
            let offset = self.next_rotation(data_type);
            let len = candidates.len();
            candidates.rotate_left(offset % len);
        }
        Ok(candidates)
    }

    /// Current rotation for `data_type`; advances by one per call.
    fn next_rotation(&self, data_type: DataType) -> usize {
        let mut round_robin = self.round_robin.lock().unwrap_or_else(|poisoned| {
            warn!("Round-robin lock was poisoned, recovering");
            poisoned.into_inner()
        });
        let index = round_robin.entry(data_type).or_insert(0);
        let current = *index;
        *index = index.wrapping_add(1);
        current
    }

    // ===== Fetching =====

    /// Fetch `data_type` data, trying candidates in order until one succeeds.
    ///
    /// With `failover = false` only the first candidate is tried. When every
    /// candidate fails, one failure naming each of them is returned. Only an
    /// unregistered data type is an error.
    pub async fn fetch(
        &self,
        data_type: DataType,
        params: &FetchParams,
        failover: bool,
    ) -> Result<FetchResult, GatewayError> {
        let mut candidates = self.ordered_candidates(data_type, true)?;

        if candidates.is_empty() {
            warn!("No enabled providers for {}", data_type);
            return Ok(FetchResult::failure(
                MANAGER_SOURCE,
                format!("no enabled providers for {}", data_type),
            ));
        }

        if !failover {
            candidates.truncate(1);
        }

        let mut errors = Vec::with_capacity(candidates.len());
        for (index, provider) in candidates.iter().enumerate() {
            let outcome = self.attempt(data_type, provider.as_ref(), params).await;

            if outcome.success() {
                if index > 0 {
                    debug!(
                        "Fallback provider '{}' served {} after {} failures",
                        outcome.provider, data_type, index
                    );
                }
                return Ok(outcome
                    .result
                    .with_metadata(META_ATTEMPTS, index + 1)
                    .with_metadata(META_FALLBACK_USED, index > 0));
            }

            debug!(
                "Provider '{}' failed for {}: {}, trying next",
                outcome.provider,
                data_type,
                outcome.result.error_message()
            );
            errors.push(format!(
                "{}: {}",
                outcome.provider,
                outcome.result.error_message()
            ));
        }

        warn!(
            "All {} providers failed for {}",
            candidates.len(),
            data_type
        );
        Ok(FetchResult::failure(MANAGER_SOURCE, errors.join("; "))
            .with_metadata(META_ATTEMPTS, candidates.len()))
    }

    /// Fetch each item from the top candidate only.
    ///
    /// Output is aligned with `params_list`; failures stay per item.
    pub async fn fetch_batch(
        &self,
        data_type: DataType,
        params_list: &[FetchParams],
        parallel: bool,
    ) -> Result<Vec<FetchResult>, GatewayError> {
        let candidates = self.ordered_candidates(data_type, true)?;
        let Some(provider) = candidates.into_iter().next() else {
            warn!("No enabled providers for {} batch", data_type);
            return Ok(params_list
                .iter()
                .map(|_| {
                    FetchResult::failure(
                        MANAGER_SOURCE,
                        format!("no enabled providers for {}", data_type),
                    )
                })
                .collect());
        };

        debug!(
            "Batch of {} {} items via '{}' ({})",
            params_list.len(),
            data_type,
            provider.name(),
            if parallel { "parallel" } else { "sequential" }
        );

        if parallel {
            let outcomes = join_all(
                params_list
                    .iter()
                    .map(|params| self.attempt(data_type, provider.as_ref(), params)),
            )
            .await;
            return Ok(outcomes.into_iter().map(|outcome| outcome.result).collect());
        }

        let mut results = Vec::with_capacity(params_list.len());
        for params in params_list {
            results.push(self.attempt(data_type, provider.as_ref(), params).await.result);
        }
        Ok(results)
    }

    /// One candidate, including retries for transient failures.
    async fn attempt(
        &self,
        data_type: DataType,
        provider: &dyn DataProvider,
        params: &FetchParams,
    ) -> CallOutcome {
        let mut retries = 0u32;
        loop {
            let outcome = {
                let _permit = self.acquire_permit().await;
                call_provider(provider, params).await
            };
            self.record(data_type, &outcome);

            let retryable = outcome.retry_class == Some(RetryClass::WithBackoff);
            if outcome.success() || !retryable || retries >= self.config.max_retries {
                return outcome;
            }

            let backoff = self
                .config
                .retry_backoff
                .saturating_mul(2u32.saturating_pow(retries));
            retries += 1;
            debug!(
                "Retrying provider '{}' in {:?} (retry {}/{})",
                outcome.provider, backoff, retries, self.config.max_retries
            );
            tokio::time::sleep(backoff).await;
        }
    }

    fn semaphore(&self) -> &Semaphore {
        self.semaphore
            .get_or_init(|| Semaphore::new(self.config.max_concurrent.max(1)))
    }

    async fn acquire_permit(&self) -> Option<SemaphorePermit<'_>> {
        // The semaphore is never closed, so this only fails if that changes.
        self.semaphore().acquire().await.ok()
    }

    fn record(&self, data_type: DataType, outcome: &CallOutcome) {
        self.history.push(FetchRecord {
            timestamp: Utc::now(),
            provider: outcome.provider.clone(),
            data_type,
            success: outcome.success(),
            error: outcome.result.error.clone(),
            latency_ms: outcome.latency_ms,
        });
    }

    // ===== Diagnostics =====

    /// Attempts in the retained history, oldest first.
    pub fn history(&self) -> Vec<FetchRecord> {
        self.history.snapshot()
    }

    pub fn clear_history(&self) {
        self.history.clear();
    }

    pub fn statistics(&self) -> ManagerStatistics {
        let registered = self.read_table().name_index.len();
        self.history.statistics(registered)
    }

    /// Probe every registered provider concurrently.
    ///
    /// Errors and probes exceeding the provider's timeout count as unhealthy.
    pub async fn health_check(&self) -> BTreeMap<String, bool> {
        let providers: Vec<Arc<dyn DataProvider>> = {
            let table = self.read_table();
            table
                .by_type
                .values()
                .flatten()
                .map(|entry| Arc::clone(&entry.provider))
                .collect()
        };

        let checks = providers.iter().map(|provider| async move {
            let healthy = matches!(
                tokio::time::timeout(provider.timeout(), provider.health_check()).await,
                Ok(Ok(true))
            );
            (provider.name().to_string(), healthy)
        });

        join_all(checks).await.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;
    use crate::provider::testing::{Behavior, MockProvider};
    use serde_json::json;
    use std::time::Instant;

    fn fund(name: &str, behavior: Behavior) -> Arc<MockProvider> {
        Arc::new(MockProvider::new(name, DataType::Fund, behavior))
    }

    fn ok(value: serde_json::Value) -> Behavior {
        Behavior::Succeed(value)
    }

    fn fail(message: &str) -> Behavior {
        Behavior::Fail(message.to_string())
    }

    #[tokio::test]
    async fn test_failover_to_second_provider() {
        let manager = DataSourceManager::new();
        let a = fund("A", fail("x"));
        let b = fund("B", ok(json!({"price": 10})));
        manager.register(a.clone(), None).unwrap();
        manager.register(b.clone(), None).unwrap();

        let result = manager
            .fetch(DataType::Fund, &FetchParams::for_symbol("000001"), true)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.source, "B");
        assert_eq!(result.data, Some(json!({"price": 10})));
        assert_eq!(result.metadata[META_ATTEMPTS], json!(2));
        assert_eq!(result.metadata[META_FALLBACK_USED], json!(true));

        let history = manager.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].provider, "A");
        assert!(!history[0].success);
        assert_eq!(history[1].provider, "B");
        assert!(history[1].success);
    }

    #[tokio::test]
    async fn test_exhaustion_names_every_provider() {
        let manager = DataSourceManager::new();
        manager.register(fund("A", fail("x")), None).unwrap();
        manager.register(fund("B", fail("y")), None).unwrap();

        let result = manager
            .fetch(DataType::Fund, &FetchParams::new(), true)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.source, MANAGER_SOURCE);
        assert_eq!(result.error_message(), "A: x; B: y");
    }

    #[tokio::test]
    async fn test_provider_errors_are_folded() {
        let manager = DataSourceManager::new();
        manager
            .register(
                Arc::new(MockProvider::erroring(
                    "A",
                    DataType::Stock,
                    ProviderError::upstream("A", "bad gateway"),
                )),
                None,
            )
            .unwrap();

        let result = manager
            .fetch(DataType::Stock, &FetchParams::new(), true)
            .await
            .unwrap();
        assert_eq!(result.error_message(), "A: Provider error: A - bad gateway");
    }

    #[tokio::test]
    async fn test_no_failover_tries_only_first() {
        let manager = DataSourceManager::new();
        let a = fund("A", fail("x"));
        let b = fund("B", ok(json!(1)));
        manager.register(a.clone(), None).unwrap();
        manager.register(b.clone(), None).unwrap();

        let result = manager
            .fetch(DataType::Fund, &FetchParams::new(), false)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_data_type() {
        let manager = DataSourceManager::new();
        let err = manager
            .fetch(DataType::Crypto, &FetchParams::new(), true)
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::UnknownDataType(DataType::Crypto));
    }

    #[tokio::test]
    async fn test_no_enabled_providers() {
        let manager = DataSourceManager::new();
        manager.register(fund("A", ok(json!(1))), None).unwrap();
        manager.set_enabled("A", false).unwrap();

        let result = manager
            .fetch(DataType::Fund, &FetchParams::new(), true)
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error_message().contains("no enabled providers"));

        // Still known after every provider is gone.
        manager.unregister("A").unwrap();
        assert!(manager
            .fetch(DataType::Fund, &FetchParams::new(), true)
            .await
            .is_ok());
    }

    #[test]
    fn test_registration_errors() {
        let manager = DataSourceManager::new();
        manager.register(fund("A", ok(json!(1))), None).unwrap();

        assert_eq!(
            manager.register(fund("A", ok(json!(2))), None),
            Err(GatewayError::DuplicateProvider {
                name: "A".to_string()
            })
        );
        assert!(matches!(
            manager.unregister("missing"),
            Err(GatewayError::ProviderNotFound { .. })
        ));
        assert!(manager.set_priority("missing", 1).is_err());
        assert!(manager.set_enabled("missing", true).is_err());
    }

    #[test]
    fn test_priority_ordering() {
        let manager = DataSourceManager::new();
        manager.register(fund("A", ok(json!(1))), None).unwrap();
        manager.register(fund("B", ok(json!(2))), None).unwrap();
        manager
            .register(fund("C", ok(json!(3))), Some(ProviderConfig::new().with_priority(-1)))
            .unwrap();

        let names: Vec<_> = manager
            .providers(DataType::Fund)
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["C", "A", "B"]);

        manager.set_priority("A", 10).unwrap();
        let names: Vec<_> = manager
            .candidates(DataType::Fund)
            .unwrap()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["C", "B", "A"]);
    }

    #[tokio::test]
    async fn test_load_balancing_rotates_first_candidate() {
        let manager = DataSourceManager::with_config(ManagerConfig {
            enable_load_balancing: true,
            ..Default::default()
        });
        manager.register(fund("A", ok(json!("a"))), None).unwrap();
        manager.register(fund("B", ok(json!("b"))), None).unwrap();

        let mut sources = Vec::new();
        for _ in 0..4 {
            let result = manager
                .fetch(DataType::Fund, &FetchParams::new(), true)
                .await
                .unwrap();
            sources.push(result.source);
        }
        assert_eq!(sources, vec!["A", "B", "A", "B"]);
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let manager = DataSourceManager::with_config(ManagerConfig {
            max_retries: 2,
            retry_backoff: Duration::from_millis(1),
            ..Default::default()
        });
        let a = Arc::new(MockProvider::erroring(
            "A",
            DataType::Fund,
            ProviderError::RateLimited {
                provider: "A".to_string(),
            },
        ));
        let b = Arc::new(MockProvider::erroring(
            "B",
            DataType::Fund,
            ProviderError::upstream("B", "nope"),
        ));
        manager.register(a.clone(), None).unwrap();
        manager.register(b.clone(), None).unwrap();

        let result = manager
            .fetch(DataType::Fund, &FetchParams::new(), true)
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(a.calls(), 3);
        assert_eq!(b.calls(), 1);
        assert_eq!(manager.history().len(), 4);
    }

    /// Answers with the requested symbol after sleeping that many milliseconds.
    struct SymbolEcho;

    #[async_trait::async_trait]
    impl DataProvider for SymbolEcho {
        fn name(&self) -> &str {
            "ECHO"
        }

        fn data_type(&self) -> DataType {
            DataType::Fund
        }

        async fn fetch(&self, params: &FetchParams) -> Result<FetchResult, ProviderError> {
            let symbol = params.symbol().unwrap_or_default().to_string();
            let delay_ms = symbol.parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok(FetchResult::ok("ECHO", json!(symbol)))
        }
    }

    #[tokio::test]
    async fn test_parallel_batch_preserves_order() {
        let manager = DataSourceManager::new();
        manager.register(Arc::new(SymbolEcho), None).unwrap();

        // Later items finish first.
        let symbols = ["80", "45", "60", "5", "20", "0"];
        let params: Vec<_> = symbols.iter().map(|s| FetchParams::for_symbol(*s)).collect();
        let results = manager
            .fetch_batch(DataType::Fund, &params, true)
            .await
            .unwrap();

        assert_eq!(results.len(), symbols.len());
        for (symbol, result) in symbols.iter().zip(&results) {
            assert!(result.success);
            assert_eq!(result.data, Some(json!(symbol)));
        }
    }

    #[tokio::test]
    async fn test_semaphore_bounds_concurrency() {
        let manager = DataSourceManager::with_config(ManagerConfig {
            max_concurrent: 1,
            ..Default::default()
        });
        manager
            .register(
                Arc::new(
                    MockProvider::succeeding("SLOW", DataType::Fund, json!(1))
                        .with_delay(Duration::from_millis(30)),
                ),
                None,
            )
            .unwrap();

        let params = vec![FetchParams::new(); 3];
        let started = Instant::now();
        let results = manager
            .fetch_batch(DataType::Fund, &params, true)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(started.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_health_check_reports_every_provider() {
        let manager = DataSourceManager::new();
        let a = fund("A", ok(json!(1)));
        let b = fund("B", ok(json!(1)));
        b.set_health(Ok(false));
        manager.register(a, None).unwrap();
        manager.register(b, Some(ProviderConfig::new().disabled())).unwrap();

        let health = manager.health_check().await;
        assert_eq!(health.get("A"), Some(&true));
        assert_eq!(health.get("B"), Some(&false));
    }

    #[tokio::test]
    async fn test_statistics_track_usage() {
        let manager = DataSourceManager::new();
        manager.register(fund("A", fail("x")), None).unwrap();
        manager.register(fund("B", ok(json!(1))), None).unwrap();

        manager
            .fetch(DataType::Fund, &FetchParams::new(), true)
            .await
            .unwrap();

        let stats = manager.statistics();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.providers["A"].failures, 1);
        assert_eq!(stats.providers["B"].successes, 1);
        assert_eq!(stats.registered_providers, 2);
    }
}

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};

use super::{AggregateCounters, AggregatorStats, Members};
use crate::errors::{GatewayError, ProviderError};
use crate::models::{DataType, FetchParams, FetchResult, META_FALLBACK_USED};
use crate::provider::{DataProvider, ProviderStats};

/// Providers serving the same data with a fixed primary.
///
/// The primary is always tried first. When it fails, the remaining members
/// are tried in registration order, skipping the member that served the
/// previous successful request.
pub struct SameSourceAggregator {
    name: String,
    data_type: DataType,
    members: Members,
    primary: usize,
    last_success: Mutex<Option<String>>,
    counters: AggregateCounters,
}

impl SameSourceAggregator {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            members: Members::default(),
            primary: 0,
            last_success: Mutex::new(None),
            counters: AggregateCounters::default(),
        }
    }

    /// Add a member. The first member added is the primary.
    pub fn with_provider(mut self, provider: Arc<dyn DataProvider>) -> Self {
        if provider.data_type() != self.data_type {
            warn!(
                "Aggregator '{}' ({}) given provider '{}' of type {}",
                self.name,
                self.data_type,
                provider.name(),
                provider.data_type()
            );
        }
        self.members.push(provider);
        self
    }

    /// Make the named member the primary.
    pub fn set_primary(&mut self, name: &str) -> Result<(), GatewayError> {
        self.primary = self
            .members
            .position(name)
            .ok_or_else(|| GatewayError::ProviderNotFound {
                name: name.to_string(),
            })?;
        Ok(())
    }

    pub fn primary(&self) -> Option<&str> {
        (self.primary < self.members.len()).then(|| self.members.name(self.primary))
    }

    /// Name of the member that served the most recent success.
    pub fn last_success(&self) -> Option<String> {
        self.lock_last_success().clone()
    }

    fn lock_last_success(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.last_success.lock().unwrap_or_else(|poisoned| {
            warn!("Aggregator '{}' mutex was poisoned, recovering", self.name);
            poisoned.into_inner()
        })
    }

    /// Query every member concurrently, one result per member.
    pub async fn fetch_all(&self, params: &FetchParams) -> Vec<FetchResult> {
        self.members.fetch_all(params).await
    }

    /// Run each member's batch fetch over `params_list`.
    pub async fn fetch_batch_all(&self, params_list: &[FetchParams]) -> Vec<(String, Vec<FetchResult>)> {
        self.members.fetch_batch_all(params_list).await
    }

    pub fn aggregator_stats(&self) -> AggregatorStats {
        self.counters.report(&self.name, &self.members)
    }

    fn succeed(&self, index: usize, result: FetchResult, fallback: bool) -> FetchResult {
        self.counters.success();
        *self.lock_last_success() = Some(self.members.name(index).to_string());
        result.with_metadata(META_FALLBACK_USED, fallback)
    }
}

#[async_trait]
impl DataProvider for SameSourceAggregator {
    fn name(&self) -> &str {
        &self.name
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn timeout(&self) -> Duration {
        self.members.chain_timeout()
    }

    async fn fetch(&self, params: &FetchParams) -> Result<FetchResult, ProviderError> {
        self.counters.request();

        if self.members.len() == 0 {
            return Ok(FetchResult::failure(&self.name, "no providers configured"));
        }

        let primary = self.members.attempt(self.primary, params).await;
        if primary.success() {
            return Ok(self.succeed(self.primary, primary.result, false));
        }

        let mut errors = vec![format!(
            "{}: {}",
            primary.provider,
            primary.result.error_message()
        )];
        let last_success = self.last_success();
        let backups: Vec<usize> = (0..self.members.len())
            .filter(|&index| index != self.primary)
            .filter(|&index| last_success.as_deref() != Some(self.members.name(index)))
            .collect();

        if !backups.is_empty() {
            self.counters.failover();
            debug!(
                "Aggregator '{}': primary '{}' failed, trying {} backups",
                self.name,
                primary.provider,
                backups.len()
            );
        }

        for index in backups {
            let outcome = self.members.attempt(index, params).await;
            if outcome.success() {
                return Ok(self.succeed(index, outcome.result, true));
            }
            errors.push(format!(
                "{}: {}",
                outcome.provider,
                outcome.result.error_message()
            ));
        }

        Ok(FetchResult::failure(&self.name, errors.join("; ")))
    }

    fn stats(&self) -> ProviderStats {
        self.counters.provider_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::MockProvider;
    use serde_json::json;

    fn member(name: &str, ok: bool) -> Arc<MockProvider> {
        Arc::new(if ok {
            MockProvider::succeeding(name, DataType::Fund, json!(name))
        } else {
            MockProvider::failing(name, DataType::Fund, "down")
        })
    }

    #[tokio::test]
    async fn test_primary_serves_when_healthy() {
        let p = member("P", true);
        let a = member("A", true);
        let agg = SameSourceAggregator::new("FUND_AGG", DataType::Fund)
            .with_provider(p.clone())
            .with_provider(a.clone());

        let result = agg.fetch(&FetchParams::new()).await.unwrap();
        assert_eq!(result.source, "P");
        assert_eq!(result.metadata[META_FALLBACK_USED], json!(false));
        assert_eq!(a.calls(), 0);
        assert_eq!(agg.primary(), Some("P"));
    }

    #[tokio::test]
    async fn test_failover_skips_last_successful_member() {
        let p = member("P", false);
        let a = member("A", true);
        let b = member("B", false);
        let agg = SameSourceAggregator::new("FUND_AGG", DataType::Fund)
            .with_provider(p.clone())
            .with_provider(a.clone())
            .with_provider(b.clone());

        let first = agg.fetch(&FetchParams::new()).await.unwrap();
        assert_eq!(first.source, "A");
        assert_eq!(agg.last_success().as_deref(), Some("A"));

        // A served last time, so only B is tried as a backup.
        let second = agg.fetch(&FetchParams::new()).await.unwrap();
        assert!(!second.success);
        assert_eq!(second.error_message(), "P: down; B: down");
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);

        let stats = agg.aggregator_stats();
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.failovers, 2);
        assert_eq!(stats.members[0].usage, 2);
        assert_eq!(agg.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_set_primary() {
        let agg = SameSourceAggregator::new("FUND_AGG", DataType::Fund)
            .with_provider(member("P", true))
            .with_provider(member("A", true));
        let mut agg = agg;
        agg.set_primary("A").unwrap();
        assert!(agg.set_primary("missing").is_err());

        let result = agg.fetch(&FetchParams::new()).await.unwrap();
        assert_eq!(result.source, "A");
    }

    #[tokio::test]
    async fn test_fetch_all_in_registration_order() {
        let agg = SameSourceAggregator::new("FUND_AGG", DataType::Fund)
            .with_provider(member("P", true))
            .with_provider(member("A", false))
            .with_provider(member("B", true));

        let results = agg.fetch_all(&FetchParams::new()).await;
        let sources: Vec<_> = results.iter().map(|r| r.source.as_str()).collect();
        assert_eq!(sources, vec!["P", "A", "B"]);
        assert!(!results[1].success);

        let batches = agg
            .fetch_batch_all(&[FetchParams::for_symbol("1"), FetchParams::for_symbol("2")])
            .await;
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].0, "B");
        assert_eq!(batches[2].1.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_aggregator_fails() {
        let agg = SameSourceAggregator::new("EMPTY", DataType::News);
        let result = agg.fetch(&FetchParams::new()).await.unwrap();
        assert!(!result.success);
        assert!(agg.primary().is_none());
    }
}

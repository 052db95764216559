use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};

use super::{AggregateCounters, AggregatorStats, Members};
use crate::errors::ProviderError;
use crate::models::{DataType, FetchParams, FetchResult, META_FALLBACK_USED};
use crate::provider::{DataProvider, ProviderStats};

/// Spreads requests over equivalent providers.
///
/// Each fetch orders members by how often this aggregator has called them
/// (ties by registration order) and returns the first success. Every attempt
/// counts as usage, whether it succeeded or not.
pub struct LoadBalancedAggregator {
    name: String,
    data_type: DataType,
    members: Members,
    counters: AggregateCounters,
}

impl LoadBalancedAggregator {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            members: Members::default(),
            counters: AggregateCounters::default(),
        }
    }

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

    /// Member indexes, least used first.
    fn order(&self) -> Vec<usize> {
        let mut order: Vec<(u64, usize)> = (0..self.members.len())
            .map(|index| (self.members.usage(index), index))
            .collect();
        order.sort_unstable();
        order.into_iter().map(|(_, index)| index).collect()
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
}

#[async_trait]
impl DataProvider for LoadBalancedAggregator {
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

        let order = self.order();
        if order.is_empty() {
            return Ok(FetchResult::failure(&self.name, "no providers configured"));
        }

        let mut errors = Vec::new();
        for (attempt, index) in order.into_iter().enumerate() {
            if attempt == 1 {
                self.counters.failover();
            }

            let outcome = self.members.attempt(index, params).await;
            if outcome.success() {
                self.counters.success();
                return Ok(outcome.result.with_metadata(META_FALLBACK_USED, attempt > 0));
            }

            debug!(
                "Aggregator '{}': member '{}' failed: {}",
                self.name,
                outcome.provider,
                outcome.result.error_message()
            );
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

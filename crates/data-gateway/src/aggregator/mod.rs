//! Composite providers.
//!
//! An aggregator bundles several providers of one data type behind the
//! [`DataProvider`] trait, so it can be registered with the manager like any
//! single source.
//!
//! - [`SameSourceAggregator`]: fixed primary with failover to the others
//! - [`LoadBalancedAggregator`]: least-used provider first

mod load_balanced;
mod same_source;

pub use load_balanced::LoadBalancedAggregator;
pub use same_source::SameSourceAggregator;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::models::{FetchParams, FetchResult};
use crate::provider::{call_provider, CallOutcome, DataProvider, ProviderStats};

/// Counters and per-member usage of an aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorStats {
    pub name: String,
    pub requests: u64,
    pub successes: u64,
    pub failovers: u64,
    pub success_rate: f64,
    /// In registration order.
    pub members: Vec<MemberStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberStats {
    pub name: String,
    /// Attempts this aggregator made against the member.
    pub usage: u64,
    /// The member's own counters.
    pub stats: ProviderStats,
}

/// Providers of an aggregator with their usage counters, in registration order.
#[derive(Default)]
pub(crate) struct Members {
    providers: Vec<Arc<dyn DataProvider>>,
    usage: Vec<AtomicU64>,
}

impl Members {
    pub(crate) fn push(&mut self, provider: Arc<dyn DataProvider>) {
        self.providers.push(provider);
        self.usage.push(AtomicU64::new(0));
    }

    pub(crate) fn len(&self) -> usize {
        self.providers.len()
    }

    pub(crate) fn name(&self, index: usize) -> &str {
        self.providers[index].name()
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.providers.iter().position(|p| p.name() == name)
    }

    pub(crate) fn usage(&self, index: usize) -> u64 {
        self.usage[index].load(Ordering::Relaxed)
    }

    /// Call one member and count the attempt regardless of outcome.
    pub(crate) async fn attempt(&self, index: usize, params: &FetchParams) -> CallOutcome {
        self.usage[index].fetch_add(1, Ordering::Relaxed);
        call_provider(self.providers[index].as_ref(), params).await
    }

    /// Sum of member timeouts, enough for a full failover chain.
    pub(crate) fn chain_timeout(&self) -> Duration {
        self.providers
            .iter()
            .fold(Duration::ZERO, |total, p| total.saturating_add(p.timeout()))
    }

    pub(crate) async fn fetch_all(&self, params: &FetchParams) -> Vec<FetchResult> {
        join_all((0..self.len()).map(|index| self.attempt(index, params)))
            .await
            .into_iter()
            .map(|outcome| outcome.result)
            .collect()
    }

    pub(crate) async fn fetch_batch_all(
        &self,
        params_list: &[FetchParams],
    ) -> Vec<(String, Vec<FetchResult>)> {
        let batches = self.providers.iter().map(|provider| async move {
            let budget = provider
                .timeout()
                .saturating_mul(params_list.len().max(1) as u32);
            let results = match tokio::time::timeout(budget, provider.fetch_batch(params_list)).await {
                Ok(results) => results,
                Err(_) => params_list
                    .iter()
                    .map(|_| {
                        FetchResult::failure(
                            provider.name(),
                            format!("Timeout: {} batch after {:?}", provider.name(), budget),
                        )
                    })
                    .collect(),
            };
            (provider.name().to_string(), results)
        });
        join_all(batches).await
    }

    pub(crate) fn member_stats(&self) -> Vec<MemberStats> {
        self.providers
            .iter()
            .zip(&self.usage)
            .map(|(provider, usage)| MemberStats {
                name: provider.name().to_string(),
                usage: usage.load(Ordering::Relaxed),
                stats: provider.stats(),
            })
            .collect()
    }
}

/// Request counters shared by both aggregators.
#[derive(Debug, Default)]
pub(crate) struct AggregateCounters {
    requests: AtomicU64,
    successes: AtomicU64,
    failovers: AtomicU64,
}

impl AggregateCounters {
    pub(crate) fn request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failover(&self) {
        self.failovers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn provider_stats(&self) -> ProviderStats {
        let requests = self.requests.load(Ordering::Relaxed);
        let errors = requests.saturating_sub(self.successes.load(Ordering::Relaxed));
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

    pub(crate) fn report(&self, name: &str, members: &Members) -> AggregatorStats {
        let requests = self.requests.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);
        AggregatorStats {
            name: name.to_string(),
            requests,
            successes,
            failovers: self.failovers.load(Ordering::Relaxed),
            success_rate: if requests == 0 {
                0.0
            } else {
                successes as f64 / requests as f64
            },
            members: members.member_stats(),
        }
    }
}

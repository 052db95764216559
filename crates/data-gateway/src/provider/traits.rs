//! Provider trait definition.
//!
//! This module defines the `DataProvider` trait that every upstream data
//! source (and every aggregator composing several of them) implements.

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::ProviderError;
use crate::models::{DataType, FetchParams, FetchResult};

use super::counters::ProviderStats;

/// Default per-call timeout when a provider does not declare one.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for upstream data providers.
///
/// Implement this trait to plug a new data source into the manager,
/// an aggregator, the hot-backup racer or the health checker. All
/// scraping and parsing stays behind `fetch`.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use data_gateway::{DataProvider, DataType, FetchParams, FetchResult, ProviderError};
///
/// struct NavProvider;
///
/// #[async_trait]
/// impl DataProvider for NavProvider {
///     fn name(&self) -> &str {
///         "NAV_PROVIDER"
///     }
///
///     fn data_type(&self) -> DataType {
///         DataType::Fund
///     }
///
///     async fn fetch(&self, params: &FetchParams) -> Result<FetchResult, ProviderError> {
///         // ... call upstream and build the result
///     }
/// }
/// ```
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Unique name of this provider.
    ///
    /// Used for registration, logging, history and health tracking.
    fn name(&self) -> &str;

    /// The data type this provider serves.
    fn data_type(&self) -> DataType;

    /// Declared timeout for a single call.
    ///
    /// Callers enforce it; a provider does not need to time itself out.
    fn timeout(&self) -> Duration {
        DEFAULT_PROVIDER_TIMEOUT
    }

    /// Fetch data for the given arguments.
    ///
    /// Return `Ok` with `success = false` when the upstream answered with a
    /// failure, and `Err` when the call itself broke.
    async fn fetch(&self, params: &FetchParams) -> Result<FetchResult, ProviderError>;

    /// Fetch data for several argument sets.
    ///
    /// Default implementation calls [`fetch`](Self::fetch) for each item in
    /// order; errors become failed results so the output stays aligned.
    async fn fetch_batch(&self, params: &[FetchParams]) -> Vec<FetchResult> {
        let mut results = Vec::with_capacity(params.len());
        for item in params {
            let result = match self.fetch(item).await {
                Ok(result) => result,
                Err(e) => FetchResult::failure(self.name(), e.to_string()),
            };
            results.push(result);
        }
        results
    }

    /// Best-effort liveness probe.
    ///
    /// Default implementation reports healthy without contacting the upstream.
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }

    /// The provider's own request/error counters.
    fn stats(&self) -> ProviderStats {
        ProviderStats::default()
    }
}

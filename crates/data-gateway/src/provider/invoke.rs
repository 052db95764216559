//! Timed call shim used by every orchestrator.
//!
//! Wraps a provider call in the provider's declared timeout, measures it,
//! and folds `Err` and timeouts into a failed [`FetchResult`]. Nothing above
//! this layer sees a `ProviderError` directly.

use std::sync::Arc;
use std::time::Instant;

use log::debug;

use crate::errors::{ProviderError, RetryClass};
use crate::models::{FetchParams, FetchResult, META_LATENCY_MS};

use super::DataProvider;

/// Result of one shimmed provider call.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub provider: String,
    pub result: FetchResult,
    pub latency_ms: f64,
    /// Set when the call broke (error or timeout) rather than returning a
    /// failed result.
    pub retry_class: Option<RetryClass>,
}

impl CallOutcome {
    /// Fold a finished call into an outcome.
    pub fn from_result(
        provider: impl Into<String>,
        outcome: Result<FetchResult, ProviderError>,
        latency_ms: f64,
    ) -> Self {
        let provider = provider.into();
        let (result, retry_class) = match outcome {
            Ok(result) => (result.with_error_text(), None),
            Err(e) => {
                debug!("Provider '{}' call failed: {}", provider, e);
                let class = e.retry_class();
                (FetchResult::failure(provider.clone(), e.to_string()), Some(class))
            }
        };

        Self {
            provider,
            result: result.with_metadata(META_LATENCY_MS, latency_ms),
            latency_ms,
            retry_class,
        }
    }

    pub fn success(&self) -> bool {
        self.result.success
    }
}

/// Call `provider.fetch` under its declared timeout.
pub async fn call_provider(provider: &dyn DataProvider, params: &FetchParams) -> CallOutcome {
    let name = provider.name().to_string();
    let timeout = provider.timeout();
    let started = Instant::now();

    let outcome = tokio::time::timeout(timeout, provider.fetch(params))
        .await
        .unwrap_or_else(|_| {
            debug!("Provider '{}' call timed out after {:?}", name, timeout);
            Err(ProviderError::Timeout {
                provider: name.clone(),
                timeout,
            })
        });

    CallOutcome::from_result(name, outcome, elapsed_ms(started))
}

/// Owned variant for spawned tasks.
pub async fn call_provider_owned(
    provider: Arc<dyn DataProvider>,
    params: FetchParams,
) -> CallOutcome {
    call_provider(provider.as_ref(), &params).await
}

pub(crate) fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

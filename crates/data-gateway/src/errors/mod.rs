//! Error types and retry classification for the gateway crate.
//!
//! This module provides:
//! - [`GatewayError`]: usage errors that signal a misconfigured topology
//! - [`ProviderError`]: provider-local failures returned by a single call
//! - [`RetryClass`]: classification for determining retry behavior
//!
//! Provider errors never travel past the manager, aggregator or hot-backup
//! boundary. They are folded into a failed [`FetchResult`](crate::FetchResult)
//! there. Only [`GatewayError`] propagates to callers.

mod retry;

pub use retry::RetryClass;

use std::time::Duration;

use thiserror::Error;

use crate::models::DataType;

/// Errors raised for programmer or configuration mistakes.
///
/// These are not transient: retrying the same call will fail the same way.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// A provider with this name is already registered.
    #[error("Provider already registered: {name}")]
    DuplicateProvider {
        /// The conflicting provider name
        name: String,
    },

    /// No provider with this name is registered.
    #[error("Provider not found: {name}")]
    ProviderNotFound {
        /// The missing provider name
        name: String,
    },

    /// No provider has ever been registered for this data type.
    #[error("Unknown data type: {0}")]
    UnknownDataType(DataType),

    /// The background health loop is already running.
    #[error("Background health check already running")]
    HealthCheckAlreadyRunning,
}

/// Failure of a single provider call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The call did not finish within the provider's declared timeout.
    #[error("Timeout: {provider} after {timeout:?}")]
    Timeout {
        /// The provider that timed out
        provider: String,
        /// The timeout that was exceeded
        timeout: Duration,
    },

    /// The upstream rate limited the request.
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
    },

    /// The upstream is temporarily unreachable.
    #[error("Unavailable: {provider} - {message}")]
    Unavailable {
        /// The unreachable provider
        provider: String,
        /// Connection-level detail
        message: String,
    },

    /// The upstream returned an error.
    #[error("Provider error: {provider} - {message}")]
    Upstream {
        /// The provider that returned the error
        provider: String,
        /// The error message from the provider
        message: String,
    },

    /// The upstream answered with something that could not be used.
    #[error("Invalid response: {provider} - {message}")]
    InvalidResponse {
        /// The provider that returned the payload
        provider: String,
        /// What was wrong with it
        message: String,
    },
}

impl ProviderError {
    /// Returns the retry classification for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use data_gateway::errors::{ProviderError, RetryClass};
    ///
    /// let error = ProviderError::RateLimited { provider: "EASTMONEY".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Timeout { .. } | Self::RateLimited { .. } | Self::Unavailable { .. } => {
                RetryClass::WithBackoff
            }
            Self::Upstream { .. } | Self::InvalidResponse { .. } => RetryClass::NextProvider,
        }
    }

    /// Name of the provider this error belongs to.
    pub fn provider(&self) -> &str {
        match self {
            Self::Timeout { provider, .. }
            | Self::RateLimited { provider }
            | Self::Unavailable { provider, .. }
            | Self::Upstream { provider, .. }
            | Self::InvalidResponse { provider, .. } => provider,
        }
    }

    /// Shorthand for an upstream error.
    pub fn upstream(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

//! Caller-facing response value objects.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{DataRequest, FetchResult};

/// Metadata key set on responses rejected by an open circuit breaker.
pub const META_CIRCUIT_BREAKER_OPEN: &str = "circuit_breaker_open";

/// Source reported when the gateway itself produced the response.
pub const GATEWAY_SOURCE: &str = "gateway";

/// Final status of a gateway response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Failed,
    Timeout,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Success => "SUCCESS",
            ResponseStatus::Failed => "FAILED",
            ResponseStatus::Timeout => "TIMEOUT",
        }
    }
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Response returned for one [`DataRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataResponse {
    pub request_id: String,
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub source: String,
    pub status: ResponseStatus,
    /// A provider other than the first candidate served the request.
    pub fallback_used: bool,
    pub latency_ms: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl DataResponse {
    /// Derive a response from a provider result plus request context.
    pub fn from_fetch_result(
        request: &DataRequest,
        result: FetchResult,
        latency_ms: f64,
        fallback_used: bool,
    ) -> Self {
        let status = if result.success {
            ResponseStatus::Success
        } else {
            ResponseStatus::Failed
        };
        let error = if result.success {
            None
        } else {
            Some(result.error_message().to_string())
        };

        Self {
            request_id: request.request_id.clone(),
            success: result.success,
            data: result.data,
            error,
            source: result.source,
            status,
            fallback_used,
            latency_ms,
            timestamp: result.timestamp,
            metadata: result.metadata,
        }
    }

    /// Immediate rejection because the data type's breaker is open.
    pub fn circuit_open(request: &DataRequest) -> Self {
        Self::failed(
            request,
            format!("Circuit breaker open for data type '{}'", request.data_type),
            0.0,
        )
        .with_metadata(META_CIRCUIT_BREAKER_OPEN, true)
    }

    /// The request exceeded its overall timeout.
    pub fn timed_out(request: &DataRequest, latency_ms: f64) -> Self {
        let mut response = Self::failed(
            request,
            format!("Request timed out after {}ms", request.timeout.as_millis()),
            latency_ms,
        );
        response.status = ResponseStatus::Timeout;
        response
    }

    /// Gateway-produced failure.
    pub fn failed(request: &DataRequest, error: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            request_id: request.request_id.clone(),
            success: false,
            data: None,
            error: Some(error.into()),
            source: GATEWAY_SOURCE.to_string(),
            status: ResponseStatus::Failed,
            fallback_used: false,
            latency_ms,
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether the breaker rejected this request (as opposed to exhaustion).
    pub fn is_circuit_rejection(&self) -> bool {
        self.metadata
            .get(META_CIRCUIT_BREAKER_OPEN)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn to_map(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Responses for a [`BatchDataRequest`](super::BatchDataRequest), in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDataResponse {
    pub batch_id: String,
    pub responses: Vec<DataResponse>,
    pub total: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub total_latency_ms: f64,
}

impl BatchDataResponse {
    pub fn from_responses(
        batch_id: impl Into<String>,
        responses: Vec<DataResponse>,
        total_latency_ms: f64,
    ) -> Self {
        let success_count = responses.iter().filter(|r| r.success).count();
        Self {
            batch_id: batch_id.into(),
            total: responses.len(),
            failed_count: responses.len() - success_count,
            success_count,
            responses,
            total_latency_ms,
        }
    }

    pub fn to_map(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

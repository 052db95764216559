//! Caller-facing request value objects.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{DataType, FetchParams, RequestPriority};

/// Default overall timeout for a gateway request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A single request entering the gateway.
///
/// Created per call and never mutated once handed to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRequest {
    /// Unique for the lifetime of the process (UUID v4).
    pub request_id: String,
    pub symbol: String,
    pub data_type: DataType,
    #[serde(default)]
    pub priority: RequestPriority,
    /// Whether the manager may fail over to lower-priority providers.
    pub allow_fallback: bool,
    #[serde(with = "duration_ms", rename = "timeout_ms")]
    pub timeout: Duration,
    /// Extra provider arguments, forwarded verbatim.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl DataRequest {
    pub fn new(symbol: impl Into<String>, data_type: DataType) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            data_type,
            priority: RequestPriority::Normal,
            allow_fallback: true,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: RequestPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_fallback(mut self, allow_fallback: bool) -> Self {
        self.allow_fallback = allow_fallback;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Provider arguments for this request: the metadata entries plus `symbol`.
    pub fn to_params(&self) -> FetchParams {
        let mut params: FetchParams = self
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        params.insert("symbol", self.symbol.clone());
        params
    }

    /// Plain map form for logging and monitoring sinks.
    pub fn to_map(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A group of requests served together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDataRequest {
    pub batch_id: String,
    pub requests: Vec<DataRequest>,
    /// Run items concurrently (bounded) instead of one after another.
    pub parallel: bool,
}

impl BatchDataRequest {
    pub fn new(requests: Vec<DataRequest>) -> Self {
        Self {
            batch_id: Uuid::new_v4().to_string(),
            requests,
            parallel: true,
        }
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

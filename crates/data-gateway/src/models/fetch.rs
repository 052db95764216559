//! Provider call arguments and results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata key carrying the number of provider attempts behind a result.
pub const META_ATTEMPTS: &str = "attempts";

/// Metadata key set when a non-primary candidate served the result.
pub const META_FALLBACK_USED: &str = "fallback_used";

/// Metadata key carrying the measured call latency in milliseconds.
pub const META_LATENCY_MS: &str = "latency_ms";

/// Error text of a failed result that gave no reason.
pub const UNKNOWN_ERROR: &str = "unknown error";

/// Arguments passed to a provider call.
///
/// An ordered string-keyed map so that identical arguments always
/// serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FetchParams(BTreeMap<String, Value>);

impl FetchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Params with only a `symbol` entry.
    pub fn for_symbol(symbol: impl Into<String>) -> Self {
        Self::new().with("symbol", Value::String(symbol.into()))
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn symbol(&self) -> Option<&str> {
        self.0.get("symbol").and_then(Value::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for FetchParams {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Outcome of one provider call.
///
/// Produced once per call and not mutated afterwards; helpers that add
/// metadata consume `self` and return a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    /// Name of the provider (or orchestrator) that produced the result.
    pub source: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl FetchResult {
    /// Successful result carrying `data`.
    pub fn ok(source: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            source: source.into(),
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Failed result. The error string is always present.
    pub fn failure(source: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            data: None,
            error: Some(if error.is_empty() {
                UNKNOWN_ERROR.to_string()
            } else {
                error
            }),
            source: source.into(),
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Make sure a failed result names its error.
    pub(crate) fn with_error_text(mut self) -> Self {
        if !self.success && self.error_message().is_empty() {
            self.error = Some(UNKNOWN_ERROR.to_string());
        }
        self
    }

    /// Error message, or an empty string for successful results.
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }
}

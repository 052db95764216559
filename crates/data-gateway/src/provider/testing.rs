//! Scripted provider shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::ProviderError;
use crate::models::{DataType, FetchParams, FetchResult};

use super::{DataProvider, ProviderCounters, ProviderStats};

#[derive(Clone, Debug)]
pub(crate) enum Behavior {
    Succeed(Value),
    Fail(String),
    Error(ProviderError),
}

pub(crate) struct MockProvider {
    name: String,
    data_type: DataType,
    behavior: Mutex<Behavior>,
    delay: Duration,
    timeout: Duration,
    health: Mutex<Result<bool, ProviderError>>,
    health_delay: Duration,
    calls: AtomicUsize,
    counters: ProviderCounters,
}

impl MockProvider {
    pub(crate) fn new(name: &str, data_type: DataType, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            behavior: Mutex::new(behavior),
            delay: Duration::ZERO,
            timeout: Duration::from_secs(5),
            health: Mutex::new(Ok(true)),
            health_delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            counters: ProviderCounters::new(),
        }
    }

    pub(crate) fn succeeding(name: &str, data_type: DataType, data: Value) -> Self {
        Self::new(name, data_type, Behavior::Succeed(data))
    }

    pub(crate) fn failing(name: &str, data_type: DataType, error: &str) -> Self {
        Self::new(name, data_type, Behavior::Fail(error.to_string()))
    }

    pub(crate) fn erroring(name: &str, data_type: DataType, error: ProviderError) -> Self {
        Self::new(name, data_type, Behavior::Error(error))
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn with_health_delay(mut self, delay: Duration) -> Self {
        self.health_delay = delay;
        self
    }

    pub(crate) fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub(crate) fn set_health(&self, health: Result<bool, ProviderError>) {
        *self.health.lock().unwrap() = health;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(&self, _params: &FetchParams) -> Result<FetchResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            Behavior::Succeed(data) => {
                self.counters.record(true);
                Ok(FetchResult::ok(self.name.clone(), data))
            }
            Behavior::Fail(error) => {
                self.counters.record(false);
                Ok(FetchResult::failure(self.name.clone(), error))
            }
            Behavior::Error(error) => {
                self.counters.record(false);
                Err(error)
            }
        }
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        if !self.health_delay.is_zero() {
            tokio::time::sleep(self.health_delay).await;
        }
        self.health.lock().unwrap().clone()
    }

    fn stats(&self) -> ProviderStats {
        self.counters.snapshot()
    }
}

//! Hot backup racing for latency-critical reads.
//!
//! The primary call and every backup are spawned at once under a single
//! deadline. Depending on [`RaceMode`] the race stops at the first success or
//! waits for every call. Whatever is still running at that point is aborted
//! and never awaited again.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::errors::ProviderError;
use crate::models::{FetchParams, FetchResult};
use crate::provider::{call_provider_owned, elapsed_ms, CallOutcome, DataProvider};

/// Source name used when no call finished before the deadline.
pub const HOT_BACKUP_SOURCE: &str = "hot_backup";

const DEFAULT_RACE_TIMEOUT: Duration = Duration::from_secs(5);

/// When a race stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceMode {
    /// Stop as soon as any call succeeds.
    #[default]
    FirstSuccess,
    /// Wait for every call, or the deadline.
    AllWithinDeadline,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HotBackupConfig {
    /// Overall deadline for the race.
    pub timeout: Duration,
    pub mode: RaceMode,
}

impl Default for HotBackupConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_RACE_TIMEOUT,
            mode: RaceMode::default(),
        }
    }
}

/// One contestant in a race.
pub struct BackupCall {
    name: String,
    future: BoxFuture<'static, CallOutcome>,
}

impl BackupCall {
    /// Wrap an arbitrary fetch. The call is timed and an `Err` becomes a
    /// failed result.
    pub fn new<F>(name: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = Result<FetchResult, ProviderError>> + Send + 'static,
    {
        let name = name.into();
        let label = name.clone();
        let future = async move {
            let started = Instant::now();
            let outcome = future.await;
            CallOutcome::from_result(label, outcome, elapsed_ms(started))
        }
        .boxed();
        Self { name, future }
    }

    /// Call `provider.fetch` under its declared timeout.
    pub fn from_provider(provider: Arc<dyn DataProvider>, params: FetchParams) -> Self {
        Self {
            name: provider.name().to_string(),
            future: call_provider_owned(provider, params).boxed(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Outcome of a race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotBackupResult {
    pub success: bool,
    /// First success in submission order, or the first failure to finish,
    /// or a synthetic timeout when nothing finished.
    pub primary_response: FetchResult,
    /// Other successes that finished before the race stopped.
    pub backup_responses: Vec<FetchResult>,
    /// A backup (not the primary call) produced `primary_response`.
    pub used_backup: bool,
    /// Calls aborted when the race stopped.
    pub cancelled: usize,
    pub latency_ms: f64,
}

/// Cumulative race counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HotBackupStats {
    pub races: u64,
    pub successes: u64,
    pub backup_wins: u64,
    pub deadline_exceeded: u64,
    pub cancelled_calls: u64,
}

#[derive(Debug, Default)]
struct RaceCounters {
    races: AtomicU64,
    successes: AtomicU64,
    backup_wins: AtomicU64,
    deadline_exceeded: AtomicU64,
    cancelled_calls: AtomicU64,
}

/// Races a primary call against backups.
#[derive(Debug, Default)]
pub struct HotBackupManager {
    config: HotBackupConfig,
    counters: RaceCounters,
}

impl HotBackupManager {
    pub fn new(config: HotBackupConfig) -> Self {
        Self {
            config,
            counters: RaceCounters::default(),
        }
    }

    pub fn config(&self) -> &HotBackupConfig {
        &self.config
    }

    /// Race `primary` against `backups` under the configured deadline.
    pub async fn race(&self, primary: BackupCall, backups: Vec<BackupCall>) -> HotBackupResult {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.timeout;
        let total = backups.len() + 1;

        let mut tasks = JoinSet::new();
        for (index, call) in std::iter::once(primary).chain(backups).enumerate() {
            debug!("Hot backup: starting call {} ('{}')", index, call.name);
            let future = call.future;
            tasks.spawn(async move { (index, future.await) });
        }

        let mut completed: Vec<Option<CallOutcome>> = vec![None; total];
        let mut finish_order = Vec::with_capacity(total);
        let mut deadline_hit = false;

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((index, outcome)))) => {
                    let success = outcome.success();
                    debug!(
                        "Hot backup: call {} ('{}') finished in {:.1}ms (success: {})",
                        index, outcome.provider, outcome.latency_ms, success
                    );
                    completed[index] = Some(outcome);
                    finish_order.push(index);
                    if success && self.config.mode == RaceMode::FirstSuccess {
                        break;
                    }
                }
                Ok(Some(Err(e))) => {
                    warn!("Hot backup: call task failed: {}", e);
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_hit = true;
                    debug!(
                        "Hot backup: deadline of {:?} reached with {} calls pending",
                        self.config.timeout,
                        tasks.len()
                    );
                    break;
                }
            }
        }

        let cancelled = tasks.len();
        tasks.abort_all();
        drop(tasks);

        let result = self.settle(completed, &finish_order, cancelled, elapsed_ms(started));
        self.record(&result, deadline_hit && finish_order.is_empty());
        result
    }

    /// Race `primary` against `backups`, each called with `params`.
    pub async fn execute(
        &self,
        primary: Arc<dyn DataProvider>,
        backups: Vec<Arc<dyn DataProvider>>,
        params: &FetchParams,
    ) -> HotBackupResult {
        let primary = BackupCall::from_provider(primary, params.clone());
        let backups = backups
            .into_iter()
            .map(|provider| BackupCall::from_provider(provider, params.clone()))
            .collect();
        self.race(primary, backups).await
    }

    fn settle(
        &self,
        completed: Vec<Option<CallOutcome>>,
        finish_order: &[usize],
        cancelled: usize,
        latency_ms: f64,
    ) -> HotBackupResult {
        let first_failure = finish_order
            .first()
            .and_then(|&index| completed[index].as_ref())
            .map(|outcome| outcome.result.clone());

        let mut successes = completed
            .into_iter()
            .enumerate()
            .filter_map(|(index, outcome)| outcome.map(|outcome| (index, outcome)))
            .filter(|(_, outcome)| outcome.success());

        if let Some((winner, outcome)) = successes.next() {
            return HotBackupResult {
                success: true,
                primary_response: outcome.result,
                backup_responses: successes.map(|(_, outcome)| outcome.result).collect(),
                used_backup: winner > 0,
                cancelled,
                latency_ms,
            };
        }

        let primary_response = first_failure.unwrap_or_else(|| {
            FetchResult::failure(
                HOT_BACKUP_SOURCE,
                format!("Timeout: no call finished within {:?}", self.config.timeout),
            )
        });

        HotBackupResult {
            success: false,
            primary_response,
            backup_responses: Vec::new(),
            used_backup: false,
            cancelled,
            latency_ms,
        }
    }

    fn record(&self, result: &HotBackupResult, nothing_finished: bool) {
        let counters = &self.counters;
        counters.races.fetch_add(1, Ordering::Relaxed);
        counters
            .cancelled_calls
            .fetch_add(result.cancelled as u64, Ordering::Relaxed);
        if result.success {
            counters.successes.fetch_add(1, Ordering::Relaxed);
        }
        if result.used_backup {
            counters.backup_wins.fetch_add(1, Ordering::Relaxed);
        }
        if nothing_finished {
            counters.deadline_exceeded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> HotBackupStats {
        let counters = &self.counters;
        HotBackupStats {
            races: counters.races.load(Ordering::Relaxed),
            successes: counters.successes.load(Ordering::Relaxed),
            backup_wins: counters.backup_wins.load(Ordering::Relaxed),
            deadline_exceeded: counters.deadline_exceeded.load(Ordering::Relaxed),
            cancelled_calls: counters.cancelled_calls.load(Ordering::Relaxed),
        }
    }
}

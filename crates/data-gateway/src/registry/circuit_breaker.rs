//! Per-key circuit breaker for fault tolerance.
//!
//! Implements the circuit breaker pattern to stop hammering a failing
//! data type. The circuit has three states:
//!
//! - **Closed**: Normal operation, requests are allowed through.
//! - **Open**: Upstreams are failing, requests are rejected.
//! - **HalfOpen**: Testing recovery with a limited number of probes.
//!
//! Each breaker owns its own lock; breakers for different keys never
//! contend with each other. State is in-memory and lives as long as the
//! owning registry.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Default number of failures before opening the circuit.
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default number of half-open successes needed to close the circuit.
const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;

/// Default time to wait before transitioning from Open to HalfOpen.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of concurrent half-open probes.
const DEFAULT_HALF_OPEN_MAX_CALLS: u32 = 1;

/// Circuit breaker state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - requests are allowed.
    Closed,
    /// Upstreams are failing - requests are blocked.
    Open,
    /// Testing recovery - limited requests allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in Closed before opening the circuit.
    pub failure_threshold: u32,
    /// Half-open successes needed to close the circuit.
    pub success_threshold: u32,
    /// Time since the last failure before an Open circuit may probe.
    pub timeout: Duration,
    /// Maximum in-flight probes while HalfOpen.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            timeout: DEFAULT_TIMEOUT,
            half_open_max_calls: DEFAULT_HALF_OPEN_MAX_CALLS,
        }
    }
}

/// Mutable circuit state, only touched under the breaker lock.
#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    /// Consecutive failures while Closed.
    failure_count: u32,
    /// Successes in the current HalfOpen window.
    success_count: u32,
    /// Probes admitted and not yet reported in the current HalfOpen window.
    half_open_calls: u32,
    /// Bumped on every entry into HalfOpen.
    half_open_window: u64,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    times_opened: u64,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            half_open_calls: 0,
            half_open_window: 0,
            last_failure: None,
            last_failure_at: None,
            times_opened: 0,
        }
    }
}

/// What [`CircuitBreaker::admit`] decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Admission {
    Denied,
    Allowed,
    /// Admitted as a probe of the given HalfOpen window.
    Probe(u64),
}

/// Admission handed out by [`CircuitBreaker::try_acquire`].
///
/// Report the outcome with [`success`](Self::success) or
/// [`failure`](Self::failure). A permit dropped without a report (the
/// caller was cancelled, or bailed out early) gives its half-open probe
/// slot back, so an abandoned probe never wedges the breaker.
#[derive(Debug)]
#[must_use = "report the outcome through the permit"]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe_window: Option<u64>,
    reported: bool,
}

impl BreakerPermit<'_> {
    /// Whether this permit holds a half-open probe slot.
    pub fn is_probe(&self) -> bool {
        self.probe_window.is_some()
    }

    pub fn success(mut self) {
        self.reported = true;
        self.breaker.record_success();
    }

    pub fn failure(mut self) {
        self.reported = true;
        self.breaker.record_failure();
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.reported {
            return;
        }
        if let Some(window) = self.probe_window {
            self.breaker.release_probe(window);
        }
    }
}

/// Snapshot of a single breaker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub half_open_calls: u32,
    pub times_opened: u64,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub failure_threshold: u32,
    pub timeout_secs: f64,
}

/// Circuit breaker for one key.
///
/// Thread-safe; every read-modify-write happens under one mutex so that
/// admission and the Open -> HalfOpen transition are a single step.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    circuit: Mutex<Circuit>,
}

impl CircuitBreaker {
    /// Create a breaker with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    /// Create a breaker with custom configuration.
    pub fn with_config(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            circuit: Mutex::new(Circuit::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Lock the circuit, recovering from poison if necessary.
    ///
    /// The worst case after a poisoned lock is a slightly stale circuit,
    /// which is better than panicking on every later request.
    fn lock_circuit(&self) -> MutexGuard<'_, Circuit> {
        self.circuit.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker '{}' mutex was poisoned, recovering", self.name);
            poisoned.into_inner()
        })
    }

    /// Check whether a request may proceed.
    ///
    /// Closed always admits. Open admits nothing until `timeout` has passed
    /// since the last failure; at that point the circuit moves to HalfOpen
    /// and the same call is evaluated as a probe. HalfOpen admits at most
    /// `half_open_max_calls` outstanding probes.
    ///
    /// An admitted probe must be followed by `record_success` or
    /// `record_failure`. Callers that may be cancelled in between should use
    /// [`try_acquire`](Self::try_acquire) instead.
    pub fn can_execute(&self) -> bool {
        self.admit() != Admission::Denied
    }

    /// Like [`can_execute`](Self::can_execute), returning a permit that
    /// reports the outcome and frees its probe slot if dropped unreported.
    pub fn try_acquire(&self) -> Option<BreakerPermit<'_>> {
        let probe_window = match self.admit() {
            Admission::Denied => return None,
            Admission::Allowed => None,
            Admission::Probe(window) => Some(window),
        };
        Some(BreakerPermit {
            breaker: self,
            probe_window,
            reported: false,
        })
    }

    fn admit(&self) -> Admission {
        let mut circuit = self.lock_circuit();

        match circuit.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::HalfOpen => self.admit_probe(&mut circuit),
            CircuitState::Open => {
                let elapsed = circuit
                    .last_failure
                    .map(|last_failure| last_failure.elapsed() >= self.config.timeout)
                    .unwrap_or(true);

                if !elapsed {
                    return Admission::Denied;
                }

                info!(
                    "Circuit breaker: transitioning '{}' from Open to HalfOpen",
                    self.name
                );
                circuit.state = CircuitState::HalfOpen;
                circuit.success_count = 0;
                circuit.half_open_calls = 0;
                circuit.half_open_window += 1;
                self.admit_probe(&mut circuit)
            }
        }
    }

    fn admit_probe(&self, circuit: &mut Circuit) -> Admission {
        if circuit.half_open_calls < self.config.half_open_max_calls {
            circuit.half_open_calls += 1;
            Admission::Probe(circuit.half_open_window)
        } else {
            debug!(
                "Circuit breaker: '{}' HalfOpen probe limit reached ({})",
                self.name, self.config.half_open_max_calls
            );
            Admission::Denied
        }
    }

    /// Return an unreported probe slot. Slots of an earlier HalfOpen window
    /// were already cleared when that window ended.
    fn release_probe(&self, window: u64) {
        let mut circuit = self.lock_circuit();
        if circuit.state == CircuitState::HalfOpen && circuit.half_open_window == window {
            circuit.half_open_calls = circuit.half_open_calls.saturating_sub(1);
            debug!(
                "Circuit breaker: abandoned probe for '{}' released ({} in flight)",
                self.name, circuit.half_open_calls
            );
        }
    }

    /// Record a successful request.
    ///
    /// In Closed state: resets the failure count.
    /// In HalfOpen state: counts towards closing the circuit.
    pub fn record_success(&self) {
        let mut circuit = self.lock_circuit();

        match circuit.state {
            CircuitState::Closed => {
                circuit.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                circuit.success_count += 1;
                circuit.half_open_calls = circuit.half_open_calls.saturating_sub(1);
                debug!(
                    "Circuit breaker: success for '{}' in HalfOpen ({}/{})",
                    self.name, circuit.success_count, self.config.success_threshold
                );

                if circuit.success_count >= self.config.success_threshold {
                    info!(
                        "Circuit breaker: closing circuit for '{}' after {} successes",
                        self.name, circuit.success_count
                    );
                    circuit.state = CircuitState::Closed;
                    circuit.failure_count = 0;
                    circuit.success_count = 0;
                    circuit.half_open_calls = 0;
                }
            }
            CircuitState::Open => {
                // A call admitted before the circuit opened finished late.
                debug!(
                    "Circuit breaker: late success for '{}' in Open state ignored",
                    self.name
                );
            }
        }
    }

    /// Record a failed request.
    ///
    /// In Closed state the circuit opens once `failure_threshold` is reached.
    /// In HalfOpen state any failure immediately reopens the circuit.
    pub fn record_failure(&self) {
        let mut circuit = self.lock_circuit();

        circuit.last_failure = Some(Instant::now());
        circuit.last_failure_at = Some(Utc::now());

        match circuit.state {
            CircuitState::Closed => {
                circuit.failure_count += 1;
                if circuit.failure_count >= self.config.failure_threshold {
                    info!(
                        "Circuit breaker: opening circuit for '{}' after {} failures",
                        self.name, circuit.failure_count
                    );
                    circuit.state = CircuitState::Open;
                    circuit.times_opened += 1;
                } else {
                    debug!(
                        "Circuit breaker: failure for '{}' ({}/{})",
                        self.name, circuit.failure_count, self.config.failure_threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                info!(
                    "Circuit breaker: reopening circuit for '{}' after failure in HalfOpen",
                    self.name
                );
                circuit.state = CircuitState::Open;
                circuit.success_count = 0;
                circuit.half_open_calls = 0;
                circuit.times_opened += 1;
            }
            CircuitState::Open => {
                debug!(
                    "Circuit breaker: additional failure for '{}' (already open)",
                    self.name
                );
            }
        }
    }

    /// Get the current state.
    pub fn state(&self) -> CircuitState {
        self.lock_circuit().state
    }

    /// Get the consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.lock_circuit().failure_count
    }

    /// Reset the circuit to its initial Closed state.
    pub fn reset(&self) {
        let mut circuit = self.lock_circuit();
        info!("Circuit breaker: manually resetting circuit for '{}'", self.name);
        let window = circuit.half_open_window;
        *circuit = Circuit::new();
        circuit.half_open_window = window;
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let circuit = self.lock_circuit();
        CircuitBreakerStats {
            name: self.name.clone(),
            state: circuit.state,
            failure_count: circuit.failure_count,
            success_count: circuit.success_count,
            half_open_calls: circuit.half_open_calls,
            times_opened: circuit.times_opened,
            last_failure_time: circuit.last_failure_at,
            failure_threshold: self.config.failure_threshold,
            timeout_secs: self.config.timeout.as_secs_f64(),
        }
    }
}

//! Three-state circuit breaker guarding calls to a remote authority.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Result, SettlementError};

/// Thresholds for opening and recovering a breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures inside `failure_window` that open the breaker.
    pub failure_threshold: u32,
    /// Failures older than this no longer count.
    pub failure_window: Duration,
    /// How long the breaker stays open before admitting a trial call.
    pub cool_down: Duration,
    /// Trial calls allowed in flight while half-open.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            cool_down: Duration::from_secs(10),
            half_open_max_calls: 1,
        }
    }
}

/// The state of a circuit breaker.
///
/// State transitions:
/// ```text
/// Closed ──(threshold)──► Open ──(cool-down)──► HalfOpen ──┬──► Closed
///                          ▲                               │
///                          └─────────(trial fails)─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }

    fn gauge_value(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    trials_in_flight: u32,
    forced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

/// Process-wide breaker shared by every caller of one remote operation.
///
/// All bookkeeping happens under one mutex that is never held across an
/// await point.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                trials_in_flight: 0,
                forced: false,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the current state.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Opens the breaker and keeps it open until [`reset`](Self::reset).
    pub fn force_open(&self) {
        let mut inner = self.lock();
        inner.forced = true;
        self.transition(&mut inner, CircuitState::Open);
    }

    /// Closes the breaker and forgets recorded failures.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.forced = false;
        self.transition(&mut inner, CircuitState::Closed);
    }

    /// Runs `call` if the breaker admits it, recording the outcome.
    ///
    /// Rejected calls fail with [`SettlementError::CircuitOpen`] without
    /// running `call`. Only remote failures count against the breaker; a
    /// request the remote refused still proves it answers.
    pub async fn call<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let admission = self.try_acquire()?;
        let result = call().await;

        match &result {
            Err(e) if e.is_remote() => self.on_failure(admission),
            _ => self.on_success(admission),
        }
        result
    }

    fn try_acquire(&self) -> Result<Admission> {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.cool_down);
                if cooled && !inner.forced {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.trials_in_flight = 1;
                    Ok(Admission::Trial)
                } else {
                    Err(self.reject())
                }
            }
            CircuitState::HalfOpen => {
                if inner.trials_in_flight < self.config.half_open_max_calls {
                    inner.trials_in_flight += 1;
                    Ok(Admission::Trial)
                } else {
                    Err(self.reject())
                }
            }
        }
    }

    fn on_success(&self, admission: Admission) {
        let mut inner = self.lock();
        match (admission, inner.state) {
            (Admission::Trial, CircuitState::HalfOpen) => {
                tracing::info!(breaker = self.name, "trial call succeeded, closing circuit");
                self.transition(&mut inner, CircuitState::Closed);
            }
            (Admission::Normal, CircuitState::Closed) => inner.failures.clear(),
            _ => {}
        }
    }

    fn on_failure(&self, admission: Admission) {
        let mut inner = self.lock();
        match (admission, inner.state) {
            (Admission::Trial, CircuitState::HalfOpen) => {
                tracing::warn!(breaker = self.name, "trial call failed, re-opening circuit");
                self.transition(&mut inner, CircuitState::Open);
            }
            (Admission::Normal, CircuitState::Closed) => {
                let now = Instant::now();
                inner.failures.push_back(now);
                while inner
                    .failures
                    .front()
                    .is_some_and(|t| now.duration_since(*t) > self.config.failure_window)
                {
                    inner.failures.pop_front();
                }

                if inner.failures.len() >= self.config.failure_threshold as usize {
                    tracing::warn!(
                        breaker = self.name,
                        failures = inner.failures.len(),
                        "failure threshold reached, opening circuit"
                    );
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            _ => {}
        }
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        inner.state = to;
        inner.trials_in_flight = 0;
        match to {
            CircuitState::Closed => {
                inner.failures.clear();
                inner.opened_at = None;
            }
            CircuitState::Open => {
                inner.opened_at = Some(Instant::now());
                metrics::counter!("circuit_breaker_opened_total", "breaker" => self.name)
                    .increment(1);
            }
            CircuitState::HalfOpen => {}
        }
        metrics::gauge!("circuit_breaker_state", "breaker" => self.name).set(to.gauge_value());
    }

    fn reject(&self) -> SettlementError {
        metrics::counter!("circuit_breaker_rejected_total", "breaker" => self.name).increment(1);
        SettlementError::CircuitOpen { breaker: self.name }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

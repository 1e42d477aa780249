//! Per-operation circuit breakers.
//!
//! A breaker starts `closed`. When `failure_threshold` failures land inside
//! the trailing `window` it opens and every call fails fast. After
//! `reset_timeout` the next [`CircuitBreaker::should_allow`] moves it to
//! `half_open`; `half_open_calls` consecutive successes close it again and
//! any failure re-opens it.
//!
//! All methods have an `_at` variant taking an explicit [`Instant`] so the
//! state machine can be driven deterministically in tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use dealbrief_core::BreakerConfig;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Health-probe view of one breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerStatus {
    pub state: BreakerState,
    /// Failures recorded since the breaker last closed.
    pub failures: usize,
    /// Failures per second inside the sliding window.
    pub error_rate: f64,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failures: usize,
    half_open_successes: usize,
    opened_at: Option<Instant>,
    recent_failures: VecDeque<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                half_open_successes: 0,
                opened_at: None,
                recent_failures: VecDeque::new(),
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    // The state is a handful of counters; a panic mid-update cannot leave
    // it in a shape worse than stale, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn prune(&self, inner: &mut Inner, now: Instant) {
        while let Some(&oldest) = inner.recent_failures.front() {
            if now.saturating_duration_since(oldest) > self.config.window {
                inner.recent_failures.pop_front();
            } else {
                break;
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    #[must_use]
    pub fn should_allow(&self) -> bool {
        self.should_allow_at(Instant::now())
    }

    /// Returns `false` while open; transitions `open -> half_open` once the
    /// reset timeout has elapsed.
    pub fn should_allow_at(&self, now: Instant) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map_or(self.config.reset_timeout, |at| {
                        now.saturating_duration_since(at)
                    });
                if elapsed >= self.config.reset_timeout {
                    tracing::info!(breaker = %self.name, "circuit breaker entering half-open state");
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state == BreakerState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes >= self.config.half_open_calls {
                tracing::info!(
                    breaker = %self.name,
                    successes = inner.half_open_successes,
                    "circuit breaker closing"
                );
                inner.state = BreakerState::Closed;
                inner.failures = 0;
                inner.half_open_successes = 0;
                inner.opened_at = None;
                inner.recent_failures.clear();
            }
        }
    }

    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_failure_at(&self, now: Instant) {
        let mut inner = self.lock();
        inner.failures += 1;
        inner.recent_failures.push_back(now);
        self.prune(&mut inner, now);

        match inner.state {
            BreakerState::Closed
                if inner.recent_failures.len() >= self.config.failure_threshold =>
            {
                tracing::warn!(
                    breaker = %self.name,
                    failures = inner.recent_failures.len(),
                    "circuit breaker opening"
                );
                inner.state = BreakerState::Open;
                inner.opened_at = Some(now);
            }
            BreakerState::HalfOpen => {
                tracing::warn!(breaker = %self.name, "half-open probe failed, re-opening");
                inner.state = BreakerState::Open;
                inner.opened_at = Some(now);
                inner.half_open_successes = 0;
            }
            _ => {}
        }
    }

    #[must_use]
    pub fn status(&self) -> BreakerStatus {
        self.status_at(Instant::now())
    }

    #[must_use]
    pub fn status_at(&self, now: Instant) -> BreakerStatus {
        let mut inner = self.lock();
        self.prune(&mut inner, now);
        let window_secs = self.config.window.as_secs_f64().max(1.0);
        #[allow(clippy::cast_precision_loss)]
        let error_rate = inner.recent_failures.len() as f64 / window_secs;
        BreakerStatus {
            state: inner.state,
            failures: inner.failures,
            error_rate,
        }
    }
}

/// Lazily-created breakers keyed by operation name. Shared by handing out
/// an `Arc<BreakerRegistry>`; nothing here is process-global.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the breaker for `name`.
    #[must_use]
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self
            .breakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            breakers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config.clone()))),
        )
    }

    #[must_use]
    pub fn status(&self) -> BTreeMap<String, BreakerStatus> {
        let breakers = self
            .breakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        breakers
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.status()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(10),
            half_open_calls: 2,
            window: Duration::from_secs(60),
        }
    }

    fn open_breaker(t0: Instant) -> CircuitBreaker {
        let breaker = CircuitBreaker::new("search", config());
        for _ in 0..3 {
            breaker.record_failure_at(t0);
        }
        breaker
    }

    #[test]
    fn opens_after_threshold_failures_in_window() {
        let t0 = Instant::now();
        let breaker = CircuitBreaker::new("search", config());
        breaker.record_failure_at(t0);
        breaker.record_failure_at(t0);
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.should_allow_at(t0));

        breaker.record_failure_at(t0);
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.should_allow_at(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn failures_outside_window_do_not_count() {
        let t0 = Instant::now();
        let breaker = CircuitBreaker::new("search", config());
        breaker.record_failure_at(t0);
        breaker.record_failure_at(t0);
        breaker.record_failure_at(t0 + Duration::from_secs(61));
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn stays_open_until_reset_timeout() {
        let t0 = Instant::now();
        let breaker = open_breaker(t0);
        assert!(!breaker.should_allow_at(t0 + Duration::from_secs(9)));
        assert!(breaker.should_allow_at(t0 + Duration::from_secs(10)));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_successes_close_the_breaker() {
        let t0 = Instant::now();
        let breaker = open_breaker(t0);
        assert!(breaker.should_allow_at(t0 + Duration::from_secs(11)));

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.status_at(t0 + Duration::from_secs(11)).failures, 0);
    }

    #[test]
    fn half_open_failure_reopens() {
        let t0 = Instant::now();
        let breaker = open_breaker(t0);
        let probe = t0 + Duration::from_secs(11);
        assert!(breaker.should_allow_at(probe));
        breaker.record_success();
        breaker.record_failure_at(probe);
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.should_allow_at(probe + Duration::from_secs(1)));
        assert!(breaker.should_allow_at(probe + Duration::from_secs(10)));
    }

    #[test]
    fn success_while_closed_is_a_no_op() {
        let breaker = CircuitBreaker::new("search", config());
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn status_reports_error_rate_per_second() {
        let t0 = Instant::now();
        let breaker = CircuitBreaker::new("search", config());
        breaker.record_failure_at(t0);
        breaker.record_failure_at(t0);
        let status = breaker.status_at(t0);
        assert_eq!(status.failures, 2);
        assert!((status.error_rate - 2.0 / 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn registry_returns_same_breaker_per_name() {
        let registry = BreakerRegistry::new(config());
        let a = registry.breaker("completion");
        let b = registry.breaker("completion");
        assert!(Arc::ptr_eq(&a, &b));

        let _ = registry.breaker("search");
        let status = registry.status();
        assert_eq!(status.len(), 2);
        assert_eq!(status["completion"].state, BreakerState::Closed);
    }

    #[test]
    fn registries_are_isolated() {
        let first = BreakerRegistry::new(config());
        let second = BreakerRegistry::new(config());
        for _ in 0..3 {
            first.breaker("search").record_failure();
        }
        assert_eq!(first.breaker("search").state(), BreakerState::Open);
        assert_eq!(second.breaker("search").state(), BreakerState::Closed);
    }
}

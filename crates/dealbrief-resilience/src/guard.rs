use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use dealbrief_core::BreakerConfig;

use crate::breaker::BreakerRegistry;
use crate::error::ServiceError;
use crate::metrics::MetricsRecorder;

/// Breakers and metrics shared by every collaborator client of a process.
#[derive(Debug, Clone)]
pub struct Guard {
    pub breakers: Arc<BreakerRegistry>,
    pub metrics: Arc<MetricsRecorder>,
}

impl Guard {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            breakers: Arc::new(BreakerRegistry::new(config)),
            metrics: Arc::new(MetricsRecorder::new()),
        }
    }

    /// Run `operation` behind the breaker named `name`, recording metrics.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::CircuitOpen`] without calling `operation`
    /// while the breaker is open, otherwise whatever `operation` returns.
    pub async fn call<T, F, Fut>(&self, name: &str, operation: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let breaker = self.breakers.breaker(name);
        if !breaker.should_allow() {
            tracing::warn!(breaker = name, "circuit breaker open, failing fast");
            return Err(ServiceError::CircuitOpen(name.to_string()));
        }

        let started = Instant::now();
        let result = operation().await;
        let latency = started.elapsed();

        match &result {
            Ok(_) => {
                breaker.record_success();
                self.metrics.record(name, latency, None);
            }
            Err(err) => {
                breaker.record_failure();
                self.metrics.record(name, latency, Some(err.kind()));
                tracing::error!(breaker = name, error = %err, "circuit breaker recorded failure");
            }
        }
        result
    }
}

/// Like [`Guard::call`], but an open breaker yields `fallback` instead of
/// an error.
///
/// # Errors
///
/// Propagates the failure of `operation` when it was attempted.
pub async fn guarded_call<T, F, Fut>(
    guard: &Guard,
    name: &str,
    fallback: T,
    operation: F,
) -> Result<T, ServiceError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    match guard.call(name, operation).await {
        Err(ServiceError::CircuitOpen(_)) => Ok(fallback),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::BreakerState;

    fn guard() -> Guard {
        Guard::new(BreakerConfig {
            failure_threshold: 2,
            reset_timeout: Duration::from_secs(60),
            half_open_calls: 1,
            window: Duration::from_secs(60),
        })
    }

    fn failing() -> Result<u32, ServiceError> {
        Err(ServiceError::Empty("search".to_string()))
    }

    #[tokio::test]
    async fn success_is_recorded() {
        let guard = guard();
        let value = guard.call("search", || async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        let snap = guard.metrics.snapshot("search");
        assert_eq!(snap.total_calls, 1);
        assert!((snap.success_rate - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn failures_open_breaker_and_fallback_is_returned() {
        let guard = guard();
        for _ in 0..2 {
            let result = guarded_call(&guard, "search", 0, || async { failing() }).await;
            assert!(matches!(result, Err(ServiceError::Empty(_))));
        }
        assert_eq!(guard.breakers.breaker("search").state(), BreakerState::Open);

        let counter = AtomicU32::new(0);
        let calls = &counter;
        let value = guarded_call(&guard, "search", 99, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        })
        .await
        .unwrap();
        assert_eq!(value, 99);
        assert_eq!(calls.load(Ordering::SeqCst), 0, "operation must be skipped");
        assert_eq!(guard.metrics.snapshot("search").error_counts["empty"], 2);
    }

    #[tokio::test]
    async fn open_breaker_without_fallback_is_an_error() {
        let guard = guard();
        for _ in 0..2 {
            let _ = guard.call("completion", || async { failing() }).await;
        }
        let result = guard.call("completion", || async { Ok(1) }).await;
        assert!(matches!(result, Err(ServiceError::CircuitOpen(ref n)) if n == "completion"));
    }
}

//! Fault isolation for calls to external services.
//!
//! Every outbound call is wrapped by a named [`CircuitBreaker`] (fail fast
//! while a service is unhealthy) and recorded by the [`MetricsRecorder`].
//! Transient HTTP failures are retried below the breaker by
//! [`retry_with_backoff`].

pub mod breaker;
pub mod error;
pub mod guard;
pub mod metrics;
pub mod retry;

pub use breaker::{BreakerRegistry, BreakerState, BreakerStatus, CircuitBreaker};
pub use error::ServiceError;
pub use guard::{guarded_call, Guard};
pub use metrics::{MetricsRecorder, MetricsSnapshot};
pub use retry::retry_with_backoff;

//! Three-state circuit breaker for one logical service.
//!
//! The Open -> HalfOpen transition is lazy: there is no background timer.
//! Reading the state checks how long ago the last failure was recorded and
//! moves to HalfOpen once the reset timeout has strictly elapsed. The check
//! and the mutation happen under the breaker's own lock, so concurrent
//! readers and recorders never observe a torn transition.

use std::sync::Mutex;
use std::time::Duration;

use stepwise_types::breaker::{BreakerStatus, CircuitState};
use tokio::time::Instant;

/// Failures in a row before a breaker opens.
pub const DEFAULT_MAX_FAILURES: u32 = 3;

/// Cool-down before an open breaker admits a trial call.
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    /// Cleared on success.
    last_failure: Option<Instant>,
    total_calls: u64,
    total_failures: u64,
}

/// Failure counter and gate for a single service.
#[derive(Debug)]
pub struct CircuitBreaker {
    service_id: String,
    max_failures: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(service_id: impl Into<String>, max_failures: u32, reset_timeout: Duration) -> Self {
        Self {
            service_id: service_id.into(),
            // A zero threshold would open on a breaker that never failed.
            max_failures: max_failures.max(1),
            reset_timeout,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                total_calls: 0,
                total_failures: 0,
            }),
        }
    }

    /// A breaker with the default threshold and cool-down.
    pub fn with_defaults(service_id: impl Into<String>) -> Self {
        Self::new(service_id, DEFAULT_MAX_FAILURES, DEFAULT_RESET_TIMEOUT)
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    /// Current state, applying the lazy Open -> HalfOpen transition.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        inner.state
    }

    /// Consecutive failures since the last success.
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Record a failed call.
    ///
    /// Opens the breaker on the failure that reaches `max_failures`. A failure
    /// recorded while HalfOpen re-opens immediately, since the count is
    /// already at or past the threshold.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        self.refresh(&mut inner);

        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        inner.total_failures += 1;

        if inner.failure_count >= self.max_failures && inner.state != CircuitState::Open {
            let previous = inner.state;
            inner.state = CircuitState::Open;
            tracing::warn!(
                service_id = %self.service_id,
                from = %previous,
                failure_count = inner.failure_count,
                reset_timeout_secs = self.reset_timeout.as_secs(),
                "circuit breaker opened"
            );
        }
    }

    /// Record a successful call: back to Closed with a clean count.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            tracing::info!(
                service_id = %self.service_id,
                from = %inner.state,
                "circuit breaker reset"
            );
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
    }

    /// Count a call that was let through the gate.
    pub(crate) fn record_attempt(&self) {
        self.lock().total_calls += 1;
    }

    /// Point-in-time view for status reporting.
    pub fn status(&self) -> BreakerStatus {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        BreakerStatus {
            service_id: self.service_id.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            max_failures: self.max_failures,
            reset_timeout_secs: self.reset_timeout.as_secs(),
            last_failure_secs_ago: inner.last_failure.map(|t| t.elapsed().as_secs()),
            total_calls: inner.total_calls,
            total_failures: inner.total_failures,
        }
    }

    fn refresh(&self, inner: &mut BreakerInner) {
        if inner.state != CircuitState::Open {
            return;
        }
        let cooled_down = inner
            .last_failure
            .is_none_or(|at| at.elapsed() > self.reset_timeout);
        if cooled_down {
            inner.state = CircuitState::HalfOpen;
            tracing::info!(
                service_id = %self.service_id,
                "circuit breaker half-open, admitting trial call"
            );
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().expect("circuit breaker lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_exactly_at_threshold() {
        for max in 1..=5 {
            let breaker = CircuitBreaker::new("svc", max, DEFAULT_RESET_TIMEOUT);
            for _ in 0..max - 1 {
                breaker.record_failure();
            }
            assert_eq!(breaker.state(), CircuitState::Closed, "max={max}");
            breaker.record_failure();
            assert_eq!(breaker.state(), CircuitState::Open, "max={max}");
        }
    }

    #[test]
    fn test_success_resets_count_while_closed() {
        let breaker = CircuitBreaker::with_defaults("svc");
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.failure_count(), 0);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_open_through_cool_down_then_half_opens() {
        let breaker = CircuitBreaker::new("svc", 2, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes() {
        let breaker = CircuitBreaker::new("svc", 1, Duration::from_secs(5));
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
        assert!(breaker.status().last_failure_secs_ago.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_with_fresh_window() {
        let breaker = CircuitBreaker::new("svc", 2, Duration::from_secs(10));
        breaker.record_failure();
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.failure_count(), 3);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_status_reports_totals() {
        let breaker = CircuitBreaker::new("payments", 3, Duration::from_secs(60));
        breaker.record_attempt();
        breaker.record_failure();
        breaker.record_attempt();
        breaker.record_success();

        let status = breaker.status();
        assert_eq!(status.service_id, "payments");
        assert_eq!(status.total_calls, 2);
        assert_eq!(status.total_failures, 1);
        assert_eq!(status.failure_count, 0);
        assert_eq!(status.reset_timeout_secs, 60);
    }

    #[test]
    fn test_concurrent_failures_are_counted_exactly() {
        let breaker = CircuitBreaker::new("svc", 1000, DEFAULT_RESET_TIMEOUT);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        breaker.record_failure();
                    }
                });
            }
        });
        assert_eq!(breaker.failure_count(), 400);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}

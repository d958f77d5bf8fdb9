//! Registry of circuit breakers keyed by service ID.
//!
//! The manager is explicitly constructed and shared (usually as an
//! `Arc<CircuitBreakerManager>`) by whatever composes the system. Breakers are
//! created lazily on first reference and live as long as the manager.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::FutureExt;
use stepwise_types::breaker::{BreakerStatus, CircuitState};
use stepwise_types::config::CircuitBreakerConfig;

use super::circuit::CircuitBreaker;

/// Returned by [`CircuitBreakerManager::call`] when the service's breaker is
/// open. The wrapped operation was not invoked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circuit breaker open for service '{service_id}'")]
pub struct CircuitOpenError {
    pub service_id: String,
}

/// Thread-safe map of service ID to breaker.
#[derive(Debug, Default)]
pub struct CircuitBreakerManager {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerManager {
    /// A manager whose breakers use the default threshold and cool-down.
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager whose breakers take their settings from `config`
    /// (global defaults plus per-service overrides).
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Get or create the breaker for `service_id` using configured settings.
    pub fn get_breaker(&self, service_id: &str) -> Arc<CircuitBreaker> {
        let settings = self.config.settings_for(service_id);
        self.get_breaker_with(
            service_id,
            settings.max_failures,
            Duration::from_secs(settings.reset_timeout_secs),
        )
    }

    /// Get or create the breaker for `service_id` with explicit settings.
    ///
    /// Settings only apply when this call creates the breaker; an existing
    /// breaker is returned unchanged. Concurrent first calls for the same ID
    /// all receive the same instance.
    pub fn get_breaker_with(
        &self,
        service_id: &str,
        max_failures: u32,
        reset_timeout: Duration,
    ) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(service_id) {
            return Arc::clone(existing.value());
        }

        // The entry API holds the shard's write lock, so only one creator wins.
        let breaker = self
            .breakers
            .entry(service_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(
                    service_id,
                    max_failures,
                    reset_timeout_secs = reset_timeout.as_secs(),
                    "creating circuit breaker"
                );
                Arc::new(CircuitBreaker::new(service_id, max_failures, reset_timeout))
            });
        Arc::clone(breaker.value())
    }

    /// Run `operation` behind the breaker for `service_id`.
    ///
    /// Fails with [`CircuitOpenError`] without invoking `operation` while the
    /// breaker is open. Otherwise the operation's own error is returned
    /// unchanged after being recorded as a failure. A panic in the operation
    /// is recorded as a failure and then resumed.
    pub async fn call<F, Fut, T, E>(&self, service_id: &str, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpenError>,
    {
        let breaker = self.get_breaker(service_id);
        if breaker.state() == CircuitState::Open {
            tracing::debug!(service_id, "call rejected by open circuit");
            return Err(CircuitOpenError {
                service_id: service_id.to_string(),
            }
            .into());
        }

        breaker.record_attempt();
        match AssertUnwindSafe(operation()).catch_unwind().await {
            Ok(Ok(value)) => {
                breaker.record_success();
                Ok(value)
            }
            Ok(Err(err)) => {
                breaker.record_failure();
                Err(err)
            }
            Err(panic) => {
                breaker.record_failure();
                std::panic::resume_unwind(panic)
            }
        }
    }

    /// Status of every known breaker, ordered by service ID.
    pub fn statuses(&self) -> Vec<BreakerStatus> {
        let mut statuses: Vec<BreakerStatus> =
            self.breakers.iter().map(|entry| entry.value().status()).collect();
        statuses.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        statuses
    }

    /// Number of breakers created so far.
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use stepwise_types::config::BreakerSettings;

    use super::*;

    #[derive(Debug, PartialEq, thiserror::Error)]
    enum TestError {
        #[error("value error: {0}")]
        Value(String),
        #[error(transparent)]
        Open(#[from] CircuitOpenError),
    }

    #[test]
    fn test_concurrent_first_calls_share_one_breaker() {
        let manager = CircuitBreakerManager::new();
        let breakers: Vec<Arc<CircuitBreaker>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| s.spawn(|| manager.get_breaker("svcX")))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(manager.len(), 1);
        for breaker in &breakers[1..] {
            assert!(Arc::ptr_eq(&breakers[0], breaker));
        }
    }

    #[test]
    fn test_first_writer_wins_on_settings() {
        let manager = CircuitBreakerManager::new();
        let first = manager.get_breaker_with("svc", 5, Duration::from_secs(10));
        let second = manager.get_breaker_with("svc", 1, Duration::from_secs(99));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.max_failures(), 5);
        assert_eq!(second.reset_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_config_overrides_apply_per_service() {
        let mut services = HashMap::new();
        services.insert(
            "http".to_string(),
            BreakerSettings {
                max_failures: 7,
                reset_timeout_secs: 5,
            },
        );
        let manager = CircuitBreakerManager::with_config(CircuitBreakerConfig {
            services,
            ..Default::default()
        });

        assert_eq!(manager.get_breaker("http").max_failures(), 7);
        assert_eq!(manager.get_breaker("shell").max_failures(), 3);
        assert_eq!(
            manager.get_breaker("shell").reset_timeout(),
            Duration::from_secs(60)
        );
    }

    #[tokio::test]
    async fn test_call_propagates_original_error_and_counts_once() {
        let manager = CircuitBreakerManager::new();
        let result: Result<(), TestError> = manager
            .call("svc", || async { Err(TestError::Value("boom".to_string())) })
            .await;

        assert_eq!(result, Err(TestError::Value("boom".to_string())));
        assert_eq!(manager.get_breaker("svc").failure_count(), 1);
    }

    #[tokio::test]
    async fn test_panicking_operation_counts_as_failure_and_resumes() {
        let manager = CircuitBreakerManager::new();
        let outcome = AssertUnwindSafe(manager.call("svc", || async {
            if true {
                panic!("backend crashed");
            }
            Ok::<(), TestError>(())
        }))
        .catch_unwind()
        .await;

        let payload = outcome.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"backend crashed"));
        let status = manager.get_breaker("svc").status();
        assert_eq!(status.failure_count, 1);
        assert_eq!(status.total_calls, 1);
    }

    #[tokio::test]
    async fn test_call_success_returns_value() {
        let manager = CircuitBreakerManager::new();
        let result: Result<u32, TestError> = manager.call("svc", || async { Ok(42) }).await;
        assert_eq!(result, Ok(42));
        assert_eq!(manager.get_breaker("svc").status().total_calls, 1);
    }

    #[tokio::test]
    async fn test_open_circuit_never_invokes_operation() {
        let manager = CircuitBreakerManager::new();
        let counter = AtomicUsize::new(0);
        let invoked = &counter;

        for _ in 0..3 {
            let _: Result<(), TestError> = manager
                .call("svc", move || async move {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::Value("down".to_string()))
                })
                .await;
        }
        assert_eq!(invoked.load(Ordering::SeqCst), 3);
        assert_eq!(manager.get_breaker("svc").state(), CircuitState::Open);

        let result: Result<(), TestError> = manager
            .call("svc", move || async move {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(
            result,
            Err(TestError::Open(CircuitOpenError {
                service_id: "svc".to_string()
            }))
        );
        assert_eq!(invoked.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trial_call_after_cool_down_closes_circuit() {
        let manager = CircuitBreakerManager::new();
        let breaker = manager.get_breaker_with("svc", 1, Duration::from_secs(30));
        breaker.record_failure();

        tokio::time::advance(Duration::from_secs(31)).await;
        let result: Result<&str, TestError> = manager.call("svc", || async { Ok("ok") }).await;

        assert_eq!(result, Ok("ok"));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_statuses_sorted_by_service() {
        let manager = CircuitBreakerManager::new();
        manager.get_breaker("shell");
        manager.get_breaker("http");
        let ids: Vec<String> = manager
            .statuses()
            .into_iter()
            .map(|s| s.service_id)
            .collect();
        assert_eq!(ids, vec!["http".to_string(), "shell".to_string()]);
    }

    #[test]
    fn test_open_error_display() {
        let err = CircuitOpenError {
            service_id: "payments".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "circuit breaker open for service 'payments'"
        );
    }
}

//! Shared bound on calls to external model services.

use cyclecare_core::{AppError, AppResult, RagConfig};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Caps concurrent external calls and applies a per-call timeout.
///
/// Clones share the same permits, so one limiter handed to both the
/// embedder and the generator bounds their combined concurrency.
#[derive(Debug, Clone)]
pub struct ExternalCallLimiter {
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl ExternalCallLimiter {
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
        }
    }

    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(
            config.max_concurrent_external_calls,
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `call` once a permit is free, failing with `AppError::Timeout`
    /// if it does not complete within the timeout. Waiting for a permit does
    /// not count against the timeout.
    pub async fn run<T, F>(&self, operation: &str, call: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AppError::Other("external call limiter closed".to_string()))?;

        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "External call timed out"
                );
                Err(AppError::Timeout {
                    operation: operation.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_passes_result_through() {
        let limiter = ExternalCallLimiter::new(2, Duration::from_secs(1));
        let value = limiter.run("op", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(limiter.available(), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_typed() {
        let limiter = ExternalCallLimiter::new(1, Duration::from_millis(20));
        let result: AppResult<()> = limiter
            .run("generate", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        match result {
            Err(AppError::Timeout {
                operation,
                timeout_ms,
            }) => {
                assert_eq!(operation, "generate");
                assert_eq!(timeout_ms, 20);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let limiter = ExternalCallLimiter::new(2, Duration::from_secs(5));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let limiter = limiter.clone();
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    limiter
                        .run("embed", async {
                            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}

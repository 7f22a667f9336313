use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::{Mutex, Semaphore};

use crate::error::{ClassifiedError, ErrorClass, SchedulerError};
use crate::types::{effective_concurrency, inter_batch_delay_ms, CancellationToken, SchedulerConfig, MAX_BACKOFF_MS};

/// Bounded-concurrency, tier-aware, retrying task runner (spec §4.3).
///
/// Ordering guarantee: tasks submitted in order are dispatched in order,
/// but may complete out of order. Callers must not assume completion
/// order — each call to `run` is independent once its semaphore permit is
/// granted.
pub struct Scheduler {
    config: SchedulerConfig,
    semaphore: Semaphore,
    next_allowed: Mutex<Instant>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let permits = effective_concurrency(&config);
        Scheduler {
            config,
            semaphore: Semaphore::new(permits),
            next_allowed: Mutex::new(Instant::now()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    async fn wait_for_pacing(&self) {
        let target = *self.next_allowed.lock().await;
        let now = Instant::now();
        if target > now {
            tokio::time::sleep(target - now).await;
        }
    }

    async fn record_dispatch(&self) {
        let mut next = self.next_allowed.lock().await;
        *next = Instant::now() + Duration::from_millis(inter_batch_delay_ms(&self.config));
    }

    fn backoff_delay_ms(&self, attempt: u32, is_first_rate_limit: bool, retry_after_ms: Option<u64>) -> u64 {
        if let Some(ra) = retry_after_ms {
            // spec §6: prefer the provider's header over our own backoff.
            return ra.min(MAX_BACKOFF_MS);
        }
        let jitter = rand::thread_rng().gen_range(0..=1000u64);
        let exponential = self
            .config
            .base_backoff_ms
            .saturating_mul(1u64 << attempt.min(20))
            .saturating_add(jitter);
        let mut delay = exponential;
        if is_first_rate_limit {
            delay = delay.max(self.config.rate_limit_floor_ms);
        }
        delay.min(MAX_BACKOFF_MS)
    }

    /// Runs `make_task` (a factory producing a fresh future per attempt)
    /// to completion, retrying per spec §4.3's policy. At most one task is
    /// in flight for this call; overall concurrency across calls sharing
    /// this scheduler is capped at `effective_concurrency`.
    pub async fn run<F, Fut, T, E>(&self, mut make_task: F) -> Result<T, SchedulerError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ClassifiedError,
    {
        if self.cancel.is_cancelled() {
            return Err(SchedulerError::Cancelled);
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("scheduler semaphore never closes");

        let mut attempt: u32 = 0;
        let mut seen_rate_limit = false;

        loop {
            self.wait_for_pacing().await;

            if self.cancel.is_cancelled() {
                return Err(SchedulerError::Cancelled);
            }

            let result = make_task().await;
            self.record_dispatch().await;

            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if self.cancel.is_cancelled() {
                        // In-flight call completed; per spec §5 we do not retry
                        // once cancellation has been requested.
                        return Err(SchedulerError::Cancelled);
                    }

                    match e.classification() {
                        ErrorClass::NonRetryable => return Err(SchedulerError::Task(e)),
                        ErrorClass::Retryable => {
                            attempt += 1;
                            if attempt > self.config.max_retries {
                                return Err(SchedulerError::RateLimitExhausted { attempts: attempt });
                            }
                            let delay = self.backoff_delay_ms(attempt, false, None);
                            tracing::warn!(attempt, delay_ms = delay, error = %e, "retrying transient error");
                            tokio::time::sleep(Duration::from_millis(delay)).await;
                        }
                        ErrorClass::RateLimited { retry_after_ms } => {
                            let is_first = !seen_rate_limit;
                            seen_rate_limit = true;
                            attempt += 1;
                            if attempt > self.config.max_retries {
                                return Err(SchedulerError::RateLimitExhausted { attempts: attempt });
                            }
                            let delay = self.backoff_delay_ms(attempt, is_first, retry_after_ms);
                            tracing::warn!(attempt, delay_ms = delay, "rate limited");
                            tokio::time::sleep(Duration::from_millis(delay)).await;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imaginize_core::Tier;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct FakeError(ErrorClass, String);

    impl std::fmt::Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.1)
        }
    }

    impl ClassifiedError for FakeError {
        fn classification(&self) -> ErrorClass {
            self.0
        }
    }

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            max_concurrency: 2,
            tier: Some(Tier::Paid),
            max_retries: 3,
            base_backoff_ms: 1,
            rate_limit_floor_ms: 5,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn succeeds_without_retry_on_first_try() {
        let scheduler = Scheduler::new(fast_config());
        let result: Result<u32, SchedulerError<FakeError>> =
            scheduler.run(|| async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retries_transient_error_then_succeeds() {
        let scheduler = Scheduler::new(fast_config());
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<u32, SchedulerError<FakeError>> = scheduler
            .run(move || {
                let calls = calls2.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(FakeError(ErrorClass::Retryable, "transient".into()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_retryable_fails_immediately() {
        let scheduler = Scheduler::new(fast_config());
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<u32, SchedulerError<FakeError>> = scheduler
            .run(move || {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(FakeError(ErrorClass::NonRetryable, "bad request".into()))
                }
            })
            .await;
        assert!(matches!(result, Err(SchedulerError::Task(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exhausts_retries_and_surfaces_rate_limit_exhausted() {
        let mut config = fast_config();
        config.max_retries = 2;
        let scheduler = Scheduler::new(config);
        let result: Result<u32, SchedulerError<FakeError>> = scheduler
            .run(|| async { Err(FakeError(ErrorClass::RateLimited { retry_after_ms: None }, "429".into())) })
            .await;
        assert!(matches!(
            result,
            Err(SchedulerError::RateLimitExhausted { attempts: 3 })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancellation_short_circuits_before_dispatch() {
        let scheduler = Scheduler::new(fast_config());
        scheduler.cancel();
        let result: Result<u32, SchedulerError<FakeError>> =
            scheduler.run(|| async { Ok(1) }).await;
        assert!(matches!(result, Err(SchedulerError::Cancelled)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn free_tier_serializes_to_one_in_flight() {
        let mut config = fast_config();
        config.tier = Some(Tier::Free);
        config.rate_limit_floor_ms = 1;
        let scheduler = Arc::new(Scheduler::new(config));
        let active = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let scheduler = scheduler.clone();
            let active = active.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _: Result<u32, SchedulerError<FakeError>> = scheduler
                    .run(|| {
                        let active = active.clone();
                        let max_seen = max_seen.clone();
                        async move {
                            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            active.fetch_sub(1, Ordering::SeqCst);
                            Ok(1)
                        }
                    })
                    .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}

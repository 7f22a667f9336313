use std::fmt;

/// How a task error should be treated by the scheduler (spec §4.3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 429 specifically — the scheduler treats the first 429 on a task
    /// specially (rate-limit floor sleep) rather than the exponential
    /// backoff used for other retryable errors.
    RateLimited { retry_after_ms: Option<u64> },
    /// 408, 425, 5xx, transient network errors.
    Retryable,
    /// 400, 401, 403, 404, 422 — fail immediately.
    NonRetryable,
}

/// Implemented by every error type a scheduled task can fail with, so the
/// scheduler can make retry decisions without depending on any concrete
/// provider error type (spec §4.3's "errors are tagged values").
pub trait ClassifiedError: fmt::Debug + fmt::Display {
    fn classification(&self) -> ErrorClass;
}

/// Classifies an HTTP status code per spec §6.
pub fn classify_status(status: u16) -> ErrorClass {
    match status {
        429 => ErrorClass::RateLimited { retry_after_ms: None },
        408 | 425 | 500 | 502 | 503 | 504 => ErrorClass::Retryable,
        _ => ErrorClass::NonRetryable,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError<E: fmt::Debug + fmt::Display> {
    #[error("rate limit exhausted after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Task(E),
}

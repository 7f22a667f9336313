use imaginize_scheduler::{classify_status, ClassifiedError, ErrorClass};

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("unparseable model response: {0}")]
    BadResponse(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

impl ClassifiedError for AiError {
    fn classification(&self) -> ErrorClass {
        match self {
            AiError::ApiError { status, .. } => classify_status(*status),
            // A connection reset / DNS failure surfaces through reqwest as
            // a non-status error; treat it as retryable transient network
            // per spec §6.
            AiError::Http(e) if e.is_timeout() || e.is_connect() => ErrorClass::Retryable,
            AiError::Http(_) => ErrorClass::Retryable,
            AiError::BadResponse(_) => ErrorClass::NonRetryable,
            AiError::NotConfigured(_) => ErrorClass::NonRetryable,
        }
    }
}

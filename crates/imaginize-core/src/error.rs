use std::fmt;

/// Shared error taxonomy (spec §7). Every crate's own error enum converts
/// into this one at the points where the pipeline controller needs to make
/// a retryable/non-retryable decision.
#[derive(Debug, thiserror::Error)]
pub enum ImaginizeError {
    #[error("transient I/O error: {0}")]
    TransientIo(#[from] std::io::Error),

    #[error("lock timeout on {path}")]
    LockTimeout { path: String },

    #[error("rate limit exhausted after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    #[error("model returned an unparseable response: {reason}")]
    BadModelResponse { reason: String },

    #[error("auth or configuration error: {0}")]
    AuthOrConfig(String),

    #[error("missing prerequisite: {0}")]
    MissingPrerequisite(String),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ImaginizeError {
    /// Whether the scheduler should retry an operation that failed with
    /// this error. Matches the taxonomy in spec §7: only transient I/O and
    /// lock timeouts are retried at this layer; rate limiting is handled
    /// entirely inside the scheduler and never reaches here as retryable.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ImaginizeError::TransientIo(_) | ImaginizeError::LockTimeout { .. }
        )
    }

    /// Exit code mapping from spec §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            ImaginizeError::RateLimitExhausted { .. } => 4,
            ImaginizeError::AuthOrConfig(_) => 5,
            ImaginizeError::MissingPrerequisite(_) => 3,
            ImaginizeError::Cancelled => 130,
            _ => 5,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Shared status enum used by both `BookState.phases.*.status` and
/// `ChapterShard.status` (spec §3 and §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Cancelled)
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use imaginize_core::Tier;
use tokio::sync::Notify;

pub use imaginize_core::SchedulerConfig;

/// Inter-batch spacing enforced when `tier=paid` (spec §4.3).
pub const PAID_TIER_SPACING_MS: u64 = 2_000;

/// Exponential-backoff cap (spec §4.3).
pub const MAX_BACKOFF_MS: u64 = 120_000;

/// The concurrency actually in effect: free tier forces 1, regardless of
/// configured `max_concurrency` (spec §4.3).
pub fn effective_concurrency(config: &SchedulerConfig) -> usize {
    match config.tier {
        Some(Tier::Free) => 1,
        _ => config.max_concurrency.max(1),
    }
}

/// The inter-batch delay enforced between a completed task and the next
/// dispatch on the same worker (spec §4.3).
pub fn inter_batch_delay_ms(config: &SchedulerConfig) -> u64 {
    match config.tier {
        Some(Tier::Free) => config.rate_limit_floor_ms,
        _ => PAID_TIER_SPACING_MS,
    }
}

/// Cooperative cancellation signal shared between the pipeline controller
/// and the scheduler (spec §5 "Cancellation"), grounded on the
/// `Arc<AtomicBool>` + `Arc<Notify>` pattern used for job cancellation in
/// the job-runner idiom this workspace follows for long-running tasks.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        CancellationToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(tier: Option<Tier>, max_concurrency: usize) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrency,
            tier,
            max_retries: 10,
            base_backoff_ms: 10_000,
            rate_limit_floor_ms: 65_000,
        }
    }

    #[test]
    fn free_tier_forces_concurrency_one() {
        let cfg = config(Some(Tier::Free), 8);
        assert_eq!(effective_concurrency(&cfg), 1);
        assert_eq!(inter_batch_delay_ms(&cfg), 65_000);
    }

    #[test]
    fn paid_tier_uses_configured_concurrency_and_fixed_spacing() {
        let cfg = config(Some(Tier::Paid), 8);
        assert_eq!(effective_concurrency(&cfg), 8);
        assert_eq!(inter_batch_delay_ms(&cfg), PAID_TIER_SPACING_MS);
    }

    #[test]
    fn cancellation_token_reports_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }
}

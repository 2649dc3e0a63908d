//! Delay policy applied before a failed job is re-queued

use std::time::Duration;

use rand::Rng;
use resonance_shared_config::{JobQueueConfig, RetryBackoffKind};

/// How long a failed job waits before going back on the work channel
///
/// The state machine is the same for every policy: the job is `Pending`
/// as soon as the retry is scheduled, only the hand-off to a worker is delayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Re-queue straight away
    #[default]
    Immediate,
    /// `base * 2^(attempt-1)`, capped at `max`, optionally with full jitter
    Exponential {
        base: Duration,
        max: Duration,
        jitter: bool,
    },
}

impl RetryPolicy {
    /// Delay before the attempt following failure number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Self::Immediate => Duration::ZERO,
            Self::Exponential { base, max, jitter } => {
                let exponent = attempt.saturating_sub(1).min(31);
                let capped = base.saturating_mul(2_u32.pow(exponent)).min(max);
                if jitter && !capped.is_zero() {
                    let millis = capped.as_millis() as u64;
                    Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
                } else {
                    capped
                }
            }
        }
    }
}

impl From<&JobQueueConfig> for RetryPolicy {
    fn from(config: &JobQueueConfig) -> Self {
        match config.retry_backoff {
            RetryBackoffKind::Immediate => Self::Immediate,
            RetryBackoffKind::Exponential => Self::Exponential {
                base: Duration::from_millis(config.retry_base_delay_ms),
                max: Duration::from_millis(config.retry_max_delay_ms),
                jitter: true,
            },
        }
    }
}

//! Bounded exponential backoff with jitter, shared by the query retry
//! path and the push-channel reconnect loop.

use crate::config::{ReconnectConfig, RetryConfig};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub jitter_ms: u64,
}

impl From<&RetryConfig> for BackoffPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_ms),
            max: Duration::from_millis(config.max_ms),
            multiplier: config.multiplier,
            jitter_ms: config.jitter_ms,
        }
    }
}

impl From<&ReconnectConfig> for BackoffPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_ms),
            max: Duration::from_millis(config.max_ms),
            multiplier: config.multiplier,
            jitter_ms: config.jitter_ms,
        }
    }
}

/// Mutable backoff sequence: each `next_delay` returns the current
/// (jittered) delay and advances toward the cap.
#[derive(Debug, Clone)]
pub struct BackoffState {
    policy: BackoffPolicy,
    current: Duration,
}

impl BackoffState {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            current: policy.initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = jittered(self.current, self.policy.jitter_ms);
        let next_ms = (self.current.as_millis() as f64 * self.policy.multiplier) as u64;
        self.current = Duration::from_millis(next_ms).min(self.policy.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.policy.initial;
    }
}

fn jittered(base: Duration, jitter_ms: u64) -> Duration {
    if jitter_ms == 0 {
        return base;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_nanos(0))
        .subsec_nanos() as u64;
    base.saturating_add(Duration::from_millis(nanos % jitter_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(300),
            max: Duration::from_millis(5_000),
            multiplier: 2.0,
            jitter_ms: 0,
        }
    }

    #[test]
    fn delays_double_and_cap() {
        let mut state = BackoffState::new(policy());
        assert_eq!(state.next_delay(), Duration::from_millis(300));
        assert_eq!(state.next_delay(), Duration::from_millis(600));
        assert_eq!(state.next_delay(), Duration::from_millis(1_200));
        assert_eq!(state.next_delay(), Duration::from_millis(2_400));
        assert_eq!(state.next_delay(), Duration::from_millis(4_800));
        // Capped from here on.
        assert_eq!(state.next_delay(), Duration::from_millis(5_000));
        assert_eq!(state.next_delay(), Duration::from_millis(5_000));
    }

    #[test]
    fn reset_restarts_the_sequence() {
        let mut state = BackoffState::new(policy());
        state.next_delay();
        state.next_delay();
        state.reset();
        assert_eq!(state.next_delay(), Duration::from_millis(300));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let mut with_jitter = policy();
        with_jitter.jitter_ms = 100;
        let mut state = BackoffState::new(with_jitter);
        let delay = state.next_delay();
        assert!(delay >= Duration::from_millis(300));
        assert!(delay < Duration::from_millis(400));
    }
}

use std::time::Duration;

use rand::RngExt;

/// How a range-fetch session recovers from early connection termination.
#[derive(Debug, Clone)]
pub struct ResumePolicy {
    /// Consecutive reconnects that deliver no new byte before giving up.
    pub max_stalled_reconnects: u32,
    /// Delay before the first stalled reconnect, doubled for each further one.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Add up to `base_delay / 2` of random delay.
    pub jitter: bool,
}

impl Default for ResumePolicy {
    fn default() -> Self {
        Self {
            max_stalled_reconnects: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl ResumePolicy {
    pub fn with_max_stalled_reconnects(mut self, max: u32) -> Self {
        self.max_stalled_reconnects = max;
        self
    }

    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before the `stall`-th consecutive stalled reconnect (1-based):
    /// `base_delay * 2^(stall-1)`, capped at `max_delay`, plus optional jitter
    /// that never crosses the cap.
    pub(crate) fn backoff(&self, stall: u32) -> Duration {
        let exponent = stall.saturating_sub(1).min(31);
        let delay = self
            .base_delay
            .checked_mul(1 << exponent)
            .map_or(self.max_delay, |d| d.min(self.max_delay));

        let headroom = self.max_delay.saturating_sub(delay).min(self.base_delay / 2);
        if !self.jitter || headroom.is_zero() {
            return delay;
        }
        let headroom_ms = u64::try_from(headroom.as_millis()).unwrap_or(u64::MAX);
        if headroom_ms == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::rng().random_range(0..headroom_ms))
    }
}

/// Connect, timeout, request, body and decode failures are worth another
/// attempt; redirect and builder errors are not.
pub fn is_retryable_reqwest_error(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() || e.is_decode()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy() {
        let policy = ResumePolicy::default();
        assert_eq!(policy.max_stalled_reconnects, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_secs(5));
    }

    #[test]
    fn delay_respects_max_cap() {
        let policy = ResumePolicy::default().with_jitter(false);
        // 250ms * 2^10 is far past the cap
        assert_eq!(policy.backoff(11), Duration::from_secs(5));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn delay_with_jitter_does_not_exceed_max_cap() {
        let policy = ResumePolicy::default()
            .with_backoff(Duration::from_millis(500), Duration::from_secs(1));

        for _ in 0..32 {
            assert!(policy.backoff(11) <= Duration::from_secs(1));
        }
    }

    #[test]
    fn delay_without_jitter_is_deterministic() {
        let policy = ResumePolicy::default()
            .with_backoff(Duration::from_millis(100), Duration::from_secs(10))
            .with_jitter(false);
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn delay_with_jitter_adds_random_component() {
        let policy = ResumePolicy::default()
            .with_backoff(Duration::from_millis(100), Duration::from_secs(10));
        let delay = policy.backoff(1);
        // [100, 150)ms
        assert!(delay >= Duration::from_millis(100));
        assert!(delay < Duration::from_millis(150));
    }
}

use std::time::Duration;

pub const DEFAULT_LADDER_SECS: [u64; 3] = [5 * 60, 15 * 60, 30 * 60];

/// Retry policy for quota signals.
///
/// Exhaustion with a known reset is always retried. A quota signal without
/// any usable reset walks a fixed ladder and then keeps repeating the last
/// rung; the operation is never abandoned.
#[derive(Clone, Debug)]
pub struct QuotaRetryPolicy {
    pub ladder: Vec<Duration>,
}

impl Default for QuotaRetryPolicy {
    fn default() -> Self {
        Self {
            ladder: DEFAULT_LADDER_SECS.iter().map(|s| Duration::from_secs(*s)).collect(),
        }
    }
}

impl QuotaRetryPolicy {
    /// Wait for the `attempt`-th consecutive ambiguous quota signal (1-based).
    pub fn ladder_wait(&self, attempt: u32) -> Duration {
        let idx = (attempt.max(1) as usize - 1).min(self.ladder.len().saturating_sub(1));
        self.ladder
            .get(idx)
            .copied()
            .unwrap_or(Duration::from_secs(DEFAULT_LADDER_SECS[DEFAULT_LADDER_SECS.len() - 1]))
    }
}

/// Bounded exponential backoff with jitter for network faults and 5xx.
#[derive(Clone, Debug)]
pub struct TransientRetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for TransientRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl TransientRetryPolicy {
    /// Upper bound of the delay before retry number `attempt` (1-based).
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    /// Jittered delay before retry `attempt`, or `None` when attempts are
    /// exhausted.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let ceiling = self.ceiling(attempt);
        let millis = ceiling.as_millis() as u64;
        if millis == 0 {
            return Some(Duration::ZERO);
        }
        Some(Duration::from_millis(jitter(millis)))
    }
}

/// Uniform value in `[millis / 2, millis]`.
fn jitter(millis: u64) -> u64 {
    let mut buf = [0u8; 8];
    let r = match getrandom::getrandom(&mut buf) {
        Ok(()) => u64::from_le_bytes(buf),
        Err(_) => 0,
    };
    let half = millis / 2;
    half + r % (millis - half + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_escalates_then_repeats_last_rung() {
        let policy = QuotaRetryPolicy::default();
        assert_eq!(policy.ladder_wait(1), Duration::from_secs(300));
        assert_eq!(policy.ladder_wait(2), Duration::from_secs(900));
        assert_eq!(policy.ladder_wait(3), Duration::from_secs(1800));
        assert_eq!(policy.ladder_wait(50), Duration::from_secs(1800));
    }

    #[test]
    fn empty_ladder_still_waits() {
        let policy = QuotaRetryPolicy { ladder: Vec::new() };
        assert_eq!(policy.ladder_wait(1), Duration::from_secs(1800));
    }

    #[test]
    fn transient_delay_is_bounded_and_exhausts() {
        let policy = TransientRetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
        };
        for attempt in 1..4 {
            let d = policy.delay(attempt).unwrap();
            assert!(d <= policy.ceiling(attempt));
            assert!(d >= policy.ceiling(attempt) / 2);
        }
        assert_eq!(policy.ceiling(3), Duration::from_millis(250));
        assert_eq!(policy.delay(4), None);
    }
}

use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;

use crate::github::transport::HttpResponse;

pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_RETRY_AFTER: &str = "retry-after";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LimiterPhase {
    Idle,
    /// Quota exhausted, reset time known.
    Waiting { reset_at: DateTime<Utc> },
    /// Quota signalled without a usable reset; walking the ladder.
    Backoff { rung: u32 },
    /// Non-retryable failure observed on the last response.
    Failed,
}

/// Quota bookkeeping shared by every outbound request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitState {
    pub remaining: Option<u32>,
    pub limit: Option<u32>,
    pub reset_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub phase: LimiterPhase,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self {
            remaining: None,
            limit: None,
            reset_at: None,
            consecutive_failures: 0,
            phase: LimiterPhase::Idle,
        }
    }
}

/// Rate limit headers parsed from a single response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuotaHeaders {
    pub remaining: Option<u32>,
    pub limit: Option<u32>,
    pub reset_at: Option<DateTime<Utc>>,
    pub retry_after: Option<Duration>,
}

impl QuotaHeaders {
    pub fn parse(resp: &HttpResponse) -> Self {
        let num = |name: &str| resp.header(name).and_then(|v| v.trim().parse::<u64>().ok());
        Self {
            remaining: num(HEADER_REMAINING).map(|v| v.min(u32::MAX as u64) as u32),
            limit: num(HEADER_LIMIT).map(|v| v.min(u32::MAX as u64) as u32),
            reset_at: num(HEADER_RESET)
                .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single()),
            retry_after: num(HEADER_RETRY_AFTER).map(Duration::from_secs),
        }
    }

    /// True when the response carried any quota signal at all.
    pub fn is_present(&self) -> bool {
        self.remaining.is_some() || self.reset_at.is_some() || self.retry_after.is_some()
    }
}

impl RateLimitState {
    /// Folds the headers of the latest response into the state. Older reset
    /// times never replace newer ones.
    pub fn observe(&mut self, headers: &QuotaHeaders) {
        if let Some(remaining) = headers.remaining {
            self.remaining = Some(remaining);
        }
        if let Some(limit) = headers.limit {
            self.limit = Some(limit);
        }
        if let Some(reset_at) = headers.reset_at {
            self.reset_at = Some(self.reset_at.map_or(reset_at, |prev| prev.max(reset_at)));
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Time left until the recorded reset, measured against `now`.
    pub fn wait_until_reset(&self, now: DateTime<Utc>) -> Duration {
        self.reset_at
            .map(|reset| (reset.timestamp() - now.timestamp()).max(0) as u64)
            .map(Duration::from_secs)
            .unwrap_or_default()
    }
}

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::error::{ForkgateError, Result};
use crate::github::transport::{HttpResponse, TransportError};
use crate::progress::{emit, Progress, ProgressCallback};
use crate::rate_limit::policy::QuotaRetryPolicy;
use crate::rate_limit::state::{LimiterPhase, QuotaHeaders, RateLimitState};

/// Wait after a secondary limit that names no retry time. The primary
/// quota reset is unrelated to it.
pub const SECONDARY_LIMIT_WAIT: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct LimiterConfig {
    /// Requests allowed in flight at once across every stream.
    pub max_in_flight: usize,
    /// Added to every reset-based wait to absorb clock skew.
    pub reset_buffer: Duration,
    pub heartbeat_interval: Duration,
    /// Waits longer than this emit heartbeats.
    pub heartbeat_threshold: Duration,
    pub quota_policy: QuotaRetryPolicy,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 8,
            reset_buffer: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_threshold: Duration::from_secs(60),
            quota_policy: QuotaRetryPolicy::default(),
        }
    }
}

/// What the limiter concluded from the latest attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    /// Quota exhausted with a usable reset signal; retry after `acquire`.
    QuotaExceeded { reset_at: Option<DateTime<Utc>> },
    /// Quota-like refusal with no usable reset; retry after `wait`.
    Ambiguous { attempt: u32, wait: Duration },
    Authentication,
    NotFound,
    Transient,
    Unexpected,
}

struct Inner {
    state: RateLimitState,
    resume_at: Option<Instant>,
    ambiguous_attempts: u32,
}

/// Single gate every outbound request passes through.
pub struct RateLimiter {
    inner: Mutex<Inner>,
    permits: Arc<Semaphore>,
    config: LimiterConfig,
    on_progress: Option<ProgressCallback>,
}

/// Held for the duration of one request.
#[derive(Debug)]
pub struct RequestPermit {
    _permit: OwnedSemaphorePermit,
}

impl RateLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: RateLimitState::default(),
                resume_at: None,
                ambiguous_attempts: 0,
            }),
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            config,
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn snapshot(&self) -> RateLimitState {
        self.lock().state.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Suspends until a request may proceed.
    ///
    /// Dropping the returned future at any point leaves the shared counters
    /// untouched: state only changes under the lock, never across an await.
    pub async fn acquire(&self) -> Result<RequestPermit> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ForkgateError::Cancelled("rate limiter closed".to_string()))?;

        while let Some(wait) = self.pending_wait() {
            self.sleep_with_heartbeat(wait).await;
        }

        Ok(RequestPermit { _permit: permit })
    }

    /// Returns the wait still owed, or grants the request.
    fn pending_wait(&self) -> Option<Duration> {
        let mut inner = self.lock();
        let now = Instant::now();

        if let Some(resume_at) = inner.resume_at {
            if resume_at > now {
                return Some(resume_at - now);
            }
            inner.resume_at = None;
            if inner.state.is_exhausted() {
                inner.state.remaining = None;
            }
            if matches!(
                inner.state.phase,
                LimiterPhase::Waiting { .. } | LimiterPhase::Backoff { .. }
            ) {
                inner.state.phase = LimiterPhase::Idle;
            }
        }

        if inner.state.is_exhausted() {
            let wait = inner.state.wait_until_reset(Utc::now());
            if wait.is_zero() {
                inner.state.remaining = None;
            } else {
                let wait = wait + self.config.reset_buffer;
                inner.resume_at = Some(now + wait);
                if let Some(reset_at) = inner.state.reset_at {
                    inner.state.phase = LimiterPhase::Waiting { reset_at };
                }
                return Some(wait);
            }
        }

        if let Some(remaining) = inner.state.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
        None
    }

    async fn sleep_with_heartbeat(&self, total: Duration) {
        if total <= self.config.heartbeat_threshold {
            tokio::time::sleep(total).await;
            return;
        }

        tracing::info!(wait_secs = total.as_secs(), "rate limit wait started");
        let step_max = self.config.heartbeat_interval.max(Duration::from_millis(1));
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            let step = (total - elapsed).min(step_max);
            tokio::time::sleep(step).await;
            elapsed += step;
            let remaining = total - elapsed;
            tracing::info!(
                elapsed_secs = elapsed.as_secs(),
                remaining_secs = remaining.as_secs(),
                "waiting for rate limit reset"
            );
            emit(
                self.on_progress.as_ref(),
                Progress::RateLimitWait {
                    elapsed,
                    remaining,
                    total,
                },
            );
        }
    }

    /// Folds the latest response into the shared state and classifies it.
    pub fn record_response(&self, resp: &HttpResponse) -> ResponseClass {
        let headers = QuotaHeaders::parse(resp);
        let now_wall = Utc::now();
        let now = Instant::now();
        let mut inner = self.lock();
        inner.state.observe(&headers);

        let class = classify(resp, &headers);
        match class {
            StatusClass::Success => {
                inner.state.consecutive_failures = 0;
                inner.ambiguous_attempts = 0;
                if inner.state.phase == LimiterPhase::Failed {
                    inner.state.phase = LimiterPhase::Idle;
                }
                ResponseClass::Success
            }
            StatusClass::Quota => {
                inner.state.consecutive_failures += 1;
                let reset_wait = inner.state.wait_until_reset(now_wall);
                let wait = match headers.retry_after {
                    Some(after) => Some(after),
                    None if headers.remaining.is_some_and(|r| r > 0) => {
                        Some(SECONDARY_LIMIT_WAIT)
                    }
                    None if !reset_wait.is_zero()
                        && (headers.reset_at.is_some() || inner.state.is_exhausted()) =>
                    {
                        Some(reset_wait + self.config.reset_buffer)
                    }
                    None => None,
                };
                match wait {
                    Some(wait) => {
                        inner.ambiguous_attempts = 0;
                        let resume = now + wait;
                        inner.resume_at = Some(inner.resume_at.map_or(resume, |r| r.max(resume)));
                        let reset_at = now_wall
                            + chrono::Duration::from_std(wait)
                                .unwrap_or_else(|_| chrono::Duration::zero());
                        inner.state.phase = LimiterPhase::Waiting { reset_at };
                        tracing::warn!(
                            status = resp.status,
                            wait_secs = wait.as_secs(),
                            reset_at = %reset_at,
                            "rate limit exhausted"
                        );
                        ResponseClass::QuotaExceeded {
                            reset_at: Some(reset_at),
                        }
                    }
                    None => self.escalate(&mut inner, now, resp.status),
                }
            }
            StatusClass::Ambiguous => {
                inner.state.consecutive_failures += 1;
                self.escalate(&mut inner, now, resp.status)
            }
            StatusClass::Auth => {
                inner.state.consecutive_failures += 1;
                inner.state.phase = LimiterPhase::Failed;
                tracing::error!(status = resp.status, "authentication failed");
                ResponseClass::Authentication
            }
            StatusClass::NotFound => {
                inner.state.consecutive_failures = 0;
                ResponseClass::NotFound
            }
            StatusClass::Transient => {
                inner.state.consecutive_failures += 1;
                ResponseClass::Transient
            }
            StatusClass::Unexpected => {
                inner.state.consecutive_failures += 1;
                ResponseClass::Unexpected
            }
        }
    }

    pub fn record_transport_error(&self, err: &TransportError) -> ResponseClass {
        let mut inner = self.lock();
        inner.state.consecutive_failures += 1;
        tracing::debug!(
            error = %err,
            consecutive_failures = inner.state.consecutive_failures,
            "transport error"
        );
        ResponseClass::Transient
    }

    fn escalate(&self, inner: &mut Inner, now: Instant, status: u16) -> ResponseClass {
        inner.ambiguous_attempts = inner.ambiguous_attempts.saturating_add(1);
        let attempt = inner.ambiguous_attempts;
        let wait = self.config.quota_policy.ladder_wait(attempt);
        let resume = now + wait;
        inner.resume_at = Some(inner.resume_at.map_or(resume, |r| r.max(resume)));
        inner.state.phase = LimiterPhase::Backoff { rung: attempt };
        tracing::warn!(
            status,
            attempt,
            wait_secs = wait.as_secs(),
            "quota refusal without reset headers, backing off"
        );
        ResponseClass::Ambiguous { attempt, wait }
    }
}

enum StatusClass {
    Success,
    Quota,
    Ambiguous,
    Auth,
    NotFound,
    Transient,
    Unexpected,
}

fn classify(resp: &HttpResponse, headers: &QuotaHeaders) -> StatusClass {
    match resp.status {
        _ if resp.is_success() => StatusClass::Success,
        429 => StatusClass::Quota,
        403 => {
            let mentions_limit = resp.body.to_ascii_lowercase().contains("rate limit");
            if headers.remaining == Some(0) || headers.retry_after.is_some() || mentions_limit {
                StatusClass::Quota
            } else if !headers.is_present() {
                StatusClass::Ambiguous
            } else {
                StatusClass::Auth
            }
        }
        401 => StatusClass::Auth,
        404 | 410 => StatusClass::NotFound,
        s if s >= 500 => StatusClass::Transient,
        _ => StatusClass::Unexpected,
    }
}

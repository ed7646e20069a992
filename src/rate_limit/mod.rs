pub mod limiter;
pub mod policy;
pub mod state;

pub use limiter::{LimiterConfig, RateLimiter, RequestPermit, ResponseClass};
pub use policy::{QuotaRetryPolicy, TransientRetryPolicy};
pub use state::{LimiterPhase, RateLimitState};

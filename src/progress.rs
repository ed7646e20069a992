use std::sync::Arc;
use std::time::Duration;

use crate::github::types::RepoIdentity;

/// Progress signals emitted while waiting on quota or walking a fork listing.
#[derive(Clone, Debug, PartialEq)]
pub enum Progress {
    RateLimitWait {
        elapsed: Duration,
        remaining: Duration,
        total: Duration,
    },
    PageQualified {
        upstream: RepoIdentity,
        page: u32,
        forks: usize,
        total_so_far: usize,
    },
}

pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

pub fn emit(callback: Option<&ProgressCallback>, event: Progress) {
    if let Some(cb) = callback {
        cb(event);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::github::client::repo_path;
use crate::github::types::RepoIdentity;

/// A paginated collection: path plus the fixed part of its query.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub path: String,
    #[serde(default)]
    pub query: Vec<(String, String)>,
}

impl Endpoint {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Forks of `upstream`, oldest first so new forks land on later pages
    /// and already-seen pages stay stable across a resume.
    pub fn forks(upstream: &RepoIdentity) -> Self {
        Self::new(format!("{}/forks", repo_path(upstream))).with_query("sort", "oldest")
    }
}

/// Resumable marker of pagination progress. `next_page` is the first page
/// not yet yielded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationCheckpoint {
    pub endpoint: Endpoint,
    pub next_page: u32,
    pub items_seen: u64,
    pub pages_seen: u32,
    pub complete: bool,
    pub recorded_at: DateTime<Utc>,
}

impl PaginationCheckpoint {
    pub fn start(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            next_page: 1,
            items_seen: 0,
            pages_seen: 0,
            complete: false,
            recorded_at: Utc::now(),
        }
    }

    pub(crate) fn advance(&self, items: usize, complete: bool) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            next_page: self.next_page + 1,
            items_seen: self.items_seen + items as u64,
            pages_seen: self.pages_seen + 1,
            complete,
            recorded_at: Utc::now(),
        }
    }
}

/// Persists checkpoints between runs. Durable backends live outside this
/// crate; the in-memory store covers a single process.
pub trait CheckpointStore: Send + Sync {
    fn load(&self, endpoint: &Endpoint) -> Option<PaginationCheckpoint>;
    fn save(&self, checkpoint: &PaginationCheckpoint);
    fn clear(&self, endpoint: &Endpoint);
}

#[derive(Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<HashMap<Endpoint, PaginationCheckpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, endpoint: &Endpoint) -> Option<PaginationCheckpoint> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(endpoint)
            .cloned()
    }

    fn save(&self, checkpoint: &PaginationCheckpoint) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(checkpoint.endpoint.clone(), checkpoint.clone());
    }

    fn clear(&self, endpoint: &Endpoint) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(endpoint);
    }
}

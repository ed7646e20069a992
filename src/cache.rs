use moka::future::Cache;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ForkgateError, Result};
use crate::github::types::{CompareOutcome, ForkKey, RepoIdentity, RepoMetadata};

pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

const MAX_ENTRIES: u64 = 50_000;

#[derive(Debug)]
pub struct CacheEntry<K, V> {
    pub key: K,
    pub value: V,
    pub expires_at: Instant,
    pub hit_count: AtomicU64,
}

impl<K, V> CacheEntry<K, V> {
    pub fn hits(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl std::ops::Add for CacheStats {
    type Output = CacheStats;

    fn add(self, other: CacheStats) -> CacheStats {
        CacheStats {
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
            entries: self.entries + other.entries,
        }
    }
}

/// TTL cache where concurrent lookups of one key share a single
/// computation. A failed or dropped computation stores nothing.
struct KeyedCache<K, V> {
    entries: Cache<K, Arc<CacheEntry<K, V>>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> KeyedCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn new(ttl: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(MAX_ENTRIES)
            .time_to_live(ttl)
            .build();
        Self {
            entries,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    async fn get_or_try_insert<F, Fut>(&self, key: &K, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let computed = AtomicBool::new(false);
        let init = async {
            computed.store(true, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            let value = compute().await?;
            Ok::<_, ForkgateError>(Arc::new(CacheEntry {
                key: key.clone(),
                value,
                expires_at: Instant::now() + self.ttl,
                hit_count: AtomicU64::new(0),
            }))
        };

        let entry = self
            .entries
            .try_get_with(key.clone(), init)
            .await
            .map_err(|e| Arc::try_unwrap(e).unwrap_or_else(ForkgateError::Shared))?;

        if !computed.load(Ordering::Relaxed) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            entry.hit_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(entry.value.clone())
    }

    async fn entry(&self, key: &K) -> Option<Arc<CacheEntry<K, V>>> {
        self.entries.get(key).await
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.iter().count(),
        }
    }
}

/// Memoizes upstream metadata and fork comparisons for one or more
/// qualification runs.
pub struct VerificationCache {
    parents: KeyedCache<RepoIdentity, RepoMetadata>,
    comparisons: KeyedCache<ForkKey, CompareOutcome>,
}

impl Default for VerificationCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl VerificationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            parents: KeyedCache::new(ttl),
            comparisons: KeyedCache::new(ttl),
        }
    }

    /// Upstream metadata, fetched at most once per `repo` while fresh.
    pub async fn get_parent_metadata<F, Fut>(
        &self,
        repo: &RepoIdentity,
        fetch: F,
    ) -> Result<RepoMetadata>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RepoMetadata>>,
    {
        self.parents.get_or_try_insert(repo, fetch).await
    }

    /// Verified comparison for `key`. Concurrent callers for the same key
    /// share one computation; failures are not stored.
    pub async fn get_or_verify<F, Fut>(&self, key: &ForkKey, compute: F) -> Result<CompareOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CompareOutcome>>,
    {
        self.comparisons.get_or_try_insert(key, compute).await
    }

    pub async fn comparison_entry(&self, key: &ForkKey) -> Option<Arc<CacheEntry<ForkKey, CompareOutcome>>> {
        self.comparisons.entry(key).await
    }

    pub fn parent_stats(&self) -> CacheStats {
        self.parents.stats()
    }

    pub fn verify_stats(&self) -> CacheStats {
        self.comparisons.stats()
    }

    pub fn stats(&self) -> CacheStats {
        self.parent_stats() + self.verify_stats()
    }
}

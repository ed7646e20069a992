use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::VerificationCache;
use crate::error::{ErrorClass, ForkgateError, Result};
use crate::github::client::GitHubClient;
use crate::github::types::{ForkRecord, RepoIdentity, RepoMetadata};
use crate::pagination::{CheckpointStore, Endpoint, PaginationCheckpoint, PaginationEngine, PaginationError};
use crate::progress::{emit, Progress, ProgressCallback};
use crate::qualify::classify::classify;
use crate::qualify::result::{Confidence, Qualification, QualificationResult};

/// What to do with a fork whose verification call failed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep the heuristic result unchanged.
    #[default]
    RetainHeuristic,
    /// Keep the heuristic state but drop its confidence to low.
    Downgrade,
}

const DOWNGRADED_CONFIDENCE: f32 = 0.3;

#[derive(Clone, Debug)]
pub struct QualificationOptions {
    /// Heuristic results below this confidence are verified.
    pub confidence_threshold: f32,
    /// Verify every fork that may have commits, to get exact ahead counts.
    pub exact_counts: bool,
    pub verify_concurrency: usize,
    pub on_verification_failure: FailurePolicy,
}

impl Default for QualificationOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            exact_counts: false,
            verify_concurrency: 8,
            on_verification_failure: FailurePolicy::RetainHeuristic,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Partition {
    Skip,
    Verify,
    Accept,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub total: usize,
    pub skipped: usize,
    pub accepted: usize,
    pub verified: usize,
    pub verification_failures: usize,
}

impl BatchStats {
    /// Comparison calls avoided against verifying every fork.
    pub fn calls_saved(&self) -> usize {
        self.skipped + self.accepted
    }

    pub fn savings_ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.calls_saved() as f64 / self.total as f64
    }

    pub fn merge(&mut self, other: &BatchStats) {
        self.total += other.total;
        self.skipped += other.skipped;
        self.accepted += other.accepted;
        self.verified += other.verified;
        self.verification_failures += other.verification_failures;
    }
}

#[derive(Debug)]
pub struct BatchReport {
    /// One result per input record, in input order.
    pub results: Vec<QualificationResult>,
    pub stats: BatchStats,
    pub failures: Vec<ForkgateError>,
    /// Set when the credentials were rejected. Forks not yet verified keep
    /// their heuristic result.
    pub fatal: Option<ForkgateError>,
}

/// Outcome of walking a whole forks listing. When `interrupted` is set,
/// `checkpoint` is where a later run should resume.
#[derive(Debug)]
pub struct QualificationRun {
    pub results: Vec<QualificationResult>,
    pub stats: BatchStats,
    pub failures: Vec<ForkgateError>,
    pub checkpoint: PaginationCheckpoint,
    pub interrupted: Option<PaginationError>,
}

impl QualificationRun {
    pub fn is_complete(&self) -> bool {
        self.interrupted.is_none()
    }

    pub fn needing_inspection(&self) -> impl Iterator<Item = &QualificationResult> {
        self.results
            .iter()
            .filter(|r| r.qualification.needs_inspection())
    }
}

pub struct ForkQualificationEngine {
    client: GitHubClient,
    cache: Arc<VerificationCache>,
    upstream: RepoIdentity,
    options: QualificationOptions,
    on_progress: Option<ProgressCallback>,
}

impl ForkQualificationEngine {
    pub fn new(
        client: GitHubClient,
        cache: Arc<VerificationCache>,
        upstream: RepoIdentity,
        options: QualificationOptions,
    ) -> Self {
        Self {
            client,
            cache,
            upstream,
            options,
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn upstream(&self) -> &RepoIdentity {
        &self.upstream
    }

    pub fn cache(&self) -> &Arc<VerificationCache> {
        &self.cache
    }

    pub fn classify(&self, record: &ForkRecord) -> QualificationResult {
        classify(record, &self.upstream)
    }

    pub fn partition(&self, heuristic: &QualificationResult) -> Partition {
        let confident = heuristic.confidence >= Confidence::new(self.options.confidence_threshold);
        match heuristic.qualification {
            Qualification::NoCommits if confident => Partition::Skip,
            Qualification::HasCommits if confident && !self.options.exact_counts => {
                Partition::Accept
            }
            _ => Partition::Verify,
        }
    }

    pub async fn parent_metadata(&self) -> Result<RepoMetadata> {
        self.cache
            .get_parent_metadata(&self.upstream, || self.client.get_repository(&self.upstream))
            .await
    }

    /// Authoritative result from one (cached) comparison call.
    pub async fn try_verify(&self, record: &ForkRecord) -> Result<QualificationResult> {
        let parent = self.parent_metadata().await?;
        let key = record.key(&self.upstream);
        let fork = record.identity();
        let outcome = self
            .cache
            .get_or_verify(&key, || {
                self.client.compare(
                    &self.upstream,
                    &parent.default_branch,
                    &fork,
                    &record.default_branch,
                )
            })
            .await?;
        Ok(QualificationResult::verified(key, &outcome))
    }

    /// Like [`Self::try_verify`], but falls back to the heuristic result
    /// when verification fails.
    pub async fn verify(&self, record: &ForkRecord) -> QualificationResult {
        let heuristic = self.classify(record);
        match self.try_verify(record).await {
            Ok(result) => result,
            Err(e) => self.fallback(heuristic, &e),
        }
    }

    fn fallback(&self, heuristic: QualificationResult, err: &ForkgateError) -> QualificationResult {
        match err.class() {
            ErrorClass::NotFound => {
                tracing::debug!(
                    fork = %heuristic.fork,
                    state = %heuristic.qualification,
                    error = %err,
                    "fork vanished before verification"
                );
            }
            _ => {
                tracing::warn!(
                    fork = %heuristic.fork,
                    state = %heuristic.qualification,
                    error = %err,
                    "verification failed, keeping heuristic result"
                );
            }
        }
        match self.options.on_verification_failure {
            FailurePolicy::RetainHeuristic => heuristic,
            FailurePolicy::Downgrade => QualificationResult {
                confidence: Confidence::new(
                    heuristic.confidence.value().min(DOWNGRADED_CONFIDENCE),
                ),
                ..heuristic
            },
        }
    }

    /// Classifies every record and verifies only the uncertain ones.
    pub async fn qualify_batch(&self, records: &[ForkRecord]) -> BatchReport {
        let mut stats = BatchStats {
            total: records.len(),
            ..Default::default()
        };
        let mut results: Vec<Option<QualificationResult>> = vec![None; records.len()];
        let mut to_verify = Vec::new();

        for (idx, record) in records.iter().enumerate() {
            let heuristic = self.classify(record);
            match self.partition(&heuristic) {
                Partition::Skip => {
                    stats.skipped += 1;
                    results[idx] = Some(heuristic);
                }
                Partition::Accept => {
                    stats.accepted += 1;
                    results[idx] = Some(heuristic);
                }
                Partition::Verify => {
                    results[idx] = Some(heuristic.clone());
                    to_verify.push((idx, heuristic));
                }
            }
        }

        let mut outcomes = stream::iter(to_verify)
            .map(|(idx, heuristic)| async move {
                let verified = self.try_verify(&records[idx]).await;
                (idx, heuristic, verified)
            })
            .buffer_unordered(self.options.verify_concurrency.max(1));

        let mut failures = Vec::new();
        let mut fatal = None;
        while let Some((idx, heuristic, verified)) = outcomes.next().await {
            stats.verified += 1;
            match verified {
                Ok(result) => results[idx] = Some(result),
                Err(e) if e.is_authentication() => {
                    tracing::error!(
                        upstream = %self.upstream,
                        fork = %heuristic.fork,
                        error = %e,
                        "credentials rejected, stopping verification"
                    );
                    fatal = Some(e);
                    break;
                }
                Err(e) => {
                    stats.verification_failures += 1;
                    let fallback = self.fallback(heuristic, &e);
                    failures.push(ForkgateError::VerificationFailure {
                        fork: fallback.fork.to_string(),
                        reason: e.to_string(),
                    });
                    results[idx] = Some(fallback);
                }
            }
        }

        tracing::info!(
            upstream = %self.upstream,
            total = stats.total,
            skipped = stats.skipped,
            accepted = stats.accepted,
            verified = stats.verified,
            failures = stats.verification_failures,
            calls_saved = stats.calls_saved(),
            "qualified fork batch"
        );

        BatchReport {
            results: results.into_iter().flatten().collect(),
            stats,
            failures,
            fatal,
        }
    }

    /// Walks the upstream's forks listing page by page, qualifying each page
    /// as it arrives. With a store, the run resumes from the stored checkpoint
    /// and saves a new one after every page.
    pub async fn qualify_forks(
        &self,
        pagination: &PaginationEngine,
        store: Option<&dyn CheckpointStore>,
    ) -> QualificationRun {
        let endpoint = Endpoint::forks(&self.upstream);
        let start = store
            .and_then(|s| s.load(&endpoint))
            .unwrap_or_else(|| PaginationCheckpoint::start(endpoint));
        if start.pages_seen > 0 {
            tracing::info!(
                upstream = %self.upstream,
                next_page = start.next_page,
                items_seen = start.items_seen,
                "resuming fork listing"
            );
        }

        let mut run = QualificationRun {
            results: Vec::new(),
            stats: BatchStats::default(),
            failures: Vec::new(),
            checkpoint: start.clone(),
            interrupted: None,
        };
        let mut pages = Box::pin(pagination.resume::<ForkRecord>(start));

        while let Some(page) = pages.next().await {
            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(
                        upstream = %self.upstream,
                        next_page = e.checkpoint.next_page,
                        error = %e.source,
                        "fork listing interrupted"
                    );
                    run.interrupted = Some(e);
                    break;
                }
            };

            let report = self.qualify_batch(&page.items).await;
            if let Some(fatal) = report.fatal {
                // The page is redone on resume, so none of it is recorded.
                run.interrupted = Some(PaginationError {
                    source: fatal,
                    checkpoint: run.checkpoint.clone(),
                });
                break;
            }
            run.stats.merge(&report.stats);
            run.results.extend(report.results);
            run.failures.extend(report.failures);
            run.checkpoint = page.checkpoint;
            if let Some(store) = store {
                store.save(&run.checkpoint);
            }
            emit(
                self.on_progress.as_ref(),
                Progress::PageQualified {
                    upstream: self.upstream.clone(),
                    page: page.number,
                    forks: page.items.len(),
                    total_so_far: run.results.len(),
                },
            );
        }

        run
    }
}

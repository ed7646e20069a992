use chrono::Duration;

use crate::github::types::{ForkRecord, RepoIdentity};
use crate::qualify::result::{Qualification, QualificationResult};

pub const NO_COMMITS_CONFIDENCE: f32 = 0.95;
pub const UNKNOWN_CONFIDENCE: f32 = 0.10;

/// Classifies a fork from listing metadata alone.
///
/// A fork whose `pushed_at` does not come after `created_at` has never been
/// pushed to since it was created and cannot be ahead of its upstream.
/// Missing timestamps yield `Unknown`, which callers treat as "inspect".
pub fn classify(record: &ForkRecord, upstream: &RepoIdentity) -> QualificationResult {
    let key = record.key(upstream);
    match (record.created_at, record.pushed_at) {
        (Some(created), Some(pushed)) if created >= pushed => {
            QualificationResult::heuristic(key, Qualification::NoCommits, NO_COMMITS_CONFIDENCE)
        }
        (Some(created), Some(pushed)) => QualificationResult::heuristic(
            key,
            Qualification::HasCommits,
            has_commits_confidence(pushed - created),
        ),
        _ => QualificationResult::heuristic(key, Qualification::Unknown, UNKNOWN_CONFIDENCE),
    }
}

/// Pushes seconds after fork creation are often the fork sync itself; the
/// longer the gap, the likelier real work landed.
fn has_commits_confidence(delta: Duration) -> f32 {
    if delta < Duration::minutes(1) {
        0.55
    } else if delta < Duration::hours(1) {
        0.70
    } else if delta < Duration::days(1) {
        0.80
    } else {
        0.90
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qualify::result::{ConfidenceLevel, Provenance};
    use crate::test_utils::make_fork;

    fn upstream() -> RepoIdentity {
        RepoIdentity::new("up", "proj")
    }

    #[test]
    fn equal_timestamps_mean_no_commits_with_high_confidence() {
        let fork = make_fork(
            "alice",
            Some("2020-01-01T00:00:00Z"),
            Some("2020-01-01T00:00:00Z"),
        );
        let result = classify(&fork, &upstream());
        assert_eq!(result.qualification, Qualification::NoCommits);
        assert_eq!(result.confidence.level(), ConfidenceLevel::High);
        assert_eq!(result.provenance, Provenance::Heuristic);
    }

    #[test]
    fn pushed_before_created_means_no_commits() {
        let fork = make_fork(
            "bob",
            Some("2021-03-01T00:00:00Z"),
            Some("2019-12-31T00:00:00Z"),
        );
        assert_eq!(
            classify(&fork, &upstream()).qualification,
            Qualification::NoCommits
        );
    }

    #[test]
    fn later_push_means_has_commits() {
        let fork = make_fork(
            "carol",
            Some("2020-01-01T00:00:00Z"),
            Some("2020-06-01T00:00:00Z"),
        );
        let result = classify(&fork, &upstream());
        assert_eq!(result.qualification, Qualification::HasCommits);
        assert!((result.confidence.value() - 0.90).abs() < f32::EPSILON);
    }

    #[test]
    fn confidence_grows_with_push_delta() {
        let at = |pushed: &str| {
            classify(
                &make_fork("d", Some("2020-01-01T00:00:00Z"), Some(pushed)),
                &upstream(),
            )
            .confidence
        };
        let seconds = at("2020-01-01T00:00:10Z");
        let minutes = at("2020-01-01T00:10:00Z");
        let hours = at("2020-01-01T05:00:00Z");
        let days = at("2020-01-09T00:00:00Z");
        assert!(seconds < minutes && minutes < hours && hours < days);
    }

    #[test]
    fn missing_or_malformed_timestamps_are_unknown() {
        for (created, pushed) in [
            (None, Some("2020-01-01T00:00:00Z")),
            (Some("2020-01-01T00:00:00Z"), None),
            (Some("not a date"), Some("2020-01-01T00:00:00Z")),
        ] {
            let result = classify(&make_fork("e", created, pushed), &upstream());
            assert_eq!(result.qualification, Qualification::Unknown);
            assert_eq!(result.confidence.level(), ConfidenceLevel::Low);
            assert!(result.qualification.needs_inspection());
        }
    }

    #[test]
    fn classification_is_deterministic() {
        let fork = make_fork(
            "f",
            Some("2020-01-01T00:00:00Z"),
            Some("2020-02-01T00:00:00Z"),
        );
        assert_eq!(classify(&fork, &upstream()), classify(&fork, &upstream()));
    }
}

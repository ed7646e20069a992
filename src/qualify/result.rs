use serde::Serialize;
use std::fmt;

use crate::github::types::{CompareOutcome, ForkKey};

/// Closed set of qualification states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Qualification {
    Unknown,
    NoCommits,
    HasCommits,
    VerifiedNone { behind_by: u32 },
    VerifiedAhead { ahead_by: u32, behind_by: u32 },
}

impl Qualification {
    pub fn from_compare(outcome: &CompareOutcome) -> Self {
        if outcome.ahead_by > 0 {
            Qualification::VerifiedAhead {
                ahead_by: outcome.ahead_by,
                behind_by: outcome.behind_by,
            }
        } else {
            Qualification::VerifiedNone {
                behind_by: outcome.behind_by,
            }
        }
    }

    /// Whether the fork should go on to downstream analysis.
    /// `Unknown` is included so that missing data never hides a fork.
    pub fn needs_inspection(&self) -> bool {
        matches!(
            self,
            Qualification::Unknown
                | Qualification::HasCommits
                | Qualification::VerifiedAhead { .. }
        )
    }
}

impl fmt::Display for Qualification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Qualification::Unknown => write!(f, "unknown"),
            Qualification::NoCommits => write!(f, "no commits"),
            Qualification::HasCommits => write!(f, "has commits"),
            Qualification::VerifiedNone { .. } => write!(f, "verified: not ahead"),
            Qualification::VerifiedAhead { ahead_by, .. } => {
                write!(f, "verified: {ahead_by} ahead")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Heuristic,
    Verified,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

/// Confidence in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize)]
pub struct Confidence(f32);

impl Confidence {
    pub const CERTAIN: Confidence = Confidence(1.0);

    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Confidence(0.0);
        }
        Confidence(value.clamp(0.0, 1.0))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    pub fn level(self) -> ConfidenceLevel {
        match self.0 {
            v if v >= 0.85 => ConfidenceLevel::High,
            v if v >= 0.5 => ConfidenceLevel::Medium,
            _ => ConfidenceLevel::Low,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QualificationResult {
    pub fork: ForkKey,
    pub qualification: Qualification,
    pub confidence: Confidence,
    pub provenance: Provenance,
}

impl QualificationResult {
    pub fn heuristic(fork: ForkKey, qualification: Qualification, confidence: f32) -> Self {
        Self {
            fork,
            qualification,
            confidence: Confidence::new(confidence),
            provenance: Provenance::Heuristic,
        }
    }

    pub fn verified(fork: ForkKey, outcome: &CompareOutcome) -> Self {
        Self {
            fork,
            qualification: Qualification::from_compare(outcome),
            confidence: Confidence::CERTAIN,
            provenance: Provenance::Verified,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.provenance == Provenance::Verified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(Confidence::new(1.7).value(), 1.0);
        assert_eq!(Confidence::new(-0.2).value(), 0.0);
        assert_eq!(Confidence::new(f32::NAN).value(), 0.0);
        assert_eq!(Confidence::new(0.95).level(), ConfidenceLevel::High);
        assert_eq!(Confidence::new(0.6).level(), ConfidenceLevel::Medium);
        assert_eq!(Confidence::new(0.1).level(), ConfidenceLevel::Low);
    }

    #[test]
    fn compare_outcome_maps_to_verified_state() {
        let ahead = CompareOutcome {
            status: "diverged".to_string(),
            ahead_by: 4,
            behind_by: 9,
            total_commits: 4,
        };
        assert_eq!(
            Qualification::from_compare(&ahead),
            Qualification::VerifiedAhead {
                ahead_by: 4,
                behind_by: 9
            }
        );
        let behind = CompareOutcome {
            ahead_by: 0,
            ..ahead.clone()
        };
        assert_eq!(
            Qualification::from_compare(&behind),
            Qualification::VerifiedNone { behind_by: 9 }
        );
        assert!(!Qualification::VerifiedNone { behind_by: 9 }.needs_inspection());
        assert_eq!(Qualification::from_compare(&ahead).to_string(), "verified: 4 ahead");
        assert!(Qualification::Unknown.needs_inspection());
    }
}

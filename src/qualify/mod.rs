pub mod classify;
pub mod engine;
pub mod result;

pub use classify::classify;
pub use engine::{
    BatchReport, BatchStats, FailurePolicy, ForkQualificationEngine, Partition,
    QualificationOptions, QualificationRun,
};
pub use result::{Confidence, ConfidenceLevel, Provenance, Qualification, QualificationResult};

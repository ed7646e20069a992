use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForkgateError {
    #[error("github error: {0}")]
    GitHub(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("rate limited — resets at {}", fmt_reset(.reset_at))]
    QuotaExceeded { reset_at: Option<DateTime<Utc>> },

    #[error("network error after {attempts} attempt(s): {message}")]
    TransientNetwork { attempts: u32, message: String },

    #[error("not found: {path}")]
    NotFound { path: String },

    #[error("authentication failed ({status}): {message}")]
    Authentication { status: u16, message: String },

    #[error("unexpected status {status} for {path}")]
    UnexpectedStatus { status: u16, path: String },

    #[error("verification failed for {fork}: {reason}")]
    VerificationFailure { fork: String, reason: String },

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("cancelled: {0}")]
    Cancelled(String),

    /// An error handed to every caller waiting on the same cached computation.
    #[error(transparent)]
    Shared(Arc<ForkgateError>),
}

/// Coarse retry semantics attached to each error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Quota,
    Transient,
    NotFound,
    Fatal,
    Recoverable,
}

impl ForkgateError {
    /// The underlying error, looking through [`ForkgateError::Shared`].
    pub fn root(&self) -> &ForkgateError {
        match self {
            ForkgateError::Shared(inner) => inner.root(),
            other => other,
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self.root(), ForkgateError::Authentication { .. })
    }

    pub fn class(&self) -> ErrorClass {
        match self.root() {
            ForkgateError::QuotaExceeded { .. } => ErrorClass::Quota,
            ForkgateError::TransientNetwork { .. } | ForkgateError::Cancelled(_) => {
                ErrorClass::Transient
            }
            ForkgateError::NotFound { .. } => ErrorClass::NotFound,
            ForkgateError::VerificationFailure { .. } => ErrorClass::Recoverable,
            ForkgateError::GitHub(_)
            | ForkgateError::Config(_)
            | ForkgateError::Authentication { .. }
            | ForkgateError::UnexpectedStatus { .. }
            | ForkgateError::Decode(_)
            | ForkgateError::Shared(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::Quota | ErrorClass::Transient)
    }
}

fn fmt_reset(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(t) => t.to_rfc3339(),
        None => "unknown".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, ForkgateError>;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ForkgateError, Result};
use crate::pagination::PaginationOptions;
use crate::qualify::{FailurePolicy, QualificationOptions};
use crate::rate_limit::{LimiterConfig, QuotaRetryPolicy, TransientRetryPolicy};

#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    pub github_token: Option<String>,
    pub api_base: String,
    pub max_in_flight: usize,
    pub reset_buffer_secs: u64,
    pub heartbeat_interval_secs: u64,
    /// Waits for bare 403s that carry no reset information.
    pub ambiguous_ladder_secs: Vec<u64>,
    pub transient_max_attempts: u32,
    pub transient_base_delay_ms: u64,
    pub transient_max_delay_secs: u64,
    pub per_page: u32,
    pub max_pages: Option<u32>,
    pub cache_ttl_secs: u64,
    pub confidence_threshold: f32,
    pub exact_counts: bool,
    pub verify_concurrency: usize,
    pub on_verification_failure: FailurePolicy,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("github_token", &self.github_token.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("max_in_flight", &self.max_in_flight)
            .field("reset_buffer_secs", &self.reset_buffer_secs)
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("ambiguous_ladder_secs", &self.ambiguous_ladder_secs)
            .field("transient_max_attempts", &self.transient_max_attempts)
            .field("transient_base_delay_ms", &self.transient_base_delay_ms)
            .field("transient_max_delay_secs", &self.transient_max_delay_secs)
            .field("per_page", &self.per_page)
            .field("max_pages", &self.max_pages)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("confidence_threshold", &self.confidence_threshold)
            .field("exact_counts", &self.exact_counts)
            .field("verify_concurrency", &self.verify_concurrency)
            .field("on_verification_failure", &self.on_verification_failure)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github_token: None,
            api_base: "https://api.github.com".to_string(),
            max_in_flight: 8,
            reset_buffer_secs: 1,
            heartbeat_interval_secs: 30,
            ambiguous_ladder_secs: vec![5 * 60, 15 * 60, 30 * 60],
            transient_max_attempts: 5,
            transient_base_delay_ms: 500,
            transient_max_delay_secs: 30,
            per_page: 100,
            max_pages: None,
            cache_ttl_secs: 60 * 60,
            confidence_threshold: 0.6,
            exact_counts: false,
            verify_concurrency: 8,
            on_verification_failure: FailurePolicy::RetainHeuristic,
        }
    }
}

impl Config {
    /// Loads config, falling back to defaults when the sources don't parse.
    pub fn load(config_path: Option<PathBuf>) -> Self {
        match Self::try_load(config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "config parse error, using defaults");
                Config::default()
            }
        }
    }

    pub fn try_load(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file =
            config_path.unwrap_or_else(|| config_dir().join("forkgate").join("config.toml"));

        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if config_file.exists() {
            figment = figment.merge(Toml::file(&config_file));
        }

        figment = figment.merge(Env::prefixed("FORKGATE_")).merge(
            Env::raw()
                .only(&["GITHUB_TOKEN"])
                .map(|_| "github_token".into()),
        );

        figment
            .extract()
            .map_err(|e| ForkgateError::Config(e.to_string()))
    }

    pub fn limiter_config(&self) -> LimiterConfig {
        LimiterConfig {
            max_in_flight: self.max_in_flight.max(1),
            reset_buffer: Duration::from_secs(self.reset_buffer_secs),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
            quota_policy: QuotaRetryPolicy {
                ladder: self
                    .ambiguous_ladder_secs
                    .iter()
                    .map(|s| Duration::from_secs(*s))
                    .collect(),
            },
            ..LimiterConfig::default()
        }
    }

    pub fn transient_policy(&self) -> TransientRetryPolicy {
        TransientRetryPolicy {
            max_attempts: self.transient_max_attempts.max(1),
            base_delay: Duration::from_millis(self.transient_base_delay_ms),
            max_delay: Duration::from_secs(self.transient_max_delay_secs),
        }
    }

    pub fn pagination_options(&self) -> PaginationOptions {
        PaginationOptions {
            per_page: self.per_page,
            max_pages: self.max_pages,
        }
    }

    pub fn qualification_options(&self) -> QualificationOptions {
        QualificationOptions {
            confidence_threshold: self.confidence_threshold,
            exact_counts: self.exact_counts,
            verify_concurrency: self.verify_concurrency.max(1),
            on_verification_failure: self.on_verification_failure,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        })
        .unwrap_or_else(|| PathBuf::from("."))
}

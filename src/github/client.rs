use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{ForkgateError, Result};
use crate::github::transport::{HttpResponse, Transport};
use crate::github::types::{CompareOutcome, RepoIdentity, RepoMetadata};
use crate::rate_limit::{RateLimiter, ResponseClass, TransientRetryPolicy};

/// Gated request executor. Every call goes through the shared [`RateLimiter`];
/// quota signals and transient faults are retried under separate policies.
#[derive(Clone)]
pub struct GitHubClient {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    transient: TransientRetryPolicy,
}

#[derive(Deserialize)]
struct ApiMessage {
    message: String,
}

impl GitHubClient {
    pub fn new(transport: Arc<dyn Transport>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            transport,
            limiter,
            transient: TransientRetryPolicy::default(),
        }
    }

    pub fn with_transient_policy(mut self, policy: TransientRetryPolicy) -> Self {
        self.transient = policy;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn remaining_quota(&self) -> Option<u32> {
        self.limiter.snapshot().remaining
    }

    pub async fn get(&self, path: &str, query: &[(String, String)]) -> Result<HttpResponse> {
        let mut transient_attempts = 0u32;

        loop {
            let permit = self.limiter.acquire().await?;
            let outcome = self.transport.get(path, query).await;
            drop(permit);

            let (class, response, failure) = match outcome {
                Ok(resp) => (self.limiter.record_response(&resp), Some(resp), None),
                Err(e) => (self.limiter.record_transport_error(&e), None, Some(e.message)),
            };

            match class {
                ResponseClass::Success => {
                    return response
                        .ok_or_else(|| ForkgateError::GitHub("missing response".to_string()));
                }
                ResponseClass::QuotaExceeded { .. } | ResponseClass::Ambiguous { .. } => {
                    continue;
                }
                ResponseClass::Authentication => {
                    let (status, body) = response
                        .map(|r| (r.status, r.body))
                        .unwrap_or_default();
                    return Err(ForkgateError::Authentication {
                        status,
                        message: api_message(&body),
                    });
                }
                ResponseClass::NotFound => {
                    tracing::debug!(path, "resource not found");
                    return Err(ForkgateError::NotFound {
                        path: path.to_string(),
                    });
                }
                ResponseClass::Unexpected => {
                    let status = response.map(|r| r.status).unwrap_or_default();
                    return Err(ForkgateError::UnexpectedStatus {
                        status,
                        path: path.to_string(),
                    });
                }
                ResponseClass::Transient => {}
            }

            transient_attempts += 1;
            let message = failure.unwrap_or_else(|| {
                let status = response.as_ref().map(|r| r.status).unwrap_or_default();
                format!("server returned {status}")
            });
            match self.transient.delay(transient_attempts) {
                Some(delay) => {
                    tracing::warn!(
                        path,
                        attempt = transient_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(ForkgateError::TransientNetwork {
                        attempts: transient_attempts,
                        message,
                    });
                }
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T> {
        let resp = self.get(path, query).await?;
        Ok(serde_json::from_str(&resp.body)?)
    }

    pub async fn get_repository(&self, repo: &RepoIdentity) -> Result<RepoMetadata> {
        self.get_json(&repo_path(repo), &[]).await
    }

    /// Compares `base` on the upstream against `head` on the fork.
    pub async fn compare(
        &self,
        upstream: &RepoIdentity,
        base: &str,
        fork: &RepoIdentity,
        head: &str,
    ) -> Result<CompareOutcome> {
        let path = format!(
            "{}/compare/{}...{}:{}",
            repo_path(upstream),
            encode_ref(base),
            urlencoding::encode(&fork.owner),
            encode_ref(head)
        );
        self.get_json(&path, &[]).await
    }
}

pub fn repo_path(repo: &RepoIdentity) -> String {
    format!(
        "/repos/{}/{}",
        urlencoding::encode(&repo.owner),
        urlencoding::encode(&repo.name)
    )
}

/// Percent-encodes each segment of a ref, keeping `/` separators.
fn encode_ref(r: &str) -> String {
    r.split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn api_message(body: &str) -> String {
    serde_json::from_str::<ApiMessage>(body)
        .map(|m| m.message)
        .unwrap_or_else(|_| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::transport::TransportError;
    use crate::rate_limit::LimiterConfig;
    use crate::test_utils::*;
    use std::time::Duration;
    use tokio::time::Instant;

    fn client_with(transport: Arc<MockTransport>) -> GitHubClient {
        let limiter = Arc::new(RateLimiter::new(LimiterConfig::default()));
        GitHubClient::new(transport, limiter).with_transient_policy(TransientRetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_is_not_retried() {
        let transport = MockTransport::sequence(vec![Ok(json_response(
            401,
            r#"{"message":"Bad credentials"}"#,
        ))]);
        let client = client_with(Arc::clone(&transport));

        let err = client.get("/repos/a/b", &[]).await.unwrap_err();
        assert!(matches!(
            err,
            ForkgateError::Authentication { status: 401, ref message } if message == "Bad credentials"
        ));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_with_reset_is_retried_until_success() {
        let reset = (chrono::Utc::now().timestamp() + 45).to_string();
        let exhausted = response_with_headers(
            403,
            &[
                ("x-ratelimit-remaining", "0"),
                ("x-ratelimit-limit", "60"),
                ("x-ratelimit-reset", &reset),
            ],
        );
        let transport = MockTransport::sequence(vec![
            Ok(exhausted.clone()),
            Ok(exhausted),
            Ok(json_response(200, "{}")),
        ]);
        let client = client_with(Arc::clone(&transport));

        let start = Instant::now();
        let resp = client.get("/repos/a/b", &[]).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(transport.call_count(), 3);
        assert!(start.elapsed() >= Duration::from_secs(44));
    }

    #[tokio::test(start_paused = true)]
    async fn bare_forbidden_waits_on_ladder_then_succeeds() {
        let transport = MockTransport::sequence(vec![
            Ok(response_with_headers(403, &[])),
            Ok(json_response(200, "{}")),
        ]);
        let client = client_with(Arc::clone(&transport));

        let start = Instant::now();
        let resp = client.get("/repos/a/b/forks", &[]).await.unwrap();
        assert_eq!(resp.status, 200);
        assert!(start.elapsed() >= Duration::from_secs(5 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_exhaust_bounded_retries() {
        let transport = MockTransport::new(|_, _| Err(TransportError::new("connection reset")));
        let client = client_with(Arc::clone(&transport));

        let err = client.get("/repos/a/b", &[]).await.unwrap_err();
        assert!(matches!(err, ForkgateError::TransientNetwork { attempts: 3, .. }));
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn server_error_then_success() {
        let transport = MockTransport::sequence(vec![
            Ok(response_with_headers(502, &[])),
            Ok(json_response(200, r#"{"full_name":"a/b","default_branch":"trunk"}"#)),
        ]);
        let client = client_with(Arc::clone(&transport));

        let meta = client
            .get_repository(&RepoIdentity::new("a", "b"))
            .await
            .unwrap();
        assert_eq!(meta.default_branch, "trunk");
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_surfaced() {
        let transport = MockTransport::sequence(vec![Ok(response_with_headers(404, &[]))]);
        let client = client_with(transport);
        let err = client.get("/repos/gone/away", &[]).await.unwrap_err();
        assert!(matches!(err, ForkgateError::NotFound { .. }));
    }

    #[tokio::test]
    async fn compare_path_keeps_branch_slashes() {
        let transport = MockTransport::sequence(vec![Ok(json_response(
            200,
            r#"{"status":"ahead","ahead_by":2,"behind_by":0,"total_commits":2}"#,
        ))]);
        let client = client_with(Arc::clone(&transport));

        let outcome = client
            .compare(
                &RepoIdentity::new("up", "proj"),
                "main",
                &RepoIdentity::new("alice", "proj"),
                "feature/x",
            )
            .await
            .unwrap();
        assert_eq!(outcome.ahead_by, 2);
        assert_eq!(
            transport.calls(),
            vec!["/repos/up/proj/compare/main...alice:feature/x".to_string()]
        );
    }
}

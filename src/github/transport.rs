use async_trait::async_trait;
use itertools::Itertools;
use octocrab::service::middleware::retry::RetryConfig;
use octocrab::Octocrab;
use std::collections::HashMap;
use thiserror::Error;

use crate::error::{ForkgateError, Result};

/// Raw response as seen by the rate limiter and the pagination engine.
#[derive(Clone, Debug, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

#[derive(Error, Debug, Clone)]
#[error("transport error: {message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Narrow HTTP contract the core depends on.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> std::result::Result<HttpResponse, TransportError>;
}

pub fn encode_query(query: &[(String, String)]) -> String {
    query
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .join("&")
}

/// Transport backed by octocrab's raw request API, so status codes and rate
/// limit headers reach the limiter untouched. Octocrab's own retry layer is
/// off: one `get` is exactly one request on the wire.
#[derive(Clone)]
pub struct OctocrabTransport {
    octo: Octocrab,
    api_base: String,
}

impl OctocrabTransport {
    pub fn new(token: Option<&str>, api_base: &str) -> Result<Self> {
        let mut builder = Octocrab::builder().add_retry_config(RetryConfig::None);
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            builder = builder.personal_token(token.to_string());
        }
        let octo = builder
            .build()
            .map_err(|e| ForkgateError::GitHub(e.to_string()))?;

        Ok(Self {
            octo,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str, query: &[(String, String)]) -> String {
        if query.is_empty() {
            format!("{}{}", self.api_base, path)
        } else {
            format!("{}{}?{}", self.api_base, path, encode_query(query))
        }
    }
}

#[async_trait]
impl Transport for OctocrabTransport {
    async fn get(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> std::result::Result<HttpResponse, TransportError> {
        let url = self.url(path, query);
        let response = self
            .octo
            ._get(url)
            .await
            .map_err(|e| TransportError::new(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = self
            .octo
            .body_to_string(response)
            .await
            .map_err(|e| TransportError::new(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

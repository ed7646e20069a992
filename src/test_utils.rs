#![cfg(test)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::github::transport::{HttpResponse, Transport, TransportError};
use crate::github::types::ForkRecord;

type Handler =
    Box<dyn Fn(&str, &[(String, String)]) -> Result<HttpResponse, TransportError> + Send + Sync>;

/// Transport double that records every call and answers from a handler.
pub struct MockTransport {
    handler: Handler,
    calls: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new(
        handler: impl Fn(&str, &[(String, String)]) -> Result<HttpResponse, TransportError>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Answers calls in order; panics when the script runs out.
    pub fn sequence(responses: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
        let queue = Mutex::new(VecDeque::from(responses));
        Self::new(move |path, _| {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected call to {path}"))
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_matching(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.contains(needle))
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<HttpResponse, TransportError> {
        let rendered = if query.is_empty() {
            path.to_string()
        } else {
            format!("{path}?{}", crate::github::transport::encode_query(query))
        };
        self.calls.lock().unwrap().push(rendered);
        tokio::task::yield_now().await;
        (self.handler)(path, query)
    }
}

pub fn response_with_headers(status: u16, headers: &[(&str, &str)]) -> HttpResponse {
    HttpResponse {
        status,
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect::<HashMap<_, _>>(),
        body: String::new(),
    }
}

pub fn json_response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        headers: HashMap::new(),
        body: body.to_string(),
    }
}

pub fn query_value<'a>(query: &'a [(String, String)], key: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

pub fn fork_json(owner: &str, created_at: &str, pushed_at: &str) -> serde_json::Value {
    serde_json::json!({
        "name": "proj",
        "owner": { "login": owner },
        "created_at": created_at,
        "updated_at": pushed_at,
        "pushed_at": pushed_at,
        "default_branch": "main",
    })
}

pub fn make_fork(owner: &str, created_at: Option<&str>, pushed_at: Option<&str>) -> ForkRecord {
    let value = serde_json::json!({
        "name": "proj",
        "owner": { "login": owner },
        "created_at": created_at,
        "pushed_at": pushed_at,
        "default_branch": "main",
    });
    serde_json::from_value(value).unwrap()
}

/// One page of a forks listing with an optional `Link: rel="next"`.
pub fn forks_page(forks: &[serde_json::Value], next_page: Option<u32>) -> HttpResponse {
    let mut resp = json_response(200, &serde_json::Value::from(forks.to_vec()).to_string());
    let link = match next_page {
        Some(next) => {
            format!("<https://api.github.com/repositories/1/forks?page={next}>; rel=\"next\"")
        }
        None => "<https://api.github.com/repositories/1/forks?page=1>; rel=\"first\"".to_string(),
    };
    if !forks.is_empty() {
        resp.headers.insert("link".to_string(), link);
    }
    resp
}

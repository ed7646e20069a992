use futures::stream::{self, Stream, StreamExt};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::error::ForkgateError;
use crate::github::client::GitHubClient;
use crate::pagination::checkpoint::{Endpoint, PaginationCheckpoint};

pub const MAX_PER_PAGE: u32 = 100;

#[derive(Clone, Debug)]
pub struct PaginationOptions {
    pub per_page: u32,
    /// Stop after this many pages in total, counting pages before a resume.
    pub max_pages: Option<u32>,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            per_page: MAX_PER_PAGE,
            max_pages: None,
        }
    }
}

/// One fetched page and the checkpoint to resume after it.
#[derive(Clone, Debug)]
pub struct Page<T> {
    pub number: u32,
    pub items: Vec<T>,
    pub checkpoint: PaginationCheckpoint,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.checkpoint.complete
    }
}

/// A stream stopped early. `checkpoint` is the last good position.
#[derive(Error, Debug)]
#[error("pagination of {} stopped at page {}: {source}", .checkpoint.endpoint.path, .checkpoint.next_page)]
pub struct PaginationError {
    #[source]
    pub source: ForkgateError,
    pub checkpoint: PaginationCheckpoint,
}

/// Lazily walks paginated collections through the shared rate limiter.
#[derive(Clone)]
pub struct PaginationEngine {
    client: GitHubClient,
    options: PaginationOptions,
}

impl PaginationEngine {
    pub fn new(client: GitHubClient, options: PaginationOptions) -> Self {
        let per_page = options.per_page.clamp(1, MAX_PER_PAGE);
        Self {
            client,
            options: PaginationOptions { per_page, ..options },
        }
    }

    pub fn client(&self) -> &GitHubClient {
        &self.client
    }

    pub fn fetch_all<T>(
        &self,
        endpoint: Endpoint,
    ) -> impl Stream<Item = Result<Page<T>, PaginationError>> + Send + 'static
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.resume(PaginationCheckpoint::start(endpoint))
    }

    /// Continues from `checkpoint.next_page`; earlier pages are never fetched
    /// again. The stream ends after the first error.
    pub fn resume<T>(
        &self,
        checkpoint: PaginationCheckpoint,
    ) -> impl Stream<Item = Result<Page<T>, PaginationError>> + Send + 'static
    where
        T: DeserializeOwned + Send + 'static,
    {
        let client = self.client.clone();
        let options = self.options.clone();

        stream::unfold(Some(checkpoint), move |state| {
            let client = client.clone();
            let options = options.clone();
            async move {
                let checkpoint = state?;
                if checkpoint.complete || reached_max(&options, &checkpoint) {
                    return None;
                }
                let page = fetch_page::<T>(&client, &options, checkpoint).await;
                match page {
                    Ok(Some(page)) => {
                        let next = (!page.checkpoint.complete).then(|| page.checkpoint.clone());
                        Some((Ok(page), next))
                    }
                    Ok(None) => None,
                    Err(e) => Some((Err(e), None)),
                }
            }
        })
    }

    /// Buffers a whole collection. Prefer [`Self::fetch_all`] for large sets.
    pub async fn collect_all<T>(
        &self,
        endpoint: Endpoint,
    ) -> Result<(Vec<T>, PaginationCheckpoint), PaginationError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let mut last = PaginationCheckpoint::start(endpoint.clone());
        let mut items = Vec::new();
        let mut pages = Box::pin(self.fetch_all::<T>(endpoint));
        while let Some(page) = pages.next().await {
            let page = page?;
            last = page.checkpoint;
            items.extend(page.items);
        }
        Ok((items, last))
    }

    /// Drains several independent collections concurrently. Each stream keeps
    /// its own page order; streams complete in any order.
    pub async fn fetch_many<T>(
        &self,
        endpoints: Vec<Endpoint>,
        concurrency: usize,
    ) -> Vec<(Endpoint, Result<Vec<T>, PaginationError>)>
    where
        T: DeserializeOwned + Send + 'static,
    {
        stream::iter(endpoints)
            .map(|endpoint| async move {
                let result = self
                    .collect_all::<T>(endpoint.clone())
                    .await
                    .map(|(items, _)| items);
                (endpoint, result)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await
    }
}

fn reached_max(options: &PaginationOptions, checkpoint: &PaginationCheckpoint) -> bool {
    options
        .max_pages
        .is_some_and(|max| checkpoint.pages_seen >= max)
}

async fn fetch_page<T: DeserializeOwned>(
    client: &GitHubClient,
    options: &PaginationOptions,
    checkpoint: PaginationCheckpoint,
) -> Result<Option<Page<T>>, PaginationError> {
    let page_no = checkpoint.next_page;
    let mut query = checkpoint.endpoint.query.clone();
    query.push(("per_page".to_string(), options.per_page.to_string()));
    query.push(("page".to_string(), page_no.to_string()));

    let resp = match client.get(&checkpoint.endpoint.path, &query).await {
        Ok(resp) => resp,
        Err(source) => return Err(PaginationError { source, checkpoint }),
    };
    let items: Vec<T> = match serde_json::from_str(&resp.body) {
        Ok(items) => items,
        Err(e) => {
            return Err(PaginationError {
                source: e.into(),
                checkpoint,
            })
        }
    };
    if items.is_empty() {
        return Ok(None);
    }

    let has_next = match resp.header("link") {
        Some(link) => link_has_next(link),
        None => items.len() as u32 >= options.per_page,
    };
    let mut next = checkpoint.advance(items.len(), !has_next);
    if reached_max(options, &next) {
        next.complete = true;
    }
    tracing::debug!(
        path = %checkpoint.endpoint.path,
        page = page_no,
        items = items.len(),
        last = next.complete,
        "fetched page"
    );

    Ok(Some(Page {
        number: page_no,
        items,
        checkpoint: next,
    }))
}

/// True when an RFC 8288 `Link` header advertises a `rel="next"` target.
pub fn link_has_next(link: &str) -> bool {
    link.split(',').any(|part| {
        part.split(';')
            .skip(1)
            .any(|param| matches!(param.trim(), "rel=\"next\"" | "rel=next"))
    })
}

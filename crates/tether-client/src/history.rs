//! History collaborator: paginated session history over HTTP.
//!
//! Used only when a reconnect finds the replay cursor evicted or invalid.
//! `GET {base}/sessions/{id}/history?after=<cursor>&limit=<n>` returns a
//! [`HistoryPage`].

use async_trait::async_trait;
use tether_core::SessionId;
use tether_protocol::events::HistoryPage;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::HistoryConfig;

/// Entries per page when no history config is given.
pub const DEFAULT_PAGE_SIZE: u32 = 200;
/// Pages per bootstrap when no history config is given.
pub const DEFAULT_MAX_PAGES: u32 = 20;

/// History fetch failures.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Request failed before a response arrived, or the body was not JSON.
    #[error("history request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("history request returned status {0}")]
    Status(u16),
}

/// Fetches history pages.
#[async_trait]
pub trait HistoryFetcher: Send + Sync + 'static {
    /// One page of entries strictly after `after`.
    async fn fetch_page(
        &self,
        session_id: &SessionId,
        after: Option<u64>,
        limit: u32,
    ) -> Result<HistoryPage, HistoryError>;
}

/// reqwest-backed fetcher.
#[derive(Clone, Debug)]
pub struct HttpHistory {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpHistory {
    /// Fetcher for `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
        }
    }

    /// Fetcher from client config.
    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(config.base_url.clone())
    }

    /// Send a bearer token with each request.
    #[must_use]
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }
}

#[async_trait]
impl HistoryFetcher for HttpHistory {
    #[instrument(skip(self), fields(session_id = %session_id))]
    async fn fetch_page(
        &self,
        session_id: &SessionId,
        after: Option<u64>,
        limit: u32,
    ) -> Result<HistoryPage, HistoryError> {
        let url = format!("{}/sessions/{}/history", self.base_url, session_id);
        let mut query = vec![("limit", limit.to_string())];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }

        let mut request = self.client.get(&url).query(&query);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HistoryError::Status(status.as_u16()));
        }
        let page: HistoryPage = response.json().await?;
        debug!(entries = page.events.len(), has_more = page.has_more, "history page fetched");
        Ok(page)
    }
}

/// Page through history from `after`, handing each page to `on_page`.
///
/// Stops after a page without `hasMore`, a page without a cursor, or
/// `max_pages` pages. Returns the number of pages fetched.
pub async fn fetch_all<F>(
    fetcher: &dyn HistoryFetcher,
    session_id: &SessionId,
    mut after: Option<u64>,
    page_size: u32,
    max_pages: u32,
    mut on_page: F,
) -> Result<u32, HistoryError>
where
    F: FnMut(HistoryPage) + Send,
{
    let mut fetched = 0;
    while fetched < max_pages {
        let page = fetcher.fetch_page(session_id, after, page_size).await?;
        fetched += 1;
        let next = page.cursor;
        let more = page.has_more;
        on_page(page);
        match next {
            Some(cursor) if more => after = Some(cursor),
            _ => break,
        }
    }
    Ok(fetched)
}

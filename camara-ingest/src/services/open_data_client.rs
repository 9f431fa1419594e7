//! Chamber of Deputies open-data API client
//!
//! One long-lived client is shared by every ingestion stage in a run so the
//! underlying connections are reused. All retry behavior lives here: bounded
//! attempts with exponential backoff on connection failures and on the
//! transient status set. No stage implements its own retry.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

const API_BASE_URL: &str = "https://dadosabertos.camara.leg.br/api/v2";
const BULK_FILES_BASE_URL: &str = "https://dadosabertos.camara.leg.br/arquivos";
const EXPENSE_ARCHIVE_BASE_URL: &str = "http://www.camara.leg.br/cotas";
const USER_AGENT: &str = "camara-ingest/0.1.0";

const MAX_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 8_000;
const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Bulk archives run to hundreds of megabytes; downloads get a long leash.
const DOWNLOAD_TIMEOUT_SECS: u64 = 300;

/// HTTP statuses worth retrying: rate limiting and upstream hiccups.
const TRANSIENT_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Open-data client errors
#[derive(Debug, Error)]
pub enum OpenDataError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0} for {1}")]
    Status(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Paginated listing envelope: a `dados` page plus navigation links.
#[derive(Debug, Clone, Deserialize)]
pub struct Listing<T> {
    pub dados: Vec<T>,
    #[serde(default)]
    pub links: Vec<PageLink>,
}

/// One entry of the `links[]` array of a paginated listing.
#[derive(Debug, Clone, Deserialize)]
pub struct PageLink {
    pub rel: String,
    pub href: String,
}

/// Extract the `rel=next` href from a listing's links, if any.
pub fn next_page_link(links: &[PageLink]) -> Option<&str> {
    links
        .iter()
        .find(|link| link.rel == "next")
        .map(|link| link.href.as_str())
}

/// Returns true for statuses the client retries before giving up.
pub fn is_transient_status(status: u16) -> bool {
    TRANSIENT_STATUSES.contains(&status)
}

/// Shared HTTP client with bounded automatic retry.
pub struct OpenDataClient {
    http: reqwest::Client,
    api_base: String,
    bulk_files_base: String,
    expense_archive_base: String,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl OpenDataClient {
    pub fn new() -> Result<Self, OpenDataError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| OpenDataError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_base: API_BASE_URL.to_string(),
            bulk_files_base: BULK_FILES_BASE_URL.to_string(),
            expense_archive_base: EXPENSE_ARCHIVE_BASE_URL.to_string(),
            max_attempts: MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Point every endpoint family at one base URL (test servers).
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.api_base = base.clone();
        self.bulk_files_base = base.clone();
        self.expense_archive_base = base;
        self
    }

    /// Shrink the retry backoff (test servers).
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Base URL of the versioned REST API.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Base URL of the bulk-file area (session archives).
    pub fn bulk_files_base(&self) -> &str {
        &self.bulk_files_base
    }

    /// Base URL of the expense archive area.
    pub fn expense_archive_base(&self) -> &str {
        &self.expense_archive_base
    }

    /// GET a JSON resource and deserialize it.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, OpenDataError> {
        let response = self.get_with_retry(url, "application/json", None).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| OpenDataError::Parse(e.to_string()))
    }

    /// GET an XML resource and return the raw document text.
    pub async fn get_xml(&self, url: &str) -> Result<String, OpenDataError> {
        let response = self.get_with_retry(url, "application/xml", None).await?;
        response
            .text()
            .await
            .map_err(|e| OpenDataError::Network(e.to_string()))
    }

    /// Follow a paginated listing's `rel=next` links until exhausted,
    /// concatenating every page's `dados` items in page order.
    pub async fn get_paginated<T: DeserializeOwned>(
        &self,
        start_url: &str,
    ) -> Result<Vec<T>, OpenDataError> {
        let mut items = Vec::new();
        let mut url = start_url.to_string();

        loop {
            let page: Listing<T> = self.get_json(&url).await?;
            items.extend(page.dados);

            match next_page_link(&page.links) {
                Some(next) => url = next.to_string(),
                None => break,
            }
        }

        Ok(items)
    }

    /// Download a (possibly large) resource to `dest`, streaming chunks to
    /// disk. A partially written file is removed on failure.
    pub async fn download_to_file(&self, url: &str, dest: &Path) -> Result<(), OpenDataError> {
        let timeout = Duration::from_secs(DOWNLOAD_TIMEOUT_SECS);
        let result = self.stream_to_file(url, dest, timeout).await;

        if result.is_err() && dest.exists() {
            let _ = std::fs::remove_file(dest);
        }
        result
    }

    async fn stream_to_file(
        &self,
        url: &str,
        dest: &Path,
        timeout: Duration,
    ) -> Result<(), OpenDataError> {
        let mut response = self
            .get_with_retry(url, "application/octet-stream", Some(timeout))
            .await?;

        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| OpenDataError::Network(e.to_string()))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }

    /// Perform a GET with retry on transient failures.
    ///
    /// Backoff doubles per attempt: 500ms, 1s, 2s, 4s (capped at 8s).
    /// A non-transient error status fails immediately.
    async fn get_with_retry(
        &self,
        url: &str,
        accept: &str,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, OpenDataError> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let mut request = self
                .http
                .get(url)
                .header(reqwest::header::ACCEPT, accept);
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();

                    if response.status().is_success() {
                        return Ok(response);
                    }

                    if is_transient_status(status) && attempt < self.max_attempts {
                        tracing::warn!(
                            url = %url,
                            status,
                            attempt,
                            backoff_ms = backoff.as_millis() as u64,
                            "Transient API status, will retry after backoff"
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(Duration::from_millis(MAX_BACKOFF_MS));
                        continue;
                    }

                    return Err(OpenDataError::Status(status, url.to_string()));
                }
                Err(err) => {
                    let retryable = err.is_connect() || err.is_timeout();

                    if retryable && attempt < self.max_attempts {
                        tracing::warn!(
                            url = %url,
                            attempt,
                            error = %err,
                            backoff_ms = backoff.as_millis() as u64,
                            "Connection failure, will retry after backoff"
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(Duration::from_millis(MAX_BACKOFF_MS));
                        continue;
                    }

                    return Err(OpenDataError::Network(err.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        assert!(OpenDataClient::new().is_ok());
    }

    #[test]
    fn transient_statuses_are_classified() {
        for status in [429, 500, 502, 503, 504] {
            assert!(is_transient_status(status), "{} should be transient", status);
        }
        for status in [200, 301, 400, 401, 403, 404, 501] {
            assert!(!is_transient_status(status), "{} should not be transient", status);
        }
    }

    #[test]
    fn next_link_is_found_among_navigation_links() {
        let links = vec![
            PageLink { rel: "self".into(), href: "https://example.org/p1".into() },
            PageLink { rel: "next".into(), href: "https://example.org/p2".into() },
            PageLink { rel: "last".into(), href: "https://example.org/p9".into() },
        ];
        assert_eq!(next_page_link(&links), Some("https://example.org/p2"));
    }

    #[test]
    fn missing_next_link_ends_pagination() {
        let links = vec![
            PageLink { rel: "self".into(), href: "https://example.org/p9".into() },
            PageLink { rel: "first".into(), href: "https://example.org/p1".into() },
        ];
        assert_eq!(next_page_link(&links), None);
    }

    #[test]
    fn listing_deserializes_with_and_without_links() {
        let with_links: Listing<i64> = serde_json::from_str(
            r#"{"dados": [1, 2], "links": [{"rel": "next", "href": "x"}]}"#,
        )
        .unwrap();
        assert_eq!(with_links.dados, vec![1, 2]);
        assert_eq!(next_page_link(&with_links.links), Some("x"));

        let without_links: Listing<i64> = serde_json::from_str(r#"{"dados": []}"#).unwrap();
        assert!(without_links.dados.is_empty());
        assert!(without_links.links.is_empty());
    }
}

//! Retrieval of raw page bytes with an optional in-memory cache.

use crate::config::CacheMode;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use url::Url;

const USER_AGENT: &str = "fitcrawl/0.1 (+https://github.com/fitcrawl/fitcrawl)";

/// Source classification assigned at fetch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceKind {
    /// Markup parsed into a structured block tree.
    Html,
    /// PDF bytes handed to text extraction.
    Pdf,
    /// Anything the normalizer cannot handle.
    Other,
}

/// Fetched bytes plus retrieval metadata awaiting normalization.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Canonical URL of the fetched document.
    pub url: Url,
    /// Source classification.
    pub kind: SourceKind,
    /// HTTP response status code.
    pub status: u16,
    /// Timestamp when the fetch completed.
    pub fetched_at: SystemTime,
    /// Content-Type header (if provided).
    pub content_type: Option<String>,
    /// Raw response body bytes.
    pub body: Vec<u8>,
    /// True when the document was served from the cache.
    pub from_cache: bool,
}

/// Errors surfaced while fetching a locator.
#[derive(Debug)]
pub enum FetchError {
    /// The locator scheme is not http(s).
    UnsupportedScheme {
        /// Scheme the caller supplied.
        scheme: String,
    },
    /// The fetch exceeded the per-attempt timeout.
    Timeout(reqwest::Error),
    /// Transport-level failure (DNS, connect, TLS, body read).
    Http(reqwest::Error),
    /// The server answered with a non-success status.
    Status {
        /// Locator that produced the response.
        url: String,
        /// HTTP status code.
        status: u16,
    },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedScheme { scheme } => {
                write!(f, "unsupported locator scheme: {scheme}")
            }
            Self::Timeout(err) => write!(f, "fetch timed out: {err}"),
            Self::Http(err) => write!(f, "http error: {err}"),
            Self::Status { url, status } => write!(f, "{url} answered with status {status}"),
        }
    }
}

impl Error for FetchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Timeout(err) | Self::Http(err) => Some(err),
            Self::UnsupportedScheme { .. } | Self::Status { .. } => None,
        }
    }
}

/// Raw response handed back by a transport.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Content-Type header value, if any.
    pub content_type: Option<String>,
    /// Response body bytes.
    pub body: Vec<u8>,
}

/// Network seam so the pipeline can be exercised without live fetches.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issues a GET for the locator and collects the full body.
    async fn get(&self, url: &Url) -> Result<TransportResponse, FetchError>;
}

/// Reqwest-backed transport used outside of tests.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds a transport with the shared client settings.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(FetchError::Http)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<TransportResponse, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(map_reqwest)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let body = response.bytes().await.map_err(map_reqwest)?.to_vec();
        Ok(TransportResponse {
            status,
            content_type,
            body,
        })
    }
}

fn map_reqwest(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(err)
    } else {
        FetchError::Http(err)
    }
}

/// In-memory page cache keyed by locator.
///
/// Reads run concurrently; writes take the exclusive lock and the last writer
/// for a locator wins.
#[derive(Default)]
struct PageCache {
    entries: RwLock<HashMap<String, RawDocument>>,
}

impl PageCache {
    async fn get(&self, url: &Url) -> Option<RawDocument> {
        let entries = self.entries.read().await;
        entries.get(url.as_str()).map(|doc| {
            let mut hit = doc.clone();
            hit.from_cache = true;
            hit
        })
    }

    async fn put(&self, doc: &RawDocument) {
        let mut entries = self.entries.write().await;
        entries.insert(doc.url.as_str().to_string(), doc.clone());
    }
}

/// Fetch stage: retrieves raw content for a locator, honoring the cache mode.
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    cache: PageCache,
}

impl Fetcher {
    /// Builds a fetcher over an arbitrary transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            cache: PageCache::default(),
        }
    }

    /// Builds a fetcher over the reqwest transport.
    pub fn over_http(timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self::new(Arc::new(HttpTransport::new(timeout)?)))
    }

    /// Retrieves the raw document for `url`.
    ///
    /// `Enabled` reads the cache first and writes after a miss. `Bypass`
    /// never reads but refreshes the entry after a successful fetch.
    /// `Disabled` neither reads nor writes. The cache is only written once a
    /// fetch has fully completed, so a cancelled crawl leaves no entry.
    pub async fn fetch(&self, url: &Url, mode: CacheMode) -> Result<RawDocument, FetchError> {
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(FetchError::UnsupportedScheme {
                    scheme: other.to_string(),
                })
            }
        }

        if mode == CacheMode::Enabled {
            if let Some(hit) = self.cache.get(url).await {
                return Ok(hit);
            }
        }

        let response = self.transport.get(url).await?;
        if !(200..300).contains(&response.status) {
            return Err(FetchError::Status {
                url: url.as_str().to_string(),
                status: response.status,
            });
        }

        let kind = classify(url, response.content_type.as_deref(), &response.body);
        let doc = RawDocument {
            url: url.clone(),
            kind,
            status: response.status,
            fetched_at: SystemTime::now(),
            content_type: response.content_type,
            body: response.body,
            from_cache: false,
        };

        match mode {
            CacheMode::Enabled | CacheMode::Bypass => self.cache.put(&doc).await,
            CacheMode::Disabled => {}
        }

        Ok(doc)
    }
}

/// Classifies fetched bytes, trusting magic bytes over server headers since
/// PDFs are routinely mislabeled as `text/html`.
fn classify(url: &Url, content_type: Option<&str>, body: &[u8]) -> SourceKind {
    if body.starts_with(b"%PDF-") {
        return SourceKind::Pdf;
    }

    match content_type {
        Some(raw) => {
            let ct = raw.to_ascii_lowercase();
            if ct.contains("pdf") {
                SourceKind::Pdf
            } else if ct.contains("html") || ct.contains("xhtml") || ct.starts_with("text/") {
                SourceKind::Html
            } else {
                SourceKind::Other
            }
        }
        None => {
            if url.path().to_ascii_lowercase().ends_with(".pdf") {
                SourceKind::Pdf
            } else {
                SourceKind::Html
            }
        }
    }
}

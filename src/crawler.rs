//! Crawl orchestration: fetch, normalize, prune, and render one locator.

use crate::config::CrawlConfig;
use crate::fetcher::{FetchError, Fetcher, RawDocument, SourceKind, Transport};
use crate::filter::{ContentFilter, FilterError};
use crate::markdown::{self, RenderError};
use crate::normalizer::{DocumentTree, Normalizer, ParseError};
use crc32fast::Hasher as Crc32;
use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use url::Url;

/// Pipeline stage that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    /// Retrieval of raw bytes.
    Fetch,
    /// Parsing into a block tree.
    Normalize,
    /// Pruning content filter.
    Filter,
    /// Markdown rendering.
    Render,
}

impl Stage {
    /// Stage name for diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Normalize => "normalize",
            Self::Filter => "filter",
            Self::Render => "render",
        }
    }
}

/// First failing stage's error, tagged with the stage name.
#[derive(Debug)]
pub enum CrawlError {
    /// Fetch stage failure.
    Fetch(FetchError),
    /// Normalization failure.
    Normalize(ParseError),
    /// Filter parameter failure.
    Filter(FilterError),
    /// Rendering failure.
    Render(RenderError),
}

impl CrawlError {
    /// Identifies the originating stage.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Fetch(_) => Stage::Fetch,
            Self::Normalize(_) => Stage::Normalize,
            Self::Filter(_) => Stage::Filter,
            Self::Render(_) => Stage::Render,
        }
    }
}

impl fmt::Display for CrawlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cause: &dyn fmt::Display = match self {
            Self::Fetch(err) => err,
            Self::Normalize(err) => err,
            Self::Filter(err) => err,
            Self::Render(err) => err,
        };
        write!(f, "{} stage failed: {cause}", self.stage().as_str())
    }
}

impl Error for CrawlError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Fetch(err) => Some(err),
            Self::Normalize(err) => Some(err),
            Self::Filter(err) => Some(err),
            Self::Render(err) => Some(err),
        }
    }
}

/// Metadata captured for a completed crawl.
#[derive(Debug, Clone, Serialize)]
pub struct PageMetadata {
    /// Canonical URL.
    pub url: Url,
    /// HTTP status code.
    pub status: u16,
    /// Source classification.
    pub kind: SourceKind,
    /// Content-Type header (if provided).
    pub content_type: Option<String>,
    /// Body length in bytes.
    pub content_length: usize,
    /// CRC32 checksum of the raw body.
    pub checksum: u32,
    /// Epoch milliseconds when the fetch completed.
    pub fetched_at_epoch_ms: u64,
    /// True when the document was served from the cache.
    pub from_cache: bool,
    /// True when the body required lossy decoding.
    pub lossy_decoding: bool,
}

impl PageMetadata {
    fn from_document(doc: &RawDocument, lossy_decoding: bool) -> Self {
        let mut hasher = Crc32::new();
        hasher.update(&doc.body);
        let checksum = hasher.finalize();

        let fetched_at_epoch_ms = doc
            .fetched_at
            .duration_since(UNIX_EPOCH)
            .map(|dur| dur.as_millis() as u64)
            .unwrap_or(0);

        Self {
            url: doc.url.clone(),
            status: doc.status,
            kind: doc.kind,
            content_type: doc.content_type.clone(),
            content_length: doc.body.len(),
            checksum,
            fetched_at_epoch_ms,
            from_cache: doc.from_cache,
            lossy_decoding,
        }
    }
}

/// Result bundle for one crawl; owned by the caller once returned.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlResult {
    /// Markdown rendering of the unfiltered tree.
    pub raw_markdown: String,
    /// Markdown rendering of the pruned tree.
    pub fit_markdown: String,
    /// Retrieval metadata.
    pub metadata: PageMetadata,
}

/// Drives the fetch → normalize → filter → render pipeline for one locator.
///
/// Crawls of different locators are independent; the only shared state is the
/// fetch cache. Dropping the future returned by [`Crawler::crawl`] cancels
/// the run, aborting any in-flight request without leaving a cache entry or
/// a partial result behind.
pub struct Crawler {
    fetcher: Fetcher,
    normalizer: Normalizer,
}

impl Crawler {
    /// Builds a crawler over the HTTP transport with the given per-fetch
    /// timeout.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            fetcher: Fetcher::over_http(timeout)?,
            normalizer: Normalizer::new(),
        })
    }

    /// Builds a crawler over an injected transport.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            fetcher: Fetcher::new(transport),
            normalizer: Normalizer::new(),
        }
    }

    /// Runs one crawl. Fails fast: the first failing stage's error is
    /// returned tagged with its stage, and no partial result is produced.
    pub async fn crawl(&self, url: &Url, config: &CrawlConfig) -> Result<CrawlResult, CrawlError> {
        // Parameter validation happens before any network traffic.
        let filter = ContentFilter::new(
            config.filter_params(),
            config.excluded_tags(),
            config.remove_overlay_elements(),
        )
        .map_err(CrawlError::Filter)?;

        let doc = self
            .fetcher
            .fetch(url, config.cache_mode())
            .await
            .map_err(CrawlError::Fetch)?;

        let tree = self.normalizer.normalize(&doc).map_err(CrawlError::Normalize)?;
        let pruned = filter.prune(&tree);

        let raw_markdown =
            markdown::render(&tree, config.generator_options()).map_err(CrawlError::Render)?;
        let fit_markdown =
            markdown::render(&pruned, config.generator_options()).map_err(CrawlError::Render)?;

        Ok(CrawlResult {
            raw_markdown,
            fit_markdown,
            metadata: PageMetadata::from_document(&doc, tree.lossy_decoding),
        })
    }

    /// Renders the two markdown variants for an already-normalized tree.
    /// Exposed for callers that source trees outside the fetch stage.
    pub fn render_pair(
        &self,
        tree: &DocumentTree,
        config: &CrawlConfig,
    ) -> Result<(String, String), CrawlError> {
        let filter = ContentFilter::new(
            config.filter_params(),
            config.excluded_tags(),
            config.remove_overlay_elements(),
        )
        .map_err(CrawlError::Filter)?;
        let pruned = filter.prune(tree);
        let raw =
            markdown::render(tree, config.generator_options()).map_err(CrawlError::Render)?;
        let fit =
            markdown::render(&pruned, config.generator_options()).map_err(CrawlError::Render)?;
        Ok((raw, fit))
    }
}

#![warn(missing_docs)]
//! Core library entry points for the fitcrawl pipeline.

pub mod config;
pub mod crawler;
pub mod fetcher;
pub mod filter;
pub mod markdown;
pub mod normalizer;
pub mod runtime;

pub use config::{CacheMode, Cli, CrawlConfig, FilterParams, GeneratorOptions, ThresholdType};
pub use crawler::{CrawlError, CrawlResult, Crawler, PageMetadata, Stage};
pub use fetcher::{
    FetchError, Fetcher, HttpTransport, RawDocument, SourceKind, Transport, TransportResponse,
};
pub use filter::{ContentFilter, FilterError};
pub use markdown::{render, RenderError};
pub use normalizer::{
    Block, BlockKind, DocumentTree, Normalizer, ParseError, Span, DEFAULT_MAX_BLOCKS,
};
pub use runtime::run;

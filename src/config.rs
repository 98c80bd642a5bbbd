//! Crawl configuration and command-line controls.

use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::time::Duration;

/// Cache interaction policy for a crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
pub enum CacheMode {
    /// Never read the cache; refresh the entry after a successful fetch.
    Bypass,
    /// Read the cache first and write on a miss.
    Enabled,
    /// Neither read nor write the cache.
    Disabled,
}

/// How the density cutoff is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
pub enum ThresholdType {
    /// Compare scores against the configured threshold directly.
    Fixed,
    /// Scale the configured threshold by the mean score of the document.
    Dynamic,
}

/// Tuning knobs for the pruning content filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    /// Density cutoff in `[0, 1]`.
    pub threshold: f32,
    /// Fixed or distribution-derived cutoff.
    pub threshold_type: ThresholdType,
    /// Blocks with fewer words are dropped regardless of score.
    pub min_word_threshold: usize,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            threshold: 0.48,
            threshold_type: ThresholdType::Fixed,
            min_word_threshold: 0,
        }
    }
}

/// Options recognized by the markdown renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorOptions {
    /// Omit hyperlink targets, keeping anchor text only.
    pub ignore_links: bool,
}

/// Immutable configuration for a single crawl invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlConfig {
    cache_mode: CacheMode,
    excluded_tags: Vec<String>,
    remove_overlay_elements: bool,
    filter_params: FilterParams,
    generator_options: GeneratorOptions,
}

impl CrawlConfig {
    /// Constructs a new crawl configuration.
    pub fn new(
        cache_mode: CacheMode,
        excluded_tags: Vec<String>,
        remove_overlay_elements: bool,
        filter_params: FilterParams,
        generator_options: GeneratorOptions,
    ) -> Self {
        Self {
            cache_mode,
            excluded_tags,
            remove_overlay_elements,
            filter_params,
            generator_options,
        }
    }

    /// Replaces the cache mode.
    pub fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    /// Replaces the excluded tag list.
    pub fn with_excluded_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Enables or disables overlay removal.
    pub fn with_remove_overlay_elements(mut self, remove: bool) -> Self {
        self.remove_overlay_elements = remove;
        self
    }

    /// Replaces the filter parameters.
    pub fn with_filter_params(mut self, params: FilterParams) -> Self {
        self.filter_params = params;
        self
    }

    /// Replaces the generator options.
    pub fn with_generator_options(mut self, options: GeneratorOptions) -> Self {
        self.generator_options = options;
        self
    }

    /// Cache interaction policy.
    pub fn cache_mode(&self) -> CacheMode {
        self.cache_mode
    }

    /// Tag names dropped outright by the content filter.
    pub fn excluded_tags(&self) -> &[String] {
        &self.excluded_tags
    }

    /// Whether overlay/modal blocks are dropped.
    pub fn remove_overlay_elements(&self) -> bool {
        self.remove_overlay_elements
    }

    /// Pruning filter parameters.
    pub fn filter_params(&self) -> FilterParams {
        self.filter_params
    }

    /// Markdown renderer options.
    pub fn generator_options(&self) -> &GeneratorOptions {
        &self.generator_options
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            cache_mode: CacheMode::Enabled,
            excluded_tags: Vec::new(),
            remove_overlay_elements: false,
            filter_params: FilterParams::default(),
            generator_options: GeneratorOptions::default(),
        }
    }
}

/// Command-line interface shared by binaries that drive crawls.
#[derive(Parser, Debug, Clone)]
#[command(name = "fitcrawl", about = "Fetch a page or PDF and emit raw and fit markdown")]
pub struct Cli {
    /// Locators (URLs) to crawl
    #[arg(required = true)]
    pub locators: Vec<String>,

    /// Cache interaction policy
    #[arg(long, env = "FITCRAWL_CACHE_MODE", value_enum, default_value = "enabled")]
    pub cache_mode: CacheMode,

    /// Tags dropped outright, comma separated (e.g. nav,footer,aside)
    #[arg(long, env = "FITCRAWL_EXCLUDED_TAGS", default_value = "")]
    pub excluded_tags: String,

    /// Drop blocks classified as overlays/modals
    #[arg(long, env = "FITCRAWL_REMOVE_OVERLAYS", default_value_t = false)]
    pub remove_overlays: bool,

    /// Density cutoff in [0, 1]
    #[arg(long, env = "FITCRAWL_THRESHOLD", default_value_t = 0.48)]
    pub threshold: f32,

    /// Fixed or dynamic cutoff derivation
    #[arg(long, env = "FITCRAWL_THRESHOLD_TYPE", value_enum, default_value = "fixed")]
    pub threshold_type: ThresholdType,

    /// Minimum words per retained block
    #[arg(long, env = "FITCRAWL_MIN_WORDS", default_value_t = 0)]
    pub min_word_threshold: usize,

    /// Render anchor text without link targets
    #[arg(long, env = "FITCRAWL_IGNORE_LINKS", default_value_t = false)]
    pub ignore_links: bool,

    /// Per-fetch timeout in seconds
    #[arg(long, env = "FITCRAWL_TIMEOUT_SECS", default_value_t = 10)]
    pub timeout_secs: u64,

    /// Characters of raw markdown echoed as a preview (0 disables)
    #[arg(long, env = "FITCRAWL_PREVIEW_CHARS", default_value_t = 500)]
    pub preview_chars: usize,

    /// Print each crawl result as JSON instead of the summary lines
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl Cli {
    /// Converts the parsed CLI into a `CrawlConfig`.
    pub fn build_config(&self) -> CrawlConfig {
        CrawlConfig::new(
            self.cache_mode,
            self.tags_vec(),
            self.remove_overlays,
            FilterParams {
                threshold: self.threshold,
                threshold_type: self.threshold_type,
                min_word_threshold: self.min_word_threshold,
            },
            GeneratorOptions {
                ignore_links: self.ignore_links,
            },
        )
    }

    /// Returns the per-fetch timeout.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn tags_vec(&self) -> Vec<String> {
        self.excluded_tags
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

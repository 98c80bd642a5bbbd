//! Application runner driving one crawl per locator.

use crate::config::Cli;
use crate::crawler::{CrawlResult, Crawler, Stage};
use futures_util::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Builder;
use tokio::task::{spawn_local, LocalSet};
use url::Url;

type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Entry point used by the binary: runs every locator on a current-thread
/// runtime and reports aggregate metrics.
pub fn run(cli: Cli) -> Result<(), DynError> {
    let rt = Builder::new_current_thread().enable_all().build()?;
    let local = LocalSet::new();
    rt.block_on(local.run_until(run_all(cli)))
}

async fn run_all(cli: Cli) -> Result<(), DynError> {
    let crawler = Arc::new(Crawler::new(cli.fetch_timeout())?);
    let config = Arc::new(cli.build_config());
    let metrics = Arc::new(Metrics::default());
    let start = Instant::now();

    let mut tasks = Vec::with_capacity(cli.locators.len());
    for locator in cli.locators.clone() {
        let crawler = Arc::clone(&crawler);
        let config = Arc::clone(&config);
        let metrics = Arc::clone(&metrics);
        let preview_chars = cli.preview_chars;
        let json = cli.json;
        tasks.push(spawn_local(async move {
            let url = match Url::parse(&locator) {
                Ok(url) => url,
                Err(err) => {
                    eprintln!("{locator}: invalid locator: {err}");
                    metrics.record_failure(None);
                    return;
                }
            };
            match crawler.crawl(&url, &config).await {
                Ok(result) => {
                    metrics.record_success(result.metadata.from_cache);
                    report_result(&locator, &result, preview_chars, json);
                }
                Err(err) => {
                    eprintln!("{locator}: {err}");
                    metrics.record_failure(Some(err.stage()));
                }
            }
        }));
    }

    join_all(tasks).await;
    metrics.report(start.elapsed());
    Ok(())
}

fn report_result(locator: &str, result: &CrawlResult, preview_chars: usize, json: bool) {
    if json {
        match serde_json::to_string_pretty(result) {
            Ok(rendered) => println!("{rendered}"),
            Err(err) => eprintln!("{locator}: result serialization failed: {err}"),
        }
        return;
    }

    println!("{locator}");
    println!("  raw markdown length: {}", result.raw_markdown.len());
    println!("  fit markdown length: {}", result.fit_markdown.len());
    if preview_chars > 0 {
        println!(
            "  preview: {}",
            preview_snippet(&result.raw_markdown, preview_chars)
        );
    }
}

/// First `limit` characters with newlines flattened for one-line output.
fn preview_snippet(markdown: &str, limit: usize) -> String {
    markdown
        .chars()
        .take(limit)
        .collect::<String>()
        .replace('\n', " -- ")
}

#[derive(Default)]
struct Metrics {
    crawls_completed: AtomicUsize,
    crawls_failed: AtomicUsize,
    cache_hits: AtomicUsize,
    fetch_failures: AtomicUsize,
    normalize_failures: AtomicUsize,
    filter_failures: AtomicUsize,
    render_failures: AtomicUsize,
}

impl Metrics {
    fn record_success(&self, from_cache: bool) {
        self.crawls_completed.fetch_add(1, Ordering::Relaxed);
        if from_cache {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_failure(&self, stage: Option<Stage>) {
        self.crawls_failed.fetch_add(1, Ordering::Relaxed);
        match stage {
            Some(Stage::Fetch) => {
                self.fetch_failures.fetch_add(1, Ordering::Relaxed);
            }
            Some(Stage::Normalize) => {
                self.normalize_failures.fetch_add(1, Ordering::Relaxed);
            }
            Some(Stage::Filter) => {
                self.filter_failures.fetch_add(1, Ordering::Relaxed);
            }
            Some(Stage::Render) => {
                self.render_failures.fetch_add(1, Ordering::Relaxed);
            }
            None => {}
        }
    }

    fn report(&self, elapsed: Duration) {
        let secs = elapsed.as_secs_f32().max(f32::EPSILON);
        println!("--- crawl metrics ({secs:.2}s) ---");
        println!(
            "crawls completed: {}",
            self.crawls_completed.load(Ordering::Relaxed)
        );
        println!(
            "crawls failed: {}",
            self.crawls_failed.load(Ordering::Relaxed)
        );
        println!("cache hits: {}", self.cache_hits.load(Ordering::Relaxed));
        println!(
            "fetch failures: {}",
            self.fetch_failures.load(Ordering::Relaxed)
        );
        println!(
            "normalize failures: {}",
            self.normalize_failures.load(Ordering::Relaxed)
        );
        println!(
            "filter failures: {}",
            self.filter_failures.load(Ordering::Relaxed)
        );
        println!(
            "render failures: {}",
            self.render_failures.load(Ordering::Relaxed)
        );
    }
}

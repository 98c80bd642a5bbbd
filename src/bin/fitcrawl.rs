//! CLI entry point: crawl each locator and print markdown diagnostics.

use clap::Parser;
use fitcrawl::Cli;

fn main() {
    let cli = Cli::parse();
    if let Err(err) = fitcrawl::run(cli) {
        eprintln!("fitcrawl failed: {err}");
        std::process::exit(1);
    }
}

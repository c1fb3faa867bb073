//! Scrape without storing: print what the extractor sees.
//!
//! Usage: `sietch-debug [saved-page.html]`. Without a file the live page is
//! rendered with the settings from `config.toml`.

use anyhow::{Context, Result};
use sietch_scraper::config::{DEFAULT_CONFIG_PATH, ScraperConfig};
use sietch_scraper::module::sietch::{ChromeRenderer, PageRenderer, parse_status_html};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let html = match std::env::args().nth(1) {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read HTML file: {}", path))?,
        None => {
            let config = ScraperConfig::load(DEFAULT_CONFIG_PATH)?;
            let url = config.scraper.url.clone();
            ChromeRenderer::new(config.scraper)
                .render(&url)
                .await
                .context("Failed to render status page")?
        }
    };

    let report = parse_status_html(&html)?;
    for skip in &report.skipped_sections {
        println!("skipped section: {:?}", skip);
    }

    let snapshots = report.into_snapshots().context("Scraping failed")?;
    println!("{}", serde_json::to_string_pretty(&snapshots)?);

    Ok(())
}

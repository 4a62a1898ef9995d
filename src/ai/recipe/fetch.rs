//! Fetching recipe pages and flattening them to text the model can read.
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use htmd::HtmlToMarkdown;
use regex::Regex;

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n(\s*\n)+").expect("Invalid blank lines regex"));

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Returns the readable text of the page at `url`.
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// Downloads a page over HTTP and converts the HTML to markdown.
#[derive(Clone, Debug)]
pub struct HttpPageFetcher {
    timeout: Duration,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// Converts page HTML to markdown, dropping markup that has no text
/// worth reading and collapsing runs of blank lines.
pub fn html_to_text(html: &str) -> Result<String> {
    let converter = HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "footer", "img", "svg", "nav", "iframe"])
        .build();
    let markdown = converter
        .convert(html)
        .map_err(|e| anyhow!("Failed to convert HTML to markdown: {}", e))?;
    Ok(BLANK_LINES.replace_all(markdown.trim(), "\n\n").to_string())
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        tracing::debug!("Fetching page {}", url);
        let resp = reqwest::Client::new()
            .get(url)
            .header("User-Agent", concat!("recipebot/", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;
        let html = resp.text().await?;
        let text = html_to_text(&html)?;
        tracing::debug!("Fetched {} ({} bytes of text)", url, text.len());
        Ok(text)
    }
}

//! Page fetching and best-effort article content extraction.
//!
//! Two thin services over HTTP: [`Fetcher::fetch_page`] retrieves and parses
//! one URL into a navigable document for the crawler, and
//! [`Fetcher::extract_article`] pulls a title and plain-text body out of an
//! article page for the processing stage.
//!
//! Extraction is heuristic: a cascade of common content selectors, falling
//! back to every `<p>` on the page.

use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::utils::BoxError;

const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    ".article-content",
    ".story-body",
    "#content",
];

/// Title and plain-text body pulled from an article page.
#[derive(Debug)]
pub struct Extracted {
    pub title: String,
    pub body: String,
}

/// Source of navigable documents for the crawler.
pub trait PageSource {
    async fn page(&self, url: &str) -> Result<Html, BoxError>;
}

/// Source of extracted article content for the processing stage.
pub trait ArticleSource {
    async fn article(&self, url: &str) -> Result<Extracted, BoxError>;
}

/// HTTP client shared by the crawler and the extraction stage.
pub struct Fetcher {
    http: reqwest::Client,
}

impl Fetcher {
    pub fn new() -> Result<Self, BoxError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("digest_curator/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }

    /// Retrieve one URL and parse it into a navigable document.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch_page(&self, url: &str) -> Result<Html, BoxError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("page fetch failed with status {status}").into());
        }

        if let Some(content_type) = response.headers().get(reqwest::header::CONTENT_TYPE) {
            let value = content_type.to_str().unwrap_or_default();
            if !value.contains("html") && !value.contains("text") {
                return Err(format!("non-HTML content type: {value}").into());
            }
        }

        let html = response.text().await?;
        debug!(bytes = html.len(), "Fetched page");
        Ok(Html::parse_document(&html))
    }

    /// Best-effort title and plain-text body for an article URL.
    #[instrument(level = "info", skip(self))]
    pub async fn extract_article(&self, url: &str) -> Result<Extracted, BoxError> {
        let document = self.fetch_page(url).await?;

        let title_selector = Selector::parse("title").unwrap();
        let h1_selector = Selector::parse("h1").unwrap();
        let title = document
            .select(&h1_selector)
            .next()
            .or_else(|| document.select(&title_selector).next())
            .map(|el| el.text().collect::<Vec<_>>().join(" ").trim().to_string())
            .unwrap_or_default();

        for selector_str in CONTENT_SELECTORS {
            let selector = Selector::parse(selector_str).unwrap();
            if let Some(element) = document.select(&selector).next() {
                let body = joined_text(element);
                if !body.trim().is_empty() {
                    debug!(selector = selector_str, bytes = body.len(), "Extracted article body");
                    return Ok(Extracted { title, body });
                }
            }
        }

        // Fallback: concatenate every paragraph on the page.
        let p_selector = Selector::parse("p").unwrap();
        let mut body = String::new();
        for element in document.select(&p_selector) {
            let text = element.text().collect::<Vec<_>>().join(" ");
            let text = text.trim();
            if !text.is_empty() {
                body.push_str(text);
                body.push('\n');
            }
        }

        if body.trim().is_empty() {
            warn!(%url, "Extraction produced no content");
        }
        Ok(Extracted { title, body })
    }
}

impl PageSource for Fetcher {
    async fn page(&self, url: &str) -> Result<Html, BoxError> {
        self.fetch_page(url).await
    }
}

impl ArticleSource for Fetcher {
    async fn article(&self, url: &str) -> Result<Extracted, BoxError> {
        self.extract_article(url).await
    }
}

fn joined_text(element: scraper::ElementRef<'_>) -> String {
    let mut out = String::new();
    for chunk in element.text() {
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            out.push_str(chunk);
            out.push(' ');
        }
    }
    out
}

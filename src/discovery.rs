//! Breadth-first link discovery over a seed news site.
//!
//! The crawler walks category pages breadth-first, harvests anchors,
//! filters out assets and boilerplate navigation, and asks the oracle to
//! classify each unseen link as an article or a category page. Article
//! links become [`Candidate`]s; category links are queued one level deeper,
//! capped per source page. A failed page fetch abandons that subtree and
//! the crawl moves on.
//!
//! All crawl state (seen-set and queue) lives in an explicit
//! [`CrawlContext`] value owned by the discovery call, so parallel runs
//! never share hidden state.

use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::{CrawlConfig, OracleConfig};
use crate::fetch::PageSource;
use crate::models::{Candidate, LinkKind};
use crate::oracle::{ChatMessage, Oracle};
use crate::utils::BoxError;

/// File extensions that can never be article pages.
const ASSET_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".ico", ".css", ".js",
    ".pdf", ".zip", ".mp3", ".mp4", ".xml", ".rss", ".json",
];

/// Boilerplate anchor phrases that mark navigation chrome, not stories.
static BOILERPLATE_ANCHOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(contact us|privacy policy|terms of (use|service)|about us|sign (in|up)|log in|subscribe|newsletter|cookie policy|sitemap|careers|advertise|all rights reserved|skip to content)\b",
    )
    .unwrap()
});

/// Owned crawl state: the global seen-set plus the breadth-first queue.
#[derive(Debug)]
pub struct CrawlContext {
    seen: HashSet<String>,
    queue: VecDeque<(String, usize)>,
}

impl CrawlContext {
    /// Seed the crawl at depth 1.
    ///
    /// The seed goes in canonicalized, so a link back to it discovered
    /// mid-crawl hits the seen-set instead of re-entering the queue.
    pub fn new(seed_url: &str) -> Self {
        let seed = Url::parse(seed_url)
            .ok()
            .and_then(|base| canonicalize(&base, seed_url))
            .unwrap_or_else(|| seed_url.to_string());
        let mut seen = HashSet::new();
        seen.insert(seed.clone());
        let mut queue = VecDeque::new();
        queue.push_back((seed, 1));
        Self { seen, queue }
    }

    /// Mark a canonical URL seen; returns false when it already was.
    pub fn mark_seen(&mut self, url: &str) -> bool {
        self.seen.insert(url.to_string())
    }

    pub fn enqueue(&mut self, url: String, depth: usize) {
        self.queue.push_back((url, depth));
    }

    pub fn next_page(&mut self) -> Option<(String, usize)> {
        self.queue.pop_front()
    }
}

/// Resolve `href` against `base` and reduce it to scheme + host + path.
///
/// Query string and fragment are stripped; non-http(s) schemes are
/// rejected. Canonicalizing an already-canonical URL is a no-op.
pub fn canonicalize(base: &Url, href: &str) -> Option<String> {
    let mut resolved = base.join(href).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    resolved.host_str()?;
    resolved.set_query(None);
    resolved.set_fragment(None);
    Some(resolved.to_string())
}

/// True when the URL path ends in a non-HTML asset extension.
pub fn is_asset_url(url: &str) -> bool {
    let path = url.split('?').next().unwrap_or(url).to_lowercase();
    ASSET_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// True when anchor text is navigation boilerplate rather than a headline.
pub fn is_boilerplate_anchor(text: &str) -> bool {
    BOILERPLATE_ANCHOR.is_match(text)
}

/// Collect `(canonical_url, anchor_text)` pairs from every `<a href>`.
pub fn harvest_links(document: &Html, base: &Url) -> Vec<(String, String)> {
    let anchor_selector = Selector::parse("a[href]").unwrap();
    let mut links = Vec::new();
    for element in document.select(&anchor_selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(canonical) = canonicalize(base, href) else {
            continue;
        };
        let text = element
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        links.push((canonical, text));
    }
    links
}

/// Ask the oracle whether a link points at an article or a category page.
async fn classify_link<O: Oracle>(
    oracle: &O,
    oracle_cfg: &OracleConfig,
    url: &str,
    anchor: &str,
) -> Result<LinkKind, BoxError> {
    let messages = [
        ChatMessage::system(
            "You triage links found on a news site. Answer with exactly one \
             word: 'article' for a link to an individual news story, or \
             'category' for a link to a section or listing page.",
        ),
        ChatMessage::user(format!("Anchor text: {anchor}\nURL: {url}")),
    ];
    let reply = oracle
        .complete(
            &messages,
            oracle_cfg.temperature,
            Duration::from_secs(oracle_cfg.short_timeout_secs),
        )
        .await?;

    let reply = reply.to_lowercase();
    if reply.contains("category") {
        Ok(LinkKind::Category)
    } else if reply.contains("article") {
        Ok(LinkKind::Article)
    } else {
        Err(format!("unrecognized classification: {reply}").into())
    }
}

/// Breadth-first discovery of article candidates from a seed page.
///
/// Returns one [`Candidate`] per canonical article URL, all with score 0.
#[instrument(level = "info", skip(pages, oracle, crawl, oracle_cfg))]
pub async fn discover<P: PageSource, O: Oracle>(
    pages: &P,
    oracle: &O,
    seed_url: &str,
    crawl: &CrawlConfig,
    oracle_cfg: &OracleConfig,
) -> Result<Vec<Candidate>, BoxError> {
    let mut ctx = CrawlContext::new(seed_url);
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut pages_visited = 0usize;

    while let Some((page_url, depth)) = ctx.next_page() {
        let document = match pages.page(&page_url).await {
            Ok(doc) => doc,
            Err(e) => {
                // Non-fatal: the subtree is abandoned, not retried.
                warn!(url = %page_url, depth, error = %e, "Page fetch failed; abandoning subtree");
                continue;
            }
        };
        pages_visited += 1;

        let base = match Url::parse(&page_url) {
            Ok(u) => u,
            Err(e) => {
                warn!(url = %page_url, error = %e, "Unparseable page URL; skipping");
                continue;
            }
        };

        let mut to_classify = Vec::new();
        for (canonical, anchor) in harvest_links(&document, &base) {
            if is_asset_url(&canonical) {
                continue;
            }
            if anchor.chars().count() < crawl.min_anchor_length {
                continue;
            }
            if is_boilerplate_anchor(&anchor) {
                continue;
            }
            if !ctx.mark_seen(&canonical) {
                continue;
            }
            to_classify.push((canonical, anchor));
        }
        drop(document);

        debug!(url = %page_url, depth, links = to_classify.len(), "Classifying unseen links");

        let classified: Vec<(String, String, Result<LinkKind, BoxError>)> =
            stream::iter(to_classify)
                .map(|(link_url, anchor)| async move {
                    let kind = classify_link(oracle, oracle_cfg, &link_url, &anchor).await;
                    (link_url, anchor, kind)
                })
                .buffer_unordered(crawl.classify_concurrency.max(1))
                .collect()
                .await;

        let mut categories_queued = 0usize;
        for (link_url, anchor, kind) in classified {
            match kind {
                Ok(LinkKind::Article) => {
                    candidates.push(Candidate::article(link_url, anchor));
                }
                Ok(LinkKind::Category) => {
                    if depth < crawl.max_depth
                        && categories_queued < crawl.max_category_pages_per_level
                    {
                        ctx.enqueue(link_url, depth + 1);
                        categories_queued += 1;
                    }
                }
                Err(e) => {
                    warn!(url = %link_url, error = %e, "Link classification failed; skipping link");
                }
            }
        }
    }

    info!(
        pages_visited,
        candidates = candidates.len(),
        "Discovery complete"
    );
    Ok(candidates)
}

//! Sequential article processing with a bounded retry queue.
//!
//! For each top-ranked article: extract its full text, ask the oracle to
//! structure it into titled summary fields, and validate the reply
//! defensively. Any failure records the article and requeues it for the
//! next round, with exponential backoff between rounds; whatever survives
//! `max_retry_rounds` is reported as permanently failed, never silently
//! dropped.
//!
//! Processing is intentionally serial: output indices and per-article
//! logging assume strict completion order.

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

use crate::config::{OracleConfig, ProcessingConfig};
use crate::fetch::ArticleSource;
use crate::models::{FailureRecord, ProcessedArticle, RankedArticle};
use crate::oracle::{ChatMessage, Oracle};
use crate::utils::{BoxError, first_sentence, truncate_for_log};

/// Categories the structuring oracle may assign; anything else becomes
/// [`DEFAULT_CATEGORY`].
pub const ALLOWED_CATEGORIES: &[&str] = &[
    "World", "Politics", "Business", "Technology", "Science", "Health",
    "Sports", "Culture", "Other",
];
pub const DEFAULT_CATEGORY: &str = "Other";

/// Locate the first balanced `{...}` block in a raw oracle reply.
///
/// Oracles may wrap the JSON payload in prose on either side. The scan is
/// string-aware, so braces inside JSON strings don't unbalance it.
pub fn extract_json_block(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Structured fields requested from the oracle, pre-validation.
#[derive(Debug, Deserialize)]
struct StructuredReply {
    #[serde(default)]
    title: String,
    #[serde(default, rename = "conciseSummary")]
    concise_summary: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    category: String,
    #[serde(default, rename = "detailedSummary")]
    detailed_summary: String,
}

/// Validated structuring result.
#[derive(Debug)]
pub struct Structured {
    pub title: String,
    pub concise_summary: String,
    pub keywords: Vec<String>,
    pub category: String,
    pub detailed_summary: String,
}

/// Parse and validate a raw structuring reply.
///
/// Rules: `title` and `detailedSummary` must be non-empty; an empty
/// `conciseSummary` falls back to the first sentence of the detailed one;
/// an unlisted `category` is replaced with [`DEFAULT_CATEGORY`].
pub fn parse_structured(raw: &str) -> Result<Structured, BoxError> {
    let block = extract_json_block(raw)
        .ok_or_else(|| format!("no JSON object in reply: {}", truncate_for_log(raw, 200)))?;
    let reply: StructuredReply = serde_json::from_str(block)?;

    if reply.title.trim().is_empty() {
        return Err("structuring reply has an empty title".into());
    }
    if reply.detailed_summary.trim().is_empty() {
        return Err("structuring reply has an empty detailedSummary".into());
    }

    let concise_summary = if reply.concise_summary.trim().is_empty() {
        first_sentence(&reply.detailed_summary)
    } else {
        reply.concise_summary.trim().to_string()
    };

    let category = if ALLOWED_CATEGORIES.contains(&reply.category.as_str()) {
        reply.category
    } else {
        DEFAULT_CATEGORY.to_string()
    };

    Ok(Structured {
        title: reply.title.trim().to_string(),
        concise_summary,
        keywords: reply.keywords,
        category,
        detailed_summary: reply.detailed_summary.trim().to_string(),
    })
}

/// Bounded retry queue over ranked articles.
///
/// `take_round` hands out one snapshot per round until the queue empties
/// or the round budget is spent; failed articles go back in via
/// [`RetryQueue::requeue`].
#[derive(Debug)]
pub struct RetryQueue {
    pending: Vec<RankedArticle>,
    next_round: usize,
    max_rounds: usize,
}

impl RetryQueue {
    pub fn new(articles: Vec<RankedArticle>, max_rounds: usize) -> Self {
        Self {
            pending: articles,
            next_round: 0,
            max_rounds,
        }
    }

    /// Queue empty or round budget exhausted.
    pub fn is_terminated(&self) -> bool {
        self.pending.is_empty() || self.next_round >= self.max_rounds
    }

    /// Take the next round's snapshot, emptying the pending list.
    pub fn take_round(&mut self) -> Option<(usize, Vec<RankedArticle>)> {
        if self.is_terminated() {
            return None;
        }
        let round = self.next_round;
        self.next_round += 1;
        Some((round, std::mem::take(&mut self.pending)))
    }

    pub fn requeue(&mut self, article: RankedArticle) {
        self.pending.push(article);
    }

    /// Whatever is still pending once the loop stops.
    pub fn into_pending(self) -> Vec<RankedArticle> {
        self.pending
    }
}

/// Extract and structure one article.
async fn process_one<A: ArticleSource, O: Oracle>(
    articles: &A,
    oracle: &O,
    oracle_cfg: &OracleConfig,
    cfg: &ProcessingConfig,
    article: &RankedArticle,
) -> Result<Structured, BoxError> {
    let extracted = articles.article(&article.url).await?;
    if extracted.body.len() < cfg.min_content_length {
        return Err(format!(
            "content too short: {} bytes (minimum {})",
            extracted.body.len(),
            cfg.min_content_length
        )
        .into());
    }

    let messages = [
        ChatMessage::system(format!(
            "You structure news articles. Reply with a JSON object with \
             string fields \"title\", \"conciseSummary\", \"category\" (one \
             of {}), \"detailedSummary\", and an array field \"keywords\".",
            ALLOWED_CATEGORIES.join(", ")
        )),
        ChatMessage::user(format!(
            "Title: {}\n\n{}",
            extracted.title, extracted.body
        )),
    ];
    let reply = oracle
        .complete(
            &messages,
            oracle_cfg.temperature,
            Duration::from_secs(oracle_cfg.long_timeout_secs),
        )
        .await?;
    parse_structured(&reply)
}

/// Process the top-ranked articles through the bounded retry loop.
///
/// Returns the successfully processed articles (with stable 1-based
/// output indices in completion order) and the permanently failed ones.
#[instrument(level = "info", skip_all, fields(articles = ranked.len()))]
pub async fn process<A: ArticleSource, O: Oracle>(
    articles: &A,
    oracle: &O,
    oracle_cfg: &OracleConfig,
    cfg: &ProcessingConfig,
    ranked: Vec<RankedArticle>,
) -> (Vec<ProcessedArticle>, Vec<FailureRecord>) {
    let mut queue = RetryQueue::new(ranked, cfg.max_retry_rounds);
    let mut processed: Vec<ProcessedArticle> = Vec::new();
    let mut last_errors: HashMap<String, String> = HashMap::new();

    while let Some((round, snapshot)) = queue.take_round() {
        if round >= 1 {
            // Exponent capped so a generous round budget cannot overflow
            // the shift.
            let exponent = (round - 1).min(31) as u32;
            let delay = Duration::from_secs(cfg.retry_base_delay_secs)
                .saturating_mul(1u32 << exponent);
            info!(round, ?delay, remaining = snapshot.len(), "Backing off before retry round");
            sleep(delay).await;
        }

        for article in snapshot {
            match process_one(articles, oracle, oracle_cfg, cfg, &article).await {
                Ok(structured) => {
                    info!(rank = article.rank, url = %article.url, "Processed article");
                    last_errors.remove(&article.url);
                    processed.push(ProcessedArticle {
                        index: processed.len() + 1,
                        rank: article.rank,
                        url: article.url,
                        new_title: structured.title,
                        concise_summary: structured.concise_summary,
                        keywords: structured.keywords,
                        category: structured.category,
                        detailed_summary: structured.detailed_summary,
                        original_title: article.title,
                    });
                }
                Err(e) => {
                    warn!(round, rank = article.rank, url = %article.url, error = %e, "Article processing failed; requeueing");
                    last_errors.insert(article.url.clone(), e.to_string());
                    queue.requeue(article);
                }
            }
        }
    }

    let failures: Vec<FailureRecord> = queue
        .into_pending()
        .into_iter()
        .map(|article| {
            let message = last_errors
                .remove(&article.url)
                .unwrap_or_else(|| "unknown error".to_string());
            FailureRecord {
                url: article.url,
                title: article.title,
                message,
            }
        })
        .collect();

    info!(
        processed = processed.len(),
        failed = failures.len(),
        "Article processing complete"
    );
    (processed, failures)
}

/// Ask the oracle for a short editor's introduction over the processed
/// summaries. Failures are the caller's to tolerate; the digest works
/// without one.
pub async fn editor_introduction<O: Oracle>(
    oracle: &O,
    oracle_cfg: &OracleConfig,
    articles: &[ProcessedArticle],
) -> Result<String, BoxError> {
    let rundown = articles
        .iter()
        .map(|a| format!("{}. {}", a.rank, a.concise_summary))
        .collect::<Vec<_>>()
        .join("\n");
    let messages = [
        ChatMessage::system(
            "You are the editor of a daily news digest. Write a two to \
             three sentence introduction for today's edition. Reply with \
             only the introduction.",
        ),
        ChatMessage::user(rundown),
    ];
    let reply = oracle
        .complete(
            &messages,
            oracle_cfg.temperature,
            Duration::from_secs(oracle_cfg.long_timeout_secs),
        )
        .await?;
    let reply = reply.trim();
    if reply.is_empty() {
        return Err("empty introduction".into());
    }
    Ok(reply.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::Extracted;
    use crate::oracle::test_support::ScriptedOracle;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[test]
    fn test_extract_json_block_plain() {
        assert_eq!(extract_json_block(r#"{"a": 1}"#), Some(r#"{"a": 1}"#));
    }

    #[test]
    fn test_extract_json_block_prose_wrapped() {
        let raw = r#"Sure, here is the JSON: {"a": {"b": 2}} Hope that helps!"#;
        assert_eq!(extract_json_block(raw), Some(r#"{"a": {"b": 2}}"#));
    }

    #[test]
    fn test_extract_json_block_brace_inside_string() {
        let raw = r#"{"a": "closing } brace", "b": 1}"#;
        assert_eq!(extract_json_block(raw), Some(raw));
    }

    #[test]
    fn test_extract_json_block_missing() {
        assert_eq!(extract_json_block("no json here"), None);
        assert_eq!(extract_json_block("{unterminated"), None);
    }

    fn valid_reply() -> String {
        r#"{
            "title": "New Title",
            "conciseSummary": "Short.",
            "keywords": ["a", "b"],
            "category": "World",
            "detailedSummary": "First sentence. Second sentence."
        }"#
        .to_string()
    }

    #[test]
    fn test_parse_structured_valid() {
        let s = parse_structured(&valid_reply()).unwrap();
        assert_eq!(s.title, "New Title");
        assert_eq!(s.category, "World");
        assert_eq!(s.keywords, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_structured_empty_title_rejected() {
        let raw = r#"{"title": " ", "detailedSummary": "x.", "keywords": []}"#;
        assert!(parse_structured(raw).is_err());
    }

    #[test]
    fn test_parse_structured_empty_detail_rejected() {
        let raw = r#"{"title": "T", "detailedSummary": "", "keywords": []}"#;
        assert!(parse_structured(raw).is_err());
    }

    #[test]
    fn test_parse_structured_keywords_must_be_array() {
        let raw = r#"{"title": "T", "detailedSummary": "x.", "keywords": "not-a-list"}"#;
        assert!(parse_structured(raw).is_err());
    }

    #[test]
    fn test_parse_structured_concise_fallback_first_sentence() {
        let raw = r#"{
            "title": "T",
            "conciseSummary": "",
            "keywords": [],
            "category": "World",
            "detailedSummary": "The first sentence. Second sentence."
        }"#;
        let s = parse_structured(raw).unwrap();
        assert_eq!(s.concise_summary, "The first sentence.");
    }

    #[test]
    fn test_parse_structured_unknown_category_defaults() {
        let raw = r#"{
            "title": "T",
            "conciseSummary": "S.",
            "keywords": [],
            "category": "Gossip",
            "detailedSummary": "D."
        }"#;
        let s = parse_structured(raw).unwrap();
        assert_eq!(s.category, DEFAULT_CATEGORY);
    }

    fn ranked(n: usize) -> Vec<RankedArticle> {
        (0..n)
            .map(|i| RankedArticle {
                url: format!("https://e.com/{i}"),
                title: format!("Headline {i}"),
                tournament_score: 10 - i as u32,
                rank: i + 1,
            })
            .collect()
    }

    #[test]
    fn test_retry_queue_termination() {
        let mut queue = RetryQueue::new(ranked(2), 2);
        assert!(!queue.is_terminated());

        let (round, snapshot) = queue.take_round().unwrap();
        assert_eq!(round, 0);
        assert_eq!(snapshot.len(), 2);
        // Nothing requeued: terminated by emptiness.
        assert!(queue.is_terminated());

        let mut queue = RetryQueue::new(ranked(1), 1);
        let (_, snapshot) = queue.take_round().unwrap();
        for a in snapshot {
            queue.requeue(a);
        }
        // Rounds exhausted with work still pending.
        assert!(queue.is_terminated());
        assert_eq!(queue.into_pending().len(), 1);
    }

    /// Article source replaying scripted extraction results per call.
    struct ScriptedArticles {
        results: Mutex<VecDeque<Result<Extracted, String>>>,
    }

    impl ScriptedArticles {
        fn new(results: Vec<Result<Extracted, String>>) -> Self {
            Self {
                results: Mutex::new(results.into_iter().collect()),
            }
        }
    }

    impl ArticleSource for ScriptedArticles {
        async fn article(&self, _url: &str) -> Result<Extracted, BoxError> {
            match self.results.lock().unwrap().pop_front() {
                Some(Ok(e)) => Ok(e),
                Some(Err(m)) => Err(m.into()),
                None => Err("unreachable".into()),
            }
        }
    }

    fn long_body() -> Extracted {
        Extracted {
            title: "Original".to_string(),
            body: "word ".repeat(200),
        }
    }

    fn tight_config() -> ProcessingConfig {
        ProcessingConfig {
            max_retry_rounds: 3,
            retry_base_delay_secs: 0,
            min_content_length: 100,
        }
    }

    #[tokio::test]
    async fn test_process_success_path() {
        let articles = ScriptedArticles::new(vec![Ok(long_body())]);
        let oracle = ScriptedOracle::new(vec![Ok(format!("Here you go: {}", valid_reply()))]);

        let (processed, failures) = process(
            &articles,
            &oracle,
            &OracleConfig::default(),
            &tight_config(),
            ranked(1),
        )
        .await;

        assert_eq!(failures.len(), 0);
        assert_eq!(processed.len(), 1);
        assert_eq!(processed[0].index, 1);
        assert_eq!(processed[0].new_title, "New Title");
        assert_eq!(processed[0].original_title, "Headline 0");
    }

    #[tokio::test]
    async fn test_process_content_too_short_then_recovers() {
        let articles = ScriptedArticles::new(vec![
            Ok(Extracted {
                title: "Original".to_string(),
                body: "tiny".to_string(),
            }),
            Ok(long_body()),
        ]);
        let oracle = ScriptedOracle::new(vec![Ok(valid_reply())]);

        let (processed, failures) = process(
            &articles,
            &oracle,
            &OracleConfig::default(),
            &tight_config(),
            ranked(1),
        )
        .await;

        assert_eq!(failures.len(), 0);
        assert_eq!(processed.len(), 1);
    }

    #[tokio::test]
    async fn test_process_retry_exhaustion_reported() {
        let articles = ScriptedArticles::new(vec![
            Err("dns failure".to_string()),
            Err("dns failure".to_string()),
            Err("dns failure".to_string()),
        ]);
        let oracle = ScriptedOracle::always_failing();

        let (processed, failures) = process(
            &articles,
            &oracle,
            &OracleConfig::default(),
            &tight_config(),
            ranked(1),
        )
        .await;

        assert!(processed.is_empty());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].url, "https://e.com/0");
        assert_eq!(failures[0].message, "dns failure");
    }

    #[tokio::test]
    async fn test_process_indices_follow_completion_order() {
        // Article 0 fails round 0 and recovers in round 1, so article 1
        // completes first and takes index 1.
        let articles = ScriptedArticles::new(vec![
            Err("flaky".to_string()), // article 0, round 0
            Ok(long_body()),          // article 1, round 0
            Ok(long_body()),          // article 0, round 1
        ]);
        let oracle = ScriptedOracle::new(vec![Ok(valid_reply()), Ok(valid_reply())]);

        let (processed, failures) = process(
            &articles,
            &oracle,
            &OracleConfig::default(),
            &tight_config(),
            ranked(2),
        )
        .await;

        assert!(failures.is_empty());
        assert_eq!(processed.len(), 2);
        assert_eq!(processed[0].index, 1);
        assert_eq!(processed[0].url, "https://e.com/1");
        assert_eq!(processed[1].index, 2);
        assert_eq!(processed[1].url, "https://e.com/0");
    }

    #[tokio::test]
    async fn test_process_survives_large_round_budget() {
        // Every round fails; 40 rounds would overflow an uncapped
        // backoff shift.
        let articles = ScriptedArticles::new(vec![]);
        let oracle = ScriptedOracle::always_failing();
        let cfg = ProcessingConfig {
            max_retry_rounds: 40,
            retry_base_delay_secs: 0,
            min_content_length: 100,
        };

        let (processed, failures) = process(
            &articles,
            &oracle,
            &OracleConfig::default(),
            &cfg,
            ranked(1),
        )
        .await;

        assert!(processed.is_empty());
        assert_eq!(failures.len(), 1);
    }

    fn processed_article(rank: usize, concise: &str) -> ProcessedArticle {
        ProcessedArticle {
            index: rank,
            rank,
            url: format!("https://e.com/{rank}"),
            new_title: format!("Title {rank}"),
            original_title: format!("Headline {rank}"),
            concise_summary: concise.to_string(),
            detailed_summary: "Details.".to_string(),
            keywords: Vec::new(),
            category: "World".to_string(),
        }
    }

    #[tokio::test]
    async fn test_editor_introduction_sees_ranked_rundown() {
        let oracle = ScriptedOracle::new(vec![Ok("  A busy day in tech.  ".to_string())]);
        let articles = vec![
            processed_article(1, "Chips are faster."),
            processed_article(2, "Markets wobble."),
        ];

        let intro = editor_introduction(&oracle, &OracleConfig::default(), &articles)
            .await
            .unwrap();
        assert_eq!(intro, "A busy day in tech.");

        let calls = oracle.calls.lock().unwrap();
        assert!(calls[0].contains("1. Chips are faster."));
        assert!(calls[0].contains("2. Markets wobble."));
    }

    #[tokio::test]
    async fn test_editor_introduction_rejects_blank_reply() {
        let oracle = ScriptedOracle::new(vec![Ok("   ".to_string())]);
        let result =
            editor_introduction(&oracle, &OracleConfig::default(), &[processed_article(1, "x")])
                .await;
        assert!(result.is_err());
    }
}

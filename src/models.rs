//! Data models for the curation pipeline.
//!
//! Everything here is created and consumed within a single run:
//! - [`Candidate`]: a raw discovered link classified as an article
//! - [`Contender`]: a candidate that survived the qualification cut,
//!   carrying transient keywords during deduplication
//! - [`RankedArticle`]: a cluster representative with its final tournament
//!   score and dense rank
//! - [`ProcessedArticle`]: the fully structured article, ready for output
//! - [`FailureRecord`]: bookkeeping for articles that exhausted processing
//!   retries
//! - [`Digest`]: the serialization surface for one run's output

use serde::{Deserialize, Serialize};

/// How the classification oracle labeled a discovered link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// A link that leads to an individual article.
    Article,
    /// A link that leads to a listing/section page worth crawling deeper.
    Category,
}

/// A discovered article link with its accumulated qualification score.
///
/// One candidate exists per canonical URL (scheme + host + path, query and
/// fragment stripped); the crawl's seen-set enforces this. `score` starts at
/// zero and is only ever increased by the qualification tournament.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Canonical article URL.
    pub url: String,
    /// Anchor text the link was discovered under.
    pub title: String,
    /// Classification assigned during discovery.
    pub kind: LinkKind,
    /// Points accumulated across qualification rounds.
    pub score: u32,
}

impl Candidate {
    pub fn article(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            kind: LinkKind::Article,
            score: 0,
        }
    }
}

/// A candidate that survived qualification.
///
/// `keywords` is populated at the start of deduplication and stripped once
/// a cluster representative has been chosen; it never travels further
/// downstream.
#[derive(Debug, Clone)]
pub struct Contender {
    pub url: String,
    pub title: String,
    /// Score carried over from qualification.
    pub score: u32,
    /// 1-3 short lowercase terms; empty when extraction failed.
    pub keywords: Vec<String>,
}

impl Contender {
    pub fn from_candidate(candidate: Candidate) -> Self {
        Self {
            url: candidate.url,
            title: candidate.title,
            score: candidate.score,
            keywords: Vec::new(),
        }
    }

    /// True when this contender shares at least one keyword with `other`.
    pub fn shares_keyword(&self, other: &Contender) -> bool {
        self.keywords.iter().any(|k| other.keywords.contains(k))
    }
}

/// A cluster representative with its final-tournament standing.
#[derive(Debug, Clone)]
pub struct RankedArticle {
    pub url: String,
    pub title: String,
    /// Points accumulated across final-tournament rounds.
    pub tournament_score: u32,
    /// Dense 1..N rank by `tournament_score` descending.
    pub rank: usize,
}

/// A fully processed article as returned by the structuring oracle.
///
/// Field names are camelCase to match the JSON schema the oracle is asked
/// to produce, hence the serde renames.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessedArticle {
    /// Stable 1-based output index, assigned in completion order.
    pub index: usize,
    pub rank: usize,
    pub url: String,
    /// Headline rewritten by the oracle.
    #[serde(rename = "newTitle")]
    pub new_title: String,
    #[serde(rename = "conciseSummary")]
    pub concise_summary: String,
    pub keywords: Vec<String>,
    pub category: String,
    #[serde(rename = "detailedSummary")]
    pub detailed_summary: String,
    /// Anchor text the article was discovered under.
    #[serde(rename = "originalTitle")]
    pub original_title: String,
}

/// An article that failed a processing round; kept for the final report.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub url: String,
    pub title: String,
    /// Last error message observed for this article.
    pub message: String,
}

/// One run's complete output: the digest serialized to JSON and rendered
/// to Markdown by the reporter.
#[derive(Debug, Serialize)]
pub struct Digest {
    /// Run date in `YYYY-MM-DD` format.
    pub date: String,
    /// Short editor's introduction; absent when the oracle call failed.
    pub introduction: Option<String>,
    pub articles: Vec<ProcessedArticle>,
    /// Articles that exhausted the retry budget.
    pub failures: Vec<FailureRecord>,
}

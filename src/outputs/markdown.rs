//! Markdown rendering for the digest and the per-article files.

use std::fmt::Write as _;
use tokio::fs;
use tracing::{info, instrument};

use crate::models::{Digest, ProcessedArticle};
use crate::utils::{BoxError, slugify_title};

/// Filename for one processed article: `NN_<slug>.md`.
pub fn article_filename(article: &ProcessedArticle) -> String {
    format!("{:02}_{}.md", article.index, slugify_title(&article.new_title))
}

/// Render one article to its standalone Markdown file.
pub fn article_to_markdown(article: &ProcessedArticle) -> String {
    let mut md = String::new();
    writeln!(md, "# {}", article.new_title).unwrap();
    writeln!(md).unwrap();
    writeln!(md, "- Rank: {}", article.rank).unwrap();
    writeln!(md, "- Category: {}", article.category).unwrap();
    if !article.keywords.is_empty() {
        writeln!(md, "- Keywords: {}", article.keywords.join(", ")).unwrap();
    }
    writeln!(md, "- Source: [{}]({})", article.original_title, article.url).unwrap();
    writeln!(md).unwrap();
    writeln!(md, "> {}", article.concise_summary).unwrap();
    writeln!(md).unwrap();
    writeln!(md, "{}", article.detailed_summary).unwrap();
    md
}

/// Render the consolidated digest.
///
/// Articles appear in rank order with links to their standalone files;
/// permanently failed articles get their own section with the last error
/// message for each.
pub fn digest_to_markdown(digest: &Digest) -> String {
    let mut md = String::new();
    writeln!(md, "# Daily Digest - {}", digest.date).unwrap();
    writeln!(md).unwrap();

    if let Some(ref introduction) = digest.introduction {
        writeln!(md, "{introduction}").unwrap();
        writeln!(md).unwrap();
    }

    for article in &digest.articles {
        writeln!(md, "## {}. {}", article.rank, article.new_title).unwrap();
        writeln!(md).unwrap();
        writeln!(md, "*{}*", article.category).unwrap();
        writeln!(md).unwrap();
        writeln!(md, "{}", article.concise_summary).unwrap();
        writeln!(md).unwrap();
        writeln!(md, "{}", article.detailed_summary).unwrap();
        writeln!(md).unwrap();
        writeln!(
            md,
            "[Full write-up](./{}) · [Original]({})",
            article_filename(article),
            article.url
        )
        .unwrap();
        writeln!(md).unwrap();
    }

    if !digest.failures.is_empty() {
        writeln!(md, "## Articles that could not be processed").unwrap();
        writeln!(md).unwrap();
        for failure in &digest.failures {
            writeln!(
                md,
                "- [{}]({}) - {}",
                failure.title, failure.url, failure.message
            )
            .unwrap();
        }
        writeln!(md).unwrap();
    }

    md
}

/// Write the digest and the per-article files into `run_dir`.
#[instrument(level = "info", skip_all, fields(%run_dir))]
pub async fn write_digest(digest: &Digest, run_dir: &str) -> Result<(), BoxError> {
    fs::create_dir_all(run_dir).await?;

    for article in &digest.articles {
        let path = format!("{}/{}", run_dir, article_filename(article));
        fs::write(&path, article_to_markdown(article)).await?;
        info!(path = %path, "Wrote article file");
    }

    let digest_path = format!("{run_dir}/digest.md");
    fs::write(&digest_path, digest_to_markdown(digest)).await?;
    info!(path = %digest_path, articles = digest.articles.len(), "Wrote digest");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FailureRecord;

    fn article() -> ProcessedArticle {
        ProcessedArticle {
            index: 3,
            rank: 2,
            url: "https://e.com/story".to_string(),
            new_title: "Markets Rally On Rate Cut".to_string(),
            concise_summary: "Rates fell.".to_string(),
            keywords: vec!["markets".to_string(), "rates".to_string()],
            category: "Business".to_string(),
            detailed_summary: "A longer account of the rally.".to_string(),
            original_title: "markets up".to_string(),
        }
    }

    #[test]
    fn test_article_filename_zero_padded_slug() {
        assert_eq!(article_filename(&article()), "03_markets-rally-on-rate-cut.md");
    }

    #[test]
    fn test_article_markdown_contains_fields() {
        let md = article_to_markdown(&article());
        assert!(md.starts_with("# Markets Rally On Rate Cut"));
        assert!(md.contains("- Category: Business"));
        assert!(md.contains("markets, rates"));
        assert!(md.contains("> Rates fell."));
    }

    #[test]
    fn test_digest_markdown_lists_failures() {
        let digest = Digest {
            date: "2026-08-30".to_string(),
            introduction: None,
            articles: vec![article()],
            failures: vec![FailureRecord {
                url: "https://e.com/broken".to_string(),
                title: "Broken story".to_string(),
                message: "content too short: 12 bytes (minimum 500)".to_string(),
            }],
        };
        let md = digest_to_markdown(&digest);
        assert!(md.contains("# Daily Digest - 2026-08-30"));
        assert!(md.contains("## 2. Markets Rally On Rate Cut"));
        assert!(md.contains("could not be processed"));
        assert!(md.contains("content too short"));
    }

    #[test]
    fn test_digest_markdown_no_failure_section_when_clean() {
        let digest = Digest {
            date: "2026-08-30".to_string(),
            introduction: None,
            articles: vec![],
            failures: vec![],
        };
        assert!(!digest_to_markdown(&digest).contains("could not be processed"));
    }
}

//! Keyword-overlap deduplication of topically similar contenders.
//!
//! Three steps: extract 1-3 keywords per contender (bounded oracle
//! fan-out), group contenders by shared keywords with a greedy
//! seed-expansion pass, then keep only the highest-scoring member of each
//! group.
//!
//! The clustering is a single pass, not a fixed-point closure: every
//! non-seed member shares a keyword with its cluster's seed, but two
//! non-seed members need not share one with each other. That approximation
//! is intentional and must not be tightened, since a full closure would
//! change clustering outcomes.

use futures::stream::{self, StreamExt};
use std::cmp::Reverse;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::OracleConfig;
use crate::models::Contender;
use crate::oracle::{ChatMessage, Oracle};
use crate::utils::BoxError;

/// Ask the oracle for 1-3 lowercase topic keywords for one headline.
async fn extract_keywords<O: Oracle>(
    oracle: &O,
    oracle_cfg: &OracleConfig,
    title: &str,
) -> Result<Vec<String>, BoxError> {
    let messages = [
        ChatMessage::system(
            "Extract 1 to 3 short lowercase topic keywords from a news \
             headline. Reply with only the keywords, comma-separated.",
        ),
        ChatMessage::user(title.to_string()),
    ];
    let reply = oracle
        .complete(
            &messages,
            oracle_cfg.temperature,
            Duration::from_secs(oracle_cfg.short_timeout_secs),
        )
        .await?;

    let keywords: Vec<String> = reply
        .split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .take(3)
        .collect();
    if keywords.is_empty() {
        return Err(format!("no keywords in reply: {reply:?}").into());
    }
    Ok(keywords)
}

/// Greedy seed-expansion clustering over the keyword lists.
///
/// Pops the first element as a seed and moves every remaining contender
/// sharing at least one keyword with that seed into its cluster (scanning
/// in reverse so in-place removal is safe). A seed without keywords forms
/// a singleton.
pub fn cluster_by_keywords(mut working: Vec<Contender>) -> Vec<Vec<Contender>> {
    let mut clusters = Vec::new();
    while !working.is_empty() {
        let seed = working.remove(0);
        let mut members = vec![seed];
        if !members[0].keywords.is_empty() {
            let mut i = working.len();
            while i > 0 {
                i -= 1;
                if working[i].shares_keyword(&members[0]) {
                    members.push(working.remove(i));
                }
            }
        }
        clusters.push(members);
    }
    clusters
}

/// Pick each cluster's highest-scoring member (ties keep the first
/// encountered) and strip its transient keywords.
fn pick_representative(members: Vec<Contender>) -> Contender {
    let mut best: Option<Contender> = None;
    for member in members {
        match &best {
            Some(current) if member.score <= current.score => {}
            _ => best = Some(member),
        }
    }
    // Clusters are never empty by construction.
    let mut representative = best.expect("cluster with no members");
    representative.keywords.clear();
    representative
}

/// Collapse topically similar contenders to one representative each.
///
/// Returns representatives sorted by score descending. A contender whose
/// keyword extraction failed still proceeds, just unclusterable with
/// others.
#[instrument(level = "info", skip_all, fields(contenders = contenders.len()))]
pub async fn deduplicate<O: Oracle>(
    oracle: &O,
    oracle_cfg: &OracleConfig,
    concurrency: usize,
    mut contenders: Vec<Contender>,
) -> Vec<Contender> {
    let extracted: Vec<(usize, Vec<String>)> =
        stream::iter(contenders.iter().enumerate())
            .map(|(i, contender)| async move {
                match extract_keywords(oracle, oracle_cfg, &contender.title).await {
                    Ok(keywords) => (i, keywords),
                    Err(e) => {
                        warn!(title = %contender.title, error = %e, "Keyword extraction failed");
                        (i, Vec::new())
                    }
                }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

    for (i, keywords) in extracted {
        contenders[i].keywords = keywords;
    }

    let clusters = cluster_by_keywords(contenders);
    debug!(clusters = clusters.len(), "Clustered contenders");

    let mut representatives: Vec<Contender> =
        clusters.into_iter().map(pick_representative).collect();
    representatives.sort_by_key(|c| Reverse(c.score));

    info!(representatives = representatives.len(), "Deduplication complete");
    representatives
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candidate;
    use crate::oracle::test_support::ScriptedOracle;

    fn contender(url: &str, title: &str, score: u32, keywords: &[&str]) -> Contender {
        let mut c = Contender::from_candidate(Candidate::article(url, title));
        c.score = score;
        c.keywords = keywords.iter().map(|k| k.to_string()).collect();
        c
    }

    #[test]
    fn test_cluster_partition_covers_every_contender() {
        let input = vec![
            contender("u1", "t1", 5, &["nato", "summit"]),
            contender("u2", "t2", 3, &["summit"]),
            contender("u3", "t3", 8, &["markets"]),
            contender("u4", "t4", 1, &[]),
        ];
        let clusters = cluster_by_keywords(input);
        let total: usize = clusters.iter().map(|c| c.len()).sum();
        assert_eq!(total, 4);
        assert_eq!(clusters.len(), 3);
    }

    #[test]
    fn test_cluster_zero_overlap_gives_singletons() {
        let input = vec![
            contender("u1", "t1", 5, &["alpha"]),
            contender("u2", "t2", 3, &["beta"]),
        ];
        let clusters = cluster_by_keywords(input);
        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| c.len() == 1));
    }

    #[test]
    fn test_cluster_no_keywords_is_singleton_even_with_twin() {
        // Two keyword-less contenders never cluster with anything,
        // including each other.
        let input = vec![
            contender("u1", "t1", 5, &[]),
            contender("u2", "t2", 3, &[]),
        ];
        let clusters = cluster_by_keywords(input);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_cluster_single_pass_joins_via_seed_only() {
        // b and c share nothing with each other, but both share with the
        // seed a, so all three land in one cluster. Single pass, not a
        // transitive closure.
        let input = vec![
            contender("a", "seed", 1, &["war", "economy"]),
            contender("b", "left", 2, &["war"]),
            contender("c", "right", 3, &["economy"]),
        ];
        let clusters = cluster_by_keywords(input);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 3);
    }

    #[test]
    fn test_cluster_chain_beyond_seed_does_not_merge() {
        // d shares only with b (not with the seed), so it starts its own
        // cluster in a later pass.
        let input = vec![
            contender("a", "seed", 1, &["war"]),
            contender("b", "mid", 2, &["war", "trade"]),
            contender("d", "far", 3, &["trade"]),
        ];
        let clusters = cluster_by_keywords(input);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].len(), 2);
        assert_eq!(clusters[1][0].url, "d");
    }

    #[tokio::test]
    async fn test_deduplicate_keeps_highest_score_and_strips_keywords() {
        let oracle = ScriptedOracle::new(vec![
            Ok("nato, summit".to_string()),
            Ok("summit".to_string()),
            Ok("markets".to_string()),
        ]);
        let input = vec![
            contender("u1", "Summit opens", 5, &[]),
            contender("u2", "Summit closes", 9, &[]),
            contender("u3", "Markets rally", 2, &[]),
        ];

        let out = deduplicate(&oracle, &OracleConfig::default(), 1, input).await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].url, "u2");
        assert_eq!(out[0].score, 9);
        assert_eq!(out[1].url, "u3");
        assert!(out.iter().all(|c| c.keywords.is_empty()));
    }

    #[tokio::test]
    async fn test_deduplicate_extraction_failure_still_proceeds() {
        let oracle = ScriptedOracle::new(vec![
            Err("timeout".to_string()),
            Ok("markets".to_string()),
        ]);
        let input = vec![
            contender("u1", "Summit opens", 5, &[]),
            contender("u2", "Markets rally", 2, &[]),
        ];

        let out = deduplicate(&oracle, &OracleConfig::default(), 1, input).await;
        assert_eq!(out.len(), 2);
    }
}

//! Multi-round scored tournaments over article headlines.
//!
//! Both ranking passes share the same Swiss-system machinery: each round
//! partitions the field into fixed-size groups, asks the oracle to order
//! each group by importance, and awards points from a points table. Later
//! rounds group by running score, so similarly-ranked items face each
//! other.
//!
//! The two passes differ deliberately:
//! - [`qualify`] shuffles round 1 (seedable) and cuts the field to a
//!   bounded contender list;
//! - [`rank`] orders every round, including the first, by the running
//!   score (so round 1 inherits the upstream ordering), skips singleton
//!   groups, and assigns dense 1..N ranks at the end.
//!
//! Group evaluations within a round fan out up to the configured
//! concurrency cap; their awards are merged only after the whole round
//! completes, so round r+1's grouping always reads round r's final scores.

use futures::stream::{self, StreamExt};
use itertools::Itertools;
use rand::Rng;
use rand::seq::SliceRandom;
use std::cmp::Reverse;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::{OracleConfig, TournamentConfig};
use crate::models::{Candidate, Contender, RankedArticle};
use crate::oracle::{ChatMessage, Oracle};
use crate::utils::BoxError;

const QUALIFY_TASK: &str =
    "selecting the stories most worth a reader's attention in today's digest";
const RANK_TASK: &str =
    "ordering the day's most important stories for the front page";

/// Parse an oracle ranking reply into 0-based group positions.
///
/// The reply must be a comma-separated permutation of `1..=group_len`,
/// most important first. Token edges are trimmed of prose characters, but
/// a wrong count, duplicate, or out-of-range position rejects the whole
/// reply.
pub fn parse_ranking(response: &str, group_len: usize) -> Result<Vec<usize>, BoxError> {
    let mut positions = Vec::with_capacity(group_len);
    let mut seen = vec![false; group_len];

    for token in response.split(',') {
        let token = token.trim_matches(|c: char| !c.is_ascii_digit());
        if token.is_empty() {
            return Err(format!("empty position token in ranking reply: {response:?}").into());
        }
        let value: usize = token
            .parse()
            .map_err(|_| format!("non-numeric position {token:?} in ranking reply"))?;
        if value < 1 || value > group_len {
            return Err(format!("position {value} out of range for group of {group_len}").into());
        }
        if seen[value - 1] {
            return Err(format!("duplicate position {value} in ranking reply").into());
        }
        seen[value - 1] = true;
        positions.push(value - 1);
    }

    if positions.len() != group_len {
        return Err(format!(
            "ranking reply listed {} positions for a group of {group_len}",
            positions.len()
        )
        .into());
    }
    Ok(positions)
}

/// Ask the oracle to order one group of titles by importance.
async fn evaluate_group<O: Oracle>(
    oracle: &O,
    oracle_cfg: &OracleConfig,
    task: &str,
    titles: &[&str],
) -> Result<Vec<usize>, BoxError> {
    let listing = titles
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{}. {}", i + 1, t))
        .join("\n");
    let messages = [
        ChatMessage::system(format!(
            "You judge the relative importance of news headlines. The task \
             is {task}. Reply with only the headline numbers ordered from \
             most to least important, comma-separated, e.g. 2,1,3."
        )),
        ChatMessage::user(listing),
    ];
    let reply = oracle
        .complete(
            &messages,
            oracle_cfg.temperature,
            Duration::from_secs(oracle_cfg.short_timeout_secs),
        )
        .await?;
    parse_ranking(&reply, titles.len())
}

/// Run the configured number of Swiss rounds over `titles`, mutating
/// `scores` in place. `order` seeds round 1's grouping; every later round
/// regroups by descending score (stable, so ties keep their prior order).
async fn run_rounds<O: Oracle>(
    oracle: &O,
    oracle_cfg: &OracleConfig,
    cfg: &TournamentConfig,
    task: &str,
    titles: &[String],
    scores: &mut [u32],
    mut order: Vec<usize>,
    skip_singletons: bool,
) {
    for round in 1..=cfg.rounds {
        if round > 1 {
            order.sort_by_key(|&i| Reverse(scores[i]));
        }

        let groups: Vec<Vec<usize>> = order
            .chunks(cfg.group_size.max(1))
            .map(|c| c.to_vec())
            .collect();
        let mut groups_evaluated = 0usize;
        let mut fan_out = Vec::new();
        for group in groups {
            if skip_singletons && group.len() == 1 {
                // No judgment needed for a group of one; it still counts
                // as evaluated.
                groups_evaluated += 1;
                continue;
            }
            fan_out.push(group);
        }

        // Round barrier: every group's awards are collected before any
        // score changes, so grouping never reads a half-finished round.
        let awards: Vec<Option<Vec<(usize, u32)>>> = stream::iter(fan_out)
            .map(|group| async move {
                let group_titles: Vec<&str> =
                    group.iter().map(|&i| titles[i].as_str()).collect();
                match evaluate_group(oracle, oracle_cfg, task, &group_titles).await {
                    Ok(positions) => {
                        let awarded = positions
                            .iter()
                            .enumerate()
                            .map(|(rank_pos, &member)| {
                                let points =
                                    cfg.points_table.get(rank_pos).copied().unwrap_or(0);
                                (group[member], points)
                            })
                            .collect();
                        Some(awarded)
                    }
                    Err(e) => {
                        warn!(round, error = %e, "Group evaluation failed; no points awarded");
                        None
                    }
                }
            })
            .buffer_unordered(cfg.concurrency.max(1))
            .collect()
            .await;

        for group_awards in awards.into_iter().flatten() {
            groups_evaluated += 1;
            for (item, points) in group_awards {
                scores[item] += points;
            }
        }

        debug!(round, groups_evaluated, "Tournament round complete");
    }
}

/// Qualification pass: cut the full candidate field down to the top `keep`.
///
/// Round 1 plays in shuffled order; later rounds pair by running score.
#[instrument(level = "info", skip_all, fields(candidates = candidates.len(), keep))]
pub async fn qualify<O: Oracle, R: Rng>(
    oracle: &O,
    oracle_cfg: &OracleConfig,
    cfg: &TournamentConfig,
    mut candidates: Vec<Candidate>,
    keep: usize,
    rng: &mut R,
) -> Vec<Candidate> {
    let titles: Vec<String> = candidates.iter().map(|c| c.title.clone()).collect();
    let mut scores: Vec<u32> = candidates.iter().map(|c| c.score).collect();

    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.shuffle(rng);

    run_rounds(
        oracle, oracle_cfg, cfg, QUALIFY_TASK, &titles, &mut scores, order, false,
    )
    .await;

    for (candidate, score) in candidates.iter_mut().zip(&scores) {
        candidate.score = *score;
    }
    candidates.sort_by_key(|c| Reverse(c.score));
    candidates.truncate(keep);
    info!(contenders = candidates.len(), "Qualification complete");
    candidates
}

/// Final pass: produce a total order with dense ranks over the
/// deduplicated contenders.
#[instrument(level = "info", skip_all, fields(contenders = contenders.len()))]
pub async fn rank<O: Oracle>(
    oracle: &O,
    oracle_cfg: &OracleConfig,
    cfg: &TournamentConfig,
    contenders: Vec<Contender>,
) -> Vec<RankedArticle> {
    let titles: Vec<String> = contenders.iter().map(|c| c.title.clone()).collect();
    let mut scores: Vec<u32> = vec![0; contenders.len()];

    // No shuffle here: with all scores at zero the stable sort inside
    // run_rounds leaves round 1 in upstream order.
    let order: Vec<usize> = (0..contenders.len()).collect();

    run_rounds(
        oracle, oracle_cfg, cfg, RANK_TASK, &titles, &mut scores, order, true,
    )
    .await;

    let mut standings: Vec<(Contender, u32)> =
        contenders.into_iter().zip(scores).collect();
    standings.sort_by_key(|(_, score)| Reverse(*score));

    let ranked: Vec<RankedArticle> = standings
        .into_iter()
        .enumerate()
        .map(|(i, (contender, tournament_score))| RankedArticle {
            url: contender.url,
            title: contender.title,
            tournament_score,
            rank: i + 1,
        })
        .collect();
    info!(ranked = ranked.len(), "Final tournament complete");
    ranked
}

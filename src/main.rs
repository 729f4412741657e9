//! # Digest Curator
//!
//! Curates a ranked, deduplicated daily digest of news articles from a
//! seed site by combining automated web discovery with LLM-based
//! relative-importance judging.
//!
//! ## Pipeline
//!
//! 1. **Discovery**: breadth-first crawl of the seed site, classifying
//!    links as articles or category pages
//! 2. **Qualification**: multi-round scored tournament over all
//!    candidates, cutting the field to a bounded contender list
//! 3. **Deduplication**: keyword-overlap clustering, one representative
//!    per topic
//! 4. **Final tournament**: smaller-group rounds producing a total order
//!    with explicit ranks
//! 5. **Processing**: sequential extraction and structuring of the top
//!    ranked articles, with a bounded retry queue
//! 6. **Reporting**: one Markdown file per article plus a consolidated
//!    digest, written to a run-dated directory
//!
//! ## Usage
//!
//! ```sh
//! digest_curator -o ./digests -c ./config.yaml
//! ```

use chrono::Local;
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod dedup;
mod discovery;
mod fetch;
mod models;
mod oracle;
mod outputs;
mod process;
mod tournament;
mod utils;

use cli::Cli;
use fetch::Fetcher;
use models::{Contender, Digest};
use oracle::{ChatOracle, RetryOracle};
use utils::{BoxError, ensure_writable_dir};

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("digest_curator starting up");

    let args = Cli::parse();
    debug!(?args.output_dir, ?args.config, "Parsed CLI arguments");

    let mut config = config::load_config(&args.config).await?;
    if let Some(seed_url) = args.seed_url {
        config.seed_url = seed_url;
    }

    // Early check: ensure the output dir is writable before burning oracle
    // calls.
    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let fetcher = Fetcher::new()?;
    let oracle = RetryOracle::new(
        ChatOracle::new(&config.oracle, args.api_key.clone()),
        config.oracle.max_retries,
        Duration::from_secs(1),
    );

    // ---- Discovery ----
    let candidates = discovery::discover(
        &fetcher,
        &oracle,
        &config.seed_url,
        &config.crawl,
        &config.oracle,
    )
    .await?;
    info!(count = candidates.len(), "Discovered article candidates");

    // ---- Qualification tournament ----
    let mut rng = match config.shuffle_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let contenders = tournament::qualify(
        &oracle,
        &config.oracle,
        &config.qualification,
        candidates,
        config.contenders_to_rank,
        &mut rng,
    )
    .await;
    info!(count = contenders.len(), "Candidates surviving qualification");

    // ---- Deduplication ----
    let contenders: Vec<Contender> = contenders
        .into_iter()
        .map(Contender::from_candidate)
        .collect();
    let representatives = dedup::deduplicate(
        &oracle,
        &config.oracle,
        config.keyword_concurrency,
        contenders,
    )
    .await;
    info!(count = representatives.len(), "Topic representatives after deduplication");

    // ---- Final tournament ----
    let mut ranked = tournament::rank(
        &oracle,
        &config.oracle,
        &config.final_tournament,
        representatives,
    )
    .await;
    ranked.truncate(config.articles_to_process);
    info!(count = ranked.len(), "Articles selected for processing");

    // ---- Article processing ----
    let (articles, failures) = process::process(
        &fetcher,
        &oracle,
        &config.oracle,
        &config.processing,
        ranked,
    )
    .await;
    if !failures.is_empty() {
        for failure in &failures {
            error!(url = %failure.url, message = %failure.message, "Article permanently failed");
        }
    }

    // ---- Reporting ----
    let introduction = match process::editor_introduction(&oracle, &config.oracle, &articles).await
    {
        Ok(intro) => Some(intro),
        Err(e) => {
            warn!(error = %e, "Editor introduction failed; publishing the digest without one");
            None
        }
    };
    let digest = Digest {
        date: Local::now().date_naive().to_string(),
        introduction,
        articles,
        failures,
    };
    let run_dir = outputs::run_dir(&args.output_dir, &digest.date);
    outputs::markdown::write_digest(&digest, &run_dir).await?;
    if let Err(e) = outputs::json::write_digest(&digest, &run_dir).await {
        error!(error = %e, "Failed to write digest JSON");
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        articles = digest.articles.len(),
        failed = digest.failures.len(),
        "Execution complete"
    );

    Ok(())
}

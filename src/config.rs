//! Static pipeline configuration loaded from a YAML file.
//!
//! Every tunable of the run lives here: crawl bounds, both tournaments'
//! shapes, the dedup/processing knobs, and the oracle endpoint. All fields
//! carry serde defaults so a minimal config only needs `seed_url` and the
//! oracle endpoint.

use serde::Deserialize;
use tracing::info;

use crate::utils::BoxError;

/// Top-level configuration for one pipeline run.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Homepage the crawl starts from.
    pub seed_url: String,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default = "default_qualification")]
    pub qualification: TournamentConfig,
    /// How many candidates survive the qualification cut.
    #[serde(default = "default_contenders_to_rank")]
    pub contenders_to_rank: usize,
    /// Concurrency cap for keyword-extraction calls during deduplication.
    #[serde(default = "default_keyword_concurrency")]
    pub keyword_concurrency: usize,
    #[serde(default = "default_final_tournament")]
    pub final_tournament: TournamentConfig,
    /// How many top-ranked articles get fully processed.
    #[serde(default = "default_articles_to_process")]
    pub articles_to_process: usize,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Seed for the qualification round-1 shuffle; `None` seeds from entropy.
    #[serde(default)]
    pub shuffle_seed: Option<u64>,
}

/// Discovery-stage bounds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Maximum breadth-first depth, seed page counting as depth 1.
    pub max_depth: usize,
    /// Category links followed per source page; the rest are discarded.
    pub max_category_pages_per_level: usize,
    /// Concurrency cap for link-classification oracle calls.
    pub classify_concurrency: usize,
    /// Anchors shorter than this many characters are skipped.
    pub min_anchor_length: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_category_pages_per_level: 3,
            classify_concurrency: 8,
            min_anchor_length: 15,
        }
    }
}

/// Shape of one multi-round scored tournament.
#[derive(Debug, Clone, Deserialize)]
pub struct TournamentConfig {
    pub rounds: usize,
    pub group_size: usize,
    /// Points awarded per returned position; positions beyond the table
    /// earn nothing.
    pub points_table: Vec<u32>,
    /// Concurrency cap for group-evaluation oracle calls.
    pub concurrency: usize,
}

/// Article-processing retry-loop knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Retry rounds before an article is reported permanently failed.
    pub max_retry_rounds: usize,
    /// Base for the exponential inter-round backoff, in seconds.
    pub retry_base_delay_secs: u64,
    /// Extracted bodies shorter than this fail with "content too short".
    pub min_content_length: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_retry_rounds: 3,
            retry_base_delay_secs: 5,
            min_content_length: 500,
        }
    }
}

/// Text-oracle endpoint and call policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// OpenAI-compatible API root, e.g. `http://localhost:8080/v1`.
    pub base_url: String,
    pub model: String,
    /// Bearer token; the CLI's `--api-key` / env var takes precedence.
    pub api_key: Option<String>,
    /// Timeout for classification, ranking, and keyword calls, in seconds.
    pub short_timeout_secs: u64,
    /// Timeout for the heavier structuring calls, in seconds.
    pub long_timeout_secs: u64,
    /// Retries per call inside the oracle client.
    pub max_retries: usize,
    pub temperature: f32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/v1".to_string(),
            model: "default".to_string(),
            api_key: None,
            short_timeout_secs: 30,
            long_timeout_secs: 120,
            max_retries: 3,
            temperature: 0.2,
        }
    }
}

fn default_qualification() -> TournamentConfig {
    TournamentConfig {
        rounds: 2,
        group_size: 8,
        points_table: vec![10, 7, 5, 3, 2, 1],
        concurrency: 6,
    }
}

fn default_final_tournament() -> TournamentConfig {
    TournamentConfig {
        rounds: 3,
        group_size: 3,
        points_table: vec![5, 2, 1],
        concurrency: 6,
    }
}

fn default_contenders_to_rank() -> usize {
    24
}

fn default_keyword_concurrency() -> usize {
    8
}

fn default_articles_to_process() -> usize {
    10
}

/// Load and deserialize the pipeline configuration.
pub async fn load_config(path: &str) -> Result<PipelineConfig, BoxError> {
    let raw = tokio::fs::read_to_string(path).await?;
    let config: PipelineConfig = serde_yaml::from_str(&raw)?;
    info!(path, seed_url = %config.seed_url, "Loaded configuration");
    Ok(config)
}

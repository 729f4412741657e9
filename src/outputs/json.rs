//! JSON output for API consumption of a run's digest.

use tokio::fs;
use tracing::{info, instrument};

use crate::models::Digest;
use crate::utils::BoxError;

/// Serialize the digest to `{run_dir}/digest.json`.
#[instrument(level = "info", skip_all, fields(%run_dir))]
pub async fn write_digest(digest: &Digest, run_dir: &str) -> Result<(), BoxError> {
    fs::create_dir_all(run_dir).await?;
    let json = serde_json::to_string_pretty(digest)?;
    let path = format!("{run_dir}/digest.json");
    fs::write(&path, json).await?;
    info!(path = %path, articles = digest.articles.len(), "Wrote digest JSON");
    Ok(())
}

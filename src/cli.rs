//! Command-line interface definitions.

use clap::Parser;

/// Command-line arguments for the digest curator.
///
/// One invocation runs the full pipeline to completion. The run exits 0
/// even when some articles permanently fail processing; only an
/// unrecoverable top-level error is a non-zero exit.
///
/// # Examples
///
/// ```sh
/// digest_curator -o ./digests -c ./config.yaml
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Output directory for digest and article files
    #[arg(short, long)]
    pub output_dir: String,

    /// Path to the pipeline config YAML
    #[arg(short, long, default_value = "config.yaml")]
    pub config: String,

    /// Bearer token for the oracle endpoint (overrides the config file)
    #[arg(long, env = "ORACLE_API_KEY")]
    pub api_key: Option<String>,

    /// Override the configured seed URL
    #[arg(long)]
    pub seed_url: Option<String>,
}

//! Output generation for the run's digest.
//!
//! Everything lands in a run-dated directory:
//!
//! ```text
//! output_dir/
//! └── 2026-08-30/
//!     ├── digest.md          # consolidated digest
//!     ├── digest.json        # same data for API consumption
//!     ├── 01_<slug>.md       # one file per processed article
//!     └── 02_<slug>.md
//! ```

pub mod json;
pub mod markdown;

/// Run-dated directory all files for one digest go into.
pub fn run_dir(output_dir: &str, date: &str) -> String {
    format!("{}/{}", output_dir.trim_end_matches('/'), date)
}

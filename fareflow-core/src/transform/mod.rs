//! Bronze to silver refinement.
//!
//! Pipeline: discover raw partition files → read each file and normalize its
//! column labels → merge into one loosely typed `RawTable` → clean and cast
//! into a `RefinedTable` → write Parquet.

pub mod clean;
pub mod normalize;
pub mod partitions;
pub mod silver;
pub mod table;

pub use clean::{clean, clean_at, CleanStats, RefinedRecord, RefinedTable};
pub use normalize::{normalize, normalize_label};
pub use partitions::{discover_partitions, read_bronze, read_csv, read_jsonl, read_partitions};
pub use silver::{read_silver, read_silver_meta, silver_meta_path, write_silver, SilverMeta};
pub use table::RawTable;

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Structural failures of the refinement. Bad data never raises one of these;
/// it is filtered by the cleaner or reported by the validator.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("no raw partition files found under {}", .0.display())]
    NoInputFiles(PathBuf),

    #[error("failed to read {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("malformed table: {0}")]
    Malformed(String),

    #[error("missing required columns: {0:?}")]
    MissingRequiredColumns(Vec<String>),

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Refine every raw partition under `input` into the silver file at `output`.
pub fn refine(input: &Path, output: &Path) -> Result<SilverMeta, TransformError> {
    refine_at(input, output, Utc::now())
}

/// [`refine`] with an explicit load timestamp.
pub fn refine_at(
    input: &Path,
    output: &Path,
    load_ts: DateTime<Utc>,
) -> Result<SilverMeta, TransformError> {
    let (raw, files) = read_bronze(input)?;
    let refined = clean_at(&normalize(raw), load_ts)?;
    let meta = write_silver(&refined, output, &files)?;
    info!(
        input = %input.display(),
        output = %output.display(),
        rows = meta.rows,
        "refined bronze to silver"
    );
    Ok(meta)
}

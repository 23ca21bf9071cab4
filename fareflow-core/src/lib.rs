//! Fareflow Core: flight-fare ingestion and bronze to silver refinement.
//!
//! This crate contains the batch pipeline:
//! - Quote fetching with bounded retry, backoff and pacing
//! - Raw (bronze) snapshot partitions committed by atomic rename
//! - Partition discovery and reading (CSV and JSON Lines)
//! - Column normalization, cleaning, casting and deduplication
//! - The flight-fare data contract and the validator that enforces it
//! - Silver Parquet output with a metadata sidecar

pub mod config;
pub mod contract;
pub mod ingest;
pub mod parse;
pub mod transform;
pub mod validate;

pub use config::{CollectorConfig, ConfigError};
pub use contract::{Contract, FLIGHT_FARES};
pub use ingest::{FareSource, FetchOutcome, SnapshotSummary};
pub use transform::{RefinedRecord, RefinedTable, SilverMeta, TransformError};
pub use validate::{validate, ValidationReport};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: pipeline values can cross threads, so a scheduler
    /// can run collection and refinement on worker threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<CollectorConfig>();
        require_sync::<CollectorConfig>();
        require_send::<ingest::Quote>();
        require_sync::<ingest::Quote>();
        require_send::<SnapshotSummary>();
        require_sync::<SnapshotSummary>();
        require_send::<ingest::SyntheticFares>();
        require_sync::<ingest::SyntheticFares>();
        require_send::<ingest::QuoteFetcher<ingest::ReqwestTransport>>();
        require_sync::<ingest::QuoteFetcher<ingest::ReqwestTransport>>();
        require_send::<transform::RawTable>();
        require_sync::<transform::RawTable>();
        require_send::<RefinedTable>();
        require_sync::<RefinedTable>();
        require_send::<ValidationReport>();
        require_sync::<ValidationReport>();
    }

    /// The collector takes `&dyn FareSource`; the trait must stay object safe.
    #[test]
    fn fare_source_is_object_safe() {
        fn _check(source: &dyn FareSource) -> FetchOutcome {
            source.fetch("JFK", "LHR")
        }
    }
}

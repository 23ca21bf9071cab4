//! Fare collection: fetching quotes and committing raw partitions.

pub mod pacing;
pub mod provider;
pub mod snapshot;
pub mod synthetic;
pub mod travelpayouts;

pub use pacing::{RecordingSleeper, Sleeper, ThreadSleeper};
pub use provider::{
    FailureCause, FareItem, FareSource, FetchExhausted, FetchOutcome, QuoteBatch, SkipReason,
};
pub use snapshot::{
    collect, collect_at, partition_dir, AcceptWindow, PartitionWriter, Quote, SnapshotError,
    SnapshotSummary, PARTITION_FILE, RAW_HEADER, UTF8_BOM,
};
pub use synthetic::SyntheticFares;
pub use travelpayouts::{
    HttpReply, QuoteFetcher, QuoteRequest, ReqwestTransport, RetryPolicy, Transport,
    TransportError,
};

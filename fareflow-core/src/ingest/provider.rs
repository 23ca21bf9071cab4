//! Fare source trait, fetch outcomes and structured error types.
//!
//! The [`FareSource`] trait abstracts over where quotes come from (the live
//! pricing API, the synthetic generator) so the snapshot writer can be driven
//! by either, and by scripted sources in tests.

use crate::parse;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One price observation as returned by the upstream API, before acceptance
/// filtering. Fields are kept loose because the API is not consistent about
/// types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FareItem {
    #[serde(default)]
    pub depart_date: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub gate: Option<Value>,
    #[serde(default)]
    pub trip_class: Option<Value>,
    #[serde(default)]
    pub number_of_changes: Option<Value>,
}

impl FareItem {
    pub fn price(&self) -> Option<f64> {
        self.value.as_ref().and_then(parse::price_from_json)
    }

    pub fn gate(&self) -> Option<String> {
        self.gate.as_ref().and_then(parse::text_from_json)
    }

    pub fn trip_class(&self) -> Option<i64> {
        self.trip_class.as_ref().and_then(parse::int_from_json)
    }

    pub fn number_of_changes(&self) -> Option<i64> {
        self.number_of_changes.as_ref().and_then(parse::int_from_json)
    }
}

/// Why a pair produced no quotes without being an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The API rejected the request as a client error (invalid route or code).
    Rejected { status: u16 },
    /// The API answered `success: false` with no data.
    Unsuccessful,
    /// Origin and destination are the same code.
    SelfPair,
    /// A location code is blank.
    InvalidPair(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Rejected { status } => write!(f, "rejected by API (HTTP {status})"),
            SkipReason::Unsuccessful => write!(f, "API reported success=false"),
            SkipReason::SelfPair => write!(f, "origin equals destination"),
            SkipReason::InvalidPair(detail) => write!(f, "invalid pair: {detail}"),
        }
    }
}

/// Underlying cause of a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureCause {
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("server returned HTTP {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("rate limited by provider")]
    RateLimited,
}

/// Every attempt for a pair failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("upstream API failed for {origin}->{dest} after {attempts} attempts: {cause}")]
pub struct FetchExhausted {
    pub origin: String,
    pub dest: String,
    pub attempts: u32,
    #[source]
    pub cause: FailureCause,
}

/// Result of fetching one (origin, destination) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Accepted(Vec<FareItem>),
    Skipped(SkipReason),
    Failed(FetchExhausted),
}

/// Flattened view of a non-failed fetch: `accepted` is false for skipped pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteBatch {
    pub accepted: bool,
    pub quotes: Vec<FareItem>,
}

impl FetchOutcome {
    /// Collapse into a batch, surfacing exhaustion as an error.
    pub fn into_batch(self) -> Result<QuoteBatch, FetchExhausted> {
        match self {
            FetchOutcome::Accepted(quotes) => Ok(QuoteBatch {
                accepted: true,
                quotes,
            }),
            FetchOutcome::Skipped(_) => Ok(QuoteBatch::default()),
            FetchOutcome::Failed(err) => Err(err),
        }
    }
}

/// Trait for fare sources (live API, synthetic generator).
pub trait FareSource {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch the latest quotes for one pair.
    fn fetch(&self, origin: &str, dest: &str) -> FetchOutcome;
}

/// Pre-flight check shared by all sources: both codes non-blank and distinct.
pub(crate) fn check_pair(origin: &str, dest: &str) -> Option<SkipReason> {
    if origin.trim().is_empty() || dest.trim().is_empty() {
        return Some(SkipReason::InvalidPair(format!(
            "blank location code in {origin:?}->{dest:?}"
        )));
    }
    if origin.trim().eq_ignore_ascii_case(dest.trim()) {
        return Some(SkipReason::SelfPair);
    }
    None
}

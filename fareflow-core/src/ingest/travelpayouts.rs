//! Latest-prices fare fetcher.
//!
//! Calls the upstream `get_latest_prices` endpoint for one (origin, destination)
//! pair. Handles response classification, bounded retries with proportional
//! backoff, and a fixed pacing delay after every attempt:
//!
//! - HTTP 400 is a benign rejection (unknown route or code): skipped, never retried
//! - HTTP 429 waits `rate_limit_backoff × attempt` before the next attempt
//! - anything else (network, timeout, non-2xx, bad JSON) waits
//!   `failure_backoff × attempt`; once attempts run out the pair fails with
//!   [`FetchExhausted`] carrying the last cause
//!
//! HTTP goes through the [`Transport`] trait so the retry logic can be driven
//! by scripted replies.

use super::pacing::{Sleeper, ThreadSleeper};
use super::provider::{
    check_pair, FailureCause, FareItem, FareSource, FetchExhausted, FetchOutcome, SkipReason,
};
use crate::config::CollectorConfig;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Query parameters for one latest-prices request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub origin: String,
    pub destination: String,
    pub currency: String,
    pub market: String,
    pub period_type: String,
    pub token: String,
}

impl QuoteRequest {
    pub fn query(&self) -> [(&str, &str); 6] {
        [
            ("origin", self.origin.as_str()),
            ("destination", self.destination.as_str()),
            ("currency", self.currency.as_str()),
            ("market", self.market.as_str()),
            ("period_type", self.period_type.as_str()),
            ("token", self.token.as_str()),
        ]
    }
}

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network unreachable: {0}")]
    Network(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl From<TransportError> for FailureCause {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(msg) => FailureCause::Timeout(msg),
            TransportError::Network(msg) | TransportError::Client(msg) => {
                FailureCause::Network(msg)
            }
        }
    }
}

/// Sends one request and returns whatever the server answered.
pub trait Transport {
    fn get(&self, request: &QuoteRequest) -> Result<HttpReply, TransportError>;
}

/// Blocking reqwest transport with a per-request timeout.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    url: String,
}

impl ReqwestTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("fareflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, request: &QuoteRequest) -> Result<HttpReply, TransportError> {
        let resp = self
            .client
            .get(&self.url)
            .query(&request.query())
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(e.to_string())
                } else {
                    TransportError::Network(e.to_string())
                }
            })?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .map_err(|e| TransportError::Network(format!("read body: {e}")))?;
        Ok(HttpReply { status, body })
    }
}

/// Latest-prices response envelope.
#[derive(Debug, Deserialize)]
struct LatestPrices {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    data: Option<Vec<FareItem>>,
}

/// Retry and pacing knobs, taken from [`CollectorConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub rate_limit_backoff: Duration,
    pub failure_backoff: Duration,
    pub pacing: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CollectorConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            rate_limit_backoff: config.rate_limit_backoff(),
            failure_backoff: config.failure_backoff(),
            pacing: config.pacing(),
        }
    }
}

/// What a single attempt produced.
enum Attempt {
    Done(FetchOutcome),
    RateLimited,
    Failed(FailureCause),
}

/// Fare fetcher for the latest-prices endpoint.
pub struct QuoteFetcher<T, S = ThreadSleeper> {
    transport: T,
    sleeper: S,
    policy: RetryPolicy,
    currency: String,
    market: String,
    token: String,
}

impl QuoteFetcher<ReqwestTransport, ThreadSleeper> {
    /// Fetcher over real HTTP, built from the collector config.
    pub fn live(config: &CollectorConfig) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(config.api_url.clone(), config.timeout())?;
        Ok(Self::new(transport, config))
    }
}

impl<T: Transport> QuoteFetcher<T, ThreadSleeper> {
    pub fn new(transport: T, config: &CollectorConfig) -> Self {
        Self {
            transport,
            sleeper: ThreadSleeper,
            policy: RetryPolicy::from_config(config),
            currency: config.currency.clone(),
            market: config.market.clone(),
            token: config.api_key.clone().unwrap_or_default(),
        }
    }
}

impl<T: Transport, S: Sleeper> QuoteFetcher<T, S> {
    /// Swap the sleeper (tests use a recording one).
    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> QuoteFetcher<T, S2> {
        QuoteFetcher {
            transport: self.transport,
            sleeper,
            policy: self.policy,
            currency: self.currency,
            market: self.market,
            token: self.token,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn request(&self, origin: &str, dest: &str) -> QuoteRequest {
        QuoteRequest {
            origin: origin.to_string(),
            destination: dest.to_string(),
            currency: self.currency.clone(),
            market: self.market.clone(),
            period_type: "year".into(),
            token: self.token.clone(),
        }
    }

    /// Run a single attempt and classify the reply.
    fn attempt(&self, request: &QuoteRequest) -> Attempt {
        let reply = match self.transport.get(request) {
            Ok(reply) => reply,
            Err(e) => return Attempt::Failed(e.into()),
        };

        match reply.status {
            400 => Attempt::Done(FetchOutcome::Skipped(SkipReason::Rejected { status: 400 })),
            429 => Attempt::RateLimited,
            s if !(200..300).contains(&s) => Attempt::Failed(FailureCause::Status(s)),
            _ => match serde_json::from_str::<LatestPrices>(&reply.body) {
                Err(e) => Attempt::Failed(FailureCause::Malformed(e.to_string())),
                Ok(payload) => {
                    let data = payload.data.unwrap_or_default();
                    if data.is_empty() && payload.success == Some(false) {
                        Attempt::Done(FetchOutcome::Skipped(SkipReason::Unsuccessful))
                    } else {
                        Attempt::Done(FetchOutcome::Accepted(data))
                    }
                }
            },
        }
    }

    /// Fetch one pair with retry and pacing.
    pub fn fetch_pair(&self, origin: &str, dest: &str) -> FetchOutcome {
        if let Some(reason) = check_pair(origin, dest) {
            return FetchOutcome::Skipped(reason);
        }

        let request = self.request(origin, dest);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_cause = FailureCause::Network("no attempt made".into());

        for attempt in 1..=max_attempts {
            let result = self.attempt(&request);
            self.sleeper.sleep(self.policy.pacing);

            let backoff = match result {
                Attempt::Done(outcome) => return outcome,
                Attempt::RateLimited => {
                    debug!(origin, dest, attempt, "rate limited");
                    last_cause = FailureCause::RateLimited;
                    self.policy.rate_limit_backoff.saturating_mul(attempt)
                }
                Attempt::Failed(cause) => {
                    debug!(origin, dest, attempt, %cause, "attempt failed");
                    last_cause = cause;
                    self.policy.failure_backoff.saturating_mul(attempt)
                }
            };

            if attempt < max_attempts {
                self.sleeper.sleep(backoff);
            }
        }

        warn!(origin, dest, attempts = max_attempts, cause = %last_cause, "retries exhausted");
        FetchOutcome::Failed(FetchExhausted {
            origin: origin.to_string(),
            dest: dest.to_string(),
            attempts: max_attempts,
            cause: last_cause,
        })
    }
}

impl<T: Transport, S: Sleeper> FareSource for QuoteFetcher<T, S> {
    fn name(&self) -> &str {
        "travelpayouts"
    }

    fn fetch(&self, origin: &str, dest: &str) -> FetchOutcome {
        self.fetch_pair(origin, dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::pacing::RecordingSleeper;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays canned replies in order and counts calls.
    struct Scripted {
        replies: RefCell<VecDeque<Result<HttpReply, TransportError>>>,
        requests: RefCell<Vec<QuoteRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<HttpReply, TransportError>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                requests: RefCell::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.requests.borrow().len()
        }
    }

    impl Transport for Scripted {
        fn get(&self, request: &QuoteRequest) -> Result<HttpReply, TransportError> {
            self.requests.borrow_mut().push(request.clone());
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(HttpReply::new(500, "")))
        }
    }

    fn config() -> CollectorConfig {
        CollectorConfig {
            api_key: Some("token-123".into()),
            max_attempts: 3,
            pacing_ms: 200,
            rate_limit_backoff_ms: 1500,
            failure_backoff_ms: 800,
            ..Default::default()
        }
    }

    fn fetcher(
        replies: Vec<Result<HttpReply, TransportError>>,
    ) -> QuoteFetcher<Scripted, RecordingSleeper> {
        QuoteFetcher::new(Scripted::new(replies), &config()).with_sleeper(RecordingSleeper::new())
    }

    const OK_BODY: &str = r#"{"success":true,"data":[
        {"depart_date":"2026-03-01","value":412,"gate":"Kiwi.com","trip_class":0,"number_of_changes":1},
        {"depart_date":"2026-03-05","value":388.5,"gate":"Trip.com","trip_class":0,"number_of_changes":0}
    ]}"#;

    #[test]
    fn success_returns_items_after_one_attempt() {
        let f = fetcher(vec![Ok(HttpReply::new(200, OK_BODY))]);
        let outcome = f.fetch_pair("JFK", "LHR");

        match outcome {
            FetchOutcome::Accepted(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[0].price(), Some(412.0));
            }
            other => panic!("expected Accepted, got {other:?}"),
        }
        assert_eq!(f.transport().calls(), 1);
        assert_eq!(f.sleeper.waits(), vec![Duration::from_millis(200)]);
    }

    #[test]
    fn request_carries_route_and_credentials() {
        let f = fetcher(vec![Ok(HttpReply::new(200, OK_BODY))]);
        f.fetch_pair("JFK", "LHR");

        let req = f.transport().requests.borrow()[0].clone();
        assert_eq!(req.origin, "JFK");
        assert_eq!(req.destination, "LHR");
        assert_eq!(req.currency, "usd");
        assert_eq!(req.market, "us");
        assert_eq!(req.period_type, "year");
        assert_eq!(req.token, "token-123");
    }

    #[test]
    fn client_rejection_is_benign_and_not_retried() {
        let f = fetcher(vec![Ok(HttpReply::new(400, "bad route"))]);
        let batch = f.fetch_pair("JFK", "XXX").into_batch().unwrap();

        assert!(!batch.accepted);
        assert!(batch.quotes.is_empty());
        assert_eq!(f.transport().calls(), 1);
    }

    #[test]
    fn unsuccessful_payload_is_skipped() {
        let f = fetcher(vec![Ok(HttpReply::new(200, r#"{"success":false,"data":[]}"#))]);
        assert_eq!(
            f.fetch_pair("JFK", "LHR"),
            FetchOutcome::Skipped(SkipReason::Unsuccessful)
        );
    }

    #[test]
    fn rate_limit_backs_off_proportionally_then_succeeds() {
        let f = fetcher(vec![
            Ok(HttpReply::new(429, "")),
            Ok(HttpReply::new(429, "")),
            Ok(HttpReply::new(200, OK_BODY)),
        ]);
        let outcome = f.fetch_pair("JFK", "LHR");

        assert!(matches!(outcome, FetchOutcome::Accepted(_)));
        assert_eq!(f.transport().calls(), 3);
        assert_eq!(
            f.sleeper.waits(),
            vec![
                Duration::from_millis(200),
                Duration::from_millis(1500),
                Duration::from_millis(200),
                Duration::from_millis(3000),
                Duration::from_millis(200),
            ]
        );
    }

    #[test]
    fn oversized_backoff_saturates_instead_of_overflowing() {
        let cfg = CollectorConfig {
            rate_limit_backoff_ms: u64::MAX,
            failure_backoff_ms: u64::MAX,
            ..config()
        };
        let f = QuoteFetcher::new(
            Scripted::new(vec![Ok(HttpReply::new(429, "")), Ok(HttpReply::new(500, ""))]),
            &cfg,
        )
        .with_sleeper(RecordingSleeper::new());

        let err = f.fetch_pair("JFK", "LHR").into_batch().unwrap_err();
        assert_eq!(err.attempts, 3);
        assert!(f.sleeper.waits().contains(&Duration::MAX));
    }

    #[test]
    fn server_errors_exhaust_after_max_attempts() {
        let f = fetcher(vec![
            Ok(HttpReply::new(500, "")),
            Ok(HttpReply::new(502, "")),
            Ok(HttpReply::new(503, "")),
            Ok(HttpReply::new(200, OK_BODY)),
        ]);
        let err = f.fetch_pair("JFK", "LHR").into_batch().unwrap_err();

        assert_eq!(err.attempts, 3);
        assert_eq!(err.cause, FailureCause::Status(503));
        assert_eq!(f.transport().calls(), 3);
        assert_eq!(
            f.sleeper.waits(),
            vec![
                Duration::from_millis(200),
                Duration::from_millis(800),
                Duration::from_millis(200),
                Duration::from_millis(1600),
                Duration::from_millis(200),
            ]
        );
    }

    #[test]
    fn network_and_malformed_failures_are_retried() {
        let f = fetcher(vec![
            Err(TransportError::Network("connection refused".into())),
            Ok(HttpReply::new(200, "<html>not json</html>")),
            Ok(HttpReply::new(200, OK_BODY)),
        ]);
        assert!(matches!(f.fetch_pair("JFK", "LHR"), FetchOutcome::Accepted(_)));
        assert_eq!(f.transport().calls(), 3);
    }

    #[test]
    fn last_cause_is_reported() {
        let f = fetcher(vec![
            Ok(HttpReply::new(503, "")),
            Err(TransportError::Network("reset".into())),
            Err(TransportError::Timeout("15s".into())),
        ]);
        let err = f.fetch_pair("JFK", "LHR").into_batch().unwrap_err();
        assert_eq!(err.cause, FailureCause::Timeout("15s".into()));
    }

    #[test]
    fn only_rate_limits_exhaust_with_rate_limit_cause() {
        let f = fetcher(vec![
            Ok(HttpReply::new(429, "")),
            Ok(HttpReply::new(429, "")),
            Ok(HttpReply::new(429, "")),
        ]);
        let err = f.fetch_pair("JFK", "LHR").into_batch().unwrap_err();
        assert_eq!(err.cause, FailureCause::RateLimited);
        assert_eq!(f.transport().calls(), 3);
    }

    #[test]
    fn self_pair_never_hits_the_network() {
        let f = fetcher(vec![]);
        assert_eq!(
            f.fetch_pair("JFK", "JFK"),
            FetchOutcome::Skipped(SkipReason::SelfPair)
        );
        assert_eq!(f.transport().calls(), 0);
    }

    #[test]
    fn null_data_with_success_is_empty_accept() {
        let f = fetcher(vec![Ok(HttpReply::new(200, r#"{"success":true,"data":null}"#))]);
        assert_eq!(f.fetch_pair("JFK", "LHR"), FetchOutcome::Accepted(vec![]));
    }
}

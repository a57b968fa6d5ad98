// HTTP client for the Slash Golf API (RapidAPI).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use super::types::{Earnings, Leaderboard, Schedule};
use super::{FeedError, ResultsFeed};
use crate::config::{FeedConfig, SyncMode};

/// Exponential backoff with jitter between failed attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay applied as symmetric random jitter.
    pub jitter: f64,
    pub min_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1500),
            max_delay: Duration::from_secs(60),
            jitter: 0.25,
            min_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(feed: &FeedConfig) -> Self {
        Self {
            max_attempts: feed.max_attempts,
            base_delay: Duration::from_millis(feed.base_delay_ms),
            max_delay: Duration::from_millis(feed.max_delay_ms),
            ..Self::default()
        }
    }

    /// Delay before the attempt following failed attempt `attempt` (1-based),
    /// or `None` once attempts are exhausted.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(-self.jitter..=self.jitter)
        } else {
            0.0
        };
        Some(self.delay_for(attempt, factor))
    }

    /// `min(max_delay, base_delay * 2^(attempt-1))` scaled by `1 + jitter_factor`,
    /// never below `min_delay`.
    pub fn delay_for(&self, attempt: u32, jitter_factor: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let capped = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay);
        let jittered = capped.mul_f64((1.0 + jitter_factor).max(0.0));
        jittered.max(self.min_delay)
    }
}

/// Statuses worth retrying: rate limiting and transient server errors.
pub fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

enum Attempt<T> {
    Done(Result<T, FeedError>),
    Retry,
}

pub struct SlashGolfClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_host: String,
    org_id: String,
    mode: SyncMode,
    retry: RetryPolicy,
    calls: AtomicU64,
}

impl SlashGolfClient {
    pub fn new(feed: &FeedConfig, api_key: impl Into<String>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(feed.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: feed.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_host: feed.api_host.clone(),
            org_id: feed.org_id.clone(),
            mode: feed.sync_mode,
            retry: RetryPolicy::from_config(feed),
            calls: AtomicU64::new(0),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// HTTP requests sent so far, retries included.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, FeedError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut query: Vec<(&str, String)> = params.to_vec();
        query.push(("orgId", self.org_id.clone()));

        let mut attempt = 0;
        loop {
            attempt += 1;
            if let Attempt::Done(outcome) = self.attempt(endpoint, &url, &query, attempt).await {
                return outcome;
            }
            match self.retry.next_delay(attempt) {
                Some(delay) => {
                    debug!(endpoint, attempt, delay_ms = delay.as_millis() as u64, "retrying feed request");
                    tokio::time::sleep(delay).await;
                }
                None => break,
            }
        }

        error!(endpoint, attempts = attempt, "feed request failed after all retries");
        Err(FeedError::Unavailable {
            endpoint: endpoint.to_string(),
            attempts: attempt,
        })
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        url: &str,
        query: &[(&str, String)],
        attempt: u32,
    ) -> Attempt<T> {
        let started = Instant::now();
        let sent = self
            .http
            .get(url)
            .header("X-RapidAPI-Key", &self.api_key)
            .header("X-RapidAPI-Host", &self.api_host)
            .query(query)
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                self.audit(endpoint, query, None, attempt, started);
                warn!(endpoint, attempt, "feed transport error: {e}");
                return Attempt::Retry;
            }
        };

        let status = response.status();
        self.audit(endpoint, query, Some(status), attempt, started);

        if !status.is_success() {
            let retryable = is_retryable(status);
            warn!(endpoint, attempt, status = status.as_u16(), retryable, "feed request failed");
            if retryable {
                return Attempt::Retry;
            }
            return Attempt::Done(Err(FeedError::Rejected {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            }));
        }

        match response.bytes().await {
            Ok(body) => Attempt::Done(serde_json::from_slice(&body).map_err(|source| {
                FeedError::Decode {
                    endpoint: endpoint.to_string(),
                    source,
                }
            })),
            Err(e) => {
                warn!(endpoint, attempt, "failed to read feed response body: {e}");
                Attempt::Retry
            }
        }
    }

    fn audit(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
        status: Option<StatusCode>,
        attempt: u32,
        started: Instant,
    ) {
        let count = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            target: "fairway::api_calls",
            count,
            mode = self.mode.as_str(),
            endpoint,
            params = ?query,
            status = status.map(|s| s.as_u16()).unwrap_or(0),
            attempt,
            duration_ms = started.elapsed().as_millis() as u64,
            "api call"
        );
    }
}

#[async_trait]
impl ResultsFeed for SlashGolfClient {
    async fn schedule(&self, year: i32) -> Result<Schedule, FeedError> {
        self.get_json("schedule", &[("year", year.to_string())]).await
    }

    async fn leaderboard(&self, tourn_id: &str, year: i32) -> Result<Leaderboard, FeedError> {
        self.get_json(
            "leaderboard",
            &[("tournId", tourn_id.to_string()), ("year", year.to_string())],
        )
        .await
    }

    async fn earnings(&self, tourn_id: &str, year: i32) -> Result<Earnings, FeedError> {
        self.get_json(
            "earnings",
            &[("tournId", tourn_id.to_string()), ("year", year.to_string())],
        )
        .await
    }
}

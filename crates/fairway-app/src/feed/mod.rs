// Upstream results feed: provider DTOs, the feed trait and the HTTP client.

pub mod client;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use client::{RetryPolicy, SlashGolfClient};
pub use types::{Earnings, Leaderboard, Schedule};

#[derive(Debug, Error)]
pub enum FeedError {
    /// Retries exhausted on transport errors or retryable statuses.
    #[error("{endpoint} unavailable after {attempts} attempts")]
    Unavailable { endpoint: String, attempts: u32 },

    /// A terminal (non-retryable) HTTP status.
    #[error("{endpoint} rejected the request with status {status}")]
    Rejected { endpoint: String, status: u16 },

    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Source of schedule, leaderboard and earnings data.
#[async_trait]
pub trait ResultsFeed: Send + Sync {
    async fn schedule(&self, year: i32) -> Result<Schedule, FeedError>;

    async fn leaderboard(&self, tourn_id: &str, year: i32) -> Result<Leaderboard, FeedError>;

    /// Official prize money; only published once the tournament is complete.
    async fn earnings(&self, tourn_id: &str, year: i32) -> Result<Earnings, FeedError>;
}

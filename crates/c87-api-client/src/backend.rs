//! Backend seam for the sync core
//!
//! Everything above this crate talks to the API through [`FeedBackend`],
//! which [`ApiClient`](crate::ApiClient) implements over HTTP.

use crate::error::Result;
use crate::types::*;
use async_trait::async_trait;

/// Remote operations the feed application consumes
#[async_trait]
pub trait FeedBackend: Send + Sync {
    /// `GET news/?skip&limit`; an empty or short list ends the stream
    async fn fetch_feed(&self, cursor: Cursor, limit: usize) -> Result<Vec<FeedItem>>;

    /// `GET news/feed?feed_type&skip&limit`; without a key the server
    /// falls back to its general ranking
    async fn fetch_personalized_feed(
        &self,
        key: Option<&ApiKey>,
        source: FeedSource,
        cursor: Cursor,
        limit: usize,
    ) -> Result<Vec<FeedItem>>;

    /// `POST news/{id}/vote`
    async fn vote(&self, key: &ApiKey, news_id: u64, polarity: VotePolarity) -> Result<VoteReceipt>;

    /// `GET news/{id}/vote-status`
    async fn vote_status(&self, key: &ApiKey, news_id: u64) -> Result<VoteStatus>;

    /// `POST economy/spend`
    async fn spend(&self, key: &ApiKey, kind: SpendKind, news_id: Option<u64>) -> Result<SpendReceipt>;

    /// `GET economy/transactions`
    async fn transactions(&self, key: &ApiKey) -> Result<Vec<Transaction>>;

    /// `GET signals/dashboard`
    async fn dashboard_snapshot(&self) -> Result<DashboardSnapshot>;

    /// `GET users/me`
    async fn session(&self, key: &ApiKey) -> Result<SessionInfo>;

    /// `PUT users/me/watchlist`; answers with the updated user
    async fn update_watchlist(&self, key: &ApiKey, coins: &[String]) -> Result<SessionInfo>;

    /// `POST auth/login`
    async fn login(&self, email: &str) -> Result<LoginResponse>;

    /// `GET trends/narratives`
    async fn narratives(&self) -> Result<Vec<Narrative>>;
}

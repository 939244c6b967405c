//! HTTP client for the C87 API

use crate::backend::FeedBackend;
use crate::error::{ApiError, Result};
use crate::types::*;
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Header carrying the identity token
const API_KEY_HEADER: &str = "X-API-KEY";

/// HTTP client for the C87 API
///
/// # Example
///
/// ```rust,no_run
/// use c87_api_client::{ApiClient, ApiConfig, ApiKey, FeedBackend, VotePolarity};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ApiClient::new(ApiConfig::default())?;
/// let key = ApiKey::new("c87_live_key");
///
/// let me = client.session(&key).await?;
/// let receipt = client.vote(&key, 42, VotePolarity::Trust).await?;
/// println!("{} earned {}", me.email, receipt.reward);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    config: ApiConfig,
    client: Client,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(config: ApiConfig) -> Result<Self> {
        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(ApiError::InvalidConfig(format!(
                "base_url must be an http(s) URL, got '{}'",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ApiError::InvalidConfig(e.to_string()))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// URL for one feed page
    pub fn feed_url(&self, cursor: Cursor, limit: usize) -> String {
        format!("{}?skip={}&limit={}", self.url("news/"), cursor.offset(), limit)
    }

    /// URL for one page of a personalized feed
    pub fn personalized_feed_url(&self, source: FeedSource, cursor: Cursor, limit: usize) -> String {
        format!(
            "{}?feed_type={}&skip={}&limit={}",
            self.url("news/feed"),
            source.as_str(),
            cursor.offset(),
            limit
        )
    }

    fn news_url(&self, news_id: u64, action: &str) -> String {
        self.url(&format!("news/{}/{}", news_id, action))
    }

    fn authed(&self, request: RequestBuilder, key: &ApiKey) -> RequestBuilder {
        request.header(API_KEY_HEADER, key.as_str())
    }

    // ==================== Helper Methods ====================

    async fn send<T: serde::de::DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(Self::rejection(status, response).await);
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Malformed(e.to_string()))
    }

    async fn rejection(status: StatusCode, response: reqwest::Response) -> ApiError {
        let body = response.text().await.unwrap_or_default();
        let reason = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.reason())
            .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()));

        debug!("HTTP {} rejected: {:?}", status.as_u16(), reason);
        ApiError::Rejected {
            status: status.as_u16(),
            reason,
        }
    }
}

#[async_trait]
impl FeedBackend for ApiClient {
    async fn fetch_feed(&self, cursor: Cursor, limit: usize) -> Result<Vec<FeedItem>> {
        let url = self.feed_url(cursor, limit);
        debug!("Fetching feed page: {}", url);
        self.send(self.client.get(&url)).await
    }

    async fn fetch_personalized_feed(
        &self,
        key: Option<&ApiKey>,
        source: FeedSource,
        cursor: Cursor,
        limit: usize,
    ) -> Result<Vec<FeedItem>> {
        let url = self.personalized_feed_url(source, cursor, limit);
        debug!("Fetching personalized feed page: {}", url);
        let request = self.client.get(&url);
        match key {
            Some(key) => self.send(self.authed(request, key)).await,
            None => self.send(request).await,
        }
    }

    async fn vote(&self, key: &ApiKey, news_id: u64, polarity: VotePolarity) -> Result<VoteReceipt> {
        let request = self
            .client
            .post(self.news_url(news_id, "vote"))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&VoteRequest { vote_type: polarity });
        self.send(self.authed(request, key)).await
    }

    async fn vote_status(&self, key: &ApiKey, news_id: u64) -> Result<VoteStatus> {
        let request = self.client.get(self.news_url(news_id, "vote-status"));
        self.send(self.authed(request, key)).await
    }

    async fn spend(&self, key: &ApiKey, kind: SpendKind, news_id: Option<u64>) -> Result<SpendReceipt> {
        let request = self
            .client
            .post(self.url("economy/spend"))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&SpendRequest {
                spend_type: kind,
                news_id,
            });

        let response = self.authed(request, key).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Self::rejection(status, response).await);
        }

        // Any success body confirms the spend; amounts are optional extras
        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(SpendReceipt::default());
        }
        serde_json::from_slice(&body).map_err(|e| ApiError::Malformed(e.to_string()))
    }

    async fn transactions(&self, key: &ApiKey) -> Result<Vec<Transaction>> {
        let request = self.client.get(self.url("economy/transactions"));
        self.send(self.authed(request, key)).await
    }

    async fn dashboard_snapshot(&self) -> Result<DashboardSnapshot> {
        self.send(self.client.get(self.url("signals/dashboard"))).await
    }

    async fn session(&self, key: &ApiKey) -> Result<SessionInfo> {
        let request = self.client.get(self.url("users/me"));
        self.send(self.authed(request, key)).await
    }

    async fn update_watchlist(&self, key: &ApiKey, coins: &[String]) -> Result<SessionInfo> {
        let request = self
            .client
            .put(self.url("users/me/watchlist"))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&WatchlistUpdate {
                watchlist: coins.to_vec(),
            });
        self.send(self.authed(request, key)).await
    }

    async fn login(&self, email: &str) -> Result<LoginResponse> {
        let request = self
            .client
            .post(self.url("auth/login"))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&LoginRequest {
                email: email.to_string(),
            });
        self.send(request).await
    }

    async fn narratives(&self) -> Result<Vec<Narrative>> {
        self.send(self.client.get(self.url("trends/narratives"))).await
    }
}

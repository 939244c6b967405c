//! In-memory backend shared by the integration tests
//!
//! Serves the feed by skip offset from a mutable list, so tests can insert
//! items at the head between fetches the way the live feed does. Every
//! operation can be scripted to fail or to block on a gate until released.

#![allow(dead_code)]

use async_trait::async_trait;
use c87_api_client::*;
use c87_sync::{SyncConfig, SyncRuntime};
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const FEED: &str = "feed";
pub const PERSONAL_FEED: &str = "personal_feed";
pub const VOTE: &str = "vote";
pub const VOTE_STATUS: &str = "vote_status";
pub const SPEND: &str = "spend";
pub const TRANSACTIONS: &str = "transactions";
pub const DASHBOARD: &str = "dashboard";
pub const SESSION: &str = "session";
pub const LOGIN: &str = "login";
pub const NARRATIVES: &str = "narratives";
pub const WATCHLIST: &str = "watchlist";

#[derive(Default)]
pub struct MockBackend {
    /// Server-side feed, newest first
    pub feed: Mutex<Vec<FeedItem>>,
    /// (skip, limit) of every feed request
    pub feed_requests: Mutex<Vec<(u64, usize)>>,
    /// (source, sent a key, skip) of every personalized feed request
    pub personal_requests: Mutex<Vec<(FeedSource, bool, u64)>>,
    /// Server-side watchlist
    pub watchlist: Mutex<Vec<String>>,
    /// List the server answers with instead of the one it was sent
    pub watchlist_echo: Mutex<Option<Vec<String>>>,
    pub vote_reward: Mutex<Option<TokenAmount>>,
    pub spend_amount: Mutex<Option<TokenAmount>>,
    pub spends: Mutex<Vec<(SpendKind, Option<u64>)>>,
    pub voted: Mutex<HashMap<u64, VotePolarity>>,
    pub snapshots: Mutex<VecDeque<DashboardSnapshot>>,
    pub session_info: Mutex<Option<SessionInfo>>,
    pub transactions: Mutex<Vec<Transaction>>,
    pub narratives: Mutex<Vec<Narrative>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<HashMap<&'static str, VecDeque<ApiError>>>,
    gates: Mutex<HashMap<&'static str, Arc<Notify>>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_feed(items: Vec<FeedItem>) -> Arc<Self> {
        let backend = Self::default();
        *backend.feed.lock().unwrap() = items;
        Arc::new(backend)
    }

    pub fn calls(&self, op: &'static str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    /// Make the next call to `op` fail with `err`
    pub fn fail_next(&self, op: &'static str, err: ApiError) {
        self.failures
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// Block calls to `op` until the returned gate is notified once per call
    pub fn hold(&self, op: &'static str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().unwrap().insert(op, Arc::clone(&gate));
        gate
    }

    /// Insert items at the head of the server feed
    pub fn prepend(&self, items: Vec<FeedItem>) {
        let mut feed = self.feed.lock().unwrap();
        let rest = std::mem::take(&mut *feed);
        *feed = items.into_iter().chain(rest).collect();
    }

    pub fn push_snapshot(&self, snapshot: DashboardSnapshot) {
        self.snapshots.lock().unwrap().push_back(snapshot);
    }

    async fn enter(&self, op: &'static str) -> Result<()> {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;

        let gate = self.gates.lock().unwrap().get(op).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(op)
            .and_then(|queue| queue.pop_front());
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl FeedBackend for MockBackend {
    async fn fetch_feed(&self, cursor: Cursor, limit: usize) -> Result<Vec<FeedItem>> {
        self.feed_requests
            .lock()
            .unwrap()
            .push((cursor.offset(), limit));
        self.enter(FEED).await?;
        let feed = self.feed.lock().unwrap();
        Ok(feed
            .iter()
            .skip(cursor.offset() as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn fetch_personalized_feed(
        &self,
        key: Option<&ApiKey>,
        source: FeedSource,
        cursor: Cursor,
        limit: usize,
    ) -> Result<Vec<FeedItem>> {
        self.personal_requests
            .lock()
            .unwrap()
            .push((source, key.is_some(), cursor.offset()));
        self.enter(PERSONAL_FEED).await?;
        let watchlist = self.watchlist.lock().unwrap().clone();
        let feed = self.feed.lock().unwrap();
        Ok(feed
            .iter()
            .filter(|item| {
                source != FeedSource::WatchlistOnly
                    || item.coins_mentioned.iter().any(|c| watchlist.contains(c))
            })
            .skip(cursor.offset() as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn vote(&self, _key: &ApiKey, news_id: u64, polarity: VotePolarity) -> Result<VoteReceipt> {
        self.enter(VOTE).await?;
        self.voted.lock().unwrap().insert(news_id, polarity);
        let reward = self
            .vote_reward
            .lock()
            .unwrap()
            .unwrap_or(TokenAmount::from_hundredths(10));
        Ok(VoteReceipt { reward })
    }

    async fn vote_status(&self, _key: &ApiKey, news_id: u64) -> Result<VoteStatus> {
        self.enter(VOTE_STATUS).await?;
        let vote_type = self.voted.lock().unwrap().get(&news_id).copied();
        Ok(VoteStatus {
            has_voted: vote_type.is_some(),
            vote_type,
        })
    }

    async fn spend(&self, _key: &ApiKey, kind: SpendKind, news_id: Option<u64>) -> Result<SpendReceipt> {
        self.enter(SPEND).await?;
        self.spends.lock().unwrap().push((kind, news_id));
        Ok(SpendReceipt {
            amount: *self.spend_amount.lock().unwrap(),
            ..Default::default()
        })
    }

    async fn transactions(&self, _key: &ApiKey) -> Result<Vec<Transaction>> {
        self.enter(TRANSACTIONS).await?;
        Ok(self.transactions.lock().unwrap().clone())
    }

    async fn dashboard_snapshot(&self) -> Result<DashboardSnapshot> {
        self.enter(DASHBOARD).await?;
        self.snapshots
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ApiError::Rejected {
                status: 503,
                reason: Some("no snapshot scripted".into()),
            })
    }

    async fn session(&self, _key: &ApiKey) -> Result<SessionInfo> {
        self.enter(SESSION).await?;
        self.session_info
            .lock()
            .unwrap()
            .clone()
            .ok_or(ApiError::Rejected {
                status: 401,
                reason: Some("Invalid API key".into()),
            })
    }

    async fn update_watchlist(&self, _key: &ApiKey, coins: &[String]) -> Result<SessionInfo> {
        self.enter(WATCHLIST).await?;
        let saved = self
            .watchlist_echo
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| coins.to_vec());
        *self.watchlist.lock().unwrap() = saved.clone();
        Ok(SessionInfo {
            id: 7,
            email: "reader@example.com".into(),
            tier: Tier::Free,
            balance: TokenAmount::ZERO,
            watchlist: saved,
        })
    }

    async fn login(&self, email: &str) -> Result<LoginResponse> {
        self.enter(LOGIN).await?;
        Ok(LoginResponse {
            api_key: format!("key-{}", email),
            tier: Tier::Free,
            balance: TokenAmount::from_tokens(100),
        })
    }

    async fn narratives(&self) -> Result<Vec<Narrative>> {
        self.enter(NARRATIVES).await?;
        Ok(self.narratives.lock().unwrap().clone())
    }
}

// ==================== Fixtures ====================

pub const SUMMARY: &str = "Bitcoin ETF inflows reached a weekly high as institutional desks \
     rotated out of short-dated treasuries.";

pub fn item(id: u64, tags: &[&str]) -> FeedItem {
    FeedItem {
        id,
        title: format!("Headline {}", id),
        url: Some(format!("https://news.example.com/{}", id)),
        published_at: Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
            + chrono::Duration::minutes(id as i64),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        topic_category: None,
        image_url: None,
        summary: Some(SUMMARY.to_string()),
        sentiment_label: None,
        coins_mentioned: Vec::new(),
        risk_level: None,
        enhanced_trust_score: None,
        trust_breakdown: None,
    }
}

pub fn item_with_coins(id: u64, coins: &[&str]) -> FeedItem {
    FeedItem {
        coins_mentioned: coins.iter().map(|c| c.to_string()).collect(),
        ..item(id, &[])
    }
}

pub fn item_without_summary(id: u64) -> FeedItem {
    FeedItem {
        summary: Some(SUMMARY_PLACEHOLDER.to_string()),
        ..item(id, &[])
    }
}

/// Items with ids `from` down to `to`, newest first
pub fn items_desc(from: u64, to: u64) -> Vec<FeedItem> {
    (to..=from).rev().map(|id| item(id, &[])).collect()
}

pub fn ids(items: &[FeedItem]) -> Vec<u64> {
    items.iter().map(|i| i.id).collect()
}

pub fn assert_unique(items: &[FeedItem]) {
    let mut seen = HashSet::new();
    for item in items {
        assert!(seen.insert(item.id), "duplicate id {} in view", item.id);
    }
}

pub fn config(page_size: usize) -> SyncConfig {
    let mut config = SyncConfig::default();
    config.feed.page_size = page_size;
    config.economy.paywall_enabled = true;
    config
}

/// Runtime with a signed-in free-tier session holding `balance` tokens
pub fn signed_in(backend: Arc<MockBackend>, balance: i64) -> SyncRuntime {
    let runtime = SyncRuntime::with_backend(config(10), backend);
    runtime.session.set_token(ApiKey::new("test-key"));
    runtime.session.seed(SessionInfo {
        id: 7,
        email: "reader@example.com".into(),
        tier: Tier::Free,
        balance: TokenAmount::from_tokens(balance),
        watchlist: Vec::new(),
    });
    runtime
}

/// Yield until `op` has been called `n` times
pub async fn wait_for_calls(backend: &MockBackend, op: &'static str, n: usize) {
    for _ in 0..1000 {
        if backend.calls(op) >= n {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("{} was not called {} times", op, n);
}

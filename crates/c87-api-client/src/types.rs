//! Types for the C87 API

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Placeholder the summarizer writes when it has not produced a summary yet
pub const SUMMARY_PLACEHOLDER: &str = "AI Summary not available yet.";

/// Client configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the versioned API (e.g. "http://localhost:9010/api/v1")
    pub base_url: String,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9010/api/v1".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Identity token issued by the auth service, sent as `X-API-KEY`
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

// ==================== Token amounts ====================

/// Token quantity in hundredths of a $C87.
///
/// Balances and rewards travel as JSON floats but are kept as integers
/// locally so that applying and reverting the same delta is exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(i64);

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(0);

    /// Whole tokens
    pub const fn from_tokens(tokens: i64) -> Self {
        Self(tokens * 100)
    }

    pub const fn from_hundredths(hundredths: i64) -> Self {
        Self(hundredths)
    }

    /// Round a wire float to the nearest hundredth
    pub fn from_f64(value: f64) -> Self {
        Self((value * 100.0).round() as i64)
    }

    pub const fn hundredths(self) -> i64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub const fn abs(self) -> Self {
        Self(self.0.abs())
    }
}

impl Add for TokenAmount {
    type Output = TokenAmount;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for TokenAmount {
    type Output = TokenAmount;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for TokenAmount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for TokenAmount {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for TokenAmount {
    type Output = TokenAmount;
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Ok(Self::from_f64(value))
    }
}

// ==================== Feed ====================

/// Position in the ordered feed.
///
/// The server paginates by skip offset; callers should treat the value as
/// opaque and only obtain cursors from [`Cursor::start`] and [`Page`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cursor(u64);

impl Cursor {
    pub const fn start() -> Self {
        Self(0)
    }

    pub const fn offset(self) -> u64 {
        self.0
    }

    /// Cursor following a page of `count` items
    pub const fn advance(self, count: usize) -> Self {
        Self(self.0 + count as u64)
    }
}

/// How much analyzable content an item carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryQuality {
    Missing,
    Limited,
    Partial,
    Complete,
}

/// Score breakdown behind `enhanced_trust_score`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustBreakdown {
    pub base: f64,
    pub smart_money_bonus: f64,
    pub sentiment_bonus: f64,
    pub onchain_bonus: f64,
}

/// A news item from the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub published_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_string_list")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub topic_category: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    /// AI summary
    #[serde(default, rename = "summary_vi")]
    pub summary: Option<String>,
    #[serde(default)]
    pub sentiment_label: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_list")]
    pub coins_mentioned: Vec<String>,
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub enhanced_trust_score: Option<f64>,
    #[serde(default)]
    pub trust_breakdown: Option<TrustBreakdown>,
}

impl FeedItem {
    /// Whether the item has a real summary to analyze
    pub fn has_summary(&self) -> bool {
        match self.summary.as_deref() {
            Some(s) => {
                let s = s.trim();
                !s.is_empty() && s != SUMMARY_PLACEHOLDER
            }
            None => false,
        }
    }

    pub fn summary_quality(&self) -> SummaryQuality {
        if !self.has_summary() {
            return SummaryQuality::Missing;
        }
        let len = self.summary.as_deref().map(|s| s.chars().count()).unwrap_or(0);
        if len > 200 {
            SummaryQuality::Complete
        } else if len > 100 {
            SummaryQuality::Partial
        } else {
            SummaryQuality::Limited
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// One fetched page of the feed
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Cursor that produced this page
    pub cursor: Cursor,
    /// Cursor to request next
    pub next_cursor: Cursor,
    pub items: Vec<FeedItem>,
}

impl Page {
    pub fn new(cursor: Cursor, items: Vec<FeedItem>) -> Self {
        Self {
            cursor,
            next_cursor: cursor.advance(items.len()),
            items,
        }
    }

    /// A page shorter than the requested size ends the stream
    pub fn is_terminal(&self, page_size: usize) -> bool {
        self.items.len() < page_size
    }
}

/// Which ranking of the feed to page through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSource {
    /// Pinned items, then newest first (`news/`)
    #[default]
    Latest,
    /// Ranking boosted for watchlist coins (`news/feed?feed_type=for_you`)
    ForYou,
    /// Only items mentioning a watchlist coin
    WatchlistOnly,
}

impl FeedSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::ForYou => "for_you",
            Self::WatchlistOnly => "watchlist_only",
        }
    }

    /// Whether the server ranks this feed by the user's watchlist
    pub fn is_personalized(&self) -> bool {
        !matches!(self, Self::Latest)
    }
}

impl std::str::FromStr for FeedSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "latest" => Ok(Self::Latest),
            "for_you" => Ok(Self::ForYou),
            "watchlist_only" | "watchlist" => Ok(Self::WatchlistOnly),
            other => Err(format!("unknown feed source: {}", other)),
        }
    }
}

/// A trending narrative tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub tag: String,
    #[serde(default)]
    pub velocity: f64,
    #[serde(default)]
    pub count_24h: u64,
    #[serde(default)]
    pub avg_daily_7d: f64,
}

// ==================== Economy ====================

/// Vote polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VotePolarity {
    Trust,
    Fake,
}

impl VotePolarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trust => "trust",
            Self::Fake => "fake",
        }
    }
}

impl std::str::FromStr for VotePolarity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trust" => Ok(Self::Trust),
            "fake" => Ok(Self::Fake),
            other => Err(format!("unknown vote polarity: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteRequest {
    pub vote_type: VotePolarity,
}

/// Response to a successful vote
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteReceipt {
    /// Reward actually credited by the server
    #[serde(alias = "rewardAmount", alias = "reward_amount")]
    pub reward: TokenAmount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteStatus {
    pub has_voted: bool,
    #[serde(default)]
    pub vote_type: Option<VotePolarity>,
}

/// What a spend buys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpendKind {
    Unlock,
    Boost,
}

impl SpendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unlock => "unlock",
            Self::Boost => "boost",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SpendRequest {
    pub spend_type: SpendKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub news_id: Option<u64>,
}

/// Response to a successful spend; the server may or may not echo amounts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpendReceipt {
    #[serde(default)]
    pub id: Option<u64>,
    /// Signed ledger amount (negative for spends)
    #[serde(default)]
    pub amount: Option<TokenAmount>,
    #[serde(default)]
    pub balance_after: Option<TokenAmount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    EarnVote,
    SpendUnlock,
    SpendBoost,
}

/// Ledger entry from the economy history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u64,
    pub transaction_type: TransactionType,
    pub amount: TokenAmount,
    #[serde(default)]
    pub balance_after: Option<TokenAmount>,
    #[serde(default, alias = "related_news_id")]
    pub news_id: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
}

// ==================== Session ====================

/// Subscription tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Elite,
}

impl Tier {
    /// Premium tiers read every item without unlocking
    pub fn is_premium(&self) -> bool {
        matches!(self, Tier::Pro | Tier::Elite)
    }
}

/// Current user as reported by `users/me`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: u64,
    pub email: String,
    #[serde(default)]
    pub tier: Tier,
    pub balance: TokenAmount,
    /// Coin symbols the user follows
    #[serde(default, deserialize_with = "deserialize_string_list")]
    pub watchlist: Vec<String>,
}

/// Body of `PUT users/me/watchlist`; replaces the whole list
#[derive(Debug, Clone, Serialize)]
pub struct WatchlistUpdate {
    pub watchlist: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub api_key: String,
    #[serde(default)]
    pub tier: Tier,
    pub balance: TokenAmount,
}

/// Error body shape used by the API
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    /// Human-readable reason, if the body carried one
    pub fn reason(&self) -> Option<String> {
        match &self.detail {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        }
    }
}

// ==================== Signals dashboard ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskBand {
    Safe,
    Low,
    Moderate,
    High,
    Extreme,
}

impl RiskBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Low => "LOW",
            Self::Moderate => "MODERATE",
            Self::High => "HIGH",
            Self::Extreme => "EXTREME",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalDirection {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalBand {
    StrongBuy,
    Buy,
    Accumulate,
    Neutral,
    Sell,
    StrongSell,
}

impl SignalBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StrongBuy => "STRONG_BUY",
            Self::Buy => "BUY",
            Self::Accumulate => "ACCUMULATE",
            Self::Neutral => "NEUTRAL",
            Self::Sell => "SELL",
            Self::StrongSell => "STRONG_SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnChainState {
    Accumulation,
    Distribution,
    Neutral,
    Unknown,
}

impl OnChainState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accumulation => "ACCUMULATION",
            Self::Distribution => "DISTRIBUTION",
            Self::Neutral => "NEUTRAL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnChainBias {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskComponents {
    pub market_volatility: f64,
    pub liquidity: f64,
    pub news_sentiment: f64,
    pub technical_indicators: f64,
    pub volume_analysis: f64,
    pub whale_activity: f64,
    pub correlation_risk: f64,
    pub regulatory_risk: f64,
}

/// Latest bot trading decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingDecision {
    pub id: u64,
    pub overall_risk: f64,
    pub risk_band: RiskBand,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub risk_components: Option<RiskComponents>,
    #[serde(default)]
    pub active_alerts: Vec<String>,
    #[serde(default)]
    pub bot_action: String,
    #[serde(default)]
    pub max_position_pct: f64,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartMoneySignal {
    pub id: u64,
    pub coin: String,
    pub score: f64,
    pub band: SignalBand,
    pub direction: SignalDirection,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub timeframe: String,
    #[serde(default)]
    pub modules_active: u32,
    #[serde(default, rename = "description_vi")]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SentimentSources {
    #[serde(default)]
    pub twitter: Option<f64>,
    #[serde(default)]
    pub reddit: Option<f64>,
    #[serde(default)]
    pub news: Option<f64>,
    #[serde(default)]
    pub telegram: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentReport {
    pub id: u64,
    pub coin: String,
    pub signal: SignalDirection,
    #[serde(default)]
    pub bullish_count: u64,
    #[serde(default)]
    pub bearish_count: u64,
    #[serde(default)]
    pub neutral_count: u64,
    #[serde(default)]
    pub average_score: f64,
    #[serde(default)]
    pub weighted_sentiment: f64,
    #[serde(default)]
    pub velocity: f64,
    #[serde(default)]
    pub sources: SentimentSources,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnChainIntelligence {
    pub id: u64,
    pub state: OnChainState,
    pub bias: OnChainBias,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub whale_net_flow: f64,
    #[serde(default)]
    pub whale_dominance: f64,
    #[serde(default)]
    pub whale_tx_count: u64,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WhaleAlertType {
    Accumulation,
    Distribution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhaleAlert {
    pub id: u64,
    pub alert_type: WhaleAlertType,
    #[serde(default)]
    pub net_flow: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub tx_count: u64,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Point-in-time read of every server-computed signal
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    #[serde(default)]
    pub trading_decision: Option<TradingDecision>,
    #[serde(default)]
    pub smart_money_btc: Option<SmartMoneySignal>,
    #[serde(default)]
    pub smart_money_eth: Option<SmartMoneySignal>,
    #[serde(default)]
    pub sentiment_btc: Option<SentimentReport>,
    #[serde(default)]
    pub sentiment_eth: Option<SentimentReport>,
    #[serde(default)]
    pub onchain: Option<OnChainIntelligence>,
    #[serde(default, deserialize_with = "deserialize_null_as_empty")]
    pub whale_alerts: Vec<WhaleAlert>,
}

impl DashboardSnapshot {
    pub fn risk_band(&self) -> Option<RiskBand> {
        self.trading_decision.as_ref().map(|d| d.risk_band)
    }

    pub fn has_alert(&self, id: u64) -> bool {
        self.whale_alerts.iter().any(|a| a.id == id)
    }
}

// ==================== Serde helpers ====================

/// Accept RFC 3339 or a naive ISO timestamp (assumed UTC)
fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

/// Accept a JSON array of strings or a string holding one
fn deserialize_string_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Array(values) => values
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        serde_json::Value::String(s) => serde_json::from_str(&s).unwrap_or_default(),
        _ => Vec::new(),
    })
}

fn deserialize_null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

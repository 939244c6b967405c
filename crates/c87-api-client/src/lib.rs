//! Rust client for the C87 REST API
//!
//! Covers the endpoints the feed application consumes: the paginated news
//! feed, vote-to-earn, token spending, the signals dashboard and the user
//! session. Every endpoint is reachable through the [`FeedBackend`] trait so
//! higher layers can run against an in-memory backend in tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use c87_api_client::{ApiClient, ApiConfig, Cursor, FeedBackend};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::new(ApiConfig {
//!     base_url: "http://localhost:9010/api/v1".into(),
//!     ..Default::default()
//! })?;
//!
//! let first_page = client.fetch_feed(Cursor::start(), 10).await?;
//! let dashboard = client.dashboard_snapshot().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod client;
pub mod error;
pub mod types;

// Re-export main types
pub use backend::FeedBackend;
pub use client::ApiClient;
pub use error::{ApiError, Result};
pub use types::*;

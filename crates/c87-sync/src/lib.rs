//! Client-side synchronization core for the C87 feed
//!
//! Keeps a local view of server-owned state consistent while background
//! polling, optimistic user actions and partial failures interleave:
//!
//! - [`FeedPaginator`]: deduplicating, filterable infinite feed with a
//!   background first-page refresh
//! - [`MutationEngine`]: vote, unlock and boost with speculative local
//!   application and exact rollback
//! - [`WatchlistEditor`]: optimistic follow/unfollow of coins, which also
//!   restarts a personalized feed once saved
//! - [`SnapshotNotifier`]: dashboard polling that notifies once per new
//!   alert or field transition
//! - [`SessionStore`] and [`EventBus`]: shared session state and the
//!   publish/subscribe channel the components talk over
//!
//! [`SyncRuntime`] wires them together around one backend.
//!
//! # Example
//!
//! ```rust,no_run
//! use c87_sync::{MutationRequest, SyncConfig, SyncRuntime};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = SyncRuntime::connect(SyncConfig::default().with_env_overrides())?;
//! runtime.session.sync_from_remote().await?;
//!
//! runtime.feed.load_next_page().await?;
//! for item in runtime.feed.current_view().items {
//!     println!("{} {}", item.id, item.title);
//! }
//!
//! runtime.mutations.submit(MutationRequest::Unlock { target: 42 }).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod feed;
pub mod mutation;
pub mod notifier;
pub mod runtime;
pub mod session;
pub mod trends;
pub mod watchlist;

pub use config::{ApiSection, EconomyConfig, FeedConfig, NotifierConfig, SyncConfig};
pub use error::{Result, SyncError};
pub use events::{EventBus, HandlerError, SubscriptionId, SyncEvent, Topic};
pub use feed::{FeedPaginator, FeedView, LoadOutcome};
pub use mutation::{
    MutationEngine, MutationKind, MutationOutcome, MutationRecord, MutationRequest, MutationState,
};
pub use notifier::{diff_snapshots, Notification, PollOutcome, Severity, SnapshotNotifier, WatchedField};
pub use runtime::SyncRuntime;
pub use session::{SessionSnapshot, SessionStore};
pub use trends::TrendSelector;
pub use watchlist::{normalize_coin, WatchOutcome, WatchlistEditor};

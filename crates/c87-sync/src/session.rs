//! Session store
//!
//! Holds the identity token, tier, token balance and the per-item vote and
//! unlock flags. Everything here is readable by any component, but balance
//! and flags are written only by the mutation engine (through the
//! crate-private [`SessionStore::update`]) and by seeding from the server.
//! Readers that need to react to changes subscribe to the event bus instead
//! of polling.

use crate::error::{Result, SyncError};
use crate::events::{EventBus, SyncEvent};
use c87_api_client::{ApiKey, FeedBackend, SessionInfo, Tier, TokenAmount, VotePolarity};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

/// Mutable session state, guarded by the store
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) token: Option<ApiKey>,
    pub(crate) user: Option<(u64, String)>,
    pub(crate) tier: Tier,
    pub(crate) balance: TokenAmount,
    pub(crate) votes: HashMap<u64, VotePolarity>,
    pub(crate) unlocked: HashSet<u64>,
    /// Followed coin symbols, in the order they were added
    pub(crate) watchlist: Vec<String>,
}

impl SessionState {
    pub(crate) fn is_readable(&self, item_id: u64, paywall_enabled: bool) -> bool {
        !paywall_enabled || self.tier.is_premium() || self.unlocked.contains(&item_id)
    }
}

/// Read-only copy of the session for display
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub authenticated: bool,
    pub user_id: Option<u64>,
    pub email: Option<String>,
    pub tier: Tier,
    pub balance: TokenAmount,
    pub watchlist: Vec<String>,
}

struct StoreInner {
    state: Mutex<SessionState>,
    backend: Arc<dyn FeedBackend>,
    bus: EventBus,
    paywall_enabled: bool,
}

/// Cloneable handle to the shared session
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn FeedBackend>, bus: EventBus, paywall_enabled: bool) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(SessionState::default()),
                backend,
                bus,
                paywall_enabled,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `f` to the state in one critical section.
    ///
    /// Readers never observe a half-applied patch. Only the mutation engine
    /// and the seeding paths below call this.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.state();
        f(&mut state)
    }

    pub(crate) fn backend(&self) -> &Arc<dyn FeedBackend> {
        &self.inner.backend
    }

    pub(crate) fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub(crate) fn paywall_enabled(&self) -> bool {
        self.inner.paywall_enabled
    }

    // ==================== Readers ====================

    pub fn token(&self) -> Option<ApiKey> {
        self.state().token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().token.is_some()
    }

    pub fn balance(&self) -> TokenAmount {
        self.state().balance
    }

    pub fn tier(&self) -> Tier {
        self.state().tier
    }

    /// Vote recorded for an item in this session, confirmed or optimistic
    pub fn vote_for(&self, item_id: u64) -> Option<VotePolarity> {
        self.state().votes.get(&item_id).copied()
    }

    /// Whether an item's full content may be shown
    pub fn is_unlocked(&self, item_id: u64) -> bool {
        self.state().is_readable(item_id, self.inner.paywall_enabled)
    }

    pub fn watchlist(&self) -> Vec<String> {
        self.state().watchlist.clone()
    }

    pub fn is_watching(&self, coin: &str) -> bool {
        self.state().watchlist.iter().any(|c| c.eq_ignore_ascii_case(coin))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state();
        SessionSnapshot {
            authenticated: state.token.is_some(),
            user_id: state.user.as_ref().map(|(id, _)| *id),
            email: state.user.as_ref().map(|(_, email)| email.clone()),
            tier: state.tier,
            balance: state.balance,
            watchlist: state.watchlist.clone(),
        }
    }

    // ==================== Seeding ====================

    /// Attach an identity token from the auth collaborator
    pub fn set_token(&self, token: ApiKey) {
        self.state().token = Some(token);
    }

    /// Replace identity, tier, balance and watchlist with server truth
    pub fn seed(&self, info: SessionInfo) {
        let (balance, watchlist_changed) = {
            let mut state = self.state();
            state.user = Some((info.id, info.email));
            state.tier = info.tier;
            state.balance = info.balance;
            let changed = state.watchlist != info.watchlist;
            state.watchlist = info.watchlist.clone();
            (state.balance, changed)
        };
        info!("Session seeded: tier {:?}, balance {}", info.tier, balance);
        self.inner.bus.publish(SyncEvent::BalanceChanged { balance });
        if watchlist_changed {
            self.inner.bus.publish(SyncEvent::WatchlistChanged {
                coins: info.watchlist,
            });
        }
    }

    /// Re-read `users/me`; used at startup and when drift is suspected.
    ///
    /// A 401 means the token is no longer valid and it is dropped.
    pub async fn sync_from_remote(&self) -> Result<SessionSnapshot> {
        let token = self.token().ok_or(SyncError::NotAuthenticated)?;

        match self.inner.backend.session(&token).await {
            Ok(info) => {
                self.seed(info);
                Ok(self.snapshot())
            }
            Err(e) if e.is_unauthorized() => {
                warn!("Stored API key rejected, clearing session");
                self.state().token = None;
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Exchange an email for a token and seed the session
    pub async fn login(&self, email: &str) -> Result<SessionSnapshot> {
        let response = self.inner.backend.login(email).await?;
        let balance = {
            let mut state = self.state();
            state.token = Some(ApiKey::new(response.api_key));
            state.user = None;
            state.tier = response.tier;
            state.balance = response.balance;
            state.votes.clear();
            state.unlocked.clear();
            state.watchlist.clear();
            state.balance
        };
        info!("Logged in as {} ({:?})", email, response.tier);
        self.inner.bus.publish(SyncEvent::BalanceChanged { balance });
        Ok(self.snapshot())
    }

    /// Drop identity and all per-item flags
    pub fn logout(&self) {
        {
            let mut state = self.state();
            *state = SessionState::default();
        }
        info!("Logged out");
        self.inner.bus.publish(SyncEvent::BalanceChanged {
            balance: TokenAmount::ZERO,
        });
    }
}

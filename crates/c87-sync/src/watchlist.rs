//! Optimistic watchlist editing
//!
//! A toggle adds or removes one coin from the session watchlist at once and
//! then saves the whole list with `PUT users/me/watchlist`. The server's
//! answer replaces the local list. A failed save reverses only the toggle
//! that failed, so a list re-seeded in the meantime is not clobbered.
//!
//! The endpoint replaces the entire list, so at most one save is in flight;
//! a second toggle while one is pending is rejected with `AlreadyPending`.

use crate::error::{Result, SyncError};
use crate::events::SyncEvent;
use crate::mutation::MutationKind;
use crate::session::SessionStore;
use c87_api_client::ApiKey;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Result of a confirmed toggle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOutcome {
    pub coin: String,
    /// Whether the coin is followed after the toggle
    pub watching: bool,
    /// List as saved by the server
    pub watchlist: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Added,
    Removed { index: usize },
}

impl Edit {
    fn apply(self, coin: &str, list: &mut Vec<String>) {
        match self {
            Edit::Added => list.push(coin.to_string()),
            Edit::Removed { index } => {
                list.remove(index);
            }
        }
    }

    /// Undo `apply` against whatever the list holds now
    fn revert(self, coin: &str, list: &mut Vec<String>) {
        match self {
            Edit::Added => list.retain(|c| c != coin),
            Edit::Removed { index } => {
                if !list.iter().any(|c| c == coin) {
                    list.insert(index.min(list.len()), coin.to_string());
                }
            }
        }
    }
}

struct PendingEdit {
    id: u64,
    token: ApiKey,
    edit: Edit,
    list: Vec<String>,
}

struct EditorInner {
    session: SessionStore,
    /// Id of the save in flight, if any
    pending: Mutex<Option<u64>>,
    next_id: AtomicU64,
}

impl EditorInner {
    fn pending(&self) -> MutexGuard<'_, Option<u64>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cloneable handle to the shared watchlist editor
#[derive(Clone)]
pub struct WatchlistEditor {
    inner: Arc<EditorInner>,
}

/// Coin symbols are stored upper-case, the way the server stores them
pub fn normalize_coin(coin: &str) -> Result<String> {
    let coin = coin.trim();
    if coin.is_empty() || !coin.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(SyncError::InvalidRequest(format!("not a coin symbol: '{}'", coin)));
    }
    Ok(coin.to_ascii_uppercase())
}

impl WatchlistEditor {
    pub fn new(session: SessionStore) -> Self {
        Self {
            inner: Arc::new(EditorInner {
                session,
                pending: Mutex::new(None),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.inner.pending().is_some()
    }

    /// Follow `coin` if it is not followed yet, otherwise stop following it
    pub async fn toggle(&self, coin: &str) -> Result<WatchOutcome> {
        let coin = normalize_coin(coin)?;
        let pending = self.begin(&coin)?;
        debug!("Watchlist save {} pending: {:?} {}", pending.id, pending.edit, coin);

        let bus = self.inner.session.bus();
        bus.publish(SyncEvent::WatchlistChanged {
            coins: pending.list.clone(),
        });

        let saved = self
            .inner
            .session
            .backend()
            .update_watchlist(&pending.token, &pending.list)
            .await
            .map_err(|e| SyncError::from(e).for_mutation());

        match saved {
            Ok(info) => Ok(self.confirm(&coin, &pending, info.watchlist)),
            Err(err) => Err(self.roll_back(&coin, &pending, err)),
        }
    }

    fn begin(&self, coin: &str) -> Result<PendingEdit> {
        let mut pending = self.inner.pending();
        let (token, edit, list) = self.inner.session.update(|state| -> Result<(ApiKey, Edit, Vec<String>)> {
            let token = state.token.clone().ok_or(SyncError::NotAuthenticated)?;
            if pending.is_some() {
                return Err(SyncError::AlreadyPending {
                    kind: MutationKind::Watchlist,
                    target: None,
                });
            }
            let edit = match state.watchlist.iter().position(|c| c == coin) {
                Some(index) => Edit::Removed { index },
                None => Edit::Added,
            };
            edit.apply(coin, &mut state.watchlist);
            Ok((token, edit, state.watchlist.clone()))
        })?;

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        *pending = Some(id);
        Ok(PendingEdit { id, token, edit, list })
    }

    /// Clear the pending slot if it still belongs to save `id`
    fn settle(&self, id: u64) -> bool {
        let mut pending = self.inner.pending();
        if *pending == Some(id) {
            *pending = None;
            true
        } else {
            false
        }
    }

    fn confirm(&self, coin: &str, pending: &PendingEdit, saved: Vec<String>) -> WatchOutcome {
        let bus = self.inner.session.bus();
        if self.settle(pending.id) {
            let drifted = self.inner.session.update(|state| {
                let drifted = state.watchlist != saved;
                state.watchlist = saved.clone();
                drifted
            });
            if drifted {
                bus.publish(SyncEvent::WatchlistChanged {
                    coins: saved.clone(),
                });
            }
            bus.publish(SyncEvent::WatchlistSaved {
                coins: saved.clone(),
            });
        } else {
            debug!("Watchlist save {} confirmed after reset, ignoring", pending.id);
        }

        let watching = saved.iter().any(|c| c == coin);
        info!(
            "Watchlist save {} confirmed: {} coins, watching {}: {}",
            pending.id,
            saved.len(),
            coin,
            watching
        );
        WatchOutcome {
            coin: coin.to_string(),
            watching,
            watchlist: saved,
        }
    }

    fn roll_back(&self, coin: &str, pending: &PendingEdit, err: SyncError) -> SyncError {
        warn!("Watchlist save {} failed, reverting {}: {}", pending.id, coin, err);

        let bus = self.inner.session.bus();
        if self.settle(pending.id) {
            let coins = self.inner.session.update(|state| {
                pending.edit.revert(coin, &mut state.watchlist);
                state.watchlist.clone()
            });
            bus.publish(SyncEvent::WatchlistChanged { coins });
        }

        bus.publish(SyncEvent::MutationFailed {
            kind: MutationKind::Watchlist,
            target: None,
            reason: err.user_reason(),
        });
        err
    }

    /// Forget the pending save; its late answer is then ignored
    pub fn reset(&self) {
        *self.inner.pending() = None;
    }
}

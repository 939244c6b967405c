//! Optimistic mutation engine
//!
//! Votes, unlocks and boosts are applied to the session immediately and
//! confirmed or reversed once the server answers. Each (kind, target) key
//! has at most one pending mutation. A failed mutation reverses exactly the
//! effect it applied, so the balance after a rollback is bit-for-bit the
//! balance before the submit (plus whatever other mutations did meanwhile).
//!
//! Lock order is ledger, then session. Events are published only after both
//! locks are released.

use crate::config::EconomyConfig;
use crate::error::{Result, SyncError};
use crate::events::SyncEvent;
use crate::session::SessionStore;
use c87_api_client::{ApiKey, SpendKind, SpendReceipt, TokenAmount, Transaction, VotePolarity, VoteStatus};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Vote,
    Unlock,
    Boost,
    Watchlist,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Vote => "vote",
            MutationKind::Unlock => "unlock",
            MutationKind::Boost => "boost",
            MutationKind::Watchlist => "watchlist",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user action against the token economy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationRequest {
    Vote { target: u64, polarity: VotePolarity },
    Unlock { target: u64 },
    /// Boost an item, or the account when `target` is `None`
    Boost { target: Option<u64> },
}

impl MutationRequest {
    pub fn kind(&self) -> MutationKind {
        match self {
            MutationRequest::Vote { .. } => MutationKind::Vote,
            MutationRequest::Unlock { .. } => MutationKind::Unlock,
            MutationRequest::Boost { .. } => MutationKind::Boost,
        }
    }

    pub fn target(&self) -> Option<u64> {
        match self {
            MutationRequest::Vote { target, .. } | MutationRequest::Unlock { target } => Some(*target),
            MutationRequest::Boost { target } => *target,
        }
    }

    fn key(&self) -> MutationKey {
        (self.kind(), self.target())
    }
}

type MutationKey = (MutationKind, Option<u64>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationState {
    Pending,
    Confirmed,
    RolledBack,
}

/// Ledger entry for the latest mutation on a key
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    pub id: u64,
    pub request: MutationRequest,
    /// Signed amount applied to the balance
    pub amount: TokenAmount,
    pub state: MutationState,
}

impl MutationRecord {
    pub fn kind(&self) -> MutationKind {
        self.request.kind()
    }

    pub fn target(&self) -> Option<u64> {
        self.request.target()
    }
}

/// Result of a confirmed mutation
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    pub id: u64,
    pub kind: MutationKind,
    pub target: Option<u64>,
    /// Final signed amount applied to the balance
    pub amount: TokenAmount,
    /// Balance right after confirmation
    pub balance: TokenAmount,
}

/// What `begin` applied, needed to confirm or reverse it
struct Speculation {
    id: u64,
    token: ApiKey,
    delta: TokenAmount,
    balance: TokenAmount,
}

enum Confirmation {
    Reward(TokenAmount),
    Spend(SpendReceipt),
}

struct EngineInner {
    session: SessionStore,
    economy: EconomyConfig,
    ledger: Mutex<HashMap<MutationKey, MutationRecord>>,
    next_id: AtomicU64,
}

impl EngineInner {
    fn ledger(&self) -> MutexGuard<'_, HashMap<MutationKey, MutationRecord>> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cloneable handle to the shared engine
#[derive(Clone)]
pub struct MutationEngine {
    inner: Arc<EngineInner>,
}

impl MutationEngine {
    pub fn new(session: SessionStore, economy: EconomyConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                session,
                economy,
                ledger: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Nominal balance change applied before the server answers
    pub fn nominal_amount(&self, request: &MutationRequest) -> TokenAmount {
        match request {
            MutationRequest::Vote { .. } => self.inner.economy.vote_reward_estimate,
            MutationRequest::Unlock { .. } => -self.inner.economy.unlock_cost,
            MutationRequest::Boost { .. } => -self.inner.economy.boost_cost,
        }
    }

    /// Apply `request` optimistically and confirm it with the server.
    ///
    /// Local rejections return before anything is applied. Remote failures
    /// return after the speculative effect has been reversed and
    /// `MutationFailed` published.
    pub async fn submit(&self, request: MutationRequest) -> Result<MutationOutcome> {
        let speculation = self.begin(&request)?;
        debug!(
            "Mutation {} pending: {} on {:?} ({})",
            speculation.id,
            request.kind(),
            request.target(),
            speculation.delta
        );

        let bus = self.inner.session.bus();
        if let MutationRequest::Vote { target, .. } = request {
            bus.publish(SyncEvent::RewardPending {
                target,
                estimate: speculation.delta,
            });
        }
        bus.publish(SyncEvent::BalanceChanged {
            balance: speculation.balance,
        });

        match self.call_remote(&speculation.token, &request).await {
            Ok(confirmation) => Ok(self.confirm(&request, &speculation, confirmation)),
            Err(err) => Err(self.roll_back(&request, &speculation, err)),
        }
    }

    /// Check the key and apply the speculative effect in one critical section
    fn begin(&self, request: &MutationRequest) -> Result<Speculation> {
        let key = request.key();
        let (kind, target) = key;
        let paywall_enabled = self.inner.session.paywall_enabled();
        let delta = self.nominal_amount(request);

        let mut ledger = self.inner.ledger();
        let (token, balance) = self.inner.session.update(|state| -> Result<(ApiKey, TokenAmount)> {
            let token = state.token.clone().ok_or(SyncError::NotAuthenticated)?;

            match ledger.get(&key).map(|r| r.state) {
                Some(MutationState::Pending) => {
                    return Err(SyncError::AlreadyPending { kind, target });
                }
                Some(MutationState::Confirmed) if target.is_some() => {
                    return Err(SyncError::AlreadyDone { kind, target });
                }
                _ => {}
            }

            match request {
                MutationRequest::Vote { target, .. } if state.votes.contains_key(target) => {
                    return Err(SyncError::AlreadyDone { kind, target: Some(*target) });
                }
                MutationRequest::Unlock { target } if state.is_readable(*target, paywall_enabled) => {
                    return Err(SyncError::AlreadyDone { kind, target: Some(*target) });
                }
                _ => {}
            }

            if delta.is_negative() && state.balance + delta < TokenAmount::ZERO {
                return Err(SyncError::InsufficientBalance {
                    required: delta.abs(),
                    available: state.balance,
                });
            }

            match request {
                MutationRequest::Vote { target, polarity } => {
                    state.votes.insert(*target, *polarity);
                }
                MutationRequest::Unlock { target } => {
                    state.unlocked.insert(*target);
                }
                MutationRequest::Boost { .. } => {}
            }
            state.balance += delta;
            Ok((token, state.balance))
        })?;

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        ledger.insert(
            key,
            MutationRecord {
                id,
                request: *request,
                amount: delta,
                state: MutationState::Pending,
            },
        );

        Ok(Speculation {
            id,
            token,
            delta,
            balance,
        })
    }

    async fn call_remote(&self, token: &ApiKey, request: &MutationRequest) -> Result<Confirmation> {
        let backend = self.inner.session.backend();
        let result = match *request {
            MutationRequest::Vote { target, polarity } => backend
                .vote(token, target, polarity)
                .await
                .map(|receipt| Confirmation::Reward(receipt.reward)),
            MutationRequest::Unlock { target } => backend
                .spend(token, SpendKind::Unlock, Some(target))
                .await
                .map(Confirmation::Spend),
            MutationRequest::Boost { target } => backend
                .spend(token, SpendKind::Boost, target)
                .await
                .map(Confirmation::Spend),
        };
        result.map_err(|e| SyncError::from(e).for_mutation())
    }

    /// Whether the pending record for this submit is still in the ledger.
    ///
    /// A reset (logout) while the call was in flight orphans it, and the
    /// late answer must not touch the new session.
    fn settle(&self, request: &MutationRequest, id: u64, state: MutationState, amount: TokenAmount) -> bool {
        let mut ledger = self.inner.ledger();
        match ledger.get_mut(&request.key()) {
            Some(record) if record.id == id => {
                record.state = state;
                record.amount = amount;
                true
            }
            _ => false,
        }
    }

    fn confirm(&self, request: &MutationRequest, speculation: &Speculation, confirmation: Confirmation) -> MutationOutcome {
        let actual = match confirmation {
            Confirmation::Reward(reward) => reward,
            // Spends always debit; missing amount means the nominal cost held
            Confirmation::Spend(receipt) => receipt.amount.map(|a| -a.abs()).unwrap_or(speculation.delta),
        };
        let correction = actual - speculation.delta;

        let balance = if self.settle(request, speculation.id, MutationState::Confirmed, actual) {
            self.inner.session.update(|state| {
                state.balance += correction;
                state.balance
            })
        } else {
            debug!("Mutation {} confirmed after reset, ignoring", speculation.id);
            self.inner.session.balance()
        };

        info!(
            "Mutation {} confirmed: {} on {:?}, amount {}",
            speculation.id,
            request.kind(),
            request.target(),
            actual
        );

        let bus = self.inner.session.bus();
        match *request {
            MutationRequest::Vote { target, polarity } => {
                bus.publish(SyncEvent::Voted {
                    target,
                    polarity,
                    reward: actual,
                });
            }
            MutationRequest::Unlock { target } => {
                bus.publish(SyncEvent::Unlocked { target });
            }
            MutationRequest::Boost { target } => {
                bus.publish(SyncEvent::Boosted { target });
            }
        }
        if correction != TokenAmount::ZERO {
            bus.publish(SyncEvent::BalanceChanged { balance });
        }

        MutationOutcome {
            id: speculation.id,
            kind: request.kind(),
            target: request.target(),
            amount: actual,
            balance,
        }
    }

    fn roll_back(&self, request: &MutationRequest, speculation: &Speculation, err: SyncError) -> SyncError {
        warn!(
            "Mutation {} failed, rolling back {} on {:?}: {}",
            speculation.id,
            request.kind(),
            request.target(),
            err
        );

        let bus = self.inner.session.bus();
        if self.settle(request, speculation.id, MutationState::RolledBack, TokenAmount::ZERO) {
            let balance = self.inner.session.update(|state| {
                match request {
                    MutationRequest::Vote { target, .. } => {
                        state.votes.remove(target);
                    }
                    MutationRequest::Unlock { target } => {
                        state.unlocked.remove(target);
                    }
                    MutationRequest::Boost { .. } => {}
                }
                state.balance -= speculation.delta;
                state.balance
            });
            bus.publish(SyncEvent::BalanceChanged { balance });
        }

        bus.publish(SyncEvent::MutationFailed {
            kind: request.kind(),
            target: request.target(),
            reason: err.user_reason(),
        });
        err
    }

    /// Seed a server-known vote so a repeat vote is rejected locally
    pub async fn load_vote_status(&self, target: u64) -> Result<VoteStatus> {
        let token = self.inner.session.token().ok_or(SyncError::NotAuthenticated)?;
        let status = self.inner.session.backend().vote_status(&token, target).await?;
        if !status.has_voted {
            return Ok(status);
        }

        let key = (MutationKind::Vote, Some(target));
        let mut ledger = self.inner.ledger();
        if ledger.get(&key).map(|r| r.state) == Some(MutationState::Pending) {
            // The in-flight submit settles it
            return Ok(status);
        }
        let polarity = status.vote_type;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        ledger.insert(
            key,
            MutationRecord {
                id,
                request: MutationRequest::Vote {
                    target,
                    polarity: polarity.unwrap_or(VotePolarity::Trust),
                },
                amount: TokenAmount::ZERO,
                state: MutationState::Confirmed,
            },
        );
        if let Some(polarity) = polarity {
            self.inner.session.update(|state| {
                state.votes.insert(target, polarity);
            });
        }
        Ok(status)
    }

    /// Server transaction ledger for the current session
    pub async fn history(&self) -> Result<Vec<Transaction>> {
        let token = self.inner.session.token().ok_or(SyncError::NotAuthenticated)?;
        Ok(self.inner.session.backend().transactions(&token).await?)
    }

    pub fn state_of(&self, kind: MutationKind, target: Option<u64>) -> Option<MutationState> {
        self.inner.ledger().get(&(kind, target)).map(|r| r.state)
    }

    /// Latest record per key, oldest first
    pub fn records(&self) -> Vec<MutationRecord> {
        let mut records: Vec<MutationRecord> = self.inner.ledger().values().cloned().collect();
        records.sort_by_key(|r| r.id);
        records
    }

    pub fn pending_count(&self) -> usize {
        self.inner
            .ledger()
            .values()
            .filter(|r| r.state == MutationState::Pending)
            .count()
    }

    /// Forget every record; in-flight answers are then ignored
    pub fn reset(&self) {
        let dropped = {
            let mut ledger = self.inner.ledger();
            let n = ledger.len();
            ledger.clear();
            n
        };
        debug!("Mutation ledger reset, {} records dropped", dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_keys() {
        let vote = MutationRequest::Vote {
            target: 4,
            polarity: VotePolarity::Fake,
        };
        assert_eq!(vote.key(), (MutationKind::Vote, Some(4)));
        assert_eq!(MutationRequest::Boost { target: None }.key(), (MutationKind::Boost, None));
        assert_eq!(MutationKind::Unlock.to_string(), "unlock");
    }
}

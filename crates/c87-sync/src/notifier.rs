//! Dashboard snapshot diff notifier
//!
//! Polls the signals dashboard on a fixed interval and compares each
//! snapshot with the one before it. The first successful poll only seeds
//! the baseline. After that, every poll emits at most one new-alert
//! notification (covering all alerts whose id was not in the previous
//! snapshot) and at most one transition notification per watched field.
//!
//! Only the immediately previous snapshot is consulted, so a field that
//! flips back to an earlier value notifies again. A failed poll leaves the
//! baseline as it was and the loop carries on.

use crate::error::Result;
use crate::events::{EventBus, SyncEvent};
use c87_api_client::{DashboardSnapshot, FeedBackend};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Singleton dashboard fields compared between polls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchedField {
    RiskBand,
    OnChainState,
    SmartMoneyBtc,
    SmartMoneyEth,
}

impl WatchedField {
    pub const ALL: [WatchedField; 4] = [
        WatchedField::RiskBand,
        WatchedField::OnChainState,
        WatchedField::SmartMoneyBtc,
        WatchedField::SmartMoneyEth,
    ];

    /// Current value of the field, if its record is present
    pub fn read(&self, snapshot: &DashboardSnapshot) -> Option<&'static str> {
        match self {
            WatchedField::RiskBand => snapshot.risk_band().map(|b| b.as_str()),
            WatchedField::OnChainState => snapshot.onchain.as_ref().map(|o| o.state.as_str()),
            WatchedField::SmartMoneyBtc => snapshot.smart_money_btc.as_ref().map(|s| s.band.as_str()),
            WatchedField::SmartMoneyEth => snapshot.smart_money_eth.as_ref().map(|s| s.band.as_str()),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WatchedField::RiskBand => "Risk level",
            WatchedField::OnChainState => "On-chain state",
            WatchedField::SmartMoneyBtc => "BTC smart money",
            WatchedField::SmartMoneyEth => "ETH smart money",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// User-facing notification derived from two consecutive snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Whale alerts not present in the previous snapshot
    NewAlerts { ids: Vec<u64> },
    /// A watched field changed value
    Transition {
        field: WatchedField,
        from: String,
        to: String,
    },
}

impl Notification {
    pub fn severity(&self) -> Severity {
        match self {
            Notification::NewAlerts { .. } => Severity::Info,
            Notification::Transition {
                field: WatchedField::RiskBand,
                to,
                ..
            } => match to.as_str() {
                "EXTREME" => Severity::Critical,
                "HIGH" => Severity::Warning,
                _ => Severity::Info,
            },
            Notification::Transition { .. } => Severity::Info,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Notification::NewAlerts { ids } if ids.len() == 1 => {
                format!("New whale alert (#{})", ids[0])
            }
            Notification::NewAlerts { ids } => format!("{} new whale alerts", ids.len()),
            Notification::Transition { field, from, to } => {
                format!("{}: {}→{}", field.label(), from, to)
            }
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Notifications implied by moving from `prev` to `curr`
pub fn diff_snapshots(prev: &DashboardSnapshot, curr: &DashboardSnapshot) -> Vec<Notification> {
    let mut notifications = Vec::new();

    let mut seen = HashSet::new();
    let new_ids: Vec<u64> = curr
        .whale_alerts
        .iter()
        .map(|alert| alert.id)
        .filter(|id| !prev.has_alert(*id) && seen.insert(*id))
        .collect();
    if !new_ids.is_empty() {
        notifications.push(Notification::NewAlerts { ids: new_ids });
    }

    for field in WatchedField::ALL {
        if let (Some(from), Some(to)) = (field.read(prev), field.read(curr)) {
            if from != to {
                notifications.push(Notification::Transition {
                    field,
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
        }
    }

    notifications
}

/// What a single poll did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// First snapshot stored as the baseline; nothing emitted
    Seeded,
    /// Compared against the baseline
    Diffed(Vec<Notification>),
    /// Another poll was still in flight
    Skipped,
}

impl PollOutcome {
    pub fn notifications(&self) -> &[Notification] {
        match self {
            PollOutcome::Diffed(n) => n,
            _ => &[],
        }
    }
}

struct NotifierInner {
    backend: Arc<dyn FeedBackend>,
    bus: EventBus,
    baseline: Mutex<Option<DashboardSnapshot>>,
    polling: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl NotifierInner {
    fn baseline(&self) -> MutexGuard<'_, Option<DashboardSnapshot>> {
        self.baseline.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct PollGuard<'a>(&'a AtomicBool);

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Cloneable handle to a shared notifier
#[derive(Clone)]
pub struct SnapshotNotifier {
    inner: Arc<NotifierInner>,
}

impl SnapshotNotifier {
    pub fn new(backend: Arc<dyn FeedBackend>, bus: EventBus) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(NotifierInner {
                backend,
                bus,
                baseline: Mutex::new(None),
                polling: AtomicBool::new(false),
                shutdown_tx,
            }),
        }
    }

    /// Last successfully fetched snapshot
    pub fn baseline(&self) -> Option<DashboardSnapshot> {
        self.inner.baseline().clone()
    }

    /// Fetch once, diff against the baseline and publish the results
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        if self.inner.polling.swap(true, Ordering::AcqRel) {
            debug!("Dashboard poll already in flight, skipping");
            return Ok(PollOutcome::Skipped);
        }
        let _guard = PollGuard(&self.inner.polling);

        let snapshot = match self.inner.backend.dashboard_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Dashboard poll failed, keeping previous snapshot: {}", e);
                return Err(e.into());
            }
        };

        let notifications = {
            let mut baseline = self.inner.baseline();
            let outcome = match baseline.as_ref() {
                None => None,
                Some(prev) => Some(diff_snapshots(prev, &snapshot)),
            };
            *baseline = Some(snapshot);
            outcome
        };

        let Some(notifications) = notifications else {
            info!("Dashboard baseline seeded");
            return Ok(PollOutcome::Seeded);
        };

        for notification in &notifications {
            info!("Dashboard notification: {}", notification);
            self.inner
                .bus
                .publish(SyncEvent::Notification(notification.clone()));
        }
        Ok(PollOutcome::Diffed(notifications))
    }

    /// Receiver that fires on [`shutdown`](Self::shutdown).
    ///
    /// Take it before spawning [`run`](Self::run); a signal sent before the
    /// receiver exists is not delivered.
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.inner.shutdown_tx.subscribe()
    }

    /// Poll every `interval` until `shutdown` fires.
    ///
    /// The first poll runs immediately to seed the baseline.
    pub async fn run(&self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Dashboard notifier shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    // Errors are logged in poll_once; the next tick retries
                    let _ = self.poll_once().await;
                }
            }
        }
    }

    /// Stop loops started with a [`shutdown_signal`](Self::shutdown_signal) receiver
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown_tx.send(());
    }
}

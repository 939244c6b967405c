//! Wiring of the sync components around one backend and one bus

use crate::config::SyncConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::feed::FeedPaginator;
use crate::mutation::MutationEngine;
use crate::notifier::SnapshotNotifier;
use crate::session::{SessionSnapshot, SessionStore};
use crate::trends::TrendSelector;
use crate::watchlist::WatchlistEditor;
use c87_api_client::{ApiClient, ApiKey, FeedBackend};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

/// Every sync component, sharing one session and one event bus
#[derive(Clone)]
pub struct SyncRuntime {
    pub bus: EventBus,
    pub session: SessionStore,
    pub feed: FeedPaginator,
    pub mutations: MutationEngine,
    pub watchlist: WatchlistEditor,
    pub notifier: SnapshotNotifier,
    pub trends: TrendSelector,
    config: SyncConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl SyncRuntime {
    /// Build against an arbitrary backend
    pub fn with_backend(config: SyncConfig, backend: Arc<dyn FeedBackend>) -> Self {
        let bus = EventBus::new();
        let session = SessionStore::new(
            Arc::clone(&backend),
            bus.clone(),
            config.economy.paywall_enabled,
        );
        if let Some(key) = config.api.api_key.as_deref() {
            session.set_token(ApiKey::new(key));
        }

        let feed = FeedPaginator::new(session.clone(), config.feed.page_size, config.feed.source);
        feed.attach();

        let mutations = MutationEngine::new(session.clone(), config.economy.clone());
        let watchlist = WatchlistEditor::new(session.clone());
        let notifier = SnapshotNotifier::new(Arc::clone(&backend), bus.clone());
        let trends = TrendSelector::new(backend, bus.clone());
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            bus,
            session,
            feed,
            mutations,
            watchlist,
            notifier,
            trends,
            config,
            shutdown_tx,
        }
    }

    /// Build against the HTTP API described by `config.api`
    pub fn connect(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        let client = ApiClient::new(config.api.client_config())?;
        info!("Sync runtime using {}", config.api.base_url);
        Ok(Self::with_backend(config, Arc::new(client)))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Spawn the feed refresh and dashboard poll loops
    pub fn spawn_background(&self) -> Vec<JoinHandle<()>> {
        let feed = self.feed.clone();
        let refresh_interval = self.config.feed.refresh_interval();
        let feed_shutdown = self.shutdown_tx.subscribe();
        let refresh = tokio::spawn(async move {
            feed.run_refresh_loop(refresh_interval, feed_shutdown).await;
        });

        let notifier = self.notifier.clone();
        let poll_interval = self.config.notifier.poll_interval();
        let notifier_shutdown = self.shutdown_tx.subscribe();
        let poll = tokio::spawn(async move {
            notifier.run(poll_interval, notifier_shutdown).await;
        });

        vec![refresh, poll]
    }

    /// Stop every background loop
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        self.notifier.shutdown();
    }

    /// Log in and forget mutation records from the previous session.
    ///
    /// A failed login leaves the old session and its pending records alone.
    pub async fn login(&self, email: &str) -> Result<SessionSnapshot> {
        let snapshot = self.session.login(email).await?;
        self.mutations.reset();
        self.watchlist.reset();
        Ok(snapshot)
    }

    pub fn logout(&self) {
        self.mutations.reset();
        self.watchlist.reset();
        self.session.logout();
    }
}

//! Trending narrative selection
//!
//! Keeps the top narratives and the single active tag. Selecting a tag
//! publishes `TagFilterChanged`; the paginator picks it up from the bus.

use crate::error::Result;
use crate::events::{EventBus, SyncEvent};
use c87_api_client::{FeedBackend, Narrative};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Narratives kept after a refresh
pub const MAX_NARRATIVES: usize = 10;

#[derive(Default)]
struct TrendState {
    narratives: Vec<Narrative>,
    selected: Option<String>,
}

struct TrendInner {
    backend: Arc<dyn FeedBackend>,
    bus: EventBus,
    state: Mutex<TrendState>,
}

#[derive(Clone)]
pub struct TrendSelector {
    inner: Arc<TrendInner>,
}

impl TrendSelector {
    pub fn new(backend: Arc<dyn FeedBackend>, bus: EventBus) -> Self {
        Self {
            inner: Arc::new(TrendInner {
                backend,
                bus,
                state: Mutex::new(TrendState::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TrendState> {
        self.inner.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Re-fetch narratives, keeping the server's order
    pub async fn refresh(&self) -> Result<Vec<Narrative>> {
        let mut narratives = self.inner.backend.narratives().await?;
        narratives.truncate(MAX_NARRATIVES);
        debug!("Loaded {} trending narratives", narratives.len());
        self.state().narratives = narratives.clone();
        Ok(narratives)
    }

    pub fn narratives(&self) -> Vec<Narrative> {
        self.state().narratives.clone()
    }

    pub fn selected(&self) -> Option<String> {
        self.state().selected.clone()
    }

    /// Select `tag`, or clear the selection if it is already selected
    pub fn toggle(&self, tag: &str) -> Option<String> {
        let selected = {
            let mut state = self.state();
            state.selected = match state.selected.as_deref() {
                Some(current) if current == tag => None,
                _ => Some(tag.to_string()),
            };
            state.selected.clone()
        };
        self.inner.bus.publish(SyncEvent::TagFilterChanged {
            tag: selected.clone(),
        });
        selected
    }

    pub fn clear(&self) {
        let had_selection = self.state().selected.take().is_some();
        if had_selection {
            self.inner.bus.publish(SyncEvent::TagFilterChanged { tag: None });
        }
    }
}

//! Infinite feed paginator
//!
//! Fetches pages of the news feed, merges them into one deduplicated view,
//! and applies the client-side filters. Page loads and the background
//! first-page refresh share a single fetch slot, so at most one feed request
//! is outstanding at any time; a trigger that finds the slot taken is
//! dropped rather than queued.
//!
//! # View composition
//!
//! [`FeedPaginator::current_view`] walks refresh-surfaced items, then every
//! page in fetch order, and applies:
//!
//! 1. id dedup, first occurrence wins
//! 2. the analyzable-content filter (items without a real summary are dropped)
//! 3. the active tag filter, if any
//!
//! Filtering never reorders.
//!
//! # Sources
//!
//! The paginator walks one [`FeedSource`] at a time. Switching source, or a
//! saved watchlist edit while a personalized source is active, drops every
//! loaded page; a fetch still in flight for the old listing is discarded
//! when it returns.

use crate::error::Result;
use crate::events::{SyncEvent, Topic};
use crate::session::SessionStore;
use c87_api_client::{ApiError, Cursor, FeedItem, FeedSource, Page};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Result of a page load or refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Page merged; `new_items` counts ids not seen before
    Loaded { new_items: usize, reached_end: bool },
    /// End of stream already reached; nothing fetched
    ReachedEnd,
    /// Another fetch holds the slot; nothing fetched
    Busy,
    /// Response could not be decoded and was treated as an empty page
    Discarded { reason: String },
    /// The listing was restarted while the request was in flight
    Superseded,
}

/// Deduplicated, filtered feed ready to render
#[derive(Debug, Clone, PartialEq)]
pub struct FeedView {
    pub items: Vec<FeedItem>,
    pub reached_end: bool,
    pub loading: bool,
    pub tag_filter: Option<String>,
    pub source: FeedSource,
}

impl FeedView {
    pub fn visible_count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Default)]
struct FeedState {
    /// Items first surfaced by a refresh, newest refresh first
    head: Vec<FeedItem>,
    pages: Vec<Page>,
    next_cursor: Cursor,
    reached_end: bool,
    in_flight: bool,
    tag_filter: Option<String>,
    source: FeedSource,
    /// Bumped on every restart; fetches from an older generation are dropped
    generation: u64,
}

impl FeedState {
    fn known_ids(&self) -> HashSet<u64> {
        self.head
            .iter()
            .chain(self.pages.iter().flat_map(|p| p.items.iter()))
            .map(|item| item.id)
            .collect()
    }

    /// Replace the payload of the first occurrence of `item.id`
    fn supersede(&mut self, item: &FeedItem) -> bool {
        let slot = self
            .head
            .iter_mut()
            .chain(self.pages.iter_mut().flat_map(|p| p.items.iter_mut()))
            .find(|existing| existing.id == item.id);

        match slot {
            Some(existing) => {
                *existing = item.clone();
                true
            }
            None => false,
        }
    }

    /// Forget every loaded page and start over from the first one
    fn restart(&mut self) {
        self.head.clear();
        self.pages.clear();
        self.next_cursor = Cursor::start();
        self.reached_end = false;
        self.generation += 1;
    }

    fn view(&self) -> FeedView {
        FeedView {
            items: compose_view(&self.head, &self.pages, self.tag_filter.as_deref()),
            reached_end: self.reached_end,
            loading: self.in_flight,
            tag_filter: self.tag_filter.clone(),
            source: self.source,
        }
    }
}

/// Dedup, then content filter, then tag filter, preserving fetch order
pub fn compose_view(head: &[FeedItem], pages: &[Page], tag_filter: Option<&str>) -> Vec<FeedItem> {
    let mut seen = HashSet::new();
    head.iter()
        .chain(pages.iter().flat_map(|p| p.items.iter()))
        .filter(|item| seen.insert(item.id))
        .filter(|item| item.has_summary())
        .filter(|item| tag_filter.map_or(true, |tag| item.has_tag(tag)))
        .cloned()
        .collect()
}

struct FeedInner {
    state: Mutex<FeedState>,
    session: SessionStore,
    page_size: usize,
}

impl FeedInner {
    fn state(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Holds the single fetch slot; frees it if the fetch future is dropped
struct FetchSlot {
    inner: Arc<FeedInner>,
    armed: bool,
}

impl FetchSlot {
    /// Claim the slot, or `None` if a fetch is already outstanding
    fn claim(inner: &Arc<FeedInner>, state: &mut FeedState) -> Option<Self> {
        if state.in_flight {
            return None;
        }
        state.in_flight = true;
        Some(Self {
            inner: Arc::clone(inner),
            armed: true,
        })
    }

    fn release(mut self, state: &mut FeedState) {
        state.in_flight = false;
        self.armed = false;
    }
}

impl Drop for FetchSlot {
    fn drop(&mut self) {
        if self.armed {
            self.inner.state().in_flight = false;
        }
    }
}

/// Cloneable handle to a shared paginator
#[derive(Clone)]
pub struct FeedPaginator {
    inner: Arc<FeedInner>,
}

impl FeedPaginator {
    /// The session supplies the backend, the bus and the key for
    /// personalized sources
    pub fn new(session: SessionStore, page_size: usize, source: FeedSource) -> Self {
        Self {
            inner: Arc::new(FeedInner {
                state: Mutex::new(FeedState {
                    source,
                    ..Default::default()
                }),
                session,
                page_size: page_size.max(1),
            }),
        }
    }

    /// Follow `TagFilterChanged` and `WatchlistSaved` events from the bus
    pub fn attach(&self) {
        let bus = self.inner.session.bus();

        let weak: Weak<FeedInner> = Arc::downgrade(&self.inner);
        bus.subscribe(Topic::TagFilterChanged, move |event| {
            if let (Some(inner), SyncEvent::TagFilterChanged { tag }) = (weak.upgrade(), event) {
                FeedPaginator { inner }.set_tag_filter(tag.clone());
            }
            Ok(())
        });

        let weak: Weak<FeedInner> = Arc::downgrade(&self.inner);
        bus.subscribe(Topic::WatchlistSaved, move |_| {
            if let Some(inner) = weak.upgrade() {
                FeedPaginator { inner }.restart_personalized();
            }
            Ok(())
        });
    }

    pub fn page_size(&self) -> usize {
        self.inner.page_size
    }

    pub fn current_view(&self) -> FeedView {
        self.inner.state().view()
    }

    pub fn reached_end(&self) -> bool {
        self.inner.state().reached_end
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state().in_flight
    }

    pub fn page_count(&self) -> usize {
        self.inner.state().pages.len()
    }

    pub fn tag_filter(&self) -> Option<String> {
        self.inner.state().tag_filter.clone()
    }

    pub fn source(&self) -> FeedSource {
        self.inner.state().source
    }

    /// Switch to another listing; loaded pages are dropped when it changes
    pub fn set_source(&self, source: FeedSource) -> bool {
        let changed = {
            let mut state = self.inner.state();
            if state.source == source {
                false
            } else {
                info!("Feed source: {} -> {}", state.source.as_str(), source.as_str());
                state.source = source;
                state.restart();
                true
            }
        };
        if changed {
            self.announce();
        }
        changed
    }

    /// The ranking of a personalized listing follows the saved watchlist
    fn restart_personalized(&self) {
        let restarted = {
            let mut state = self.inner.state();
            if state.source.is_personalized() {
                debug!("Watchlist saved, restarting {} feed", state.source.as_str());
                state.restart();
                true
            } else {
                false
            }
        };
        if restarted {
            self.announce();
        }
    }

    /// Set or clear the single active tag filter
    pub fn set_tag_filter(&self, tag: Option<String>) {
        let changed = {
            let mut state = self.inner.state();
            if state.tag_filter == tag {
                false
            } else {
                debug!("Feed tag filter: {:?}", tag);
                state.tag_filter = tag;
                true
            }
        };
        if changed {
            self.announce();
        }
    }

    fn announce(&self) {
        let (visible, reached_end) = {
            let state = self.inner.state();
            (state.view().visible_count(), state.reached_end)
        };
        self.inner.session.bus().publish(SyncEvent::FeedUpdated {
            visible,
            reached_end,
        });
    }

    async fn fetch(&self, source: FeedSource, cursor: Cursor) -> c87_api_client::Result<Vec<FeedItem>> {
        let backend = self.inner.session.backend();
        let limit = self.inner.page_size;
        if source.is_personalized() {
            let token = self.inner.session.token();
            backend
                .fetch_personalized_feed(token.as_ref(), source, cursor, limit)
                .await
        } else {
            backend.fetch_feed(cursor, limit).await
        }
    }

    /// Fetch the page after the last loaded one
    pub async fn load_next_page(&self) -> Result<LoadOutcome> {
        let (slot, cursor, source, generation) = {
            let mut state = self.inner.state();
            if state.reached_end {
                return Ok(LoadOutcome::ReachedEnd);
            }
            match FetchSlot::claim(&self.inner, &mut state) {
                Some(slot) => (slot, state.next_cursor, state.source, state.generation),
                None => {
                    debug!("Feed fetch already in flight, dropping page load");
                    return Ok(LoadOutcome::Busy);
                }
            }
        };

        let fetched = self.fetch(source, cursor).await;

        let outcome = {
            let mut state = self.inner.state();
            slot.release(&mut state);
            if state.generation != generation {
                debug!("Feed restarted during page load at {:?}, dropping result", cursor);
                return Ok(LoadOutcome::Superseded);
            }
            match fetched {
                Ok(items) => self.merge_page(&mut state, cursor, items),
                Err(ApiError::Malformed(reason)) => {
                    warn!("Discarding malformed feed page at {:?}: {}", cursor, reason);
                    LoadOutcome::Discarded { reason }
                }
                Err(e) => {
                    warn!("Feed page at {:?} failed: {}", cursor, e);
                    return Err(e.into());
                }
            }
        };

        self.announce();
        Ok(outcome)
    }

    fn merge_page(&self, state: &mut FeedState, cursor: Cursor, items: Vec<FeedItem>) -> LoadOutcome {
        let known = state.known_ids();
        let new_items = items.iter().filter(|i| !known.contains(&i.id)).count();

        if items.is_empty() {
            state.reached_end = true;
        } else {
            let page = Page::new(cursor, items);
            if page.is_terminal(self.inner.page_size) {
                state.reached_end = true;
            }
            state.next_cursor = page.next_cursor;
            state.pages.push(page);
        }

        if state.reached_end {
            info!("Feed reached end after {} pages", state.pages.len());
        }
        LoadOutcome::Loaded {
            new_items,
            reached_end: state.reached_end,
        }
    }

    /// Re-request the first page and merge it.
    ///
    /// Known ids keep their position with the newer payload; unknown ids
    /// surface at the head. Never marks the end of the stream, and reopens
    /// pagination when new items turn up after the end was reached.
    pub async fn refresh(&self) -> Result<LoadOutcome> {
        let slot = {
            let mut state = self.inner.state();
            if state.pages.is_empty() && state.head.is_empty() {
                None
            } else {
                match FetchSlot::claim(&self.inner, &mut state) {
                    Some(slot) => Some((slot, state.source, state.generation)),
                    None => {
                        debug!("Feed fetch already in flight, dropping refresh");
                        return Ok(LoadOutcome::Busy);
                    }
                }
            }
        };

        let Some((slot, source, generation)) = slot else {
            // Nothing loaded yet: behave like the first page load
            {
                let mut state = self.inner.state();
                if !state.in_flight {
                    state.reached_end = false;
                    state.next_cursor = Cursor::start();
                }
            }
            return self.load_next_page().await;
        };

        let fetched = self.fetch(source, Cursor::start()).await;

        let outcome = {
            let mut state = self.inner.state();
            slot.release(&mut state);
            if state.generation != generation {
                debug!("Feed restarted during refresh, dropping result");
                return Ok(LoadOutcome::Superseded);
            }
            match fetched {
                Ok(items) => Self::merge_refresh(&mut state, items),
                Err(ApiError::Malformed(reason)) => {
                    warn!("Discarding malformed refresh page: {}", reason);
                    LoadOutcome::Discarded { reason }
                }
                Err(e) => {
                    warn!("Feed refresh failed: {}", e);
                    return Err(e.into());
                }
            }
        };

        self.announce();
        Ok(outcome)
    }

    fn merge_refresh(state: &mut FeedState, items: Vec<FeedItem>) -> LoadOutcome {
        let mut fresh = Vec::new();
        let mut fresh_ids = HashSet::new();
        for item in items {
            if state.supersede(&item) {
                continue;
            }
            if fresh_ids.insert(item.id) {
                fresh.push(item);
            }
        }

        let new_items = fresh.len();
        if new_items > 0 {
            fresh.append(&mut state.head);
            state.head = fresh;

            if state.reached_end {
                info!("Refresh found {} new items, reopening pagination", new_items);
                state.reached_end = false;
            }
        }

        LoadOutcome::Loaded {
            new_items,
            reached_end: state.reached_end,
        }
    }

    /// Refresh the first page every `interval` until `shutdown` fires
    pub async fn run_refresh_loop(&self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Feed refresh loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.refresh().await {
                        Ok(LoadOutcome::Loaded { new_items, .. }) if new_items > 0 => {
                            info!("Feed refresh surfaced {} new items", new_items);
                        }
                        Ok(outcome) => debug!("Feed refresh: {:?}", outcome),
                        Err(e) => warn!("Feed refresh failed, retrying next tick: {}", e),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item(id: u64, summary: Option<&str>, tags: &[&str]) -> FeedItem {
        FeedItem {
            id,
            title: format!("Item {}", id),
            url: None,
            published_at: Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            topic_category: None,
            image_url: None,
            summary: summary.map(str::to_string),
            sentiment_label: None,
            coins_mentioned: Vec::new(),
            risk_level: None,
            enhanced_trust_score: None,
            trust_breakdown: None,
        }
    }

    #[test]
    fn test_filter_composition() {
        let page = Page::new(
            Cursor::start(),
            vec![
                item(1, Some("ETF inflows"), &["ETF"]),
                item(2, None, &["ETF"]),
                item(3, Some("Staking update"), &["DeFi"]),
                item(4, Some("AI Summary not available yet."), &["ETF"]),
                item(5, Some("ETF outflows"), &["ETF", "Macro"]),
            ],
        );

        let view = compose_view(&[], &[page], Some("ETF"));
        let ids: Vec<u64> = view.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 5]);
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let first = Page::new(Cursor::start(), vec![item(1, Some("a"), &[]), item(2, Some("first"), &[])]);
        let second = Page::new(
            Cursor::start().advance(2),
            vec![item(2, Some("second"), &[]), item(3, Some("c"), &[])],
        );

        let view = compose_view(&[], &[first, second], None);
        let ids: Vec<u64> = view.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(view[1].summary.as_deref(), Some("first"));
    }

    #[test]
    fn test_dedup_runs_before_content_filter() {
        let first = Page::new(Cursor::start(), vec![item(1, None, &[])]);
        let second = Page::new(Cursor::start().advance(1), vec![item(1, Some("later"), &[])]);

        assert!(compose_view(&[], &[first, second], None).is_empty());
    }

    #[test]
    fn test_head_items_come_first() {
        let head = vec![item(9, Some("breaking"), &[])];
        let page = Page::new(Cursor::start(), vec![item(1, Some("a"), &[])]);

        let ids: Vec<u64> = compose_view(&head, &[page], None).iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![9, 1]);
    }
}

use futures::stream::{Stream, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

use super::feed::{mark_feeds_read, Feed};
use super::item::ItemRef;
use super::refresh::{refresh, FeedResult};
use crate::config::Subscriptions;
use crate::feed::FeedSource;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ListError {
    #[error("No feeds in list")]
    NoFeedsInList,

    #[error("No category given")]
    NoCategoryGiven,

    #[error("No bookmark feed found")]
    NoBookmarkFeed,

    #[error("Invalid subscriptions: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// List
// ============================================================================

/// Every subscribed feed, the Bookmarks pseudo-feed and the lookup indices
/// over them.
///
/// Indices are only rebuilt by `List` methods. After anything that replaces
/// items wholesale (a restore, a prune) call [`List::reindex`] before trusting
/// [`List::item`]; the methods here already do so.
#[derive(Debug, Default)]
pub struct List {
    pub(super) feeds: Vec<Feed>,
    pub(super) bookmarks: Option<Feed>,
    url_index: HashMap<String, usize>,
    category_index: BTreeMap<String, Vec<usize>>,
    item_index: HashMap<String, ItemRef>,
    pub(super) ts: i64,
}

impl List {
    /// An empty list with its Bookmarks pseudo-feed in place.
    pub fn new() -> Self {
        Self {
            bookmarks: Some(Feed::bookmarks()),
            ..Self::default()
        }
    }

    // ========================================================================
    // Feeds
    // ========================================================================

    /// Adds a feed unless one with the same URL and category is already
    /// present. A Bookmarks pseudo-feed replaces the current one instead.
    pub fn add(&mut self, feed: Feed) -> bool {
        if feed.is_bookmarks() {
            self.bookmarks = Some(feed);
            return true;
        }
        if self.contains_feed(feed.category(), feed.url()) {
            return false;
        }

        let idx = self.feeds.len();
        self.feeds.push(feed);
        self.index_feed(idx);
        true
    }

    fn contains_feed(&self, category: &str, url: &str) -> bool {
        self.feeds
            .iter()
            .any(|f| f.url() == url && f.category() == category)
    }

    fn index_feed(&mut self, idx: usize) {
        let feed = &self.feeds[idx];
        self.url_index.entry(feed.url().to_owned()).or_insert(idx);
        if !feed.category().is_empty() {
            self.category_index
                .entry(feed.category().to_owned())
                .or_default()
                .push(idx);
        }
    }

    fn rebuild_feed_indices(&mut self) {
        self.url_index.clear();
        self.category_index.clear();
        for idx in 0..self.feeds.len() {
            self.index_feed(idx);
        }
    }

    pub fn feeds(&self) -> &[Feed] {
        &self.feeds
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// The first feed registered under `url`.
    pub fn feed(&self, url: &str) -> Option<&Feed> {
        self.url_index.get(url).map(|&i| &self.feeds[i])
    }

    pub fn feed_mut(&mut self, url: &str) -> Option<&mut Feed> {
        let idx = *self.url_index.get(url)?;
        self.feeds.get_mut(idx)
    }

    /// Category labels in alphabetical order.
    pub fn categories(&self) -> Vec<&str> {
        self.category_index.keys().map(String::as_str).collect()
    }

    /// Feeds filed under `label`, in registration order. An unknown label
    /// yields no feeds.
    pub fn get_category(&self, label: &str) -> Result<Vec<&Feed>, ListError> {
        if label.is_empty() {
            return Err(ListError::NoCategoryGiven);
        }
        Ok(self
            .category_index
            .get(label)
            .map(|ids| ids.iter().map(|&i| &self.feeds[i]).collect())
            .unwrap_or_default())
    }

    /// List-level logical timestamp, stamped on every save.
    pub fn ts(&self) -> i64 {
        self.ts
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Parses a `category = [urls]` document and adds every feed not already
    /// present. Nothing is added when the document is malformed.
    ///
    /// Returns the number of feeds added.
    pub fn load_from_configuration(&mut self, source: &str) -> Result<usize, ListError> {
        let subscriptions = Subscriptions::parse(source)?;
        Ok(self.apply_subscriptions(&subscriptions))
    }

    /// Adds a feed for every subscribed URL and category pair not yet present.
    pub fn apply_subscriptions(&mut self, subscriptions: &Subscriptions) -> usize {
        let mut added = 0;
        for (category, url) in subscriptions.iter() {
            if self.add(Feed::new(url, category)) {
                added += 1;
            }
        }
        tracing::info!(
            added = added,
            feeds = self.feeds.len(),
            categories = self.category_index.len(),
            "Applied subscriptions"
        );
        added
    }

    /// Drops every feed whose URL and category pair is no longer subscribed.
    ///
    /// Returns the number of feeds removed.
    pub fn prune_to(&mut self, subscriptions: &Subscriptions) -> usize {
        let before = self.feeds.len();
        self.feeds
            .retain(|f| subscriptions.contains(f.category(), f.url()));
        let removed = before - self.feeds.len();

        if removed > 0 {
            tracing::info!(removed = removed, "Pruned unsubscribed feeds");
            self.rebuild_feed_indices();
            self.rebuild_bookmarks();
            self.reindex();
        }
        removed
    }

    // ========================================================================
    // Items
    // ========================================================================

    /// Rebuilds the identity index from every feed's items. When two feeds
    /// carry the same key, the first feed wins.
    pub fn reindex(&mut self) {
        self.item_index.clear();
        for feed in &self.feeds {
            for item in feed.items() {
                self.item_index
                    .entry(item.key().to_owned())
                    .or_insert_with(|| item.clone());
            }
        }
        tracing::debug!(items = self.item_index.len(), "Rebuilt item index");
    }

    /// Looks an item up by identity key.
    pub fn item(&self, key: &str) -> Option<&ItemRef> {
        self.item_index.get(key)
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemRef> {
        self.item_index.values()
    }

    pub fn mark_all_read(&self) {
        mark_feeds_read(&self.feeds);
    }

    pub fn mark_category_read(&self, label: &str) -> Result<(), ListError> {
        mark_feeds_read(self.get_category(label)?);
        Ok(())
    }

    // ========================================================================
    // Bookmarks
    // ========================================================================

    pub fn bookmarks_feed(&self) -> Option<&Feed> {
        self.bookmarks.as_ref()
    }

    /// Flips the item's bookmark and keeps the Bookmarks feed in step.
    /// Returns whether the item ended up bookmarked.
    pub fn toggle_bookmark(&mut self, item: &ItemRef) -> Result<bool, ListError> {
        let bookmarked = !item.is_bookmarked();
        self.set_bookmark(item, bookmarked)?;
        Ok(bookmarked)
    }

    /// Sets the item's bookmark to `value`, adding it to or removing it from
    /// the Bookmarks feed by identity key.
    pub fn set_bookmark(&mut self, item: &ItemRef, value: bool) -> Result<(), ListError> {
        let bookmarks = self.bookmarks.as_mut().ok_or(ListError::NoBookmarkFeed)?;
        item.set_bookmark(value);
        if value {
            if !bookmarks.contains(item.key()) {
                bookmarks.push_item(item.clone());
            }
        } else {
            bookmarks.remove_item(item.key());
        }
        Ok(())
    }

    /// Refills the Bookmarks feed from the bookmark flags of every feed's
    /// items.
    pub fn rebuild_bookmarks(&mut self) {
        let Some(bookmarks) = self.bookmarks.as_mut() else {
            return;
        };
        bookmarks.clear_items();

        let mut seen = HashSet::new();
        for item in self.feeds.iter().flat_map(|f| f.items()) {
            if item.is_bookmarked() && seen.insert(item.key().to_owned()) {
                bookmarks.push_item(item.clone());
            }
        }
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Refreshes every subscribed feed. See [`refresh`] for the stream
    /// contract.
    pub fn refresh_all<'a, S>(
        &'a mut self,
        source: &'a S,
    ) -> Result<impl Stream<Item = FeedResult> + 'a, ListError>
    where
        S: FeedSource + ?Sized + 'a,
    {
        refresh(self.feeds.iter_mut().collect(), source)
    }

    /// Refreshes only the feeds filed under `label`.
    pub fn refresh_category<'a, S>(
        &'a mut self,
        label: &str,
        source: &'a S,
    ) -> Result<impl Stream<Item = FeedResult> + 'a, ListError>
    where
        S: FeedSource + ?Sized + 'a,
    {
        if label.is_empty() {
            return Err(ListError::NoCategoryGiven);
        }
        let wanted: HashSet<usize> = self
            .category_index
            .get(label)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();

        let feeds = self
            .feeds
            .iter_mut()
            .enumerate()
            .filter(|(i, _)| wanted.contains(i))
            .map(|(_, f)| f)
            .collect();
        refresh(feeds, source)
    }

    /// Refreshes every feed, logs each outcome and reindexes.
    pub async fn update_all<S>(&mut self, source: &S) -> Result<Vec<FeedResult>, ListError>
    where
        S: FeedSource + ?Sized,
    {
        let results: Vec<FeedResult> = self.refresh_all(source)?.collect().await;

        for r in &results {
            match &r.result {
                Ok(added) => tracing::info!(feed = %r.url, added = added, "Updated feed"),
                Err(e) => tracing::warn!(feed = %r.url, error = %e, "Feed not updated"),
            }
        }

        self.reindex();
        Ok(results)
    }
}

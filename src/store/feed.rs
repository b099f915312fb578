use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use super::item::{ItemRef, ItemRecord};
use super::merge::merge;
use crate::feed::{FeedDocument, FeedSource, FetchError};
use crate::util::clean;

/// Source URL of the reserved Bookmarks pseudo-feed.
pub const BOOKMARKS_URL: &str = "Bookmarks";

/// Summary shown for a feed that has never been fetched.
pub const MSG_FEED_NOT_LOADED: &str = "Feed not loaded yet. Refresh to fetch it.";

/// Minimum interval between two refresh attempts on the same feed.
pub const REFRESH_COOLDOWN: Duration = Duration::from_secs(5);

const UNREAD_MARKER: &str = "+ ";

/// Why a single feed could not be refreshed.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The feed has no source to fetch (empty URL or the Bookmarks pseudo-feed).
    #[error("Feed has no URL")]
    NoUrl,
    /// A refresh was attempted within the cooldown window.
    #[error("{}s cooldown", REFRESH_COOLDOWN.as_secs())]
    Cooldown,
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedKind {
    Remote,
    Bookmarks,
}

/// One subscribed source and the items merged from it so far.
///
/// Items are kept newest first by [`Item::timestamp`](super::Item::timestamp);
/// items without any timestamp trail the rest in first-seen order.
#[derive(Debug)]
pub struct Feed {
    url: String,
    category: String,
    kind: FeedKind,
    error: String,
    document: Option<FeedDocument>,
    items: Vec<ItemRef>,
    last_attempt: Option<Instant>,
}

impl Feed {
    pub fn new(url: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            category: category.into(),
            kind: FeedKind::Remote,
            error: String::new(),
            document: None,
            items: Vec::new(),
            last_attempt: None,
        }
    }

    /// The category-less, never-fetched container for bookmarked items.
    pub fn bookmarks() -> Self {
        Self {
            kind: FeedKind::Bookmarks,
            ..Self::new(BOOKMARKS_URL, "")
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn is_bookmarks(&self) -> bool {
        self.kind == FeedKind::Bookmarks
    }

    /// Message of the last failed fetch; empty when healthy.
    pub fn error(&self) -> &str {
        &self.error
    }

    pub fn document(&self) -> Option<&FeedDocument> {
        self.document.as_ref()
    }

    pub fn items(&self) -> &[ItemRef] {
        &self.items
    }

    pub fn item(&self, key: &str) -> Option<&ItemRef> {
        self.items.iter().find(|i| i.key() == key)
    }

    /// Fetches the source, merges unseen entries and re-sorts.
    ///
    /// On failure the error message is stored on the feed and returned; items
    /// merged by earlier refreshes are left as they were. Returns the number of
    /// new items.
    pub async fn refresh<S>(&mut self, source: &S) -> Result<usize, RefreshError>
    where
        S: FeedSource + ?Sized,
    {
        if self.url.is_empty() || self.is_bookmarks() {
            return Err(RefreshError::NoUrl);
        }

        let mut document = match source.fetch(&self.url).await {
            Ok(doc) => doc,
            Err(e) => {
                self.error = e.to_string();
                return Err(e.into());
            }
        };

        self.error.clear();
        document.title = clean(&document.title);
        document.description = clean(&document.description);

        let added = merge(&mut self.items, &document.entries);
        self.sort_by_date();
        // Entries now live on as items; keep only the feed metadata.
        document.entries.clear();
        self.document = Some(document);

        tracing::debug!(feed = %self.url, added = added, total = self.items.len(), "Merged feed");
        Ok(added)
    }

    /// Whether a refresh attempted at `now` falls inside the cooldown window.
    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.last_attempt
            .is_some_and(|t| now.saturating_duration_since(t) < REFRESH_COOLDOWN)
    }

    /// Records a refresh attempt starting at `now`.
    pub fn mark_attempt(&mut self, now: Instant) {
        self.last_attempt = Some(now);
    }

    /// Newest first; untimestamped items last. The sort is stable.
    pub fn sort_by_date(&mut self) {
        self.items
            .sort_by(|a, b| match (a.timestamp(), b.timestamp()) {
                (Some(ta), Some(tb)) => tb.cmp(&ta),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            });
    }

    pub fn has_unread(&self) -> bool {
        self.items.iter().any(|i| !i.is_read())
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|i| !i.is_read()).count()
    }

    pub fn mark_all_read(&self) {
        for item in &self.items {
            item.mark_read();
        }
    }

    /// Source title (or URL when untitled), prefixed with `+ ` while anything is unread.
    pub fn display_title(&self) -> String {
        let title = match &self.document {
            Some(doc) if !doc.title.is_empty() => doc.title.as_str(),
            _ => self.url.as_str(),
        };
        if self.has_unread() {
            format!("{UNREAD_MARKER}{title}")
        } else {
            title.to_owned()
        }
    }

    /// One-line status for the feed: the last error, else the newest unread
    /// title, else the newest title, else the source description, else a
    /// not-loaded placeholder.
    pub fn latest_summary(&self) -> String {
        if !self.error.is_empty() {
            return self.error.clone();
        }
        if let Some(item) = self.items.iter().find(|i| !i.is_read()) {
            return item.title.clone();
        }
        if let Some(item) = self.items.first() {
            return item.title.clone();
        }
        if let Some(doc) = &self.document {
            return doc.description.clone();
        }
        MSG_FEED_NOT_LOADED.to_owned()
    }

    /// Site link of the feed, falling back to its self link and then the
    /// source URL.
    pub fn link(&self) -> Result<url::Url, url::ParseError> {
        let raw = match &self.document {
            Some(doc) if !doc.link.is_empty() => doc.link.as_str(),
            Some(doc) if !doc.feed_link.is_empty() => doc.feed_link.as_str(),
            _ => self.url.as_str(),
        };
        url::Url::parse(raw)
    }

    fn position(&self, reference: &ItemRef) -> Option<usize> {
        self.items.iter().position(|i| i.key() == reference.key())
    }

    /// The item directly after `reference`.
    pub fn next_after(&self, reference: &ItemRef) -> Option<(usize, ItemRef)> {
        let i = self.position(reference)? + 1;
        self.items.get(i).map(|item| (i, item.clone()))
    }

    /// The item directly before `reference`.
    pub fn prev_before(&self, reference: &ItemRef) -> Option<(usize, ItemRef)> {
        let i = self.position(reference)?.checked_sub(1)?;
        self.items.get(i).map(|item| (i, item.clone()))
    }

    /// The next item after `reference` that is unread or bookmarked.
    pub fn next_unread(&self, reference: &ItemRef) -> Option<(usize, ItemRef)> {
        let start = self.position(reference)? + 1;
        self.items
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, item)| item.is_interesting())
            .map(|(i, item)| (i, item.clone()))
    }

    /// The closest item before `reference` that is unread or bookmarked.
    pub fn prev_unread(&self, reference: &ItemRef) -> Option<(usize, ItemRef)> {
        let end = self.position(reference)?;
        self.items[..end]
            .iter()
            .enumerate()
            .rev()
            .find(|(_, item)| item.is_interesting())
            .map(|(i, item)| (i, item.clone()))
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.items.iter().any(|i| i.key() == key)
    }

    pub(crate) fn push_item(&mut self, item: ItemRef) {
        self.items.push(item);
    }

    pub(crate) fn remove_item(&mut self, key: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.key() != key);
        self.items.len() != before
    }

    pub(crate) fn clear_items(&mut self) {
        self.items.clear();
    }

    pub(crate) fn to_record(&self) -> FeedRecord {
        FeedRecord {
            url: self.url.clone(),
            category: self.category.clone(),
            error: self.error.clone(),
            document: self.document.clone(),
            items: self.items.iter().map(|i| i.to_record()).collect(),
        }
    }

    /// Applies a persisted record: error and document are taken from it,
    /// items already held get the recorded read/bookmark state, and recorded
    /// items not held yet are added. URL, category and cooldown are kept.
    pub(crate) fn overlay(&mut self, record: FeedRecord) {
        self.error = record.error;
        if record.document.is_some() {
            self.document = record.document;
        }

        let mut known: HashMap<String, ItemRef> = self
            .items
            .iter()
            .map(|i| (i.key().to_owned(), i.clone()))
            .collect();
        for r in record.items {
            match known.get(&r.key) {
                Some(item) => item.overwrite_state(r.read, r.bookmark, r.last_changed),
                None => {
                    let item = Arc::new(r.into_item());
                    known.insert(item.key().to_owned(), item.clone());
                    self.items.push(item);
                }
            }
        }
        self.sort_by_date();
    }
}

/// Persisted form of a [`Feed`].
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub(crate) struct FeedRecord {
    pub url: String,
    pub category: String,
    pub error: String,
    pub document: Option<FeedDocument>,
    pub items: Vec<ItemRecord>,
}

/// Marks every item of every given feed read.
pub fn mark_feeds_read<'a>(feeds: impl IntoIterator<Item = &'a Feed>) {
    for feed in feeds {
        feed.mark_all_read();
    }
}

/// The next feed after `current` (matched by URL) that has unread items.
pub fn next_unread_feed<'a>(feeds: &[&'a Feed], current: &Feed) -> Option<(usize, &'a Feed)> {
    let start = feeds.iter().position(|f| f.url() == current.url())? + 1;
    feeds
        .iter()
        .enumerate()
        .skip(start)
        .find(|(_, f)| f.has_unread())
        .map(|(i, f)| (i, *f))
}

/// The closest feed before `current` (matched by URL) that has unread items.
pub fn prev_unread_feed<'a>(feeds: &[&'a Feed], current: &Feed) -> Option<(usize, &'a Feed)> {
    let end = feeds.iter().position(|f| f.url() == current.url())?;
    feeds[..end]
        .iter()
        .enumerate()
        .rev()
        .find(|(_, f)| f.has_unread())
        .map(|(i, f)| (i, *f))
}

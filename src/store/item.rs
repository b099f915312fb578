use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use crate::feed::Entry;
use crate::util::{clean, to_display_format};

/// Shared handle to an [`Item`].
///
/// The owning feed, the Bookmarks pseudo-feed and the list's identity index
/// all hold the same handle, so state flipped through one is seen by all.
pub type ItemRef = Arc<Item>;

/// Current wall clock as a logical timestamp (Unix nanoseconds).
pub fn logical_now() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Identity key of an entry: its unique id when non-empty, else its link.
///
/// Entries with neither get a SHA-256 digest of title and publish time so
/// they do not all collapse onto the empty key.
pub fn identity_key(entry: &Entry) -> String {
    let id = entry.id.trim();
    if !id.is_empty() {
        return id.to_owned();
    }
    let link = entry.link.trim();
    if !link.is_empty() {
        return link.to_owned();
    }

    let input = format!(
        "{}|{}",
        entry.title,
        entry
            .published
            .map(|p| p.timestamp().to_string())
            .unwrap_or_default()
    );
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

/// One feed entry plus the per-reader state tracked across refreshes.
///
/// Content fields are fixed when the item is first merged. `read`, `bookmark`
/// and `last_changed` are atomics so a shared [`ItemRef`] can be updated
/// without a lock around every item.
#[derive(Debug)]
pub struct Item {
    key: String,
    pub title: String,
    pub link: String,
    pub enclosures: Vec<String>,
    pub description: String,
    pub content: String,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    read: AtomicBool,
    bookmark: AtomicBool,
    last_changed: AtomicI64,
}

impl Item {
    /// Builds an unread, unbookmarked item from a freshly fetched entry,
    /// cleaning its text fields.
    pub fn from_entry(entry: &Entry) -> Self {
        let enclosures = entry
            .enclosures
            .iter()
            .filter_map(|raw| url::Url::parse(raw.trim()).ok())
            .map(|u| u.to_string())
            .collect();

        Self {
            key: identity_key(entry),
            title: clean(&entry.title),
            link: entry.link.trim().to_owned(),
            enclosures,
            description: clean(&entry.description),
            content: to_display_format(&entry.content),
            published: entry.published,
            updated: entry.updated,
            read: AtomicBool::new(false),
            bookmark: AtomicBool::new(false),
            last_changed: AtomicI64::new(0),
        }
    }

    /// The identity key computed when this item was first merged.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_read(&self) -> bool {
        self.read.load(Ordering::Acquire)
    }

    pub fn is_bookmarked(&self) -> bool {
        self.bookmark.load(Ordering::Acquire)
    }

    /// Logical timestamp of the last state change, used for sync ordering.
    pub fn last_changed(&self) -> i64 {
        self.last_changed.load(Ordering::Acquire)
    }

    /// Unread items, and read items the reader bookmarked, are worth visiting.
    pub fn is_interesting(&self) -> bool {
        !self.is_read() || self.is_bookmarked()
    }

    /// Sets the read flag, stamping `last_changed` when the value changes.
    /// Returns whether anything changed.
    pub fn set_read(&self, value: bool) -> bool {
        let changed = self.read.swap(value, Ordering::AcqRel) != value;
        if changed {
            self.touch();
        }
        changed
    }

    pub fn mark_read(&self) -> bool {
        self.set_read(true)
    }

    pub fn toggle_read(&self) {
        self.set_read(!self.is_read());
    }

    /// Flips the bookmark flag without touching Bookmarks feed membership.
    /// Use [`List::toggle_bookmark`](super::List::toggle_bookmark) to keep both in step.
    pub(crate) fn set_bookmark(&self, value: bool) -> bool {
        let changed = self.bookmark.swap(value, Ordering::AcqRel) != value;
        if changed {
            self.touch();
        }
        changed
    }

    /// Overwrites mutable state verbatim, as received from a sync peer or a
    /// snapshot. Does not stamp a new timestamp.
    pub(crate) fn overwrite_state(&self, read: bool, bookmark: bool, last_changed: i64) {
        self.read.store(read, Ordering::Release);
        self.bookmark.store(bookmark, Ordering::Release);
        self.last_changed.store(last_changed, Ordering::Release);
    }

    fn touch(&self) {
        self.last_changed.store(logical_now(), Ordering::Release);
    }

    /// Effective timestamp used for ordering: `updated` when it is strictly
    /// later than `published`, otherwise whichever of the two is present.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match (self.published, self.updated) {
            (Some(p), Some(u)) if u > p => Some(u),
            (Some(p), _) => Some(p),
            (None, u) => u,
        }
    }

    /// Title with the `*` bookmark and `+` unread markers used in listings.
    pub fn display_title(&self) -> String {
        let mut title = self.title.clone();
        if self.is_bookmarked() {
            title = format!("* {title}");
        }
        if !self.is_read() {
            title = format!("+ {title}");
        }
        title
    }

    /// The item link, falling back to its first enclosure.
    /// Empty when neither is an absolute URL.
    pub fn link(&self) -> String {
        let raw = if self.link.is_empty() {
            self.enclosures.first().map(String::as_str).unwrap_or("")
        } else {
            self.link.as_str()
        };
        url::Url::parse(raw)
            .map(|u| u.to_string())
            .unwrap_or_default()
    }

    pub fn description(&self) -> String {
        if !self.description.is_empty() {
            return self.description.clone();
        }
        if !self.content.is_empty() {
            return self.content.clone();
        }
        self.published.map(|p| p.to_rfc2822()).unwrap_or_default()
    }

    /// Numbered list of enclosure links, empty when there are none.
    pub fn enclosure_listing(&self) -> String {
        if self.enclosures.is_empty() {
            return String::new();
        }
        let mut text = String::from("Enclosed links:\n");
        for (i, enc) in self.enclosures.iter().enumerate() {
            text.push_str(&format!("- [{i}] {enc}\n"));
        }
        text
    }

    /// Text used when filtering items by a search string.
    pub fn filter_text(&self) -> String {
        format!("{} {}", self.display_title(), self.description())
    }

    /// Reader view: timestamp, link, body and enclosures.
    pub fn render(&self) -> String {
        let time = self
            .timestamp()
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_default();
        let body = if self.content.is_empty() {
            self.description()
        } else {
            self.content.clone()
        };
        format!(
            "{}\n{}\n\n{}\n\n{}\n",
            time,
            self.link(),
            body,
            self.enclosure_listing()
        )
    }

    pub(crate) fn to_record(&self) -> ItemRecord {
        ItemRecord {
            key: self.key.clone(),
            title: self.title.clone(),
            link: self.link.clone(),
            enclosures: self.enclosures.clone(),
            description: self.description.clone(),
            content: self.content.clone(),
            published: self.published,
            updated: self.updated,
            read: self.is_read(),
            bookmark: self.is_bookmarked(),
            last_changed: self.last_changed(),
        }
    }
}

/// Persisted form of an [`Item`]; content is stored already cleaned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ItemRecord {
    pub key: String,
    pub title: String,
    pub link: String,
    pub enclosures: Vec<String>,
    pub description: String,
    pub content: String,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub read: bool,
    pub bookmark: bool,
    pub last_changed: i64,
}

impl ItemRecord {
    pub(crate) fn into_item(self) -> Item {
        Item {
            key: self.key,
            title: self.title,
            link: self.link,
            enclosures: self.enclosures,
            description: self.description,
            content: self.content,
            published: self.published,
            updated: self.updated,
            read: AtomicBool::new(self.read),
            bookmark: AtomicBool::new(self.bookmark),
            last_changed: AtomicI64::new(self.last_changed),
        }
    }
}

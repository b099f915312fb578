use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A remote feed normalized away from its wire format (RSS, Atom, JSON Feed).
///
/// This is what a [`FeedSource`](super::FeedSource) hands back. It is also
/// persisted in snapshots as the feed's last-known document, so every field
/// defaults when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedDocument {
    pub title: String,
    pub description: String,
    /// Link to the site the feed belongs to.
    pub link: String,
    /// Self link of the feed document.
    pub feed_link: String,
    pub entries: Vec<Entry>,
}

/// One entry of a [`FeedDocument`], as published by the source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Entry {
    /// Globally or locally unique identifier; may be empty.
    pub id: String,
    pub title: String,
    pub link: String,
    pub enclosures: Vec<String>,
    pub description: String,
    pub content: String,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

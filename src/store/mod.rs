//! In-memory feed store: items, feeds, the list that indexes them, and the
//! concurrent refresh that keeps them current.
//!
//! State that changes while reading (`read`, `bookmark`, last-changed
//! timestamp) lives on shared [`ItemRef`] handles, so a feed, the Bookmarks
//! pseudo-feed and the list's identity index never disagree about an item.

mod feed;
mod item;
mod list;
mod merge;
mod refresh;
mod snapshot;

pub use feed::{
    mark_feeds_read, next_unread_feed, prev_unread_feed, Feed, RefreshError, BOOKMARKS_URL,
    MSG_FEED_NOT_LOADED, REFRESH_COOLDOWN,
};
pub use item::{identity_key, logical_now, Item, ItemRef};
pub use list::{List, ListError};
pub use merge::merge;
pub use refresh::{refresh, refresh_one, FeedResult};

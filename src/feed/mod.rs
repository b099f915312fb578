//! Fetching and parsing of RSS/Atom/JSON feeds.
//!
//! - [`document`] - source-neutral feed and entry data
//! - [`parser`] - conversion from raw bytes via the `feed-rs` crate
//! - [`fetcher`] - the [`FeedSource`] seam and its HTTP implementation with
//!   retry, timeout and size limits
//!
//! # Example
//!
//! ```ignore
//! use rivulet::feed::{FeedSource, HttpFeedSource};
//!
//! let source = HttpFeedSource::new(reqwest::Client::new());
//! let document = source.fetch("https://example.com/feed.xml").await?;
//! ```

mod document;
mod fetcher;
mod parser;

pub use document::{Entry, FeedDocument};
pub use fetcher::{FeedSource, FetchError, HttpFeedSource};
pub(crate) use fetcher::read_limited_bytes;
pub use parser::parse_feed;

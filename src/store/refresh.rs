use futures::stream::{self, Stream, StreamExt};
use tokio::time::Instant;

use super::feed::{Feed, RefreshError};
use super::list::ListError;
use crate::feed::FeedSource;

/// Outcome of refreshing one feed.
///
/// Carries the feed URL for correlation and either the number of new items
/// merged or the reason the refresh did not happen.
#[derive(Debug)]
pub struct FeedResult {
    pub url: String,
    pub result: Result<usize, RefreshError>,
}

/// Refreshes every given feed concurrently and streams the results.
///
/// One future per feed is started as the stream is polled; results arrive in
/// completion order, not input order, and the stream ends once every feed has
/// produced exactly one result. Dropping the stream early cancels whatever is
/// still in flight.
///
/// Each feed is borrowed mutably for the whole of its refresh, so the
/// cooldown check, the attempt stamp and the fetch can never interleave with
/// another refresh of the same feed.
///
/// # Errors
///
/// [`ListError::NoFeedsInList`] when `feeds` is empty, before any work starts.
pub fn refresh<'a, S>(
    feeds: Vec<&'a mut Feed>,
    source: &'a S,
) -> Result<impl Stream<Item = FeedResult> + 'a, ListError>
where
    S: FeedSource + ?Sized + 'a,
{
    if feeds.is_empty() {
        return Err(ListError::NoFeedsInList);
    }

    let workers = feeds.len();
    tracing::debug!(feeds = workers, "Dispatching feed refreshes");

    Ok(stream::iter(feeds)
        .map(move |feed| refresh_one(feed, source))
        .buffer_unordered(workers))
}

/// Refreshes one feed unless it was attempted within the cooldown window.
///
/// The attempt is stamped before the fetch starts, so a refresh requested
/// while another is still running also sees the cooldown. A cooldown leaves
/// the feed's stored error and items untouched.
pub async fn refresh_one<S>(feed: &mut Feed, source: &S) -> FeedResult
where
    S: FeedSource + ?Sized,
{
    let url = feed.url().to_owned();
    let now = Instant::now();

    if feed.in_cooldown(now) {
        tracing::debug!(feed = %url, "Refresh skipped, feed in cooldown");
        return FeedResult {
            url,
            result: Err(RefreshError::Cooldown),
        };
    }
    feed.mark_attempt(now);

    let result = feed.refresh(source).await;
    match &result {
        Ok(added) => tracing::debug!(feed = %url, added = added, "Feed refreshed"),
        Err(e) => tracing::warn!(feed = %url, error = %e, "Feed refresh failed"),
    }

    FeedResult { url, result }
}

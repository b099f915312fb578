use feed_rs::model;
use feed_rs::parser::{Builder, ParseFeedError};

use super::document::{Entry, FeedDocument};

/// Parses raw RSS/Atom/JSON Feed bytes into a [`FeedDocument`].
///
/// Text fields are passed through as published; cleaning happens when entries
/// are merged into a feed. Entries without a source identifier keep an empty
/// id so identity falls back to their link.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedDocument, ParseFeedError> {
    // feed-rs hashes link and title into missing ids; a title edit would
    // then change the identity of an unchanged post.
    let feed = Builder::new()
        .id_generator(|_, _, _| String::new())
        .build()
        .parse(bytes)?;

    let (self_links, site_links): (Vec<_>, Vec<_>) = feed
        .links
        .iter()
        .partition(|l| l.rel.as_deref() == Some("self"));

    let entries = feed.entries.into_iter().map(convert_entry).collect();

    Ok(FeedDocument {
        title: feed.title.map(|t| t.content).unwrap_or_default(),
        description: feed.description.map(|d| d.content).unwrap_or_default(),
        link: site_links.first().map(|l| l.href.clone()).unwrap_or_default(),
        feed_link: self_links.first().map(|l| l.href.clone()).unwrap_or_default(),
        entries,
    })
}

fn convert_entry(entry: model::Entry) -> Entry {
    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref() != Some("enclosure"))
        .map(|l| l.href.clone())
        .unwrap_or_default();

    let mut enclosures: Vec<String> = entry
        .links
        .iter()
        .filter(|l| l.rel.as_deref() == Some("enclosure"))
        .map(|l| l.href.clone())
        .collect();
    enclosures.extend(
        entry
            .media
            .iter()
            .flat_map(|m| m.content.iter())
            .filter_map(|c| c.url.as_ref().map(|u| u.to_string())),
    );
    enclosures.dedup();

    Entry {
        id: entry.id.trim().to_owned(),
        title: entry.title.map(|t| t.content).unwrap_or_default(),
        link,
        enclosures,
        description: entry.summary.map(|s| s.content).unwrap_or_default(),
        content: entry.content.and_then(|c| c.body).unwrap_or_default(),
        published: entry.published,
        updated: entry.updated,
    }
}

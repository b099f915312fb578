//! Integration tests for the feed lifecycle: subscribe, refresh over HTTP,
//! read and bookmark, persist, restore, refresh again.
//!
//! Each test gets its own scratch directory and mock feed server.

use futures::StreamExt;
use pretty_assertions::assert_eq;
use rivulet::config::{Paths, Subscriptions};
use rivulet::feed::HttpFeedSource;
use rivulet::store::{List, ListError, RefreshError};
use std::path::PathBuf;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rivulet_it_{}", name));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn rss(items: &[(&str, &str)]) -> String {
    let body: String = items
        .iter()
        .map(|(guid, date)| {
            format!(
                "<item><title>Post {guid}</title><guid>{guid}</guid>\
                 <link>https://blog.example.com/{guid}</link>\
                 <description>&lt;p&gt;About {guid}&lt;/p&gt;</description>\
                 <pubDate>{date}</pubDate></item>"
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Example Blog</title><link>https://blog.example.com</link><description>Posts</description>{body}</channel></rss>"#
    )
}

async fn serve(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn keys(list: &List, url: &str) -> Vec<String> {
    list.feed(url)
        .unwrap()
        .items()
        .iter()
        .map(|i| i.key().to_owned())
        .collect()
}

#[tokio::test]
async fn test_empty_configuration() {
    let dir = scratch_dir("empty_configuration");
    std::fs::write(dir.join("urls.toml"), "").unwrap();

    let paths = Paths::in_dir(&dir);
    let subscriptions = Subscriptions::load(&paths.subscriptions_file()).unwrap();
    let mut list = List::new();
    list.apply_subscriptions(&subscriptions);

    assert!(list.categories().is_empty());
    let source = HttpFeedSource::new(reqwest::Client::new());
    assert!(matches!(
        list.refresh_all(&source),
        Err(ListError::NoFeedsInList)
    ));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_refresh_persist_restore_refresh() {
    let dir = scratch_dir("refresh_persist_restore");
    let server = MockServer::start().await;
    serve(
        &server,
        "/blog.xml",
        rss(&[
            ("a", "Mon, 01 Jan 2024 10:00:00 GMT"),
            ("b", "Tue, 02 Jan 2024 10:00:00 GMT"),
        ]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/gone.xml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let blog = format!("{}/blog.xml", server.uri());
    let gone = format!("{}/gone.xml", server.uri());
    std::fs::write(
        dir.join("urls.toml"),
        format!("tech = [\"{blog}\"]\nmisc = [\"{gone}\"]\n"),
    )
    .unwrap();

    let paths = Paths::in_dir(&dir);
    let subscriptions = Subscriptions::load(&paths.subscriptions_file()).unwrap();
    let source = HttpFeedSource::new(reqwest::Client::new());

    // First session: refresh, read one item, bookmark another, save.
    let mut list = List::new();
    list.apply_subscriptions(&subscriptions);
    assert_eq!(list.categories(), vec!["misc", "tech"]);

    let results = list.update_all(&source).await.unwrap();
    assert_eq!(results.len(), 2);
    let failed = results.iter().find(|r| r.url == gone).unwrap();
    assert!(matches!(failed.result, Err(RefreshError::Fetch(_))));
    assert_eq!(list.feed(&gone).unwrap().latest_summary(), "HTTP error: status 404");

    assert_eq!(keys(&list, &blog), vec!["b", "a"]);
    let blog_feed = list.feed(&blog).unwrap();
    assert_eq!(blog_feed.display_title(), "+ Example Blog");
    assert_eq!(blog_feed.items()[0].description(), "About b");

    list.item("a").unwrap().mark_read();
    let b = list.item("b").unwrap().clone();
    assert!(list.toggle_bookmark(&b).unwrap());

    let data_file = paths.data_file(&Default::default());
    list.save(&data_file).unwrap();

    // Second session: restore, then pick up a new post.
    server.reset().await;
    serve(
        &server,
        "/blog.xml",
        rss(&[
            ("a", "Mon, 01 Jan 2024 10:00:00 GMT"),
            ("b", "Tue, 02 Jan 2024 10:00:00 GMT"),
            ("c", "Wed, 03 Jan 2024 10:00:00 GMT"),
        ]),
    )
    .await;

    let mut restored = List::new();
    restored.apply_subscriptions(&subscriptions);
    assert!(restored.load(&data_file).unwrap());
    assert!(restored.item("a").unwrap().is_read());
    assert_eq!(
        restored.feed(&gone).unwrap().error(),
        "HTTP error: status 404"
    );

    let results: Vec<_> = restored
        .refresh_category("tech", &source)
        .unwrap()
        .collect()
        .await;
    restored.reindex();
    assert_eq!(results.len(), 1);
    assert_eq!(*results[0].result.as_ref().unwrap(), 1);

    assert_eq!(keys(&restored, &blog), vec!["c", "b", "a"]);
    assert!(restored.item("a").unwrap().is_read());
    assert!(!restored.item("c").unwrap().is_read());
    let bookmarked: Vec<&str> = restored
        .bookmarks_feed()
        .unwrap()
        .items()
        .iter()
        .map(|i| i.key())
        .collect();
    assert_eq!(bookmarked, vec!["b"]);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_unsubscribed_feeds_are_pruned() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/one.xml",
        rss(&[("one", "Mon, 01 Jan 2024 10:00:00 GMT")]),
    )
    .await;
    serve(
        &server,
        "/two.xml",
        rss(&[("two", "Mon, 01 Jan 2024 10:00:00 GMT")]),
    )
    .await;

    let one = format!("{}/one.xml", server.uri());
    let two = format!("{}/two.xml", server.uri());
    let mut list = List::new();
    list.load_from_configuration(&format!("x = [\"{one}\", \"{two}\"]"))
        .unwrap();
    list.update_all(&HttpFeedSource::new(reqwest::Client::new()))
        .await
        .unwrap();
    assert_eq!(list.items().count(), 2);

    let remaining = Subscriptions::parse(&format!("x = [\"{one}\"]")).unwrap();
    assert_eq!(list.prune_to(&remaining), 1);
    assert!(list.feed(&two).is_none());
    assert!(list.item("two").is_none());
    assert!(list.item("one").is_some());
}

#[tokio::test]
async fn test_guidless_post_survives_title_edit() {
    let guidless = |title: &str| {
        format!(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Blog</title><item><title>{title}</title><link>https://blog.example.com/post-1</link></item></channel></rss>"#
        )
    };
    let server = MockServer::start().await;
    serve(&server, "/blog.xml", guidless("Draft title")).await;

    let blog = format!("{}/blog.xml", server.uri());
    let mut list = List::new();
    list.load_from_configuration(&format!("x = [\"{blog}\"]"))
        .unwrap();
    let source = HttpFeedSource::new(reqwest::Client::new());
    list.update_all(&source).await.unwrap();
    list.item("https://blog.example.com/post-1").unwrap().mark_read();

    server.reset().await;
    serve(&server, "/blog.xml", guidless("Final title")).await;

    let added = list.feed_mut(&blog).unwrap().refresh(&source).await.unwrap();
    assert_eq!(added, 0);
    assert_eq!(keys(&list, &blog), vec!["https://blog.example.com/post-1"]);
    assert!(list.item("https://blog.example.com/post-1").unwrap().is_read());
}

//! Integration tests for state sync against a mock relay, driven from the
//! same configuration the binary reads.

use pretty_assertions::assert_eq;
use rivulet::config::Config;
use rivulet::feed::HttpFeedSource;
use rivulet::store::List;
use rivulet::sync::{ApplyPolicy, SyncClient, SyncError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Relay test</title>
<item><guid>a</guid><title>A</title><pubDate>Mon, 01 Jan 2024 10:00:00 GMT</pubDate></item>
<item><guid>z</guid><title>Z</title><pubDate>Tue, 02 Jan 2024 10:00:00 GMT</pubDate></item>
</channel></rss>"#;

async fn subscribed_list(server: &MockServer) -> List {
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .mount(server)
        .await;

    let mut list = List::new();
    list.load_from_configuration(&format!("relay = [\"{}/feed.xml\"]", server.uri()))
        .unwrap();
    list.update_all(&HttpFeedSource::new(reqwest::Client::new()))
        .await
        .unwrap();
    list
}

fn client_from(config: &mut Config) -> SyncClient {
    let endpoint = config.sync_endpoint.clone().unwrap();
    let mut client = SyncClient::new(reqwest::Client::new(), endpoint);
    if let Some(key) = config.sync_key.take() {
        client = client.with_api_key(key);
    }
    client
}

#[tokio::test]
async fn test_peer_state_is_applied() {
    let server = MockServer::start().await;
    let mut list = subscribed_list(&server).await;
    let z_before = list.item("z").unwrap().last_changed();

    Mock::given(method("POST"))
        .and(path("/sync"))
        .and(body_partial_json(json!({ "ApiKey": "k1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ApiKey": "k1",
            "ItemIndex": {
                "a": { "Ts": 100, "GUID": "a", "Read": true, "Bookmark": true },
                "unknown": { "Ts": 5, "GUID": "unknown", "Read": true, "Bookmark": false }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = Config::parse(&format!(
        "sync_endpoint = \"{}\"\nsync_key = \"k1\"\n",
        server.uri()
    ))
    .unwrap();
    let applied = client_from(&mut config).sync_list(&mut list).await.unwrap();

    assert_eq!(applied, 1);
    let a = list.item("a").unwrap();
    assert!(a.is_read());
    assert_eq!(a.last_changed(), 100);
    assert_eq!(list.bookmarks_feed().unwrap().items().len(), 1);

    let z = list.item("z").unwrap();
    assert!(!z.is_read());
    assert_eq!(z.last_changed(), z_before);
    assert!(list.item("unknown").is_none());
}

#[tokio::test]
async fn test_newer_local_state_survives_with_newer_only() {
    let server = MockServer::start().await;
    let mut list = subscribed_list(&server).await;
    list.item("a").unwrap().mark_read();

    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ApiKey": "localhost",
            "ItemIndex": { "a": { "Ts": 1, "GUID": "a", "Read": false, "Bookmark": false } }
        })))
        .mount(&server)
        .await;

    let client = SyncClient::new(reqwest::Client::new(), server.uri())
        .with_policy(ApplyPolicy::NewerOnly);
    assert_eq!(client.sync_list(&mut list).await.unwrap(), 0);
    assert!(list.item("a").unwrap().is_read());
}

#[tokio::test]
async fn test_sync_requires_feeds() {
    let server = MockServer::start().await;
    let mut list = List::new();
    let client = SyncClient::new(reqwest::Client::new(), server.uri());
    assert!(matches!(
        client.sync_list(&mut list).await,
        Err(SyncError::NoFeedsInList)
    ));
}

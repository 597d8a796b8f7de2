//! Config server and client: versions, refresh and fallback.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use service_mesh::config_store::{self, ConfigClient, ConfigRepository, Properties};
use service_mesh::http::Health;
use tokio::net::TcpListener;

mod common;

fn props(value: serde_json::Value) -> Properties {
    serde_json::from_value(value).unwrap()
}

fn defaults() -> Properties {
    props(json!({"minimum": 3, "maximum": 997}))
}

#[tokio::test]
async fn test_load_merges_and_refresh_sees_commits() {
    let repository = Arc::new(ConfigRepository::new());
    repository.commit("application", "default", props(json!({"greeting": "hello"})));
    repository.commit("limits", "default", props(json!({"minimum": 1, "maximum": 999})));
    repository.commit("limits", "dev", props(json!({"maximum": 111})));

    let addr = common::serve(config_store::api::router(repository.clone(), Health::new())).await;
    let client = ConfigClient::new(&format!("http://{}", addr), Duration::from_secs(2), defaults()).unwrap();

    let snapshot = client.load("limits", "dev").await;
    assert!(!snapshot.is_fallback());
    assert_eq!(snapshot.get_as::<u32>("minimum"), Some(1));
    assert_eq!(snapshot.get_as::<u32>("maximum"), Some(111));
    assert_eq!(snapshot.get_as::<String>("greeting").as_deref(), Some("hello"));
    let first_version = snapshot.version().unwrap();

    // Cached until refreshed.
    let committed = repository.commit("limits", "dev", props(json!({"maximum": 222})));
    assert_eq!(client.load("limits", "dev").await.get_as::<u32>("maximum"), Some(111));

    client.refresh("limits");
    let snapshot = client.load("limits", "dev").await;
    assert_eq!(snapshot.get_as::<u32>("maximum"), Some(222));
    assert!(snapshot.version().unwrap() >= committed);
    assert!(snapshot.version().unwrap() > first_version);
}

#[tokio::test]
async fn test_refresh_sees_removed_profile_source() {
    let repository = Arc::new(ConfigRepository::new());
    repository.commit("limits", "default", props(json!({"maximum": 999})));
    repository.commit("limits", "dev", props(json!({"maximum": 111})));

    let addr = common::serve(config_store::api::router(repository.clone(), Health::new())).await;
    let client = ConfigClient::new(&format!("http://{}", addr), Duration::from_secs(2), defaults()).unwrap();

    let before = client.load("limits", "dev").await;
    assert_eq!(before.get_as::<u32>("maximum"), Some(111));

    assert!(repository.remove("limits", "dev"));
    client.refresh("limits");
    let after = client.load("limits", "dev").await;
    assert!(!after.is_fallback());
    assert_eq!(after.get_as::<u32>("maximum"), Some(999));
    assert!(after.version() > before.version());
}

#[tokio::test]
async fn test_unreachable_server_uses_bundled_defaults() {
    let dead = common::closed_port().await;
    let client = ConfigClient::new(&format!("http://{}", dead), Duration::from_millis(500), defaults()).unwrap();

    let snapshot = client.load("limits", "default").await;
    assert!(snapshot.is_fallback());
    assert_eq!(snapshot.get_as::<u32>("minimum"), Some(3));
    assert_eq!(snapshot.get_as::<u32>("maximum"), Some(997));
}

#[tokio::test]
async fn test_unknown_application_uses_bundled_defaults() {
    let repository = Arc::new(ConfigRepository::new());
    let addr = common::serve(config_store::api::router(repository, Health::new())).await;
    let client = ConfigClient::new(&format!("http://{}", addr), Duration::from_secs(2), defaults()).unwrap();

    assert!(client.fetch("limits", "default").await.is_err());
    let snapshot = client.load("limits", "default").await;
    assert!(snapshot.is_fallback());
    assert_eq!(snapshot.get_as::<u32>("maximum"), Some(997));
}

#[tokio::test]
async fn test_server_outage_keeps_last_snapshot() {
    let repository = Arc::new(ConfigRepository::new());
    repository.commit("limits", "default", props(json!({"minimum": 5})));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = config_store::api::router(repository, Health::new());
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let client = ConfigClient::new(&format!("http://{}", addr), Duration::from_millis(500), defaults()).unwrap();
    assert_eq!(client.load("limits", "default").await.get_as::<u32>("minimum"), Some(5));

    server.abort();
    let _ = server.await;

    client.refresh("limits");
    let snapshot = client.load("limits", "default").await;
    assert!(!snapshot.is_fallback());
    assert_eq!(snapshot.get_as::<u32>("minimum"), Some(5));
}

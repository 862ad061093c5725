//! Integration tests for changed-since reads.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::StatusCode;
use docgate_api::{default_sources, NamespaceMode, SourceConfig, WriteMode};
use docgate_core::{models::format_timestamp, Clock};
use docgate_testing::TestEnv;
use serde_json::{json, Value};

fn start_time() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(1_714_557_600)
}

/// Inserts three salesforce records one second apart and returns their
/// change timestamps as rendered in read results.
async fn seed_three(env: &TestEnv) -> [String; 3] {
    env.clock.jump_to(start_time());
    let mut stamps = Vec::with_capacity(3);
    for name in ["first", "second", "third"] {
        env.clock.advance(Duration::from_secs(1));
        env.post_json("/api/salesforce/create", &json!({"name": name}))
            .await
            .expect("seed insert")
            .assert_status(StatusCode::OK);
        stamps.push(format_timestamp(env.clock.now_utc()));
    }
    [stamps[0].clone(), stamps[1].clone(), stamps[2].clone()]
}

fn names(body: &Value) -> Vec<&str> {
    body["data"]
        .as_array()
        .map(|records| records.iter().filter_map(|r| r["name"].as_str()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn threshold_returns_strictly_newer_records_ascending() {
    let env = TestEnv::new().expect("test env setup");
    let [t1, t2, t3] = seed_three(&env).await;

    let response = env
        .get(&format!("/api/salesforce/query?last_changed_at={t1}"))
        .await
        .expect("request execution");

    response.assert_status(StatusCode::OK);
    assert_eq!(response.body["success"], json!(true));
    assert_eq!(response.body["count"], json!(2));
    assert_eq!(names(&response.body), vec!["second", "third"]);

    let records = response.body["data"].as_array().expect("data array");
    assert_eq!(records[0]["last_changed_at"], json!(t2));
    assert_eq!(records[1]["last_changed_at"], json!(t3));
    assert!(records[0]["_id"].is_string());
}

#[tokio::test]
async fn no_threshold_returns_everything() {
    let env = TestEnv::new().expect("test env setup");
    seed_three(&env).await;

    for uri in
        ["/api/salesforce/query", "/api/salesforce/create", "/api/salesforce/query?last_changed_at="]
    {
        let response = env.get(uri).await.expect("request execution");

        response.assert_status(StatusCode::OK);
        assert_eq!(response.body["count"], json!(3), "{uri}");
        assert_eq!(names(&response.body), vec!["first", "second", "third"], "{uri}");
    }
}

#[tokio::test]
async fn body_threshold_is_accepted_on_query_post() {
    let env = TestEnv::new().expect("test env setup");
    let [_, t2, _] = seed_three(&env).await;

    let response = env
        .post_json("/api/salesforce/query", &json!({"last_changed_at": t2}))
        .await
        .expect("request execution");

    response.assert_status(StatusCode::OK);
    assert_eq!(names(&response.body), vec!["third"]);

    let empty = env.post_raw("/api/salesforce/query", "").await.expect("request execution");
    empty.assert_status(StatusCode::OK);
    assert_eq!(empty.body["count"], json!(3));
}

#[tokio::test]
async fn epoch_millis_threshold_is_accepted() {
    let env = TestEnv::new().expect("test env setup");
    seed_three(&env).await;
    let first_millis = 1_714_557_601_000_i64;

    let from_body = env
        .post_json("/api/salesforce/query", &json!({"last_changed_at": first_millis}))
        .await
        .expect("request execution");
    let from_query = env
        .get(&format!("/api/salesforce/query?last_changed_at={first_millis}"))
        .await
        .expect("request execution");

    assert_eq!(names(&from_body.body), vec!["second", "third"]);
    assert_eq!(names(&from_query.body), vec!["second", "third"]);
}

#[tokio::test]
async fn threshold_at_latest_change_is_empty() {
    let env = TestEnv::new().expect("test env setup");
    let [_, _, t3] = seed_three(&env).await;

    let response = env
        .get(&format!("/api/salesforce/query?last_changed_at={t3}"))
        .await
        .expect("request execution");

    response.assert_status(StatusCode::OK);
    assert_eq!(response.body, json!({"success": true, "count": 0, "data": []}));
}

#[tokio::test]
async fn returned_stamp_is_an_exact_resume_point() {
    let env = TestEnv::new().expect("test env setup");
    // Sub-millisecond component that read results cannot render.
    env.clock.jump_to(start_time() + Duration::from_nanos(386_123_456));

    env.post_json("/api/salesforce/create", &json!({"name": "only"}))
        .await
        .expect("seed insert")
        .assert_status(StatusCode::OK);

    let first = env.get("/api/salesforce/query").await.expect("request execution");
    let records = first.body["data"].as_array().expect("data array");
    let last_seen = records[0]["last_changed_at"].as_str().expect("rendered stamp");
    assert_eq!(last_seen, "2024-05-01T10:00:00.386Z");

    let next = env
        .get(&format!("/api/salesforce/query?last_changed_at={last_seen}"))
        .await
        .expect("request execution");

    next.assert_status(StatusCode::OK);
    assert_eq!(next.body["count"], json!(0));

    let stored = env.store.records("salesforce").await;
    assert_eq!(format_timestamp(stored[0].last_changed_at), last_seen);
    assert_eq!(stored[0].last_changed_at.timestamp_subsec_nanos(), 386_000_000);
}

#[tokio::test]
async fn unparseable_threshold_is_rejected() {
    let env = TestEnv::new().expect("test env setup");

    for value in [json!("yesterday"), json!("2024-13-45"), json!({"gt": 1}), json!(true)] {
        let response = env
            .post_json("/api/salesforce/query", &json!({"last_changed_at": value}))
            .await
            .expect("request execution");

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.error_code(), Some("E1003"), "{value}");
    }

    assert_eq!(env.store.operation_count(), 0);
}

#[tokio::test]
async fn write_only_sources_refuse_reads() {
    let env = TestEnv::new().expect("test env setup");

    for uri in ["/api/outlook/query", "/api/outlook/create", "/api/sap/query"] {
        let response = env.get(uri).await.expect("request execution");

        response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.error_code(), Some("E1006"), "{uri}");
    }

    let response = env.get("/api/hubspot/query").await.expect("request execution");
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dynamic_source_reads_named_collection() {
    let mut sources = default_sources();
    sources.push(SourceConfig {
        name: "crm".to_string(),
        default_collection: "crm".to_string(),
        namespace: NamespaceMode::Dynamic,
        write: WriteMode::Insert,
        supports_read: true,
    });
    let env = TestEnv::builder().sources(sources).build().expect("test env setup");

    env.post_json("/api/crm/create", &json!({"collection": "contacts", "name": "Ada"}))
        .await
        .expect("request execution");
    env.post_json("/api/crm/create", &json!({"name": "Default"}))
        .await
        .expect("request execution");

    let contacts = env.get("/api/crm/query?collection=contacts").await.expect("request");
    assert_eq!(names(&contacts.body), vec!["Ada"]);

    let fallback = env.get("/api/crm/query").await.expect("request");
    assert_eq!(names(&fallback.body), vec!["Default"]);

    let invalid = env.get("/api/crm/query?table=bad%20name").await.expect("request");
    invalid.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(invalid.error_code(), Some("E1001"));
}

#[tokio::test]
async fn order_follows_last_change_not_creation() {
    let mut sources = default_sources();
    sources.push(SourceConfig {
        name: "catalog".to_string(),
        default_collection: "catalog".to_string(),
        namespace: NamespaceMode::Fixed,
        write: WriteMode::Upsert {
            key: "sku".to_string(),
            fields: vec!["sku".to_string(), "price".to_string()],
        },
        supports_read: true,
    });
    let env = TestEnv::builder().sources(sources).build().expect("test env setup");
    env.clock.jump_to(start_time());

    for (sku, price) in [("A1", 1), ("B2", 1), ("A1", 2), ("B2", 1)] {
        env.clock.advance(Duration::from_secs(1));
        env.post_json("/api/catalog/create", &json!({"sku": sku, "price": price}))
            .await
            .expect("request execution")
            .assert_status(StatusCode::OK);
    }

    let response = env.get("/api/catalog/query").await.expect("request execution");
    let skus: Vec<&str> = response.body["data"]
        .as_array()
        .expect("data array")
        .iter()
        .filter_map(|r| r["sku"].as_str())
        .collect();
    assert_eq!(skus, vec!["B2", "A1"]);

    // B2's unchanged repeat did not move its timestamp past A1's update.
    let a1_update = format_timestamp(
        chrono::DateTime::<chrono::Utc>::from(start_time() + Duration::from_secs(3)),
    );
    let newer = env
        .get(&format!("/api/catalog/query?last_changed_at={a1_update}"))
        .await
        .expect("request execution");
    assert_eq!(newer.body["count"], json!(0));
}

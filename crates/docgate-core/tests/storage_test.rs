//! Integration tests for the PostgreSQL document store.
//!
//! Runs the store contract against a real database reached through
//! `DATABASE_URL`. Without it every test returns early, so the suite stays
//! green on machines with no Postgres. Each test writes to collections named
//! with a fresh UUID, which keeps reruns against one database independent.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use docgate_core::{
    models::{CollectionName, Document},
    storage::{DocumentStore, PostgresDocumentStore},
    CoreError, UpsertOutcome,
};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

async fn store() -> Option<PostgresDocumentStore> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping PostgreSQL store test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&database_url)
        .await
        .expect("connect to DATABASE_URL");
    Some(PostgresDocumentStore::new(pool))
}

fn unique_collection(prefix: &str) -> CollectionName {
    CollectionName::parse(&format!("{prefix}_{}", Uuid::new_v4().simple()))
        .expect("generated name is valid")
}

fn doc(value: Value) -> Document {
    value.as_object().cloned().expect("object literal")
}

/// Base time at the precision Postgres keeps, so round-trips compare equal.
fn base_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

#[tokio::test]
async fn schema_setup_is_idempotent() {
    let Some(store) = store().await else { return };

    let (first, second) = tokio::join!(store.ensure_schema(), store.ensure_schema());
    first.expect("first schema setup");
    second.expect("concurrent schema setup");

    let fresh = PostgresDocumentStore::new((*store.pool()).clone());
    fresh.ensure_schema().await.expect("schema setup on existing tables");
    fresh.health_check().await.expect("health check");
}

#[tokio::test]
async fn upsert_creates_then_modifies_then_reports_unchanged() {
    let Some(store) = store().await else { return };
    let collection = unique_collection("sap");
    let t0 = base_time();
    let t1 = t0 + Duration::seconds(1);
    let t2 = t0 + Duration::seconds(2);

    let created = store
        .upsert(collection.clone(), "sku".into(), doc(json!({"sku": "A1", "price": 1})), t0)
        .await
        .expect("first upsert");
    let created_id = created.upserted_id.expect("first upsert creates");
    assert_eq!(created.matched_count, 0);

    let modified = store
        .upsert(collection.clone(), "sku".into(), doc(json!({"sku": "A1", "price": 2})), t1)
        .await
        .expect("changing upsert");
    assert_eq!(modified, UpsertOutcome::modified());

    let unchanged = store
        .upsert(collection.clone(), "sku".into(), doc(json!({"sku": "A1", "price": 2})), t2)
        .await
        .expect("repeated upsert");
    assert_eq!(unchanged, UpsertOutcome::unchanged());

    let records = store.find_changed_since(collection, None).await.expect("read back");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, created_id);
    assert_eq!(records[0].last_changed_at, t1);
    assert_eq!(Value::Object(records[0].data.clone()), json!({"sku": "A1", "price": 2}));
}

#[tokio::test]
async fn upsert_merges_fields_into_existing_record() {
    let Some(store) = store().await else { return };
    let collection = unique_collection("sap");
    let now = base_time();

    store
        .upsert(collection.clone(), "sku".into(), doc(json!({"sku": "A1", "name": "Bolt"})), now)
        .await
        .expect("create");
    store
        .upsert(collection.clone(), "sku".into(), doc(json!({"sku": "A1", "price": 3})), now)
        .await
        .expect("merge");

    let records = store.find_changed_since(collection, None).await.expect("read back");
    assert_eq!(
        Value::Object(records[0].data.clone()),
        json!({"sku": "A1", "name": "Bolt", "price": 3})
    );
}

#[tokio::test]
async fn changed_since_is_strict_and_ascending() {
    let Some(store) = store().await else { return };
    let collection = unique_collection("leads");
    let t1 = base_time();
    let t2 = t1 + Duration::seconds(1);
    let t3 = t1 + Duration::seconds(2);

    for (n, at) in [(3, t3), (1, t1), (2, t2), (4, t3)] {
        store.insert(collection.clone(), doc(json!({"n": n})), at).await.expect("insert");
    }

    let after_t1 =
        store.find_changed_since(collection.clone(), Some(t1)).await.expect("threshold read");
    let ns: Vec<_> = after_t1.iter().map(|d| d.data["n"].clone()).collect();
    // Equal stamps keep insertion order.
    assert_eq!(ns, vec![json!(2), json!(3), json!(4)]);

    let at_latest =
        store.find_changed_since(collection.clone(), Some(t3)).await.expect("latest read");
    assert!(at_latest.is_empty());

    let all = store.find_changed_since(collection, None).await.expect("full read");
    let ns: Vec<_> = all.iter().map(|d| d.data["n"].clone()).collect();
    assert_eq!(ns, vec![json!(1), json!(2), json!(3), json!(4)]);
}

#[tokio::test]
async fn upsert_keys_are_scoped_to_collection_and_key_field() {
    let Some(store) = store().await else { return };
    let eu = unique_collection("sap_eu");
    let us = unique_collection("sap_us");
    let now = base_time();
    let body = json!({"sku": "A1", "code": "A1"});

    for (collection, key) in [(&eu, "sku"), (&us, "sku"), (&eu, "code")] {
        let outcome = store
            .upsert(collection.clone(), key.into(), doc(body.clone()), now)
            .await
            .expect("upsert");
        assert!(outcome.upserted_id.is_some(), "{collection}/{key} should create");
    }

    assert_eq!(store.find_changed_since(eu, None).await.expect("read eu").len(), 2);
    assert_eq!(store.find_changed_since(us, None).await.expect("read us").len(), 1);
}

#[tokio::test]
async fn inserts_never_deduplicate_or_match_upserts() {
    let Some(store) = store().await else { return };
    let collection = unique_collection("mail");
    let now = base_time();

    let a = store.insert(collection.clone(), doc(json!({"sku": "A1"})), now).await.expect("a");
    let b = store.insert(collection.clone(), doc(json!({"sku": "A1"})), now).await.expect("b");
    assert_ne!(a, b);

    let outcome = store
        .upsert(collection.clone(), "sku".into(), doc(json!({"sku": "A1"})), now)
        .await
        .expect("upsert");
    assert!(outcome.upserted_id.is_some());

    assert_eq!(store.find_changed_since(collection, None).await.expect("read").len(), 3);
}

#[tokio::test]
async fn nul_characters_are_invalid_input() {
    let Some(store) = store().await else { return };
    let collection = unique_collection("mail");

    let err = store
        .insert(collection.clone(), doc(json!({"note": "a\u{0}b"})), base_time())
        .await
        .expect_err("jsonb refuses U+0000");

    assert!(matches!(err, CoreError::InvalidInput(_)), "unexpected error: {err}");
    assert!(store.find_changed_since(collection, None).await.expect("read").is_empty());
}

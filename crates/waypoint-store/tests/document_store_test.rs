//! Integration tests for the Postgres document store.
//!
//! These spin up a PostgreSQL container via testcontainers; run them with
//! `cargo test -- --ignored` on a machine with a Docker daemon.

use serde_json::json;

use waypoint_core::store::DocumentStore;
use waypoint_store::PgDocumentStore;
use waypoint_test_utils::{create_test_db, drop_test_db};

#[tokio::test]
#[ignore = "requires a local Docker daemon"]
async fn get_missing_key_returns_none() {
    let (pool, db_name) = create_test_db().await;
    let store = PgDocumentStore::new(pool.clone());

    let value = store.get("cache:shared:absent").await.unwrap();
    assert!(value.is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
#[ignore = "requires a local Docker daemon"]
async fn put_then_get_roundtrips_json() {
    let (pool, db_name) = create_test_db().await;
    let store = PgDocumentStore::new(pool.clone());

    let doc = json!({
        "review": ["strengths", "weaknesses", "verdict"],
        "steps": [{"day": 1, "city": "Aubusson", "highlights": "", "next": ""}],
        "model": "gemini-2.0-flash",
    });
    store.put("cache:shared:FR_123", doc.clone()).await.unwrap();

    let loaded = store.get("cache:shared:FR_123").await.unwrap();
    assert_eq!(loaded, Some(doc));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
#[ignore = "requires a local Docker daemon"]
async fn put_overwrites_on_key_conflict() {
    let (pool, db_name) = create_test_db().await;
    let store = PgDocumentStore::new(pool.clone());

    store
        .put("quota:user-1:summary_monthly:2026-08", json!({"count": 1}))
        .await
        .unwrap();
    store
        .put("quota:user-1:summary_monthly:2026-08", json!({"count": 2}))
        .await
        .unwrap();

    let loaded = store
        .get("quota:user-1:summary_monthly:2026-08")
        .await
        .unwrap()
        .expect("document should exist");
    assert_eq!(loaded["count"], 2);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
#[ignore = "requires a local Docker daemon"]
async fn keys_are_independent() {
    let (pool, db_name) = create_test_db().await;
    let store = PgDocumentStore::new(pool.clone());

    store.put("cache:shared:a", json!({"v": 1})).await.unwrap();
    store.put("cache:private:a", json!({"v": 2})).await.unwrap();

    let shared = store.get("cache:shared:a").await.unwrap().unwrap();
    let private = store.get("cache:private:a").await.unwrap().unwrap();
    assert_eq!(shared["v"], 1);
    assert_eq!(private["v"], 2);

    pool.close().await;
    drop_test_db(&db_name).await;
}

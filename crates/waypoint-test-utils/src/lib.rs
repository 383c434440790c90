//! Shared test utilities for waypoint integration tests.
//!
//! Provides an in-memory [`DocumentStore`] with failure injection for the
//! orchestration paths, a fixed-map identity verifier, and a shared
//! PostgreSQL container for store integration tests (one database per
//! test).

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers::ImageExt;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use waypoint_core::error::StoreError;
use waypoint_core::identity::{Identity, IdentityVerifier};
use waypoint_core::store::DocumentStore;
use waypoint_store::pool;

// ---------------------------------------------------------------------------
// In-memory document store
// ---------------------------------------------------------------------------

/// A `DocumentStore` over a mutex-guarded map, with per-prefix failure
/// injection for exercising the soft-failure paths.
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<String, Value>>,
    fail_get_prefixes: Mutex<Vec<String>>,
    fail_put_prefixes: Mutex<Vec<String>>,
    get_log: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document directly, bypassing failure injection.
    pub fn insert(&self, key: &str, value: Value) {
        self.docs.lock().unwrap().insert(key.to_string(), value);
    }

    pub fn remove(&self, key: &str) {
        self.docs.lock().unwrap().remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.docs.lock().unwrap().contains_key(key)
    }

    pub fn document_count(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    /// Ordered copy of the whole store, for before/after comparisons.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.docs
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Make every `get` whose key starts with `prefix` fail.
    pub fn fail_gets_matching(&self, prefix: &str) {
        self.fail_get_prefixes
            .lock()
            .unwrap()
            .push(prefix.to_string());
    }

    /// Make every `put` whose key starts with `prefix` fail.
    pub fn fail_puts_matching(&self, prefix: &str) {
        self.fail_put_prefixes
            .lock()
            .unwrap()
            .push(prefix.to_string());
    }

    /// Every key fetched so far, in order.
    pub fn get_log(&self) -> Vec<String> {
        self.get_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.get_log.lock().unwrap().push(key.to_string());
        let injected = self
            .fail_get_prefixes
            .lock()
            .unwrap()
            .iter()
            .any(|p| key.starts_with(p.as_str()));
        if injected {
            return Err(StoreError::Backend(format!("injected get failure for {key}")));
        }
        Ok(self.docs.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let injected = self
            .fail_put_prefixes
            .lock()
            .unwrap()
            .iter()
            .any(|p| key.starts_with(p.as_str()));
        if injected {
            return Err(StoreError::Backend(format!("injected put failure for {key}")));
        }
        self.docs.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixed-map identity verifier
// ---------------------------------------------------------------------------

/// An `IdentityVerifier` backed by a fixed token -> identity map.
#[derive(Default)]
pub struct StaticVerifier {
    identities: HashMap<String, Identity>,
}

impl StaticVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, token: &str, user_id: &str, email: Option<&str>) -> Self {
        self.identities.insert(
            token.to_string(),
            Identity {
                user_id: user_id.to_string(),
                email_hint: email.map(str::to_string),
            },
        );
        self
    }
}

#[async_trait]
impl IdentityVerifier for StaticVerifier {
    async fn verify(&self, bearer_token: &str) -> Option<Identity> {
        self.identities.get(bearer_token).cloned()
    }
}

// ---------------------------------------------------------------------------
// Shared PostgreSQL for store integration tests
// ---------------------------------------------------------------------------

/// Shared container state: base URL and optional container handle (kept
/// alive). `None` when an external URL is supplied.
struct SharedPg {
    base_url: String,
    _container: Option<ContainerAsync<Postgres>>,
}

static SHARED_PG: OnceCell<SharedPg> = OnceCell::const_new();

async fn init_shared_pg() -> SharedPg {
    // If a setup script already started a server, use it directly.
    if let Ok(url) = std::env::var("WAYPOINT_TEST_PG_URL") {
        return SharedPg {
            base_url: url,
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("18")
        .start()
        .await
        .expect("failed to start PostgreSQL container");

    let host = container.get_host().await.expect("failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("failed to get mapped port");

    SharedPg {
        base_url: format!("postgresql://postgres:postgres@{host}:{port}"),
        _container: Some(container),
    }
}

/// Base URL for the shared PostgreSQL (no database name appended).
pub async fn pg_url() -> &'static str {
    let shared = SHARED_PG.get_or_init(init_shared_pg).await;
    &shared.base_url
}

/// Create a uniquely-named database with migrations applied. Returns
/// `(pool, db_name)`; pass `db_name` to [`drop_test_db`] when done.
pub async fn create_test_db() -> (PgPool, String) {
    let base_url = pg_url().await;

    let maint_url = format!("{base_url}/postgres");
    let maint_pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&maint_url)
        .await
        .expect("failed to connect to maintenance database in container");

    let db_name = format!("waypoint_test_{}", Uuid::new_v4().simple());
    let stmt = format!("CREATE DATABASE {db_name}");
    maint_pool
        .execute(stmt.as_str())
        .await
        .unwrap_or_else(|e| panic!("failed to create temp database {db_name}: {e}"));
    maint_pool.close().await;

    let temp_url = format!("{base_url}/{db_name}");
    let temp_pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&temp_url)
        .await
        .unwrap_or_else(|e| panic!("failed to connect to temp database {db_name}: {e}"));

    pool::run_migrations(&temp_pool)
        .await
        .expect("migrations should succeed");

    (temp_pool, db_name)
}

/// Drop a temporary database, terminating its connections first. Safe to
/// call even if the database was already dropped.
pub async fn drop_test_db(db_name: &str) {
    let base_url = pg_url().await;
    let maint_url = format!("{base_url}/postgres");

    let maint_pool = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&maint_url)
        .await
        .expect("failed to connect to maintenance database for cleanup");

    let terminate = format!(
        "SELECT pg_terminate_backend(pid) \
         FROM pg_stat_activity \
         WHERE datname = '{db_name}' AND pid <> pg_backend_pid()"
    );
    let _ = maint_pool.execute(terminate.as_str()).await;

    let stmt = format!("DROP DATABASE IF EXISTS {db_name}");
    let _ = maint_pool.execute(stmt.as_str()).await;
    maint_pool.close().await;
}

//! PostgreSQL implementation of the waypoint `DocumentStore` contract.
//!
//! All durable state -- cache entries and quota counters -- lives in a
//! single keyed JSONB table with upsert semantics. The core namespaces and
//! sanitizes keys before they reach this layer.

pub mod config;
pub mod pool;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

use waypoint_core::error::StoreError;
use waypoint_core::store::DocumentStore;

/// A `DocumentStore` over the `documents` table.
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        sqlx::query_scalar::<_, Value>("SELECT value FROM documents WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO documents (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(())
    }
}

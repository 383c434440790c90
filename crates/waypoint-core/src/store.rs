//! The `DocumentStore` trait -- the narrow contract to the external document
//! store, plus the key discipline for everything written through it.
//!
//! The store holds arbitrary JSON records under two namespaces:
//! `cache:{tier}:{key}` for generated artifacts and
//! `quota:{user}:{bucket}:{period}` for per-user counters. Every
//! caller-influenced key segment is sanitized here before it reaches a
//! backend.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

/// Longest key segment accepted after sanitization.
const MAX_KEY_SEGMENT_LEN: usize = 200;

/// Keyed get/set of JSON documents.
///
/// Implementations must be thread-safe (`Send + Sync`) and object-safe so
/// the orchestration components can hold them as `Arc<dyn DocumentStore>`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the document stored under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Write `value` under `key`, overwriting any previous document.
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

// Compile-time assertion: DocumentStore must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn DocumentStore) {}
};

/// Reduce a caller-influenced identifier to a safe key segment.
///
/// Characters outside `[A-Za-z0-9._~-]` become `_`, and the result is capped
/// at 200 bytes. Idempotent: sanitizing an already-sanitized segment returns
/// it unchanged.
pub fn sanitize_key(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '~' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    out.truncate(MAX_KEY_SEGMENT_LEN);
    out
}

/// Store key for a cache entry in the given tier.
pub fn cache_key(tier: &str, key: &str) -> String {
    format!("cache:{tier}:{}", sanitize_key(key))
}

/// Store key for a quota counter.
///
/// `bucket` is a core-internal name such as `summary_monthly`; `period` is a
/// generated calendar key. Only the user id needs sanitizing.
pub fn quota_key(user_id: &str, bucket: &str, period: &str) -> String {
    format!("quota:{}:{bucket}:{period}", sanitize_key(user_id))
}

//! Two-tier artifact cache: a shared tier keyed by content identity,
//! reusable across users and languages, and a private tier keyed by a
//! specific trip or source.
//!
//! Lookups check shared before private and require structural completeness
//! to count as a hit. Writes are independent best-effort operations: a
//! failed tier write is logged and never fails the request or blocks the
//! other tier.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::artifact::StructuredArtifact;
use crate::request::ArtifactKind;
use crate::store::{cache_key, DocumentStore};

/// Cache tier names, in lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Shared,
    Private,
}

impl CacheTier {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Private => "private",
        }
    }
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored cache document: the artifact plus provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub artifact: StructuredArtifact,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub created_at: String,
}

/// A successful lookup: the entry and which tier served it.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub entry: CacheEntry,
    pub tier: CacheTier,
}

/// Looks up and writes generated artifacts across the two cache tiers.
pub struct CacheCascade {
    store: Arc<dyn DocumentStore>,
}

impl CacheCascade {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Look up an artifact of `kind`: shared tier by `primary_key` first,
    /// then private tier by `secondary_key`. A stored entry counts as a hit
    /// only if it deserializes into a structurally complete artifact of the
    /// requested kind; read errors and partial entries are misses.
    pub async fn lookup(
        &self,
        kind: ArtifactKind,
        primary_key: Option<&str>,
        secondary_key: Option<&str>,
    ) -> Option<CacheHit> {
        if let Some(key) = primary_key {
            if let Some(entry) = self.read_tier(CacheTier::Shared, key, kind).await {
                return Some(CacheHit {
                    entry,
                    tier: CacheTier::Shared,
                });
            }
        }
        if let Some(key) = secondary_key {
            if let Some(entry) = self.read_tier(CacheTier::Private, key, kind).await {
                return Some(CacheHit {
                    entry,
                    tier: CacheTier::Private,
                });
            }
        }
        None
    }

    async fn read_tier(
        &self,
        tier: CacheTier,
        key: &str,
        kind: ArtifactKind,
    ) -> Option<CacheEntry> {
        let store_key = cache_key(tier.as_str(), key);
        let value = match self.store.get(&store_key).await {
            Ok(value) => value?,
            Err(e) => {
                tracing::warn!(tier = %tier, key = %key, error = %e, "cache read failed");
                return None;
            }
        };
        let entry: CacheEntry = match serde_json::from_value(value) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(tier = %tier, key = %key, error = %e, "cache entry unreadable");
                return None;
            }
        };
        if entry.artifact.kind() != kind || !entry.artifact.is_complete() {
            tracing::debug!(tier = %tier, key = %key, "cache entry incomplete, treating as miss");
            return None;
        }
        tracing::info!(tier = %tier, key = %key, "cache hit");
        Some(entry)
    }

    /// Persist a validated artifact: shared tier when a primary key is
    /// present, private tier when a secondary key is present and different.
    /// Each tier write is best-effort.
    pub async fn store(
        &self,
        primary_key: Option<&str>,
        secondary_key: Option<&str>,
        artifact: &StructuredArtifact,
        model: &str,
        language: &str,
    ) {
        let entry = CacheEntry {
            artifact: artifact.clone(),
            model: model.to_string(),
            language: language.to_string(),
            created_at: Utc::now().to_rfc3339(),
        };
        let value = match serde_json::to_value(&entry) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "cache entry did not serialize, skipping store");
                return;
            }
        };

        if let Some(key) = primary_key {
            self.write_tier(CacheTier::Shared, key, value.clone()).await;
        }
        if let Some(key) = secondary_key {
            if primary_key != Some(key) {
                self.write_tier(CacheTier::Private, key, value).await;
            }
        }
    }

    async fn write_tier(&self, tier: CacheTier, key: &str, value: serde_json::Value) {
        let store_key = cache_key(tier.as_str(), key);
        match self.store.put(&store_key, value).await {
            Ok(()) => tracing::info!(tier = %tier, key = %key, "cache entry written"),
            Err(e) => tracing::warn!(tier = %tier, key = %key, error = %e, "cache write failed"),
        }
    }
}

impl fmt::Debug for CacheCascade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheCascade").finish()
    }
}

//! Per-user generation allowances over rolling calendar windows.
//!
//! The ledger is the only mutator of quota state. Each quota bucket (scope x
//! class) is an independent counter document; a request is billed exactly
//! once per bucket, and only when every bucket has headroom. VIP identities
//! bypass the ledger entirely -- matched by hash, never by plaintext.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StoreError;
use crate::store::{quota_key, DocumentStore};

/// Sentinel reported for VIP identities instead of a real counter.
pub const UNLIMITED: u32 = 9999;

/// An independent allowance window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaClass {
    Daily,
    Monthly,
}

impl QuotaClass {
    /// Calendar key for the current period: `2026-08-06` daily, `2026-08`
    /// monthly.
    pub fn period_key(&self, now: DateTime<Utc>) -> String {
        match self {
            Self::Daily => now.format("%Y-%m-%d").to_string(),
            Self::Monthly => now.format("%Y-%m").to_string(),
        }
    }
}

impl fmt::Display for QuotaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        };
        f.write_str(s)
    }
}

/// One bucket the ledger checks and charges: a named scope (the operation
/// family, e.g. "summary"), a class, and the configured limit.
#[derive(Debug, Clone)]
pub struct QuotaBucket {
    pub scope: &'static str,
    pub class: QuotaClass,
    pub limit: u32,
}

impl QuotaBucket {
    fn name(&self) -> String {
        format!("{}_{}", self.scope, self.class)
    }
}

/// Current usage of one class, as reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassUsage {
    pub class: QuotaClass,
    pub count: u32,
    pub limit: u32,
    pub remaining: u32,
}

/// Outcome of a reservation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed { usage: Vec<ClassUsage> },
    Denied {
        exhausted: QuotaClass,
        usage: Vec<ClassUsage>,
    },
}

/// The stored counter document. The limit is configuration, not state, so
/// only the count and its period are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct QuotaRecord {
    count: u32,
    period: String,
}

/// Stable obfuscated form of an email hint, for the VIP allow-list.
pub fn hash_email(email: &str) -> String {
    hex::encode(Sha256::digest(email.as_bytes()))
}

/// Tracks and enforces per-user generation allowances.
pub struct QuotaLedger {
    store: Arc<dyn DocumentStore>,
    /// SHA-256 hex digests of allow-listed email hints.
    vip_hashes: Vec<String>,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn DocumentStore>, vip_hashes: Vec<String>) -> Self {
        Self { store, vip_hashes }
    }

    /// Check every bucket and, if all have headroom, charge each by exactly
    /// one. Denial mutates nothing and names the first bucket (in check
    /// order) that is at or over its limit.
    pub async fn check_and_reserve(
        &self,
        user_id: &str,
        email_hint: Option<&str>,
        buckets: &[QuotaBucket],
    ) -> Result<QuotaDecision, StoreError> {
        if let Some(email) = email_hint {
            if self.vip_hashes.contains(&hash_email(email)) {
                tracing::info!(user_id = %user_id, "vip identity, quota bypassed");
                let usage = buckets
                    .iter()
                    .map(|b| ClassUsage {
                        class: b.class,
                        count: 0,
                        limit: UNLIMITED,
                        remaining: UNLIMITED,
                    })
                    .collect();
                return Ok(QuotaDecision::Allowed { usage });
            }
        }

        let now = Utc::now();

        // Read phase: no mutation until every bucket is known to have room.
        let mut counts = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            let period = bucket.class.period_key(now);
            let key = quota_key(user_id, &bucket.name(), &period);
            let count = match self.store.get(&key).await? {
                Some(value) => {
                    let record: QuotaRecord =
                        serde_json::from_value(value).map_err(|e| StoreError::CorruptRecord {
                            key: key.clone(),
                            reason: e.to_string(),
                        })?;
                    record.count
                }
                None => 0,
            };
            counts.push((key, period, count));
        }

        for (bucket, (_, _, count)) in buckets.iter().zip(&counts) {
            if *count >= bucket.limit {
                tracing::info!(
                    user_id = %user_id,
                    class = %bucket.class,
                    count = count,
                    limit = bucket.limit,
                    "quota denied"
                );
                let usage = buckets
                    .iter()
                    .zip(&counts)
                    .map(|(b, (_, _, c))| ClassUsage {
                        class: b.class,
                        count: *c,
                        limit: b.limit,
                        remaining: b.limit.saturating_sub(*c),
                    })
                    .collect();
                return Ok(QuotaDecision::Denied {
                    exhausted: bucket.class,
                    usage,
                });
            }
        }

        // Charge phase: one write per bucket. There is no transaction around
        // the read-increment sequence; concurrent requests can race to an
        // at-least-once charge (accepted design point).
        let mut usage = Vec::with_capacity(buckets.len());
        for (bucket, (key, period, count)) in buckets.iter().zip(&counts) {
            let new_count = count + 1;
            let record = QuotaRecord {
                count: new_count,
                period: period.clone(),
            };
            self.store
                .put(key, serde_json::to_value(&record).expect("quota record serializes"))
                .await?;
            usage.push(ClassUsage {
                class: bucket.class,
                count: new_count,
                limit: bucket.limit,
                remaining: bucket.limit - new_count,
            });
        }

        tracing::info!(user_id = %user_id, buckets = buckets.len(), "quota reserved");
        Ok(QuotaDecision::Allowed { usage })
    }
}

impl fmt::Debug for QuotaLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotaLedger")
            .field("vip_hashes", &self.vip_hashes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_keys_are_calendar_shaped() {
        let now = DateTime::parse_from_rfc3339("2026-08-06T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(QuotaClass::Daily.period_key(now), "2026-08-06");
        assert_eq!(QuotaClass::Monthly.period_key(now), "2026-08");
    }

    #[test]
    fn hash_email_is_stable_and_not_plaintext() {
        let h = hash_email("vip@example.com");
        assert_eq!(h.len(), 64);
        assert!(!h.contains("vip"));
        assert_eq!(h, hash_email("vip@example.com"));
    }
}

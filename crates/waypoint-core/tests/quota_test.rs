//! Tests for the quota ledger: exactly-once charging, denial without
//! mutation, VIP bypass, and fatal store failures.

use std::sync::Arc;

use chrono::Utc;

use waypoint_core::error::StoreError;
use waypoint_core::quota::{
    hash_email, QuotaBucket, QuotaClass, QuotaDecision, QuotaLedger, UNLIMITED,
};
use waypoint_core::store::quota_key;
use waypoint_test_utils::MemoryStore;

fn summary_buckets() -> Vec<QuotaBucket> {
    vec![QuotaBucket {
        scope: "summary",
        class: QuotaClass::Monthly,
        limit: 1,
    }]
}

fn import_buckets() -> Vec<QuotaBucket> {
    vec![
        QuotaBucket {
            scope: "import",
            class: QuotaClass::Monthly,
            limit: 30,
        },
        QuotaBucket {
            scope: "import",
            class: QuotaClass::Daily,
            limit: 5,
        },
    ]
}

#[tokio::test]
async fn first_reservation_is_allowed_and_charged_once() {
    let store = Arc::new(MemoryStore::new());
    let ledger = QuotaLedger::new(store.clone(), vec![]);

    let decision = ledger
        .check_and_reserve("user-1", None, &summary_buckets())
        .await
        .unwrap();

    match decision {
        QuotaDecision::Allowed { usage } => {
            assert_eq!(usage.len(), 1);
            assert_eq!(usage[0].count, 1);
            assert_eq!(usage[0].remaining, 0);
        }
        other => panic!("expected Allowed, got {other:?}"),
    }
    assert_eq!(store.document_count(), 1);
}

#[tokio::test]
async fn reservation_at_limit_is_denied_without_mutation() {
    let store = Arc::new(MemoryStore::new());
    let ledger = QuotaLedger::new(store.clone(), vec![]);

    // Exhaust the single-use monthly bucket.
    ledger
        .check_and_reserve("user-1", None, &summary_buckets())
        .await
        .unwrap();
    let before = store.snapshot();

    let decision = ledger
        .check_and_reserve("user-1", None, &summary_buckets())
        .await
        .unwrap();

    match decision {
        QuotaDecision::Denied { exhausted, usage } => {
            assert_eq!(exhausted, QuotaClass::Monthly);
            assert_eq!(usage[0].count, 1);
            assert_eq!(usage[0].remaining, 0);
        }
        other => panic!("expected Denied, got {other:?}"),
    }
    assert_eq!(store.snapshot(), before, "denial must not write");
}

#[tokio::test]
async fn multi_bucket_reservation_charges_every_bucket() {
    let store = Arc::new(MemoryStore::new());
    let ledger = QuotaLedger::new(store.clone(), vec![]);

    let decision = ledger
        .check_and_reserve("user-1", None, &import_buckets())
        .await
        .unwrap();

    let QuotaDecision::Allowed { usage } = decision else {
        panic!("expected Allowed");
    };
    assert_eq!(usage.len(), 2);
    assert_eq!(usage[0].class, QuotaClass::Monthly);
    assert_eq!(usage[0].remaining, 29);
    assert_eq!(usage[1].class, QuotaClass::Daily);
    assert_eq!(usage[1].remaining, 4);
    assert_eq!(store.document_count(), 2);
}

#[tokio::test]
async fn denial_names_first_exhausted_bucket_in_check_order() {
    let store = Arc::new(MemoryStore::new());
    let ledger = QuotaLedger::new(store.clone(), vec![]);

    // Exhaust only the daily bucket (limit 5).
    for _ in 0..5 {
        let decision = ledger
            .check_and_reserve("user-1", None, &import_buckets())
            .await
            .unwrap();
        assert!(matches!(decision, QuotaDecision::Allowed { .. }));
    }

    let decision = ledger
        .check_and_reserve("user-1", None, &import_buckets())
        .await
        .unwrap();
    match decision {
        QuotaDecision::Denied { exhausted, .. } => assert_eq!(exhausted, QuotaClass::Daily),
        other => panic!("expected Denied, got {other:?}"),
    }
}

#[tokio::test]
async fn vip_identity_is_always_allowed_and_never_writes() {
    let store = Arc::new(MemoryStore::new());
    let ledger = QuotaLedger::new(store.clone(), vec![hash_email("vip@example.com")]);

    for _ in 0..10 {
        let decision = ledger
            .check_and_reserve("vip-user", Some("vip@example.com"), &summary_buckets())
            .await
            .unwrap();
        let QuotaDecision::Allowed { usage } = decision else {
            panic!("vip must be allowed");
        };
        assert_eq!(usage[0].remaining, UNLIMITED);
    }
    assert_eq!(store.document_count(), 0, "vip must not touch storage");
}

#[tokio::test]
async fn non_vip_email_does_not_bypass() {
    let store = Arc::new(MemoryStore::new());
    let ledger = QuotaLedger::new(store.clone(), vec![hash_email("vip@example.com")]);

    let decision = ledger
        .check_and_reserve("user-1", Some("other@example.com"), &summary_buckets())
        .await
        .unwrap();
    let QuotaDecision::Allowed { usage } = decision else {
        panic!("expected Allowed");
    };
    assert_eq!(usage[0].count, 1);
    assert_eq!(store.document_count(), 1);
}

#[tokio::test]
async fn store_read_failure_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    store.fail_gets_matching("quota:");
    let ledger = QuotaLedger::new(store, vec![]);

    let result = ledger
        .check_and_reserve("user-1", None, &summary_buckets())
        .await;
    assert!(result.is_err(), "quota read failure must propagate");
}

#[tokio::test]
async fn corrupt_record_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    let ledger = QuotaLedger::new(store.clone(), vec![]);

    let period = QuotaClass::Monthly.period_key(Utc::now());
    let key = quota_key("user-1", "summary_monthly", &period);
    store.insert(&key, serde_json::json!({"count": "not a number"}));

    let result = ledger
        .check_and_reserve("user-1", None, &summary_buckets())
        .await;
    assert!(matches!(result, Err(StoreError::CorruptRecord { .. })));
}

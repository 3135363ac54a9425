mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::Harness;
use paygate::domain::money::Amount;
use paygate::domain::ports::SessionStore;
use paygate::domain::session::{
    ExecutionMode, PaymentSession, SessionStatus, generate_token,
};
use paygate::domain::snapshot::{ReconciliationMode, TruthSnapshot};
use rust_decimal_macros::dec;

fn snapshot(nav: rust_decimal::Decimal, count: u64) -> TruthSnapshot {
    TruthSnapshot {
        nav,
        share_price: dec!(10000),
        utilization_bps: 5000,
        invoice_count: count,
        total_paid: dec!(50000),
        captured_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_clean_reconciliation_within_tolerance() {
    let harness = Harness::new();
    harness.ledger.set_snapshot(snapshot(dec!(1_000_000), 10)).await;
    // Within the default money tolerance of 100 minor units.
    harness.indexed.set(snapshot(dec!(1_000_050), 10), 30).await;

    let result = harness.reconciliation().reconciled_snapshot().await.unwrap();
    assert_eq!(result.mode, ReconciliationMode::Reconciled);
    assert!(result.mismatches.is_empty());
    assert_eq!(result.canonical.nav, dec!(1_000_000));
}

#[tokio::test]
async fn test_mismatch_reports_signed_diff_and_keeps_canonical_onchain() {
    let harness = Harness::new();
    harness.ledger.set_snapshot(snapshot(dec!(1_000_000), 10)).await;
    harness.indexed.set(snapshot(dec!(1_000_500), 13), 30).await;

    let result = harness.reconciliation().reconciled_snapshot().await.unwrap();
    assert_eq!(result.mode, ReconciliationMode::Reconciled);
    assert_eq!(result.mismatches.len(), 2);

    let nav = result.mismatches.iter().find(|m| m.field == "nav").unwrap();
    assert_eq!(nav.onchain, dec!(1_000_000));
    assert_eq!(nav.indexed, dec!(1_000_500));
    assert_eq!(nav.diff, dec!(-500));

    // The canonical snapshot is the authoritative one even when it disagrees.
    assert_eq!(result.canonical.nav, dec!(1_000_000));
}

#[tokio::test]
async fn test_stale_indexed_view_degrades_to_onchain_only() {
    let harness = Harness::new();
    harness.ledger.set_snapshot(snapshot(dec!(1_000_000), 10)).await;
    // Default staleness threshold is 300 seconds.
    harness.indexed.set(snapshot(dec!(2_000_000), 99), 301).await;

    let result = harness.reconciliation().reconciled_snapshot().await.unwrap();
    assert_eq!(result.mode, ReconciliationMode::OnchainOnly);
    assert!(result.mismatches.is_empty());
    // The stale snapshot stays attached for visibility.
    let indexed = result.indexed.expect("stale snapshot attached");
    assert_eq!(indexed.lag_seconds, 301);
}

#[tokio::test]
async fn test_missing_indexer_runs_onchain_only() {
    let harness = Harness::new();
    harness.ledger.set_snapshot(snapshot(dec!(1_000_000), 10)).await;

    let result = harness
        .reconciliation_without_indexer()
        .reconciled_snapshot()
        .await
        .unwrap();
    assert_eq!(result.mode, ReconciliationMode::OnchainOnly);
    assert!(result.indexed.is_none());
}

#[tokio::test]
async fn test_unreachable_indexer_degrades_to_onchain_only() {
    let harness = Harness::new();
    harness.ledger.set_snapshot(snapshot(dec!(1_000_000), 10)).await;
    // The stub indexed source errors until a snapshot is set.

    let result = harness.reconciliation().reconciled_snapshot().await.unwrap();
    assert_eq!(result.mode, ReconciliationMode::OnchainOnly);
    assert!(result.indexed.is_none());
}

#[tokio::test]
async fn test_cycle_sweeps_expired_sessions() {
    let harness = Harness::new();
    let now = Utc::now();
    let session = PaymentSession {
        id: generate_token(),
        invoice_id: "inv-1".to_string(),
        amount_requested: Amount::from(1000),
        currency: "USDC".to_string(),
        chain: "base".to_string(),
        recipient: harness.config.recipient.clone(),
        status: SessionStatus::Pending,
        tx_hash: None,
        expires_at: now - ChronoDuration::seconds(60),
        execution_mode: ExecutionMode::UserInitiated,
        authorization_id: None,
        metadata: serde_json::Value::Null,
        created_at: now - ChronoDuration::seconds(1000),
    };
    harness.session_store.create(session.clone()).await.unwrap();

    harness.reconciliation().run_cycle().await.unwrap();

    let swept = harness.session_store.get(&session.id).await.unwrap().unwrap();
    assert_eq!(swept.status, SessionStatus::Expired);

    // A second pass finds nothing left to sweep and stays clean.
    harness.reconciliation().run_cycle().await.unwrap();
    let again = harness.session_store.get(&session.id).await.unwrap().unwrap();
    assert_eq!(again.status, SessionStatus::Expired);
}

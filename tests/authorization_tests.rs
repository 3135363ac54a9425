mod common;

use common::Harness;
use chrono::Utc;
use paygate::application::authorization::Decision;
use paygate::domain::invoice::InvoiceStatus;
use paygate::domain::money::Amount;
use paygate::domain::policy::{
    ActorKind, AuditAction, DenialReason, ExecutionRecord, ExecutionStatus, PolicyPatch,
};
use paygate::domain::ports::Page;
use paygate::domain::session::generate_token;

async fn executed(harness: &Harness, authorization_id: &str, amount: u64) {
    harness
        .engine
        .record_execution(ExecutionRecord {
            id: generate_token(),
            authorization_id: authorization_id.to_string(),
            invoice_id: "inv-prior".to_string(),
            amount: Amount::from(amount),
            currency: "USDC".to_string(),
            chain: "base".to_string(),
            status: ExecutionStatus::Executed,
            reason: None,
            tx_hash: Some(common::proof('e')),
            session_id: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
}

fn denied_with(decision: Decision, expected: DenialReason) {
    match decision {
        Decision::Denied { reason } => assert_eq!(reason, expected),
        Decision::Allowed { .. } => panic!("expected denial with {expected:?}"),
    }
}

#[tokio::test]
async fn test_daily_limit_accounts_for_todays_executions() {
    let harness = Harness::new();
    let policy = harness.add_policy("co-1", 1000, 0, 0).await;
    executed(&harness, &policy.id, 600).await;

    let denied = harness
        .engine
        .check("co-1", "inv-1", InvoiceStatus::Approved, Amount::from(500), "USDC", "base")
        .await
        .unwrap();
    denied_with(denied, DenialReason::DailyLimitExceeded);

    let allowed = harness
        .engine
        .check("co-1", "inv-1", InvoiceStatus::Approved, Amount::from(300), "USDC", "base")
        .await
        .unwrap();
    assert!(matches!(allowed, Decision::Allowed { .. }));
}

#[tokio::test]
async fn test_monthly_limit_checked_after_daily() {
    let harness = Harness::new();
    let policy = harness.add_policy("co-1", 0, 2000, 0).await;
    executed(&harness, &policy.id, 1800).await;

    let denied = harness
        .engine
        .check("co-1", "inv-1", InvoiceStatus::Approved, Amount::from(300), "USDC", "base")
        .await
        .unwrap();
    denied_with(denied, DenialReason::MonthlyLimitExceeded);
}

#[tokio::test]
async fn test_checks_short_circuit_in_order() {
    let harness = Harness::new();

    // No policy at all.
    let decision = harness
        .engine
        .check("co-1", "inv-1", InvoiceStatus::Approved, Amount::from(100), "USDC", "base")
        .await
        .unwrap();
    denied_with(decision, DenialReason::NoAuthorization);

    // Wrong status wins over wrong currency and wrong chain.
    harness.add_policy("co-1", 0, 0, 0).await;
    let decision = harness
        .engine
        .check("co-1", "inv-1", InvoiceStatus::Pending, Amount::from(100), "EURC", "arbitrum")
        .await
        .unwrap();
    denied_with(decision, DenialReason::InvoiceStatusNotAllowed);

    // Wrong currency wins over wrong chain.
    let decision = harness
        .engine
        .check("co-1", "inv-1", InvoiceStatus::Approved, Amount::from(100), "EURC", "arbitrum")
        .await
        .unwrap();
    denied_with(decision, DenialReason::CurrencyNotAllowed);

    let decision = harness
        .engine
        .check("co-1", "inv-1", InvoiceStatus::Approved, Amount::from(100), "USDC", "arbitrum")
        .await
        .unwrap();
    denied_with(decision, DenialReason::ChainNotAllowed);
}

#[tokio::test]
async fn test_per_invoice_limit() {
    let harness = Harness::new();
    harness.add_policy("co-1", 0, 0, 400).await;

    let decision = harness
        .engine
        .check("co-1", "inv-1", InvoiceStatus::Approved, Amount::from(401), "USDC", "base")
        .await
        .unwrap();
    denied_with(decision, DenialReason::PerInvoiceLimitExceeded);

    let decision = harness
        .engine
        .check("co-1", "inv-1", InvoiceStatus::Approved, Amount::from(400), "USDC", "base")
        .await
        .unwrap();
    assert!(matches!(decision, Decision::Allowed { .. }));
}

#[tokio::test]
async fn test_new_policy_revokes_prior_and_audits_both() {
    let harness = Harness::new();
    let first = harness.add_policy("co-1", 1000, 0, 0).await;
    let second = harness.add_policy("co-1", 2000, 0, 0).await;

    let prior = harness.engine.get_policy(&first.id).await.unwrap().unwrap();
    assert!(!prior.active);
    assert!(prior.revoked_at.is_some());

    let active = harness
        .engine
        .check("co-1", "inv-1", InvoiceStatus::Approved, Amount::from(1500), "USDC", "base")
        .await
        .unwrap();
    match active {
        Decision::Allowed { authorization } => assert_eq!(authorization.id, second.id),
        Decision::Denied { reason } => panic!("expected new policy to apply, got {reason:?}"),
    }

    let first_audit = harness
        .engine
        .audit_log(&first.id, Page::default())
        .await
        .unwrap();
    assert!(first_audit.iter().any(|e| e.action == AuditAction::Created));
    assert!(first_audit.iter().any(|e| e.action == AuditAction::Revoked));

    let second_audit = harness
        .engine
        .audit_log(&second.id, Page::default())
        .await
        .unwrap();
    assert!(second_audit.iter().any(|e| e.action == AuditAction::Created));
}

#[tokio::test]
async fn test_patch_and_revoke_lifecycle() {
    let harness = Harness::new();
    let policy = harness.add_policy("co-1", 1000, 0, 0).await;

    let patched = harness
        .engine
        .patch_policy(
            &policy.id,
            PolicyPatch {
                daily_limit: Some(Amount::from(5000)),
                ..PolicyPatch::default()
            },
            ActorKind::Human,
        )
        .await
        .unwrap();
    assert_eq!(patched.daily_limit, Amount::from(5000));

    harness
        .engine
        .revoke_policy(&policy.id, ActorKind::Human)
        .await
        .unwrap();
    let decision = harness
        .engine
        .check("co-1", "inv-1", InvoiceStatus::Approved, Amount::from(100), "USDC", "base")
        .await
        .unwrap();
    denied_with(decision, DenialReason::NoAuthorization);

    let audit = harness
        .engine
        .audit_log(&policy.id, Page::default())
        .await
        .unwrap();
    let actions: Vec<AuditAction> = audit.iter().map(|e| e.action).collect();
    assert!(actions.contains(&AuditAction::Updated));
    assert!(actions.contains(&AuditAction::Revoked));
}

#[tokio::test]
async fn test_blocked_executions_never_count_as_spend() {
    let harness = Harness::new();
    let policy = harness.add_policy("co-1", 1000, 0, 0).await;

    harness
        .engine
        .record_execution(ExecutionRecord {
            id: generate_token(),
            authorization_id: policy.id.clone(),
            invoice_id: "inv-0".to_string(),
            amount: Amount::from(900),
            currency: "USDC".to_string(),
            chain: "base".to_string(),
            status: ExecutionStatus::Blocked,
            reason: Some("amount would exceed daily limit".to_string()),
            tx_hash: None,
            session_id: None,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let decision = harness
        .engine
        .check("co-1", "inv-1", InvoiceStatus::Approved, Amount::from(1000), "USDC", "base")
        .await
        .unwrap();
    assert!(matches!(decision, Decision::Allowed { .. }));
}

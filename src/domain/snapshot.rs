use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Point-in-time aggregate read from either the authoritative ledger or the
/// indexed view. All monetary fields are integer minor units.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TruthSnapshot {
    pub nav: Decimal,
    pub share_price: Decimal,
    pub utilization_bps: i64,
    pub invoice_count: u64,
    pub total_paid: Decimal,
    pub captured_at: DateTime<Utc>,
}

/// Snapshot from the indexed source, which may lag the authoritative ledger.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct IndexedSnapshot {
    pub snapshot: TruthSnapshot,
    pub lag_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub enum ReconciliationMode {
    OnchainOnly,
    Reconciled,
}

/// One field disagreement between the two sources. `diff` is signed:
/// onchain minus indexed. Output-only.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct Mismatch {
    pub field: &'static str,
    pub onchain: Decimal,
    pub indexed: Decimal,
    pub diff: Decimal,
}

/// Per-field tolerances for snapshot comparison: a coarse absolute tolerance
/// for large-denomination money fields, one unit for counts, one basis point
/// for bps fields.
#[derive(Debug, Clone, Copy)]
pub struct Tolerances {
    pub money: Decimal,
    pub count: Decimal,
    pub bps: Decimal,
}

/// Outcome of one reconciliation pass. `canonical` always carries the
/// authoritative values, whatever the mode. Output-only.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct ReconciledSnapshot {
    pub canonical: TruthSnapshot,
    pub indexed: Option<IndexedSnapshot>,
    pub mode: ReconciliationMode,
    pub mismatches: Vec<Mismatch>,
}

/// Compares each shared field against its tolerance and collects mismatches.
pub fn compare_snapshots(
    onchain: &TruthSnapshot,
    indexed: &TruthSnapshot,
    tolerances: &Tolerances,
) -> Vec<Mismatch> {
    let fields: [(&'static str, Decimal, Decimal, Decimal); 5] = [
        ("nav", onchain.nav, indexed.nav, tolerances.money),
        (
            "share_price",
            onchain.share_price,
            indexed.share_price,
            tolerances.money,
        ),
        (
            "utilization_bps",
            Decimal::from(onchain.utilization_bps),
            Decimal::from(indexed.utilization_bps),
            tolerances.bps,
        ),
        (
            "invoice_count",
            Decimal::from(onchain.invoice_count),
            Decimal::from(indexed.invoice_count),
            tolerances.count,
        ),
        (
            "total_paid",
            onchain.total_paid,
            indexed.total_paid,
            tolerances.money,
        ),
    ];

    let mut mismatches = Vec::new();
    for (field, onchain_value, indexed_value, tolerance) in fields {
        let diff = onchain_value - indexed_value;
        if diff.abs() > tolerance {
            mismatches.push(Mismatch {
                field,
                onchain: onchain_value,
                indexed: indexed_value,
                diff,
            });
        }
    }
    mismatches
}

use crate::domain::invoice::InvoiceStatus;
use crate::domain::ports::{
    IndexedSource, LedgerTransaction, SettlementLedger, TransferRequest,
};
use crate::domain::session::ProofReference;
use crate::domain::snapshot::{IndexedSnapshot, TruthSnapshot};
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use rand::RngCore;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory stand-in for the authoritative ledger.
///
/// Backs the development profile and the integration tests so the full
/// agent loop runs end to end without a settlement network. Submitted
/// transfers are recorded and immediately considered deeply confirmed.
#[derive(Default, Clone)]
pub struct StubLedger {
    state: Arc<RwLock<StubLedgerState>>,
}

#[derive(Default)]
struct StubLedgerState {
    transactions: HashMap<ProofReference, LedgerTransaction>,
    statuses: HashMap<String, InvoiceStatus>,
    snapshot: Option<TruthSnapshot>,
}

impl StubLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_snapshot(&self, snapshot: TruthSnapshot) {
        self.state.write().await.snapshot = Some(snapshot);
    }

    /// Statuses pushed by the settlement coordinator; inspected by tests.
    pub async fn pushed_status(&self, invoice_id: &str) -> Option<InvoiceStatus> {
        self.state.read().await.statuses.get(invoice_id).copied()
    }
}

fn fresh_reference() -> ProofReference {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let raw = format!("0x{}", hex::encode(bytes));
    // 32 random bytes always hex-encode to 64 characters.
    ProofReference::parse(&raw).unwrap_or_else(|_| unreachable!("generated reference is well-formed"))
}

#[async_trait]
impl SettlementLedger for StubLedger {
    async fn snapshot(&self) -> Result<TruthSnapshot> {
        let state = self.state.read().await;
        Ok(state.snapshot.clone().unwrap_or(TruthSnapshot {
            nav: Decimal::ZERO,
            share_price: Decimal::ZERO,
            utilization_bps: 0,
            invoice_count: 0,
            total_paid: Decimal::ZERO,
            captured_at: Utc::now(),
        }))
    }

    async fn transaction_by_reference(
        &self,
        reference: &ProofReference,
    ) -> Result<Option<LedgerTransaction>> {
        let state = self.state.read().await;
        Ok(state.transactions.get(reference).cloned())
    }

    async fn submit_transfer(&self, request: &TransferRequest) -> Result<ProofReference> {
        let reference = fresh_reference();
        let mut state = self.state.write().await;
        state.transactions.insert(
            reference.clone(),
            LedgerTransaction {
                reference: reference.clone(),
                amount: request.amount,
                currency: request.currency.clone(),
                recipient: request.recipient.clone(),
                confirmations: 12,
            },
        );
        debug!(invoice_id = %request.invoice_id, %reference, "stub transfer submitted");
        Ok(reference)
    }

    async fn push_invoice_status(&self, invoice_id: &str, status: InvoiceStatus) -> Result<()> {
        let mut state = self.state.write().await;
        state.statuses.insert(invoice_id.to_string(), status);
        Ok(())
    }
}

/// In-memory indexed view with a settable snapshot and lag.
#[derive(Default, Clone)]
pub struct StubIndexedSource {
    state: Arc<RwLock<Option<IndexedSnapshot>>>,
}

impl StubIndexedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, snapshot: TruthSnapshot, lag_seconds: u64) {
        *self.state.write().await = Some(IndexedSnapshot {
            snapshot,
            lag_seconds,
        });
    }
}

#[async_trait]
impl IndexedSource for StubIndexedSource {
    async fn snapshot(&self) -> Result<IndexedSnapshot> {
        let state = self.state.read().await;
        state.clone().ok_or_else(|| {
            crate::error::PaymentError::ExecutionFailed("indexed source is empty".to_string())
        })
    }
}

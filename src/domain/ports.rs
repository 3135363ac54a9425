use super::invoice::{Invoice, InvoiceStatus, PaymentRecord, Settlement};
use super::money::Amount;
use super::policy::{Authorization, AuditLogEntry, ExecutionRecord, PolicyPatch};
use super::session::{PaymentSession, ProofReference};
use super::snapshot::{IndexedSnapshot, TruthSnapshot};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

pub type SessionStoreHandle = Arc<dyn SessionStore>;
pub type InvoiceStoreHandle = Arc<dyn InvoiceStore>;
pub type PolicyStoreHandle = Arc<dyn PolicyStore>;
pub type ExecutionStoreHandle = Arc<dyn ExecutionStore>;
pub type AuditStoreHandle = Arc<dyn AuditStore>;
pub type SettlementLedgerHandle = Arc<dyn SettlementLedger>;
pub type IndexedSourceHandle = Arc<dyn IndexedSource>;
pub type ProofVerifierHandle = Arc<dyn ProofVerifier>;
pub type SettlementNotifierHandle = Arc<dyn SettlementNotifier>;

/// Result of a session confirmation attempt.
///
/// `newly_confirmed` is false on the idempotent-repeat path (same session,
/// same proof, already confirmed); callers must only settle when it is true.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmOutcome {
    pub session: PaymentSession,
    pub newly_confirmed: bool,
}

/// Offset/limit pagination for history endpoints.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub const MAX_LIMIT: usize = 100;

    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, 50)
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: PaymentSession) -> Result<()>;

    async fn get(&self, session_id: &str) -> Result<Option<PaymentSession>>;

    /// Atomically binds `tx_hash` to the session and flips Pending →
    /// Confirmed. The status check, the proof-uniqueness check, and the
    /// write happen under one guard; concurrent confirmations of the same
    /// session yield exactly one winner.
    async fn confirm(&self, session_id: &str, tx_hash: ProofReference) -> Result<ConfirmOutcome>;

    /// Bulk-transitions Pending sessions past their deadline to Expired.
    /// Idempotent; returns the number transitioned.
    async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn insert(&self, invoice: Invoice) -> Result<()>;

    async fn get(&self, invoice_id: &str) -> Result<Option<Invoice>>;

    /// Invoices of a company in one of `statuses` and not yet fully paid.
    async fn payable_for_company(
        &self,
        company_id: &str,
        statuses: &HashSet<InvoiceStatus>,
    ) -> Result<Vec<Invoice>>;

    /// Persists the payment record and the invoice's cumulative/status
    /// update as one atomic unit.
    async fn apply_payment(&self, invoice_id: &str, record: PaymentRecord) -> Result<Settlement>;
}

#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Activates `policy`, revoking any prior active policy for the same
    /// company inside the same guard (at most one active per company).
    /// Returns the revoked predecessor, if any.
    async fn create(&self, policy: Authorization) -> Result<Option<Authorization>>;

    async fn get(&self, policy_id: &str) -> Result<Option<Authorization>>;

    async fn patch(&self, policy_id: &str, patch: PolicyPatch) -> Result<Authorization>;

    /// Soft-revoke: clears `active`, stamps `revoked_at`, keeps history.
    async fn revoke(&self, policy_id: &str) -> Result<Authorization>;

    async fn active_for_company(&self, company_id: &str) -> Result<Option<Authorization>>;

    async fn active_agent_policies(&self) -> Result<Vec<Authorization>>;
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn append(&self, record: ExecutionRecord) -> Result<()>;

    /// Sum of EXECUTED amounts for the authorization since `from`.
    /// Blocked and failed attempts never count against limits.
    async fn executed_total_since(&self, authorization_id: &str, from: DateTime<Utc>)
    -> Result<Amount>;

    async fn list(&self, authorization_id: &str, page: Page) -> Result<Vec<ExecutionRecord>>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: AuditLogEntry) -> Result<()>;

    async fn list(&self, authorization_id: &str, page: Page) -> Result<Vec<AuditLogEntry>>;
}

/// A fund movement observed on the authoritative ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerTransaction {
    pub reference: ProofReference,
    pub amount: Amount,
    pub currency: String,
    pub recipient: String,
    pub confirmations: u32,
}

/// Request to move funds on the settlement network.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub invoice_id: String,
    pub amount: Amount,
    pub currency: String,
    pub chain: String,
    pub recipient: String,
}

/// Read/write interface to the authoritative ledger. External collaborator;
/// callers wrap every call in a timeout.
#[async_trait]
pub trait SettlementLedger: Send + Sync {
    async fn snapshot(&self) -> Result<TruthSnapshot>;

    async fn transaction_by_reference(
        &self,
        reference: &ProofReference,
    ) -> Result<Option<LedgerTransaction>>;

    async fn submit_transfer(&self, request: &TransferRequest) -> Result<ProofReference>;

    async fn push_invoice_status(&self, invoice_id: &str, status: InvoiceStatus) -> Result<()>;
}

/// Read interface to the lagging indexed view of the ledger.
#[async_trait]
pub trait IndexedSource: Send + Sync {
    async fn snapshot(&self) -> Result<IndexedSnapshot>;
}

/// Payment details a proof is checked against.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedPayment {
    pub amount: Amount,
    pub currency: String,
    pub recipient: String,
}

/// What the verifier established about a proof.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub amount: Amount,
    pub currency: String,
    pub recipient: String,
}

#[async_trait]
pub trait ProofVerifier: Send + Sync {
    async fn verify(
        &self,
        proof: &ProofReference,
        expected: &ExpectedPayment,
    ) -> Result<Verification>;
}

/// Sink for settlement-completed notifications.
#[async_trait]
pub trait SettlementNotifier: Send + Sync {
    async fn settled(&self, settlement: &Settlement);
}

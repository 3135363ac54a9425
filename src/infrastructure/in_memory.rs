use crate::domain::invoice::{Invoice, InvoiceStatus, PaymentRecord, Settlement};
use crate::domain::money::Amount;
use crate::domain::policy::{AuditLogEntry, Authorization, ExecutionRecord, ExecutionStatus, PolicyPatch};
use crate::domain::ports::{
    AuditStore, ConfirmOutcome, ExecutionStore, InvoiceStore, Page, PolicyStore, SessionStore,
    SettlementNotifier,
};
use crate::domain::session::{PaymentSession, ProofReference, SessionStatus};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Session map and the proof-reference unique index behind ONE lock, so
/// `confirm` is a true compare-and-swap: status check, uniqueness check,
/// and write all happen under a single write guard.
#[derive(Default)]
struct SessionState {
    sessions: HashMap<String, PaymentSession>,
    proof_index: HashMap<ProofReference, String>,
}

#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    state: Arc<RwLock<SessionState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: PaymentSession) -> Result<()> {
        let mut state = self.state.write().await;
        state.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<PaymentSession>> {
        let state = self.state.read().await;
        Ok(state.sessions.get(session_id).cloned())
    }

    async fn confirm(&self, session_id: &str, tx_hash: ProofReference) -> Result<ConfirmOutcome> {
        let now = Utc::now();
        let mut state = self.state.write().await;

        let Some(session) = state.sessions.get(session_id) else {
            return Err(PaymentError::SessionNotFound(session_id.to_string()));
        };
        match session.status {
            SessionStatus::Confirmed => {
                // Same proof again is the idempotent-repeat case.
                return if session.tx_hash.as_ref() == Some(&tx_hash) {
                    Ok(ConfirmOutcome {
                        session: session.clone(),
                        newly_confirmed: false,
                    })
                } else {
                    Err(PaymentError::SessionAlreadyConfirmed(session_id.to_string()))
                };
            }
            SessionStatus::Expired => {
                return Err(PaymentError::SessionExpired(session_id.to_string()));
            }
            SessionStatus::Pending => {}
        }
        if session.expires_at < now {
            return Err(PaymentError::SessionExpired(session_id.to_string()));
        }
        if state.proof_index.contains_key(&tx_hash) {
            return Err(PaymentError::DuplicateProof);
        }

        state
            .proof_index
            .insert(tx_hash.clone(), session_id.to_string());
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| PaymentError::SessionNotFound(session_id.to_string()))?;
        session.status = SessionStatus::Confirmed;
        session.tx_hash = Some(tx_hash);
        Ok(ConfirmOutcome {
            session: session.clone(),
            newly_confirmed: true,
        })
    }

    async fn expire_due(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut count = 0u64;
        for session in state.sessions.values_mut() {
            if session.is_expired_at(now) {
                session.status = SessionStatus::Expired;
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Invoices and their payment records behind one lock; `apply_payment`
/// mutates both under a single write guard.
#[derive(Default)]
struct InvoiceState {
    invoices: HashMap<String, Invoice>,
    payments: Vec<PaymentRecord>,
}

#[derive(Default, Clone)]
pub struct InMemoryInvoiceStore {
    state: Arc<RwLock<InvoiceState>>,
}

impl InMemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all payment records; used by tests to assert
    /// exactly-once settlement.
    pub async fn payment_records(&self) -> Vec<PaymentRecord> {
        self.state.read().await.payments.clone()
    }
}

#[async_trait]
impl InvoiceStore for InMemoryInvoiceStore {
    async fn insert(&self, invoice: Invoice) -> Result<()> {
        let mut state = self.state.write().await;
        state.invoices.insert(invoice.id.clone(), invoice);
        Ok(())
    }

    async fn get(&self, invoice_id: &str) -> Result<Option<Invoice>> {
        let state = self.state.read().await;
        Ok(state.invoices.get(invoice_id).cloned())
    }

    async fn payable_for_company(
        &self,
        company_id: &str,
        statuses: &HashSet<InvoiceStatus>,
    ) -> Result<Vec<Invoice>> {
        let state = self.state.read().await;
        let mut matches: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|inv| {
                inv.company_id == company_id
                    && statuses.contains(&inv.status)
                    && !inv.remaining().is_zero()
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches)
    }

    async fn apply_payment(&self, invoice_id: &str, record: PaymentRecord) -> Result<Settlement> {
        let mut state = self.state.write().await;
        let Some(invoice) = state.invoices.get_mut(invoice_id) else {
            return Err(PaymentError::InvoiceNotFound(invoice_id.to_string()));
        };
        let settlement = invoice.apply_payment(record.amount, &record.correlation_id);
        state.payments.push(record);
        Ok(settlement)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPolicyStore {
    policies: Arc<RwLock<HashMap<String, Authorization>>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn create(&self, policy: Authorization) -> Result<Option<Authorization>> {
        let mut policies = self.policies.write().await;
        // Deactivate the predecessor inside the same guard that activates
        // the new policy: at most one active policy per company, even under
        // concurrent creates.
        let prior = policies
            .values_mut()
            .find(|p| p.company_id == policy.company_id && p.active);
        let revoked = match prior {
            Some(prior) => {
                prior.active = false;
                prior.revoked_at = Some(Utc::now());
                Some(prior.clone())
            }
            None => None,
        };
        policies.insert(policy.id.clone(), policy);
        Ok(revoked)
    }

    async fn get(&self, policy_id: &str) -> Result<Option<Authorization>> {
        let policies = self.policies.read().await;
        Ok(policies.get(policy_id).cloned())
    }

    async fn patch(&self, policy_id: &str, patch: PolicyPatch) -> Result<Authorization> {
        let mut policies = self.policies.write().await;
        let Some(policy) = policies.get_mut(policy_id) else {
            return Err(PaymentError::PolicyNotFound(policy_id.to_string()));
        };
        if let Some(v) = patch.max_amount_per_invoice {
            policy.max_amount_per_invoice = v;
        }
        if let Some(v) = patch.daily_limit {
            policy.daily_limit = v;
        }
        if let Some(v) = patch.monthly_limit {
            policy.monthly_limit = v;
        }
        if let Some(v) = patch.allowed_currencies {
            policy.allowed_currencies = v;
        }
        if let Some(v) = patch.allowed_chains {
            policy.allowed_chains = v;
        }
        if let Some(v) = patch.allowed_invoice_statuses {
            policy.allowed_invoice_statuses = v;
        }
        if let Some(v) = patch.auto_approve {
            policy.auto_approve = v;
        }
        Ok(policy.clone())
    }

    async fn revoke(&self, policy_id: &str) -> Result<Authorization> {
        let mut policies = self.policies.write().await;
        let Some(policy) = policies.get_mut(policy_id) else {
            return Err(PaymentError::PolicyNotFound(policy_id.to_string()));
        };
        if policy.active {
            policy.active = false;
            policy.revoked_at = Some(Utc::now());
        }
        Ok(policy.clone())
    }

    async fn active_for_company(&self, company_id: &str) -> Result<Option<Authorization>> {
        let policies = self.policies.read().await;
        Ok(policies
            .values()
            .find(|p| p.company_id == company_id && p.active && p.revoked_at.is_none())
            .cloned())
    }

    async fn active_agent_policies(&self) -> Result<Vec<Authorization>> {
        let policies = self.policies.read().await;
        let mut active: Vec<Authorization> =
            policies.values().filter(|p| p.active).cloned().collect();
        active.sort_by(|a, b| a.company_id.cmp(&b.company_id));
        Ok(active)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryExecutionStore {
    records: Arc<RwLock<Vec<ExecutionRecord>>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn append(&self, record: ExecutionRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.push(record);
        Ok(())
    }

    async fn executed_total_since(
        &self,
        authorization_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Amount> {
        let records = self.records.read().await;
        let mut total = Amount::ZERO;
        for record in records.iter() {
            if record.authorization_id == authorization_id
                && record.status == ExecutionStatus::Executed
                && record.created_at >= from
            {
                total += record.amount;
            }
        }
        Ok(total)
    }

    async fn list(&self, authorization_id: &str, page: Page) -> Result<Vec<ExecutionRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.authorization_id == authorization_id)
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryAuditStore {
    entries: Arc<RwLock<Vec<AuditLogEntry>>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: AuditLogEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.push(entry);
        Ok(())
    }

    async fn list(&self, authorization_id: &str, page: Page) -> Result<Vec<AuditLogEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.authorization_id == authorization_id)
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect())
    }
}

/// Notifier that emits settlement-completed events to the log stream.
#[derive(Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl SettlementNotifier for LogNotifier {
    async fn settled(&self, settlement: &Settlement) {
        info!(
            invoice_id = %settlement.invoice_id,
            correlation_id = %settlement.correlation_id,
            old_status = ?settlement.old_status,
            new_status = ?settlement.new_status,
            cumulative_paid = %settlement.cumulative_paid,
            "settlement completed"
        );
    }
}

/// Notifier that collects events in memory; used by tests.
#[derive(Default, Clone)]
pub struct CollectingNotifier {
    events: Arc<RwLock<Vec<Settlement>>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<Settlement> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl SettlementNotifier for CollectingNotifier {
    async fn settled(&self, settlement: &Settlement) {
        self.events.write().await.push(settlement.clone());
    }
}

use crate::config::Config;
use crate::domain::invoice::Invoice;
use crate::domain::ports::{ConfirmOutcome, SessionStoreHandle};
use crate::domain::session::{
    ExecutionMode, PaymentSession, ProofReference, SessionStatus, generate_token,
};
use crate::error::Result;
use chrono::{Duration as ChronoDuration, Utc};
use tracing::debug;

/// Owns the payment-session lifecycle: open, confirm, sweep.
///
/// Uniqueness and atomicity guarantees live in the session store; this
/// service adds token generation, TTL stamping, and the proof-format gate.
pub struct SessionManager {
    store: SessionStoreHandle,
    ttl_secs: u64,
    chain: String,
    currency: String,
    recipient: String,
}

impl SessionManager {
    pub fn new(store: SessionStoreHandle, config: &Config) -> Self {
        Self {
            store,
            ttl_secs: config.session_ttl_secs,
            chain: config.chain.clone(),
            currency: config.currency.clone(),
            recipient: config.recipient.clone(),
        }
    }

    /// Opens a Pending session for the invoice's remaining balance.
    pub async fn open(
        &self,
        invoice: &Invoice,
        execution_mode: ExecutionMode,
        authorization_id: Option<String>,
        metadata: serde_json::Value,
    ) -> Result<PaymentSession> {
        let now = Utc::now();
        let session = PaymentSession {
            id: generate_token(),
            invoice_id: invoice.id.clone(),
            amount_requested: invoice.remaining(),
            currency: self.currency.clone(),
            chain: self.chain.clone(),
            recipient: self.recipient.clone(),
            status: SessionStatus::Pending,
            tx_hash: None,
            expires_at: now + ChronoDuration::seconds(self.ttl_secs as i64),
            execution_mode,
            authorization_id,
            metadata,
            created_at: now,
        };
        self.store.create(session.clone()).await?;
        debug!(session_id = %session.id, invoice_id = %session.invoice_id, "session opened");
        Ok(session)
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<PaymentSession>> {
        self.store.get(session_id).await
    }

    /// Validates the proof format before touching the store, then delegates
    /// to the store's atomic conditional confirm.
    pub async fn confirm(&self, session_id: &str, raw_tx_hash: &str) -> Result<ConfirmOutcome> {
        let tx_hash = ProofReference::parse(raw_tx_hash)?;
        self.store.confirm(session_id, tx_hash).await
    }

    /// Sweeps Pending sessions past their deadline. Idempotent.
    pub async fn expire_sessions(&self) -> Result<u64> {
        self.store.expire_due(Utc::now()).await
    }
}

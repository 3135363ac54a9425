use crate::domain::invoice::{PaymentRecord, Settlement};
use crate::domain::money::Amount;
use crate::domain::ports::{
    InvoiceStoreHandle, SettlementLedgerHandle, SettlementNotifierHandle,
};
use crate::domain::session::{ProofReference, generate_token};
use crate::error::{PaymentError, Result};
use chrono::Utc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Applies a confirmed payment to the invoice ledger.
///
/// Single entry point for both the manual confirm path and the autonomous
/// agent. Callers invoke it at most once per confirmed session; the session
/// store's idempotent confirm is the upstream guard.
pub struct SettlementCoordinator {
    invoices: InvoiceStoreHandle,
    ledger: SettlementLedgerHandle,
    notifier: SettlementNotifierHandle,
    external_timeout: Duration,
}

impl SettlementCoordinator {
    pub fn new(
        invoices: InvoiceStoreHandle,
        ledger: SettlementLedgerHandle,
        notifier: SettlementNotifierHandle,
        external_timeout: Duration,
    ) -> Self {
        Self {
            invoices,
            ledger,
            notifier,
            external_timeout,
        }
    }

    /// Persists the payment record and the invoice update as one atomic
    /// unit, then propagates a status change to the external ledger
    /// best-effort. The internal ledger state is authoritative for
    /// settlement, so a failed push is logged, never fatal.
    pub async fn confirm_payment(
        &self,
        invoice_id: &str,
        amount: Amount,
        currency: &str,
        proof: &ProofReference,
        correlation_id: &str,
    ) -> Result<Settlement> {
        if self.invoices.get(invoice_id).await?.is_none() {
            return Err(PaymentError::InvoiceNotFound(invoice_id.to_string()));
        }

        let record = PaymentRecord {
            id: generate_token(),
            invoice_id: invoice_id.to_string(),
            amount,
            currency: currency.to_string(),
            proof_reference: proof.to_string(),
            correlation_id: correlation_id.to_string(),
            created_at: Utc::now(),
        };
        let settlement = self.invoices.apply_payment(invoice_id, record).await?;

        if settlement.new_status != settlement.old_status {
            let push = timeout(
                self.external_timeout,
                self.ledger
                    .push_invoice_status(invoice_id, settlement.new_status),
            )
            .await;
            match push {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(invoice_id, %err, "external status push failed; internal ledger remains authoritative");
                }
                Err(_) => {
                    warn!(invoice_id, "external status push timed out; internal ledger remains authoritative");
                }
            }
        }

        info!(
            invoice_id,
            correlation_id,
            old_status = ?settlement.old_status,
            new_status = ?settlement.new_status,
            "payment settled"
        );
        self.notifier.settled(&settlement).await;
        Ok(settlement)
    }
}

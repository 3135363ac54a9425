use crate::config::Profile;
use crate::domain::ports::{
    ExpectedPayment, ProofVerifier, ProofVerifierHandle, SettlementLedgerHandle, Verification,
};
use crate::domain::session::ProofReference;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Deterministic verifier for non-production profiles.
///
/// Accepts any format-valid proof reference and echoes the expected payment
/// details. Format validation already happened at `ProofReference::parse`,
/// so by construction there is nothing left to reject.
#[derive(Default, Clone)]
pub struct StubVerifier;

#[async_trait]
impl ProofVerifier for StubVerifier {
    async fn verify(
        &self,
        _proof: &ProofReference,
        expected: &ExpectedPayment,
    ) -> Result<Verification> {
        Ok(Verification {
            amount: expected.amount,
            currency: expected.currency.clone(),
            recipient: expected.recipient.clone(),
        })
    }
}

/// Verifier backed by the authoritative ledger: the referenced transaction
/// must exist, be sufficiently confirmed, and match recipient, amount, and
/// currency exactly.
pub struct LedgerVerifier {
    ledger: SettlementLedgerHandle,
    min_confirmations: u32,
}

impl LedgerVerifier {
    pub fn new(ledger: SettlementLedgerHandle, min_confirmations: u32) -> Self {
        Self {
            ledger,
            min_confirmations,
        }
    }
}

#[async_trait]
impl ProofVerifier for LedgerVerifier {
    async fn verify(
        &self,
        proof: &ProofReference,
        expected: &ExpectedPayment,
    ) -> Result<Verification> {
        let Some(tx) = self.ledger.transaction_by_reference(proof).await? else {
            return Err(PaymentError::VerificationFailed(
                "transaction not found on ledger".to_string(),
            ));
        };
        if tx.confirmations < self.min_confirmations {
            return Err(PaymentError::VerificationFailed(format!(
                "insufficient confirmations: {} of {}",
                tx.confirmations, self.min_confirmations
            )));
        }
        if tx.recipient != expected.recipient {
            return Err(PaymentError::RecipientMismatch);
        }
        if tx.amount != expected.amount {
            return Err(PaymentError::AmountMismatch);
        }
        if tx.currency != expected.currency {
            return Err(PaymentError::CurrencyMismatch);
        }
        Ok(Verification {
            amount: tx.amount,
            currency: tx.currency,
            recipient: tx.recipient,
        })
    }
}

/// Variant selection is a pure function of the deployment profile, fixed at
/// construction.
pub fn build_verifier(
    profile: Profile,
    ledger: SettlementLedgerHandle,
    min_confirmations: u32,
) -> ProofVerifierHandle {
    match profile {
        Profile::Development => Arc::new(StubVerifier),
        Profile::Production => Arc::new(LedgerVerifier::new(ledger, min_confirmations)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Amount;
    use crate::domain::ports::{LedgerTransaction, SettlementLedger, TransferRequest};
    use crate::domain::snapshot::TruthSnapshot;
    use crate::error::Result;
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct FixedLedger {
        tx: RwLock<Option<LedgerTransaction>>,
    }

    #[async_trait]
    impl SettlementLedger for FixedLedger {
        async fn snapshot(&self) -> Result<TruthSnapshot> {
            Err(PaymentError::ExecutionFailed("not implemented".to_string()))
        }

        async fn transaction_by_reference(
            &self,
            _reference: &ProofReference,
        ) -> Result<Option<LedgerTransaction>> {
            Ok(self.tx.read().await.clone())
        }

        async fn submit_transfer(&self, _request: &TransferRequest) -> Result<ProofReference> {
            Err(PaymentError::ExecutionFailed("not implemented".to_string()))
        }

        async fn push_invoice_status(
            &self,
            _invoice_id: &str,
            _status: crate::domain::invoice::InvoiceStatus,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn proof() -> ProofReference {
        ProofReference::parse(&format!("0x{}", "a".repeat(64))).expect("valid proof")
    }

    fn expected() -> ExpectedPayment {
        ExpectedPayment {
            amount: Amount::from(1000),
            currency: "USDC".to_string(),
            recipient: "0xrecipient".to_string(),
        }
    }

    fn matching_tx() -> LedgerTransaction {
        LedgerTransaction {
            reference: proof(),
            amount: Amount::from(1000),
            currency: "USDC".to_string(),
            recipient: "0xrecipient".to_string(),
            confirmations: 5,
        }
    }

    #[tokio::test]
    async fn test_stub_verifier_echoes_expected() {
        let verification = StubVerifier.verify(&proof(), &expected()).await.unwrap();
        assert_eq!(verification.amount, Amount::from(1000));
        assert_eq!(verification.currency, "USDC");
    }

    #[tokio::test]
    async fn test_ledger_verifier_accepts_matching_tx() {
        let ledger = Arc::new(FixedLedger::default());
        *ledger.tx.write().await = Some(matching_tx());
        let verifier = LedgerVerifier::new(ledger, 3);

        assert!(verifier.verify(&proof(), &expected()).await.is_ok());
    }

    #[tokio::test]
    async fn test_ledger_verifier_mismatches() {
        let ledger = Arc::new(FixedLedger::default());
        let verifier = LedgerVerifier::new(Arc::clone(&ledger) as SettlementLedgerHandle, 3);

        // Missing transaction.
        assert!(matches!(
            verifier.verify(&proof(), &expected()).await,
            Err(PaymentError::VerificationFailed(_))
        ));

        // Shallow confirmation depth.
        let mut tx = matching_tx();
        tx.confirmations = 1;
        *ledger.tx.write().await = Some(tx);
        assert!(matches!(
            verifier.verify(&proof(), &expected()).await,
            Err(PaymentError::VerificationFailed(_))
        ));

        // Wrong amount.
        let mut tx = matching_tx();
        tx.amount = Amount::from(999);
        *ledger.tx.write().await = Some(tx);
        assert_eq!(
            verifier.verify(&proof(), &expected()).await,
            Err(PaymentError::AmountMismatch)
        );

        // Wrong recipient.
        let mut tx = matching_tx();
        tx.recipient = "0xother".to_string();
        *ledger.tx.write().await = Some(tx);
        assert_eq!(
            verifier.verify(&proof(), &expected()).await,
            Err(PaymentError::RecipientMismatch)
        );

        // Wrong currency.
        let mut tx = matching_tx();
        tx.currency = "EURC".to_string();
        *ledger.tx.write().await = Some(tx);
        assert_eq!(
            verifier.verify(&proof(), &expected()).await,
            Err(PaymentError::CurrencyMismatch)
        );
    }
}

use super::money::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Pending,
    Approved,
    Overdue,
    PartiallyPaid,
    Paid,
}

impl InvoiceStatus {
    /// An invoice can accept payments until it is fully settled.
    pub fn is_payable(&self) -> bool {
        !matches!(self, Self::Paid)
    }
}

/// Ledger entry for a single invoice.
///
/// `cumulative_paid` and `status` are mutated only through
/// [`Invoice::apply_payment`], invoked by the invoice store under its write
/// guard so the payment record and the invoice update land as one unit.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub company_id: String,
    pub amount: Amount,
    pub cumulative_paid: Amount,
    pub status: InvoiceStatus,
    pub currency: String,
    pub chain: String,
}

/// Result of applying one confirmed payment to an invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub invoice_id: String,
    pub old_status: InvoiceStatus,
    pub new_status: InvoiceStatus,
    pub cumulative_paid: Amount,
    pub correlation_id: String,
}

impl Invoice {
    pub fn remaining(&self) -> Amount {
        self.amount.saturating_sub(self.cumulative_paid)
    }

    /// Adds `amount` to the cumulative paid total and recomputes the status.
    ///
    /// Overpayment still settles to `Paid`; a fully paid invoice never
    /// regresses to `PartiallyPaid`.
    pub fn apply_payment(&mut self, amount: Amount, correlation_id: &str) -> Settlement {
        let old_status = self.status;
        self.cumulative_paid += amount;
        if self.cumulative_paid >= self.amount {
            self.status = InvoiceStatus::Paid;
        } else if !self.cumulative_paid.is_zero() && self.status != InvoiceStatus::Paid {
            self.status = InvoiceStatus::PartiallyPaid;
        }
        Settlement {
            invoice_id: self.id.clone(),
            old_status,
            new_status: self.status,
            cumulative_paid: self.cumulative_paid,
            correlation_id: correlation_id.to_string(),
        }
    }
}

/// Immutable record of one settled payment against an invoice.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: String,
    pub invoice_id: String,
    pub amount: Amount,
    pub currency: String,
    pub proof_reference: String,
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice(amount: u64, paid: u64, status: InvoiceStatus) -> Invoice {
        Invoice {
            id: "inv-1".to_string(),
            company_id: "co-1".to_string(),
            amount: Amount::from(amount),
            cumulative_paid: Amount::from(paid),
            status,
            currency: "USDC".to_string(),
            chain: "base".to_string(),
        }
    }

    #[test]
    fn test_partial_then_full_payment() {
        let mut inv = invoice(1000, 0, InvoiceStatus::Approved);

        let first = inv.apply_payment(Amount::from(500), "corr-1");
        assert_eq!(first.new_status, InvoiceStatus::PartiallyPaid);
        assert_eq!(first.cumulative_paid, Amount::from(500));

        let second = inv.apply_payment(Amount::from(500), "corr-2");
        assert_eq!(second.old_status, InvoiceStatus::PartiallyPaid);
        assert_eq!(second.new_status, InvoiceStatus::Paid);
        assert_eq!(second.cumulative_paid, Amount::from(1000));
    }

    #[test]
    fn test_overpayment_still_settles_to_paid() {
        let mut inv = invoice(1000, 800, InvoiceStatus::PartiallyPaid);
        let outcome = inv.apply_payment(Amount::from(500), "corr-1");
        assert_eq!(outcome.new_status, InvoiceStatus::Paid);
        assert_eq!(outcome.cumulative_paid, Amount::from(1300));
    }

    #[test]
    fn test_remaining_clamps_at_zero() {
        let inv = invoice(1000, 1300, InvoiceStatus::Paid);
        assert_eq!(inv.remaining(), Amount::ZERO);
        assert!(!inv.status.is_payable());
    }
}

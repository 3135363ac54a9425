use super::invoice::InvoiceStatus;
use super::money::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Why the authorization engine refused a payment.
///
/// Ordered to match the engine's short-circuit evaluation; the first failing
/// check wins, which keeps denial reasons deterministic.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    NoAuthorization,
    InvoiceStatusNotAllowed,
    CurrencyNotAllowed,
    ChainNotAllowed,
    PerInvoiceLimitExceeded,
    DailyLimitExceeded,
    MonthlyLimitExceeded,
}

impl DenialReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoAuthorization => "authorization_denied_no_policy",
            Self::InvoiceStatusNotAllowed => "authorization_denied_invoice_status",
            Self::CurrencyNotAllowed => "authorization_denied_currency",
            Self::ChainNotAllowed => "authorization_denied_chain",
            Self::PerInvoiceLimitExceeded => "authorization_denied_per_invoice_limit",
            Self::DailyLimitExceeded => "authorization_denied_daily_limit",
            Self::MonthlyLimitExceeded => "authorization_denied_monthly_limit",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::NoAuthorization => "no active payment authorization for company",
            Self::InvoiceStatusNotAllowed => "invoice status not covered by policy",
            Self::CurrencyNotAllowed => "currency not covered by policy",
            Self::ChainNotAllowed => "chain not covered by policy",
            Self::PerInvoiceLimitExceeded => "amount exceeds per-invoice limit",
            Self::DailyLimitExceeded => "amount would exceed daily limit",
            Self::MonthlyLimitExceeded => "amount would exceed monthly limit",
        };
        f.write_str(msg)
    }
}

/// Company-scoped spend policy for the autonomous agent.
///
/// A limit of zero means unlimited. At most one policy per company is active
/// at any time; the policy store enforces this by revoking the prior active
/// policy inside the same write guard that activates the new one.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    pub id: String,
    pub company_id: String,
    pub mode: ExecutionPolicyMode,
    pub max_amount_per_invoice: Amount,
    pub daily_limit: Amount,
    pub monthly_limit: Amount,
    pub allowed_currencies: HashSet<String>,
    pub allowed_chains: HashSet<String>,
    pub allowed_invoice_statuses: HashSet<InvoiceStatus>,
    pub auto_approve: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionPolicyMode {
    AgentAuthorized,
}

impl Authorization {
    pub fn allows_invoice_status(&self, status: InvoiceStatus) -> bool {
        self.allowed_invoice_statuses.contains(&status)
    }

    pub fn allows_currency(&self, currency: &str) -> bool {
        self.allowed_currencies.contains(currency)
    }

    pub fn allows_chain(&self, chain: &str) -> bool {
        self.allowed_chains.contains(chain)
    }

    /// Zero-valued limits are treated as unlimited.
    pub fn within_per_invoice_limit(&self, amount: Amount) -> bool {
        self.max_amount_per_invoice.is_zero() || amount <= self.max_amount_per_invoice
    }

    pub fn within_daily_limit(&self, spent_today: Amount, amount: Amount) -> bool {
        self.daily_limit.is_zero() || spent_today + amount <= self.daily_limit
    }

    pub fn within_monthly_limit(&self, spent_this_month: Amount, amount: Amount) -> bool {
        self.monthly_limit.is_zero() || spent_this_month + amount <= self.monthly_limit
    }
}

/// Partial update for a policy; `None` fields are left untouched.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PolicyPatch {
    pub max_amount_per_invoice: Option<Amount>,
    pub daily_limit: Option<Amount>,
    pub monthly_limit: Option<Amount>,
    pub allowed_currencies: Option<HashSet<String>>,
    pub allowed_chains: Option<HashSet<String>>,
    pub allowed_invoice_statuses: Option<HashSet<InvoiceStatus>>,
    pub auto_approve: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Executed,
    Blocked,
    Failed,
}

/// One agent payment attempt, append-only. EXECUTED rows are the source of
/// truth for daily/monthly spend aggregation.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: String,
    pub authorization_id: String,
    pub invoice_id: String,
    pub amount: Amount,
    pub currency: String,
    pub chain: String,
    pub status: ExecutionStatus,
    pub reason: Option<String>,
    pub tx_hash: Option<String>,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Created,
    Updated,
    Revoked,
    Blocked,
    Executed,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorKind {
    Human,
    Agent,
    System,
}

/// Immutable lifecycle record for a policy.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: String,
    pub authorization_id: String,
    pub action: AuditAction,
    pub actor: ActorKind,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

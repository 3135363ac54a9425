use thiserror::Error;

use crate::domain::policy::DenialReason;

pub type Result<T> = std::result::Result<T, PaymentError>;

/// Error taxonomy for the settlement core.
///
/// Every variant carries a stable machine-readable code via [`PaymentError::code`]
/// and maps to exactly one HTTP status in the interface layer. Expected business
/// outcomes (denials, rate limiting) only surface as errors on the request path;
/// the agent loop records them as execution results instead, so
/// `AuthorizationDenied` is reserved for surfaces that report a denial as a
/// request error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("payment protocol is disabled")]
    ProtocolDisabled,
    #[error("invoice {0} not found")]
    InvoiceNotFound(String),
    #[error("invoice {0} is not payable in its current status")]
    NotPayable(String),
    #[error("payment authorization {0} not found")]
    PolicyNotFound(String),
    #[error("session {0} not found")]
    SessionNotFound(String),
    #[error("session {0} has expired")]
    SessionExpired(String),
    #[error("session {0} is already confirmed")]
    SessionAlreadyConfirmed(String),
    #[error("session does not belong to this invoice")]
    WrongInvoice,
    #[error("proof reference must be 0x followed by 64 hex characters")]
    InvalidProofFormat,
    #[error("proof verification failed: {0}")]
    VerificationFailed(String),
    #[error("proof reference is already bound to another session")]
    DuplicateProof,
    #[error("verified amount does not match the expected amount")]
    AmountMismatch,
    #[error("verified recipient does not match the settlement recipient")]
    RecipientMismatch,
    #[error("verified currency does not match the expected currency")]
    CurrencyMismatch,
    #[error("rate limit exceeded for invoice {0}")]
    RateLimited(String),
    #[error("authorization denied: {0}")]
    AuthorizationDenied(DenialReason),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("store error: {0}")]
    Store(String),
}

impl PaymentError {
    /// Stable code used in API error bodies and execution records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ProtocolDisabled => "protocol_disabled",
            Self::InvoiceNotFound(_) => "invoice_not_found",
            Self::NotPayable(_) => "invoice_not_payable",
            Self::PolicyNotFound(_) => "authorization_not_found",
            Self::SessionNotFound(_) => "session_not_found",
            Self::SessionExpired(_) => "session_expired",
            Self::SessionAlreadyConfirmed(_) => "session_already_confirmed",
            Self::WrongInvoice => "session_invoice_mismatch",
            Self::InvalidProofFormat => "invalid_proof_format",
            Self::VerificationFailed(_) => "verification_failed",
            Self::DuplicateProof => "duplicate_proof",
            Self::AmountMismatch => "amount_mismatch",
            Self::RecipientMismatch => "recipient_mismatch",
            Self::CurrencyMismatch => "currency_mismatch",
            Self::RateLimited(_) => "rate_limited",
            Self::AuthorizationDenied(reason) => reason.code(),
            Self::ExecutionFailed(_) => "execution_failed",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Store(_) => "store_error",
        }
    }
}

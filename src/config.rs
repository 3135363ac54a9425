use crate::domain::snapshot::Tolerances;
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

pub const MIN_SESSION_TTL_SECS: u64 = 60;
pub const MAX_SESSION_TTL_SECS: u64 = 3600;

/// Deployment profile; selects the proof-verifier variant at construction
/// time, never via runtime type checks.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Development,
    Production,
}

/// Static service configuration. Validated once at startup; an invalid
/// configuration aborts the process before any store or task is built.
#[derive(Debug, Clone)]
pub struct Config {
    pub profile: Profile,
    pub protocol_enabled: bool,
    /// Settlement identity: where payers are told to send funds.
    pub chain: String,
    pub currency: String,
    pub recipient: String,
    pub session_ttl_secs: u64,
    pub agent_interval_secs: u64,
    pub reconcile_interval_secs: u64,
    /// Indexed snapshots older than this are too stale to reconcile against.
    pub indexed_lag_threshold_secs: u64,
    /// Budget for every authoritative-ledger and indexed-source call.
    pub external_timeout_secs: u64,
    /// Absolute tolerance for money fields during reconciliation,
    /// in minor units.
    pub money_tolerance: Decimal,
    /// Confirmation depth required by the ledger-backed verifier.
    pub min_confirmations: u32,
    /// Per-invoice budget for `POST /invoices/{id}/pay`.
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_secs: u64,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SESSION_TTL_SECS..=MAX_SESSION_TTL_SECS).contains(&self.session_ttl_secs) {
            return Err(PaymentError::InvalidConfig(format!(
                "session TTL must be within [{MIN_SESSION_TTL_SECS}, {MAX_SESSION_TTL_SECS}] seconds, got {}",
                self.session_ttl_secs
            )));
        }
        if self.recipient.is_empty() {
            return Err(PaymentError::InvalidConfig(
                "settlement recipient must not be empty".to_string(),
            ));
        }
        if self.currency.is_empty() || self.chain.is_empty() {
            return Err(PaymentError::InvalidConfig(
                "settlement currency and chain must not be empty".to_string(),
            ));
        }
        if self.agent_interval_secs == 0 || self.reconcile_interval_secs == 0 {
            return Err(PaymentError::InvalidConfig(
                "background task intervals must be positive".to_string(),
            ));
        }
        if self.external_timeout_secs == 0 {
            return Err(PaymentError::InvalidConfig(
                "external call timeout must be positive".to_string(),
            ));
        }
        if self.money_tolerance.is_sign_negative() {
            return Err(PaymentError::InvalidConfig(
                "reconciliation tolerance must not be negative".to_string(),
            ));
        }
        if self.rate_limit_max_requests == 0 || self.rate_limit_window_secs == 0 {
            return Err(PaymentError::InvalidConfig(
                "rate limit budget must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.external_timeout_secs)
    }

    pub fn tolerances(&self) -> Tolerances {
        Tolerances {
            money: self.money_tolerance,
            count: Decimal::ONE,
            bps: Decimal::ONE,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: Profile::Development,
            protocol_enabled: true,
            chain: "base".to_string(),
            currency: "USDC".to_string(),
            recipient: "0x0000000000000000000000000000000000000001".to_string(),
            session_ttl_secs: 900,
            agent_interval_secs: 60,
            reconcile_interval_secs: 60,
            indexed_lag_threshold_secs: 300,
            external_timeout_secs: 10,
            money_tolerance: Decimal::from(100),
            min_confirmations: 3,
            rate_limit_max_requests: 5,
            rate_limit_window_secs: 60,
        }
    }
}

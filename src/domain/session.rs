use super::money::Amount;
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a completed fund movement: `0x` followed by exactly 64 hex
/// characters. Parsing is the only way to construct one, so every stored
/// proof is format-valid by construction.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone)]
#[serde(transparent)]
pub struct ProofReference(String);

impl ProofReference {
    pub fn parse(raw: &str) -> Result<Self, PaymentError> {
        let hex_part = raw.strip_prefix("0x").ok_or(PaymentError::InvalidProofFormat)?;
        if hex_part.len() != 64 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PaymentError::InvalidProofFormat);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProofReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Pending,
    Confirmed,
    Expired,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    UserInitiated,
    AgentAuthorized,
}

/// Time-boxed offer to pay a specific amount for a specific invoice.
///
/// Created once, mutated exactly once (confirm or sweep), never deleted.
/// Status transitions are monotonic: Pending → Confirmed or Pending →
/// Expired, both terminal. At most one session ever holds a given tx hash.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub id: String,
    pub invoice_id: String,
    pub amount_requested: Amount,
    pub currency: String,
    pub chain: String,
    pub recipient: String,
    pub status: SessionStatus,
    pub tx_hash: Option<ProofReference>,
    pub expires_at: DateTime<Utc>,
    pub execution_mode: ExecutionMode,
    pub authorization_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl PaymentSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Pending && self.expires_at < now
    }
}

/// Opaque correlation token: 32 random bytes, hex-encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

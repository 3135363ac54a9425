use crate::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// A monetary value in minor currency units (cents, wei-equivalents, ...).
///
/// Wrapper around `rust_decimal::Decimal` restricted to non-negative integer
/// values, so all settlement arithmetic stays exact. Floating point never
/// enters the picture. Deserialization routes through [`Amount::new`], so a
/// negative or fractional value in a request body is rejected at the parse.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value.is_sign_negative() {
            return Err(PaymentError::InvalidConfig(
                "amount must not be negative".to_string(),
            ));
        }
        if !value.is_integer() {
            return Err(PaymentError::InvalidConfig(
                "amount must be an integer number of minor units".to_string(),
            ));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Difference clamped at zero; used for `remaining = total - paid`.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        if rhs.0 >= self.0 {
            Self(Decimal::ZERO)
        } else {
            Self(self.0 - rhs.0)
        }
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(Decimal::from(value))
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl Add for Amount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

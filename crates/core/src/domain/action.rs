use std::fmt;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::errors::ActionError;

pub const MAX_AMOUNT: f64 = 999_999.99;
pub const ACCOUNT_ID_PREFIX: &str = "acct_";

/// A charge amount in major currency units, always finite and in `(0, 999999.99]`.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Amount(f64);

impl Amount {
    pub fn new(value: f64) -> Result<Self, ActionError> {
        if value.is_finite() && value > 0.0 && value <= MAX_AMOUNT {
            Ok(Self(value))
        } else {
            Err(ActionError::InvalidAmount)
        }
    }

    /// Amount in cents, rounded half away from zero to two decimal places.
    pub fn to_minor_units(self) -> i64 {
        Decimal::from_f64(self.0)
            .map(|amount| {
                amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
                    * Decimal::ONE_HUNDRED
            })
            .and_then(|cents| cents.to_i64())
            .unwrap_or_default()
    }
}

impl TryFrom<f64> for Amount {
    type Error = ActionError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for f64 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    PaymentLink { product: String, amount: Amount },
    ConnectPayment { account_id: String, amount: Amount },
}

impl Action {
    pub fn action_type(&self) -> &'static str {
        match self {
            Self::PaymentLink { .. } => "payment_link",
            Self::ConnectPayment { .. } => "connect_payment",
        }
    }

    pub fn amount(&self) -> Amount {
        match self {
            Self::PaymentLink { amount, .. } | Self::ConnectPayment { amount, .. } => *amount,
        }
    }
}

use serde::{Deserialize, Serialize};

/// What the payment provider produced for a dispatched action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchOutcome {
    PaymentLink { url: String },
    PaymentSucceeded { payment_intent_id: String },
    /// The intent needs further action; completing it is up to the caller.
    PaymentPending { client_secret: String },
}

impl DispatchOutcome {
    pub fn payload(&self) -> &str {
        match self {
            Self::PaymentLink { url } => url,
            Self::PaymentSucceeded { payment_intent_id } => payment_intent_id,
            Self::PaymentPending { client_secret } => client_secret,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryOutcome {
    pub summary: String,
    pub payment_intent: String,
}

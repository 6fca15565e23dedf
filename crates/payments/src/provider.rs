use std::collections::BTreeMap;

use agentpay_core::domain::customer::Address;
use agentpay_core::errors::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub type Metadata = BTreeMap<String, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderOperation {
    RetrieveAccount,
    CreateProduct,
    ArchiveProduct,
    CreatePrice,
    DeactivatePrice,
    CreatePaymentLink,
    CreateCustomer,
    UpdateCustomer,
    CreatePaymentMethod,
    AttachPaymentMethod,
    CreatePaymentIntent,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Account {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Price {
    pub id: String,
    pub product: String,
    pub unit_amount: Option<i64>,
    pub currency: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PaymentLink {
    pub id: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    pub customer: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

impl PaymentIntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::Processing => "processing",
            Self::RequiresCapture => "requires_capture",
            Self::Canceled => "canceled",
            Self::Succeeded => "succeeded",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct LastPaymentError {
    pub code: Option<String>,
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: PaymentIntentStatus,
    pub amount: i64,
    pub currency: String,
    pub client_secret: Option<String>,
    pub last_payment_error: Option<LastPaymentError>,
}

impl PaymentIntent {
    pub fn is_succeeded(&self) -> bool {
        self.status == PaymentIntentStatus::Succeeded
    }

    /// Human-readable reason for a payment intent that did not succeed.
    pub fn failure_reason(&self) -> String {
        self.last_payment_error
            .as_ref()
            .and_then(|error| error.message.clone().or_else(|| error.code.clone()))
            .unwrap_or_else(|| format!("payment intent status is {}", self.status.as_str()))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub metadata: Metadata,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewPrice {
    pub product_id: String,
    pub unit_amount: i64,
    pub currency: String,
    pub metadata: Metadata,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewPaymentLink {
    pub price_id: String,
    pub quantity: u32,
    pub metadata: Metadata,
    /// Ask the provider to always create a customer record at checkout.
    pub always_create_customer: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewCustomer {
    pub name: Option<String>,
    pub email: Option<String>,
    pub description: Option<String>,
    pub metadata: Metadata,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomerUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BillingDetails {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewCardPaymentMethod {
    pub token: String,
    pub billing_details: BillingDetails,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewPaymentIntent {
    pub amount: i64,
    pub currency: String,
    pub customer_id: String,
    pub payment_method_id: String,
    pub destination_account: Option<String>,
    pub confirm: bool,
    pub off_session: bool,
    pub metadata: Metadata,
}

/// Operations the dispatcher needs from the payment provider.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn retrieve_account(&self, account_id: &str) -> Result<Account, ProviderError>;
    async fn create_product(&self, product: NewProduct) -> Result<Product, ProviderError>;
    async fn archive_product(&self, product_id: &str) -> Result<Product, ProviderError>;
    async fn create_price(&self, price: NewPrice) -> Result<Price, ProviderError>;
    async fn deactivate_price(&self, price_id: &str) -> Result<Price, ProviderError>;
    async fn create_payment_link(&self, link: NewPaymentLink)
        -> Result<PaymentLink, ProviderError>;
    async fn create_customer(&self, customer: NewCustomer) -> Result<Customer, ProviderError>;
    async fn update_customer(
        &self,
        customer_id: &str,
        update: CustomerUpdate,
    ) -> Result<Customer, ProviderError>;
    async fn create_card_payment_method(
        &self,
        method: NewCardPaymentMethod,
    ) -> Result<PaymentMethod, ProviderError>;
    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> Result<PaymentMethod, ProviderError>;
    async fn create_payment_intent(
        &self,
        intent: NewPaymentIntent,
    ) -> Result<PaymentIntent, ProviderError>;
}

fn default_active() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::{PaymentIntent, PaymentIntentStatus};

    #[test]
    fn unknown_statuses_deserialize_without_failing() {
        let intent: PaymentIntent = serde_json::from_value(serde_json::json!({
            "id": "pi_1",
            "status": "some_future_status",
            "amount": 500,
            "currency": "usd",
            "client_secret": null,
            "last_payment_error": null
        }))
        .expect("intent");

        assert_eq!(intent.status, PaymentIntentStatus::Unknown);
        assert_eq!(intent.failure_reason(), "payment intent status is unknown");
    }

    #[test]
    fn failure_reason_prefers_provider_message() {
        let intent: PaymentIntent = serde_json::from_value(serde_json::json!({
            "id": "pi_2",
            "status": "requires_payment_method",
            "amount": 500,
            "currency": "usd",
            "client_secret": "pi_2_secret",
            "last_payment_error": {"code": "card_declined", "message": "Your card was declined."}
        }))
        .expect("intent");

        assert!(!intent.is_succeeded());
        assert_eq!(intent.failure_reason(), "Your card was declined.");
    }
}

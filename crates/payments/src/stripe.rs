//! Stripe REST client.
//!
//! Requests are form-encoded with bracketed keys (`metadata[source]`,
//! `transfer_data[destination]`) and authenticated with the secret key as a
//! bearer token. Error bodies are classified into [`ProviderErrorKind`] from
//! the HTTP status and the `error.type` / `error.code` fields.

use std::time::Duration;

use agentpay_core::config::StripeConfig;
use agentpay_core::domain::customer::Address;
use agentpay_core::errors::{ProviderError, ProviderErrorKind};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::provider::{
    Account, Customer, CustomerUpdate, Metadata, NewCardPaymentMethod, NewCustomer,
    NewPaymentIntent, NewPaymentLink, NewPrice, NewProduct, PaymentIntent, PaymentLink,
    PaymentMethod, PaymentProvider, Price, Product,
};

type Form = Vec<(String, String)>;

#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    api_base: Url,
    api_key: SecretString,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct StripeErrorBody {
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<String>,
    message: Option<String>,
    decline_code: Option<String>,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| {
                ProviderError::new(
                    ProviderErrorKind::Transport,
                    format!("could not build HTTP client: {error}"),
                )
            })?;
        Self::with_client(http, &config.api_base, config.api_key.clone())
    }

    pub fn with_client(
        http: Client,
        api_base: &str,
        api_key: SecretString,
    ) -> Result<Self, ProviderError> {
        let api_base = Url::parse(api_base).map_err(|error| {
            ProviderError::new(
                ProviderErrorKind::InvalidRequest,
                format!("invalid Stripe API base `{api_base}`: {error}"),
            )
        })?;
        Ok(Self { http, api_base, api_key })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ProviderError::new(
                    ProviderErrorKind::InvalidRequest,
                    "Stripe API base cannot carry a path",
                )
            })?
            .pop_if_empty()
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        form: Option<Form>,
    ) -> Result<T, ProviderError> {
        let url = self.endpoint(segments)?;
        debug!(
            event_name = "payments.stripe.request",
            method = %method,
            path = url.path(),
            "sending Stripe request"
        );

        let mut request =
            self.http.request(method, url).bearer_auth(self.api_key.expose_secret());
        if let Some(form) = form {
            request = request.form(&form);
        }

        let response = request.send().await.map_err(|error| {
            let kind = if error.is_decode() {
                ProviderErrorKind::Decode
            } else {
                ProviderErrorKind::Transport
            };
            ProviderError::new(kind, format!("Stripe request failed: {error}"))
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|error| {
            ProviderError::new(
                ProviderErrorKind::Transport,
                format!("could not read Stripe response: {error}"),
            )
        })?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }

        serde_json::from_slice(&body).map_err(|error| {
            ProviderError::new(
                ProviderErrorKind::Decode,
                format!("could not decode Stripe response: {error}"),
            )
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        form: Form,
    ) -> Result<T, ProviderError> {
        self.send(Method::POST, segments, Some(form)).await
    }
}

/// Maps a non-2xx Stripe response onto a provider error kind.
fn classify_error(status: StatusCode, body: &[u8]) -> ProviderError {
    let parsed = serde_json::from_slice::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error)
        .unwrap_or_default();

    let error_type = parsed.error_type.as_deref().unwrap_or_default();
    let code = parsed.code.as_deref().unwrap_or_default();

    let kind = if status == StatusCode::TOO_MANY_REQUESTS || code == "rate_limit" {
        ProviderErrorKind::RateLimited
    } else if status == StatusCode::UNAUTHORIZED || error_type == "authentication_error" {
        ProviderErrorKind::Authentication
    } else if code == "resource_missing" || status == StatusCode::NOT_FOUND {
        ProviderErrorKind::ResourceMissing
    } else if error_type == "card_error" || status == StatusCode::PAYMENT_REQUIRED {
        ProviderErrorKind::Card
    } else if error_type == "invalid_request_error" || status.is_client_error() {
        ProviderErrorKind::InvalidRequest
    } else {
        ProviderErrorKind::Api
    };

    let message = parsed
        .message
        .unwrap_or_else(|| format!("Stripe returned HTTP {}", status.as_u16()));
    let error = ProviderError::new(kind, message);
    match parsed.code.or(parsed.decline_code) {
        Some(code) => error.with_code(code),
        None => error,
    }
}

fn field(form: &mut Form, key: impl Into<String>, value: impl Into<String>) {
    form.push((key.into(), value.into()));
}

fn optional_field(form: &mut Form, key: &str, value: Option<&String>) {
    if let Some(value) = value {
        field(form, key, value.as_str());
    }
}

fn metadata_fields(form: &mut Form, metadata: &Metadata) {
    for (key, value) in metadata {
        field(form, format!("metadata[{key}]"), value.as_str());
    }
}

fn address_fields(form: &mut Form, prefix: &str, address: &Address) {
    for (name, value) in address.fields() {
        field(form, format!("{prefix}[{name}]"), value);
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn retrieve_account(&self, account_id: &str) -> Result<Account, ProviderError> {
        self.send(Method::GET, &["accounts", account_id], None).await
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product, ProviderError> {
        let mut form = Form::new();
        field(&mut form, "name", product.name);
        optional_field(&mut form, "description", product.description.as_ref());
        metadata_fields(&mut form, &product.metadata);
        self.post(&["products"], form).await
    }

    async fn archive_product(&self, product_id: &str) -> Result<Product, ProviderError> {
        let form = vec![("active".to_string(), "false".to_string())];
        self.post(&["products", product_id], form).await
    }

    async fn create_price(&self, price: NewPrice) -> Result<Price, ProviderError> {
        let mut form = Form::new();
        field(&mut form, "product", price.product_id);
        field(&mut form, "unit_amount", price.unit_amount.to_string());
        field(&mut form, "currency", price.currency);
        metadata_fields(&mut form, &price.metadata);
        self.post(&["prices"], form).await
    }

    async fn deactivate_price(&self, price_id: &str) -> Result<Price, ProviderError> {
        let form = vec![("active".to_string(), "false".to_string())];
        self.post(&["prices", price_id], form).await
    }

    async fn create_payment_link(
        &self,
        link: NewPaymentLink,
    ) -> Result<PaymentLink, ProviderError> {
        let mut form = Form::new();
        field(&mut form, "line_items[0][price]", link.price_id);
        field(&mut form, "line_items[0][quantity]", link.quantity.to_string());
        metadata_fields(&mut form, &link.metadata);
        if link.always_create_customer {
            field(&mut form, "customer_creation", "always");
        }
        self.post(&["payment_links"], form).await
    }

    async fn create_customer(&self, customer: NewCustomer) -> Result<Customer, ProviderError> {
        let mut form = Form::new();
        optional_field(&mut form, "name", customer.name.as_ref());
        optional_field(&mut form, "email", customer.email.as_ref());
        optional_field(&mut form, "description", customer.description.as_ref());
        metadata_fields(&mut form, &customer.metadata);
        self.post(&["customers"], form).await
    }

    async fn update_customer(
        &self,
        customer_id: &str,
        update: CustomerUpdate,
    ) -> Result<Customer, ProviderError> {
        let mut form = Form::new();
        optional_field(&mut form, "name", update.name.as_ref());
        optional_field(&mut form, "email", update.email.as_ref());
        optional_field(&mut form, "phone", update.phone.as_ref());
        if let Some(address) = &update.address {
            address_fields(&mut form, "address", address);
        }
        optional_field(&mut form, "description", update.description.as_ref());
        self.post(&["customers", customer_id], form).await
    }

    async fn create_card_payment_method(
        &self,
        method: NewCardPaymentMethod,
    ) -> Result<PaymentMethod, ProviderError> {
        let mut form = Form::new();
        field(&mut form, "type", "card");
        field(&mut form, "card[token]", method.token);
        optional_field(&mut form, "billing_details[name]", method.billing_details.name.as_ref());
        optional_field(&mut form, "billing_details[email]", method.billing_details.email.as_ref());
        self.post(&["payment_methods"], form).await
    }

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> Result<PaymentMethod, ProviderError> {
        let form = vec![("customer".to_string(), customer_id.to_string())];
        self.post(&["payment_methods", payment_method_id, "attach"], form).await
    }

    async fn create_payment_intent(
        &self,
        intent: NewPaymentIntent,
    ) -> Result<PaymentIntent, ProviderError> {
        let mut form = Form::new();
        field(&mut form, "amount", intent.amount.to_string());
        field(&mut form, "currency", intent.currency);
        field(&mut form, "customer", intent.customer_id);
        field(&mut form, "payment_method", intent.payment_method_id);
        field(&mut form, "confirm", intent.confirm.to_string());
        field(&mut form, "off_session", intent.off_session.to_string());
        optional_field(
            &mut form,
            "transfer_data[destination]",
            intent.destination_account.as_ref(),
        );
        metadata_fields(&mut form, &intent.metadata);
        self.post(&["payment_intents"], form).await
    }
}

use std::sync::Arc;

use agentpay_core::domain::action::{Action, Amount};
use agentpay_core::domain::customer::CustomerInfo;
use agentpay_core::domain::outcome::DispatchOutcome;
use agentpay_core::domain::request::CorrelationId;
use agentpay_core::errors::{InputError, ProviderError, ServiceError};
use tracing::{error, info, warn};

use crate::provider::{
    BillingDetails, CustomerUpdate, Metadata, NewCardPaymentMethod, NewCustomer,
    NewPaymentIntent, NewPaymentLink, NewPrice, NewProduct, PaymentProvider,
};

pub const METADATA_SOURCE: &str = "agentpay";
pub const METADATA_CREATED_BY: &str = "payment_agent";
pub const TEST_CARD_TOKEN: &str = "tok_visa";
pub const TEST_CUSTOMER_NAME: &str = "Test Customer";
pub const TEST_CUSTOMER_EMAIL: &str = "test@example.com";

/// Undo step recorded after a provider object was created.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Compensation {
    ArchiveProduct(String),
    DeactivatePrice(String),
}

/// Turns validated actions into payment provider calls.
pub struct ActionDispatcher {
    provider: Arc<dyn PaymentProvider>,
    currency: String,
}

impl ActionDispatcher {
    pub fn new(provider: Arc<dyn PaymentProvider>, currency: impl Into<String>) -> Self {
        Self { provider, currency: currency.into() }
    }

    pub async fn dispatch(
        &self,
        action: &Action,
        customer: Option<&CustomerInfo>,
        correlation_id: &CorrelationId,
    ) -> Result<DispatchOutcome, ServiceError> {
        info!(
            event_name = "payments.dispatch.start",
            correlation_id = %correlation_id,
            action_type = action.action_type(),
            amount = %action.amount(),
            "dispatching payment action"
        );

        match action {
            Action::PaymentLink { product, amount } => {
                self.create_payment_link(product, *amount, customer, correlation_id).await
            }
            Action::ConnectPayment { account_id, amount } => {
                self.send_connect_payment(account_id, *amount, customer, correlation_id).await
            }
        }
    }

    async fn create_payment_link(
        &self,
        product_name: &str,
        amount: Amount,
        customer: Option<&CustomerInfo>,
        correlation_id: &CorrelationId,
    ) -> Result<DispatchOutcome, ServiceError> {
        let metadata = link_metadata(customer);
        let mut undo = Vec::new();

        match self.payment_link_chain(product_name, amount, customer, metadata, &mut undo).await {
            Ok(url) => {
                info!(
                    event_name = "payments.dispatch.payment_link_created",
                    correlation_id = %correlation_id,
                    url = %url,
                    "payment link created"
                );
                Ok(DispatchOutcome::PaymentLink { url })
            }
            Err(failure) => {
                error!(
                    event_name = "payments.dispatch.payment_link_failed",
                    correlation_id = %correlation_id,
                    error = %failure,
                    compensations = undo.len(),
                    "payment link creation failed"
                );
                self.compensate(undo, correlation_id).await;
                Err(failure.into())
            }
        }
    }

    async fn payment_link_chain(
        &self,
        product_name: &str,
        amount: Amount,
        customer: Option<&CustomerInfo>,
        metadata: Metadata,
        undo: &mut Vec<Compensation>,
    ) -> Result<String, ProviderError> {
        let product = self
            .provider
            .create_product(NewProduct {
                name: product_name.to_string(),
                description: Some(format!("{product_name} - One-time purchase")),
                metadata: metadata.clone(),
            })
            .await?;
        undo.push(Compensation::ArchiveProduct(product.id.clone()));

        let price = self
            .provider
            .create_price(NewPrice {
                product_id: product.id,
                unit_amount: amount.to_minor_units(),
                currency: self.currency.clone(),
                metadata: metadata.clone(),
            })
            .await?;
        undo.push(Compensation::DeactivatePrice(price.id.clone()));

        let link = self
            .provider
            .create_payment_link(NewPaymentLink {
                price_id: price.id,
                quantity: 1,
                metadata,
                always_create_customer: customer.is_some(),
            })
            .await?;

        Ok(link.url)
    }

    /// Runs recorded undo steps newest first. Failures are logged and skipped.
    async fn compensate(&self, undo: Vec<Compensation>, correlation_id: &CorrelationId) {
        for step in undo.into_iter().rev() {
            let result = match &step {
                Compensation::DeactivatePrice(price_id) => {
                    self.provider.deactivate_price(price_id).await.map(|_| ())
                }
                Compensation::ArchiveProduct(product_id) => {
                    self.provider.archive_product(product_id).await.map(|_| ())
                }
            };

            match result {
                Ok(()) => info!(
                    event_name = "payments.dispatch.compensated",
                    correlation_id = %correlation_id,
                    step = ?step,
                    "compensation step completed"
                ),
                Err(failure) => warn!(
                    event_name = "payments.dispatch.compensation_failed",
                    correlation_id = %correlation_id,
                    step = ?step,
                    error = %failure,
                    "compensation step failed; provider object left in place"
                ),
            }
        }
    }

    async fn send_connect_payment(
        &self,
        account_id: &str,
        amount: Amount,
        customer: Option<&CustomerInfo>,
        correlation_id: &CorrelationId,
    ) -> Result<DispatchOutcome, ServiceError> {
        if let Err(failure) = self.provider.retrieve_account(account_id).await {
            warn!(
                event_name = "payments.dispatch.account_lookup_failed",
                correlation_id = %correlation_id,
                account_id,
                error = %failure,
                "destination account lookup failed"
            );
            if failure.is_client_error() {
                return Err(ServiceError::UnknownAccount { account_id: account_id.to_string() });
            }
            return Err(failure.into());
        }

        let (customer_id, payment_method_id) = match customer.and_then(CustomerInfo::payment_source)
        {
            Some(source) => {
                info!(
                    event_name = "payments.dispatch.customer_reused",
                    correlation_id = %correlation_id,
                    customer_id = source.customer_id,
                    "using caller-supplied customer"
                );
                if let Some(update) = customer.and_then(customer_update) {
                    self.provider.update_customer(source.customer_id, update).await?;
                }
                (source.customer_id.to_string(), source.payment_method_id.to_string())
            }
            None => {
                info!(
                    event_name = "payments.dispatch.test_customer",
                    correlation_id = %correlation_id,
                    "no reusable customer supplied; creating test customer"
                );
                let provisioned = self.provision_test_customer(correlation_id).await?;
                (provisioned.id.unwrap_or_default(), provisioned.payment_method_id.unwrap_or_default())
            }
        };

        let customer_email = customer
            .and_then(|customer| customer.email.clone())
            .unwrap_or_else(|| TEST_CUSTOMER_EMAIL.to_string());
        let metadata = Metadata::from([
            ("payment_type".to_string(), "connect".to_string()),
            ("recipient_account".to_string(), account_id.to_string()),
            ("source".to_string(), METADATA_SOURCE.to_string()),
            ("customer_email".to_string(), customer_email),
        ]);

        let intent = self
            .provider
            .create_payment_intent(NewPaymentIntent {
                amount: amount.to_minor_units(),
                currency: self.currency.clone(),
                customer_id,
                payment_method_id,
                destination_account: Some(account_id.to_string()),
                confirm: true,
                off_session: true,
                metadata,
            })
            .await?;

        info!(
            event_name = "payments.dispatch.connect_payment_created",
            correlation_id = %correlation_id,
            payment_intent_id = %intent.id,
            status = intent.status.as_str(),
            "connect payment intent created"
        );

        if intent.is_succeeded() {
            Ok(DispatchOutcome::PaymentSucceeded { payment_intent_id: intent.id })
        } else {
            let client_secret = intent.client_secret.unwrap_or(intent.id);
            Ok(DispatchOutcome::PaymentPending { client_secret })
        }
    }

    /// Charges the fixed summarization fee, routed to `destination`.
    ///
    /// Returns the payment intent id. Anything short of `succeeded` is a failure.
    pub async fn charge_for_summary(
        &self,
        customer: &CustomerInfo,
        destination: &str,
        price_cents: i64,
        correlation_id: &CorrelationId,
    ) -> Result<String, ServiceError> {
        let source = customer.payment_source().ok_or(InputError::MissingField("customer.id"))?;
        let metadata = Metadata::from([
            ("service".to_string(), "web_summarizer".to_string()),
            ("price".to_string(), display_price(price_cents)),
            ("customer_email".to_string(), customer.email.clone().unwrap_or_default()),
            ("connect_account".to_string(), destination.to_string()),
        ]);

        let intent = self
            .provider
            .create_payment_intent(NewPaymentIntent {
                amount: price_cents,
                currency: self.currency.clone(),
                customer_id: source.customer_id.to_string(),
                payment_method_id: source.payment_method_id.to_string(),
                destination_account: Some(destination.to_string()),
                confirm: true,
                off_session: true,
                metadata,
            })
            .await?;

        if !intent.is_succeeded() {
            let reason = intent.failure_reason();
            warn!(
                event_name = "payments.summary_charge.incomplete",
                correlation_id = %correlation_id,
                payment_intent_id = %intent.id,
                status = intent.status.as_str(),
                reason = %reason,
                "summary charge did not succeed"
            );
            return Err(ServiceError::PaymentIncomplete {
                payment_intent_id: intent.id,
                status: intent.status.as_str().to_string(),
                reason,
            });
        }

        info!(
            event_name = "payments.summary_charge.succeeded",
            correlation_id = %correlation_id,
            payment_intent_id = %intent.id,
            amount = price_cents,
            "summary charge succeeded"
        );
        Ok(intent.id)
    }

    /// Creates a disposable customer with an attached test card.
    pub async fn provision_test_customer(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<CustomerInfo, ServiceError> {
        let customer = self
            .provider
            .create_customer(NewCustomer {
                name: Some(TEST_CUSTOMER_NAME.to_string()),
                email: Some(TEST_CUSTOMER_EMAIL.to_string()),
                description: Some("Test customer created by agentpay".to_string()),
                metadata: Metadata::from([(
                    "source".to_string(),
                    format!("{METADATA_SOURCE}_test"),
                )]),
            })
            .await?;

        let payment_method = self
            .provider
            .create_card_payment_method(NewCardPaymentMethod {
                token: TEST_CARD_TOKEN.to_string(),
                billing_details: BillingDetails {
                    name: Some(TEST_CUSTOMER_NAME.to_string()),
                    email: Some(TEST_CUSTOMER_EMAIL.to_string()),
                },
            })
            .await?;
        self.provider.attach_payment_method(&payment_method.id, &customer.id).await?;

        info!(
            event_name = "payments.test_customer.created",
            correlation_id = %correlation_id,
            customer_id = %customer.id,
            payment_method_id = %payment_method.id,
            "test customer provisioned"
        );

        Ok(CustomerInfo {
            id: Some(customer.id),
            payment_method_id: Some(payment_method.id),
            name: Some(TEST_CUSTOMER_NAME.to_string()),
            email: Some(TEST_CUSTOMER_EMAIL.to_string()),
            ..CustomerInfo::default()
        })
    }
}

fn link_metadata(customer: Option<&CustomerInfo>) -> Metadata {
    let mut metadata = Metadata::from([
        ("source".to_string(), METADATA_SOURCE.to_string()),
        ("created_by".to_string(), METADATA_CREATED_BY.to_string()),
    ]);
    if let Some(customer) = customer {
        for (key, value) in [
            ("customer_id", &customer.id),
            ("customer_email", &customer.email),
            ("customer_name", &customer.name),
        ] {
            if let Some(value) = value {
                metadata.insert(key.to_string(), value.clone());
            }
        }
    }
    metadata
}

/// Contact fields to push onto a reused customer, if any were supplied.
fn customer_update(customer: &CustomerInfo) -> Option<CustomerUpdate> {
    if !customer.has_contact_details() {
        return None;
    }
    Some(CustomerUpdate {
        name: customer.name.clone(),
        email: customer.email.clone(),
        phone: customer.phone.clone(),
        address: customer.address.clone(),
        description: customer.description.clone(),
    })
}

fn display_price(cents: i64) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agentpay_core::domain::action::{Action, Amount};
    use agentpay_core::domain::customer::CustomerInfo;
    use agentpay_core::domain::outcome::DispatchOutcome;
    use agentpay_core::domain::request::CorrelationId;
    use agentpay_core::errors::{ProviderError, ProviderErrorKind, ServiceError};

    use super::{display_price, ActionDispatcher};
    use crate::memory::InMemoryPaymentProvider;
    use crate::provider::{PaymentIntentStatus, ProviderOperation};

    fn amount(value: f64) -> Amount {
        Amount::new(value).expect("valid amount")
    }

    fn dispatcher(provider: &Arc<InMemoryPaymentProvider>) -> ActionDispatcher {
        ActionDispatcher::new(provider.clone(), "usd")
    }

    fn cid() -> CorrelationId {
        CorrelationId("req-test".to_string())
    }

    #[tokio::test]
    async fn payment_link_calls_product_price_link_in_order() {
        let provider = Arc::new(InMemoryPaymentProvider::new());
        let action =
            Action::PaymentLink { product: "lawn mowing".to_string(), amount: amount(10.0) };

        let outcome = dispatcher(&provider).dispatch(&action, None, &cid()).await.expect("link");

        assert!(matches!(outcome, DispatchOutcome::PaymentLink { ref url } if url.starts_with("https://buy.stripe.com/")));
        assert_eq!(
            provider.calls().await,
            vec![
                ProviderOperation::CreateProduct,
                ProviderOperation::CreatePrice,
                ProviderOperation::CreatePaymentLink,
            ]
        );
        let prices = provider.prices().await;
        assert_eq!(prices[0].unit_amount, Some(1000));
        assert_eq!(prices[0].currency, "usd");
        let links = provider.payment_links().await;
        assert!(!links[0].always_create_customer);
        assert_eq!(links[0].metadata["source"], "agentpay");
    }

    #[tokio::test]
    async fn customer_details_flow_into_link_metadata() {
        let provider = Arc::new(InMemoryPaymentProvider::new());
        let customer = CustomerInfo {
            id: Some("cus_1".to_string()),
            email: Some("buyer@example.com".to_string()),
            ..CustomerInfo::default()
        };
        let action = Action::PaymentLink { product: "Widget".to_string(), amount: amount(19.99) };

        dispatcher(&provider).dispatch(&action, Some(&customer), &cid()).await.expect("link");

        let links = provider.payment_links().await;
        assert!(links[0].always_create_customer);
        assert_eq!(links[0].metadata["customer_id"], "cus_1");
        assert_eq!(links[0].metadata["customer_email"], "buyer@example.com");
        assert!(!links[0].metadata.contains_key("customer_name"));
        assert_eq!(provider.prices().await[0].unit_amount, Some(1999));
    }

    #[tokio::test]
    async fn failed_link_step_compensates_in_reverse_order() {
        let provider = Arc::new(InMemoryPaymentProvider::new().failing_on(
            ProviderOperation::CreatePaymentLink,
            ProviderError::new(ProviderErrorKind::Api, "link service unavailable"),
        ));
        let action = Action::PaymentLink { product: "Widget".to_string(), amount: amount(5.0) };

        let error =
            dispatcher(&provider).dispatch(&action, None, &cid()).await.expect_err("link failure");

        assert!(matches!(error, ServiceError::Provider(ref failure) if failure.message == "link service unavailable"));
        assert_eq!(
            provider.calls().await,
            vec![
                ProviderOperation::CreateProduct,
                ProviderOperation::CreatePrice,
                ProviderOperation::CreatePaymentLink,
                ProviderOperation::DeactivatePrice,
                ProviderOperation::ArchiveProduct,
            ]
        );
        assert!(provider.prices().await.iter().all(|price| !price.active));
        assert!(provider.products().await.iter().all(|product| !product.active));
    }

    #[tokio::test]
    async fn compensation_failures_do_not_mask_the_original_error() {
        let provider = Arc::new(
            InMemoryPaymentProvider::new()
                .failing_on(
                    ProviderOperation::CreatePrice,
                    ProviderError::new(ProviderErrorKind::InvalidRequest, "bad currency"),
                )
                .failing_on(
                    ProviderOperation::ArchiveProduct,
                    ProviderError::new(ProviderErrorKind::Api, "archive failed"),
                ),
        );
        let action = Action::PaymentLink { product: "Widget".to_string(), amount: amount(5.0) };

        let error = dispatcher(&provider).dispatch(&action, None, &cid()).await.expect_err("failure");

        assert!(matches!(error, ServiceError::Provider(ref failure) if failure.message == "bad currency"));
        assert_eq!(error.status_code(), 400);
        assert_eq!(
            provider.calls().await,
            vec![
                ProviderOperation::CreateProduct,
                ProviderOperation::CreatePrice,
                ProviderOperation::ArchiveProduct,
            ]
        );
    }

    #[tokio::test]
    async fn connect_payment_to_unknown_account_fails_before_any_charge() {
        let provider = Arc::new(InMemoryPaymentProvider::new());
        let action = Action::ConnectPayment {
            account_id: "acct_missing".to_string(),
            amount: amount(25.0),
        };

        let error = dispatcher(&provider).dispatch(&action, None, &cid()).await.expect_err("unknown");

        assert_eq!(error.to_string(), "Invalid or non-existent account ID: acct_missing");
        assert_eq!(provider.calls().await, vec![ProviderOperation::RetrieveAccount]);
    }

    #[tokio::test]
    async fn account_lookup_outage_is_reported_as_provider_error() {
        let provider = Arc::new(InMemoryPaymentProvider::new().failing_on(
            ProviderOperation::RetrieveAccount,
            ProviderError::new(ProviderErrorKind::RateLimited, "Too many requests"),
        ));
        let action =
            Action::ConnectPayment { account_id: "acct_1".to_string(), amount: amount(25.0) };

        let error = dispatcher(&provider).dispatch(&action, None, &cid()).await.expect_err("outage");

        assert_eq!(error.user_message(), "Rate limit reached. Please try again later.");
    }

    #[tokio::test]
    async fn connect_payment_without_customer_provisions_test_customer() {
        let provider = Arc::new(InMemoryPaymentProvider::new().with_account("acct_dest"));
        let action =
            Action::ConnectPayment { account_id: "acct_dest".to_string(), amount: amount(25.0) };

        let outcome = dispatcher(&provider).dispatch(&action, None, &cid()).await.expect("payment");

        assert!(matches!(outcome, DispatchOutcome::PaymentSucceeded { .. }));
        assert_eq!(
            provider.calls().await,
            vec![
                ProviderOperation::RetrieveAccount,
                ProviderOperation::CreateCustomer,
                ProviderOperation::CreatePaymentMethod,
                ProviderOperation::AttachPaymentMethod,
                ProviderOperation::CreatePaymentIntent,
            ]
        );
        let intents = provider.payment_intents().await;
        assert_eq!(intents[0].amount, 2500);
        assert_eq!(intents[0].destination_account.as_deref(), Some("acct_dest"));
        assert!(intents[0].confirm && intents[0].off_session);
        assert_eq!(intents[0].metadata["payment_type"], "connect");
        assert_eq!(intents[0].metadata["customer_email"], "test@example.com");
    }

    #[tokio::test]
    async fn connect_payment_reuses_customer_and_updates_contact_details() {
        let provider = Arc::new(
            InMemoryPaymentProvider::new().with_account("acct_dest").with_customer("cus_1", "pm_1"),
        );
        let customer = CustomerInfo {
            id: Some("cus_1".to_string()),
            payment_method_id: Some("pm_1".to_string()),
            email: Some("payer@example.com".to_string()),
            description: Some("VIP".to_string()),
            ..CustomerInfo::default()
        };
        let action =
            Action::ConnectPayment { account_id: "acct_dest".to_string(), amount: amount(12.5) };

        dispatcher(&provider).dispatch(&action, Some(&customer), &cid()).await.expect("payment");

        assert_eq!(
            provider.calls().await,
            vec![
                ProviderOperation::RetrieveAccount,
                ProviderOperation::UpdateCustomer,
                ProviderOperation::CreatePaymentIntent,
            ]
        );
        let updates = provider.customer_updates().await;
        assert_eq!(updates[0].0, "cus_1");
        assert_eq!(updates[0].1.email.as_deref(), Some("payer@example.com"));
        assert_eq!(updates[0].1.description.as_deref(), Some("VIP"));
        let intents = provider.payment_intents().await;
        assert_eq!(intents[0].customer_id, "cus_1");
        assert_eq!(intents[0].payment_method_id, "pm_1");
        assert_eq!(intents[0].amount, 1250);
    }

    #[tokio::test]
    async fn connect_payment_without_contact_details_skips_update() {
        let provider = Arc::new(
            InMemoryPaymentProvider::new().with_account("acct_dest").with_customer("cus_1", "pm_1"),
        );
        let customer = CustomerInfo {
            id: Some("cus_1".to_string()),
            payment_method_id: Some("pm_1".to_string()),
            ..CustomerInfo::default()
        };
        let action =
            Action::ConnectPayment { account_id: "acct_dest".to_string(), amount: amount(1.0) };

        dispatcher(&provider).dispatch(&action, Some(&customer), &cid()).await.expect("payment");

        assert!(!provider.calls().await.contains(&ProviderOperation::UpdateCustomer));
    }

    #[tokio::test]
    async fn unfinished_connect_payment_returns_client_secret() {
        let provider = Arc::new(
            InMemoryPaymentProvider::new()
                .with_account("acct_dest")
                .with_intent_outcome(PaymentIntentStatus::RequiresAction, None),
        );
        let action =
            Action::ConnectPayment { account_id: "acct_dest".to_string(), amount: amount(3.0) };

        let outcome = dispatcher(&provider).dispatch(&action, None, &cid()).await.expect("payment");

        assert!(matches!(outcome, DispatchOutcome::PaymentPending { ref client_secret } if client_secret.ends_with("_secret_test")));
    }

    #[tokio::test]
    async fn summary_charge_succeeds_with_fixed_price_metadata() {
        let provider = Arc::new(
            InMemoryPaymentProvider::new().with_account("acct_fees").with_customer("cus_1", "pm_1"),
        );
        let customer = CustomerInfo {
            id: Some("cus_1".to_string()),
            payment_method_id: Some("pm_1".to_string()),
            email: Some("reader@example.com".to_string()),
            ..CustomerInfo::default()
        };

        let intent_id = dispatcher(&provider)
            .charge_for_summary(&customer, "acct_fees", 500, &cid())
            .await
            .expect("charge");

        assert!(intent_id.starts_with("pi_"));
        let intents = provider.payment_intents().await;
        assert_eq!(intents[0].amount, 500);
        assert_eq!(intents[0].metadata["service"], "web_summarizer");
        assert_eq!(intents[0].metadata["price"], "$5.00");
        assert_eq!(intents[0].metadata["connect_account"], "acct_fees");
        assert_eq!(intents[0].metadata["customer_email"], "reader@example.com");
    }

    #[tokio::test]
    async fn summary_charge_that_does_not_succeed_is_a_payment_failure() {
        let provider = Arc::new(
            InMemoryPaymentProvider::new()
                .with_account("acct_fees")
                .with_intent_outcome(
                    PaymentIntentStatus::RequiresPaymentMethod,
                    Some("Your card was declined."),
                ),
        );
        let customer = CustomerInfo {
            id: Some("cus_1".to_string()),
            payment_method_id: Some("pm_1".to_string()),
            ..CustomerInfo::default()
        };

        let error = dispatcher(&provider)
            .charge_for_summary(&customer, "acct_fees", 500, &cid())
            .await
            .expect_err("declined");

        assert_eq!(error.to_string(), "Payment failed: Your card was declined.");
        assert!(error.is_payment_failure());
    }

    #[tokio::test]
    async fn provisioned_test_customer_has_attached_card() {
        let provider = Arc::new(InMemoryPaymentProvider::new());

        let customer =
            dispatcher(&provider).provision_test_customer(&cid()).await.expect("test customer");

        let payment_method_id = customer.payment_method_id.clone().expect("payment method");
        let stored = provider.payment_method(&payment_method_id).await.expect("stored");
        assert_eq!(stored.customer, customer.id);
        assert_eq!(customer.email.as_deref(), Some("test@example.com"));
    }

    #[test]
    fn prices_render_in_dollars_and_cents() {
        assert_eq!(display_price(500), "$5.00");
        assert_eq!(display_price(1999), "$19.99");
        assert_eq!(display_price(7), "$0.07");
    }
}

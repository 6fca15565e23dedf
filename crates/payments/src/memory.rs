use std::collections::{HashMap, HashSet};

use agentpay_core::errors::{ProviderError, ProviderErrorKind};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::provider::{
    Account, Customer, CustomerUpdate, LastPaymentError, NewCardPaymentMethod, NewCustomer,
    NewPaymentIntent, NewPaymentLink, NewPrice, NewProduct, PaymentIntent, PaymentIntentStatus,
    PaymentLink, PaymentMethod, PaymentProvider, Price, ProviderOperation, Product,
};

/// Provider that keeps every object in memory and records each call.
///
/// Failures can be injected per operation to exercise error and
/// compensation paths.
#[derive(Default)]
pub struct InMemoryPaymentProvider {
    state: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    next_id: u64,
    accounts: HashSet<String>,
    products: HashMap<String, Product>,
    prices: HashMap<String, Price>,
    links: Vec<(NewPaymentLink, PaymentLink)>,
    customers: HashMap<String, Customer>,
    customer_updates: Vec<(String, CustomerUpdate)>,
    payment_methods: HashMap<String, PaymentMethod>,
    intents: Vec<NewPaymentIntent>,
    intent_outcome: Option<(PaymentIntentStatus, Option<String>)>,
    failures: HashMap<ProviderOperation, ProviderError>,
    calls: Vec<ProviderOperation>,
}

impl MemoryState {
    fn begin(&mut self, operation: ProviderOperation) -> Result<(), ProviderError> {
        self.calls.push(operation);
        match self.failures.get(&operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_mem{}", self.next_id)
    }
}

fn missing(resource: &str, id: &str) -> ProviderError {
    ProviderError::new(ProviderErrorKind::ResourceMissing, format!("No such {resource}: '{id}'"))
        .with_code("resource_missing")
}

impl InMemoryPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.state.get_mut().accounts.insert(account_id.into());
        self
    }

    pub fn with_customer(
        mut self,
        customer_id: impl Into<String>,
        payment_method_id: impl Into<String>,
    ) -> Self {
        let state = self.state.get_mut();
        let customer_id = customer_id.into();
        let payment_method_id = payment_method_id.into();
        state.customers.insert(
            customer_id.clone(),
            Customer { id: customer_id.clone(), name: None, email: None },
        );
        state.payment_methods.insert(
            payment_method_id.clone(),
            PaymentMethod { id: payment_method_id, customer: Some(customer_id) },
        );
        self
    }

    pub fn failing_on(mut self, operation: ProviderOperation, error: ProviderError) -> Self {
        self.state.get_mut().failures.insert(operation, error);
        self
    }

    /// Makes every payment intent finish in `status` with an optional decline message.
    pub fn with_intent_outcome(
        mut self,
        status: PaymentIntentStatus,
        decline_message: Option<&str>,
    ) -> Self {
        self.state.get_mut().intent_outcome = Some((status, decline_message.map(str::to_string)));
        self
    }

    pub async fn calls(&self) -> Vec<ProviderOperation> {
        self.state.read().await.calls.clone()
    }

    pub async fn product(&self, product_id: &str) -> Option<Product> {
        self.state.read().await.products.get(product_id).cloned()
    }

    pub async fn products(&self) -> Vec<Product> {
        self.state.read().await.products.values().cloned().collect()
    }

    pub async fn prices(&self) -> Vec<Price> {
        self.state.read().await.prices.values().cloned().collect()
    }

    pub async fn payment_links(&self) -> Vec<NewPaymentLink> {
        self.state.read().await.links.iter().map(|(request, _)| request.clone()).collect()
    }

    pub async fn customer_updates(&self) -> Vec<(String, CustomerUpdate)> {
        self.state.read().await.customer_updates.clone()
    }

    pub async fn payment_method(&self, payment_method_id: &str) -> Option<PaymentMethod> {
        self.state.read().await.payment_methods.get(payment_method_id).cloned()
    }

    pub async fn payment_intents(&self) -> Vec<NewPaymentIntent> {
        self.state.read().await.intents.clone()
    }
}

#[async_trait]
impl PaymentProvider for InMemoryPaymentProvider {
    async fn retrieve_account(&self, account_id: &str) -> Result<Account, ProviderError> {
        let mut state = self.state.write().await;
        state.begin(ProviderOperation::RetrieveAccount)?;
        if state.accounts.contains(account_id) {
            Ok(Account { id: account_id.to_string() })
        } else {
            Err(missing("account", account_id))
        }
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product, ProviderError> {
        let mut state = self.state.write().await;
        state.begin(ProviderOperation::CreateProduct)?;
        let created = Product { id: state.next_id("prod"), name: product.name, active: true };
        state.products.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn archive_product(&self, product_id: &str) -> Result<Product, ProviderError> {
        let mut state = self.state.write().await;
        state.begin(ProviderOperation::ArchiveProduct)?;
        let product =
            state.products.get_mut(product_id).ok_or_else(|| missing("product", product_id))?;
        product.active = false;
        Ok(product.clone())
    }

    async fn create_price(&self, price: NewPrice) -> Result<Price, ProviderError> {
        let mut state = self.state.write().await;
        state.begin(ProviderOperation::CreatePrice)?;
        if !state.products.contains_key(&price.product_id) {
            return Err(missing("product", &price.product_id));
        }
        let created = Price {
            id: state.next_id("price"),
            product: price.product_id,
            unit_amount: Some(price.unit_amount),
            currency: price.currency,
            active: true,
        };
        state.prices.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn deactivate_price(&self, price_id: &str) -> Result<Price, ProviderError> {
        let mut state = self.state.write().await;
        state.begin(ProviderOperation::DeactivatePrice)?;
        let price = state.prices.get_mut(price_id).ok_or_else(|| missing("price", price_id))?;
        price.active = false;
        Ok(price.clone())
    }

    async fn create_payment_link(
        &self,
        link: NewPaymentLink,
    ) -> Result<PaymentLink, ProviderError> {
        let mut state = self.state.write().await;
        state.begin(ProviderOperation::CreatePaymentLink)?;
        if !state.prices.contains_key(&link.price_id) {
            return Err(missing("price", &link.price_id));
        }
        let id = state.next_id("plink");
        let created = PaymentLink { url: format!("https://buy.stripe.com/test_{id}"), id };
        state.links.push((link, created.clone()));
        Ok(created)
    }

    async fn create_customer(&self, customer: NewCustomer) -> Result<Customer, ProviderError> {
        let mut state = self.state.write().await;
        state.begin(ProviderOperation::CreateCustomer)?;
        let created =
            Customer { id: state.next_id("cus"), name: customer.name, email: customer.email };
        state.customers.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn update_customer(
        &self,
        customer_id: &str,
        update: CustomerUpdate,
    ) -> Result<Customer, ProviderError> {
        let mut state = self.state.write().await;
        state.begin(ProviderOperation::UpdateCustomer)?;
        let customer =
            state.customers.get_mut(customer_id).ok_or_else(|| missing("customer", customer_id))?;
        if let Some(name) = &update.name {
            customer.name = Some(name.clone());
        }
        if let Some(email) = &update.email {
            customer.email = Some(email.clone());
        }
        let updated = customer.clone();
        state.customer_updates.push((customer_id.to_string(), update));
        Ok(updated)
    }

    async fn create_card_payment_method(
        &self,
        _method: NewCardPaymentMethod,
    ) -> Result<PaymentMethod, ProviderError> {
        let mut state = self.state.write().await;
        state.begin(ProviderOperation::CreatePaymentMethod)?;
        let created = PaymentMethod { id: state.next_id("pm"), customer: None };
        state.payment_methods.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> Result<PaymentMethod, ProviderError> {
        let mut state = self.state.write().await;
        state.begin(ProviderOperation::AttachPaymentMethod)?;
        if !state.customers.contains_key(customer_id) {
            return Err(missing("customer", customer_id));
        }
        let method = state
            .payment_methods
            .get_mut(payment_method_id)
            .ok_or_else(|| missing("payment_method", payment_method_id))?;
        method.customer = Some(customer_id.to_string());
        Ok(method.clone())
    }

    async fn create_payment_intent(
        &self,
        intent: NewPaymentIntent,
    ) -> Result<PaymentIntent, ProviderError> {
        let mut state = self.state.write().await;
        state.begin(ProviderOperation::CreatePaymentIntent)?;
        if let Some(destination) = &intent.destination_account {
            if !state.accounts.contains(destination) {
                return Err(missing("account", destination));
            }
        }

        let id = state.next_id("pi");
        let (status, decline_message) =
            state.intent_outcome.clone().unwrap_or((PaymentIntentStatus::Succeeded, None));
        let created = PaymentIntent {
            client_secret: Some(format!("{id}_secret_test")),
            id,
            status,
            amount: intent.amount,
            currency: intent.currency.clone(),
            last_payment_error: decline_message.map(|message| LastPaymentError {
                code: Some("card_declined".to_string()),
                message: Some(message),
            }),
        };
        state.intents.push(intent);
        Ok(created)
    }
}

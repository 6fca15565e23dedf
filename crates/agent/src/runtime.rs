use std::sync::Arc;
use std::time::Duration;

use agentpay_core::config::AppConfig;
use agentpay_core::domain::customer::CustomerInfo;
use agentpay_core::domain::outcome::{DispatchOutcome, SummaryOutcome};
use agentpay_core::domain::request::{CorrelationId, PaymentRequest, SummaryRequest};
use agentpay_core::envelope::{payment_response, summary_response, ResponseEnvelope};
use agentpay_core::errors::ServiceError;
use agentpay_core::extract::extract_action_object;
use agentpay_core::validate::validate_action;
use agentpay_payments::{ActionDispatcher, PaymentProvider, StripeClient};
use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::interpreter::InstructionInterpreter;
use crate::llm::{HttpLlmClient, LlmClient};
use crate::summarizer::Summarizer;
use crate::tools::{Tool, WebPageTool};

/// Fee settings for the summarizer service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SummaryBilling {
    pub connect_account_id: Option<String>,
    pub price_cents: i64,
}

impl From<&AppConfig> for SummaryBilling {
    fn from(config: &AppConfig) -> Self {
        Self {
            connect_account_id: config.summarizer.connect_account_id.clone(),
            price_cents: config.summarizer.price_cents,
        }
    }
}

/// Runs both services: payment instructions and paid summaries.
pub struct AgentRuntime {
    interpreter: InstructionInterpreter,
    summarizer: Summarizer,
    dispatcher: ActionDispatcher,
    billing: SummaryBilling,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        provider: Arc<dyn PaymentProvider>,
        page_tool: Arc<dyn Tool>,
        currency: impl Into<String>,
        billing: SummaryBilling,
    ) -> Self {
        Self {
            interpreter: InstructionInterpreter::new(llm.clone()),
            summarizer: Summarizer::new(llm, page_tool),
            dispatcher: ActionDispatcher::new(provider, currency),
            billing,
        }
    }

    /// Wires the HTTP-backed LLM, Stripe and web page clients from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let llm = HttpLlmClient::from_config(&config.llm)?;
        let provider =
            StripeClient::new(&config.stripe).context("failed to build Stripe client")?;
        let page_tool = WebPageTool::new(
            Duration::from_secs(config.summarizer.fetch_timeout_secs),
            config.summarizer.max_content_chars,
        )?;

        Ok(Self::new(
            Arc::new(llm),
            Arc::new(provider),
            Arc::new(page_tool),
            config.stripe.currency.clone(),
            SummaryBilling::from(config),
        ))
    }

    pub async fn handle_payment_request(
        &self,
        request: &PaymentRequest,
        correlation_id: &CorrelationId,
    ) -> Result<DispatchOutcome, ServiceError> {
        info!(
            event_name = "agent.payment.start",
            correlation_id = %correlation_id,
            query = %request.query,
            "processing payment request"
        );

        if let Some(customer) = &request.customer {
            let missing = customer.missing_recommended_fields();
            if !missing.is_empty() {
                warn!(
                    event_name = "agent.payment.customer_incomplete",
                    correlation_id = %correlation_id,
                    missing = ?missing,
                    "customer is missing recommended fields"
                );
            }
        }

        let text = self
            .interpreter
            .interpret(&request.query)
            .await
            .map_err(|failure| ServiceError::Agent(format!("{failure:#}")))?;
        let object = extract_action_object(&text)?;
        let action = validate_action(&Value::Object(object))?;

        info!(
            event_name = "agent.payment.action_validated",
            correlation_id = %correlation_id,
            action_type = action.action_type(),
            "payment action validated"
        );

        self.dispatcher.dispatch(&action, request.customer.as_ref(), correlation_id).await
    }

    /// Charges first; the page is only fetched and summarized after a successful charge.
    pub async fn handle_summary_request(
        &self,
        request: &SummaryRequest,
        correlation_id: &CorrelationId,
    ) -> Result<SummaryOutcome, ServiceError> {
        let destination = self.billing.connect_account_id.as_deref().ok_or_else(|| {
            ServiceError::Configuration("summarizer.connect_account_id is not configured".to_string())
        })?;

        info!(
            event_name = "agent.summary.start",
            correlation_id = %correlation_id,
            url = %request.url,
            "processing summary request"
        );

        let payment_intent = self
            .dispatcher
            .charge_for_summary(&request.customer, destination, self.billing.price_cents, correlation_id)
            .await?;

        let summary =
            self.summarizer.summarize(&request.url, correlation_id).await.map_err(|failure| {
                error!(
                    event_name = "agent.summary.failed_after_charge",
                    correlation_id = %correlation_id,
                    payment_intent_id = %payment_intent,
                    error = %format!("{failure:#}"),
                    "summary failed after the customer was charged"
                );
                ServiceError::Agent(format!(
                    "{failure:#} (charged payment intent {payment_intent})"
                ))
            })?;

        Ok(SummaryOutcome { summary, payment_intent })
    }

    pub async fn provision_test_customer(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<CustomerInfo, ServiceError> {
        self.dispatcher.provision_test_customer(correlation_id).await
    }

    /// Payments handler: inbound event in, response envelope out.
    pub async fn handle_payment_event(&self, event: &Value) -> ResponseEnvelope {
        let correlation_id = CorrelationId::generate();
        let result = match PaymentRequest::from_event(event) {
            Ok(request) => self.handle_payment_request(&request, &correlation_id).await,
            Err(input) => Err(input.into()),
        };
        log_outcome("payments", &correlation_id, result.as_ref().err());
        payment_response(&result)
    }

    /// Summarizer handler: inbound event in, response envelope out.
    pub async fn handle_summary_event(&self, event: &Value) -> ResponseEnvelope {
        let correlation_id = CorrelationId::generate();
        let result = match SummaryRequest::from_event(event) {
            Ok(request) => self.handle_summary_request(&request, &correlation_id).await,
            Err(input) => Err(input.into()),
        };
        log_outcome("summarizer", &correlation_id, result.as_ref().err());
        summary_response(&result)
    }
}

fn log_outcome(handler: &'static str, correlation_id: &CorrelationId, failure: Option<&ServiceError>) {
    match failure {
        None => info!(
            event_name = "agent.handler.completed",
            correlation_id = %correlation_id,
            handler,
            "request completed"
        ),
        Some(failure) => warn!(
            event_name = "agent.handler.failed",
            correlation_id = %correlation_id,
            handler,
            error_kind = failure.kind().as_str(),
            error = %failure,
            "request failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agentpay_core::domain::customer::CustomerInfo;
    use agentpay_core::domain::outcome::DispatchOutcome;
    use agentpay_core::domain::request::{CorrelationId, PaymentRequest, SummaryRequest};
    use agentpay_core::errors::{ErrorKind, ServiceError};
    use agentpay_payments::provider::PaymentIntentStatus;
    use agentpay_payments::InMemoryPaymentProvider;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::{AgentRuntime, SummaryBilling};
    use crate::llm::ScriptedLlmClient;
    use crate::tools::Tool;

    struct FixedPage;

    #[async_trait]
    impl Tool for FixedPage {
        fn name(&self) -> &'static str {
            "fixed_page"
        }

        async fn execute(&self, input: Value) -> Result<Value> {
            Ok(json!({"url": input["url"], "title": "Page", "text": "Some page text."}))
        }
    }

    fn billing() -> SummaryBilling {
        SummaryBilling { connect_account_id: Some("acct_fees".to_string()), price_cents: 500 }
    }

    fn runtime(
        llm: Arc<ScriptedLlmClient>,
        provider: Arc<InMemoryPaymentProvider>,
        billing: SummaryBilling,
    ) -> AgentRuntime {
        AgentRuntime::new(llm, provider, Arc::new(FixedPage), "usd", billing)
    }

    fn cid() -> CorrelationId {
        CorrelationId("req-runtime".to_string())
    }

    fn paying_customer() -> CustomerInfo {
        CustomerInfo {
            id: Some("cus_1".to_string()),
            payment_method_id: Some("pm_1".to_string()),
            email: Some("reader@example.com".to_string()),
            ..CustomerInfo::default()
        }
    }

    #[tokio::test]
    async fn payment_request_flows_from_prose_to_payment_link() {
        let llm = Arc::new(ScriptedLlmClient::new([
            "Here you go:\n{\"type\": \"payment_link\", \"product\": \"lawn mowing\", \"amount\": 10}\nThanks!",
        ]));
        let provider = Arc::new(InMemoryPaymentProvider::new());
        let runtime = runtime(llm, provider.clone(), billing());
        let request = PaymentRequest {
            query: "Create a payment link for 'lawn mowing' for $10".to_string(),
            customer: None,
        };

        let outcome = runtime.handle_payment_request(&request, &cid()).await.expect("outcome");

        assert!(matches!(outcome, DispatchOutcome::PaymentLink { .. }));
        assert_eq!(provider.prices().await[0].unit_amount, Some(1000));
    }

    #[tokio::test]
    async fn invalid_agent_output_never_reaches_the_provider() {
        let llm = Arc::new(ScriptedLlmClient::new([
            "{\"type\": \"connect_payment\", \"account_id\": \"1234\", \"amount\": 25}",
        ]));
        let provider = Arc::new(InMemoryPaymentProvider::new());
        let runtime = runtime(llm, provider.clone(), billing());
        let request = PaymentRequest { query: "pay $25 to 1234".to_string(), customer: None };

        let error = runtime.handle_payment_request(&request, &cid()).await.expect_err("invalid");

        assert_eq!(error.kind(), ErrorKind::InvalidAccountId);
        assert!(provider.calls().await.is_empty());
    }

    #[tokio::test]
    async fn model_failure_is_an_agent_error() {
        let llm = Arc::new(ScriptedLlmClient::failing("upstream timeout"));
        let runtime = runtime(llm, Arc::new(InMemoryPaymentProvider::new()), billing());
        let request = PaymentRequest { query: "anything".to_string(), customer: None };

        let error = runtime.handle_payment_request(&request, &cid()).await.expect_err("agent");

        assert!(matches!(error, ServiceError::Agent(ref message) if message.contains("upstream timeout")));
    }

    #[tokio::test]
    async fn summary_charges_before_summarizing() {
        let llm = Arc::new(ScriptedLlmClient::new(["# Page\n\n## Key Points\n- text"]));
        let provider = Arc::new(InMemoryPaymentProvider::new().with_account("acct_fees"));
        let runtime = runtime(llm, provider.clone(), billing());
        let request =
            SummaryRequest { url: "https://example.com".to_string(), customer: paying_customer() };

        let outcome = runtime.handle_summary_request(&request, &cid()).await.expect("summary");

        assert!(outcome.summary.starts_with("# Page"));
        assert!(outcome.payment_intent.starts_with("pi_"));
        assert_eq!(provider.payment_intents().await[0].amount, 500);
    }

    #[tokio::test]
    async fn declined_summary_charge_skips_the_model() {
        let llm = Arc::new(ScriptedLlmClient::new(["unused"]));
        let provider = Arc::new(
            InMemoryPaymentProvider::new()
                .with_account("acct_fees")
                .with_intent_outcome(PaymentIntentStatus::RequiresPaymentMethod, Some("declined")),
        );
        let runtime = runtime(llm.clone(), provider, billing());
        let request =
            SummaryRequest { url: "https://example.com".to_string(), customer: paying_customer() };

        let error = runtime.handle_summary_request(&request, &cid()).await.expect_err("declined");

        assert!(error.is_payment_failure());
        assert!(llm.prompts().await.is_empty());
    }

    #[tokio::test]
    async fn summary_without_fee_account_is_a_configuration_error() {
        let runtime = runtime(
            Arc::new(ScriptedLlmClient::new(["unused"])),
            Arc::new(InMemoryPaymentProvider::new()),
            SummaryBilling { connect_account_id: None, price_cents: 500 },
        );
        let request =
            SummaryRequest { url: "https://example.com".to_string(), customer: paying_customer() };

        let error = runtime.handle_summary_request(&request, &cid()).await.expect_err("config");

        assert!(error.is_internal());
    }

    #[tokio::test]
    async fn summary_failure_after_charge_names_the_intent() {
        let llm = Arc::new(ScriptedLlmClient::failing("context length exceeded"));
        let provider = Arc::new(InMemoryPaymentProvider::new().with_account("acct_fees"));
        let runtime = runtime(llm, provider, billing());
        let request =
            SummaryRequest { url: "https://example.com".to_string(), customer: paying_customer() };

        let error = runtime.handle_summary_request(&request, &cid()).await.expect_err("failure");

        let message = error.to_string();
        assert!(message.contains("context length exceeded"), "{message}");
        assert!(message.contains("charged payment intent pi_"), "{message}");
    }

    #[tokio::test]
    async fn payment_event_handler_formats_envelopes() {
        let llm = Arc::new(ScriptedLlmClient::new([
            "{\"type\": \"payment_link\", \"product\": \"Widget\", \"amount\": \"19.99\"}",
        ]));
        let runtime = runtime(llm, Arc::new(InMemoryPaymentProvider::new()), billing());

        let envelope = runtime
            .handle_payment_event(&json!({"body": "{\"query\": \"payment link for a widget, $19.99\"}"}))
            .await;
        assert_eq!(envelope.status_code, 200);
        let body = envelope.body_json().expect("json body");
        assert!(body["result"].as_str().is_some_and(|result| result.starts_with("SUCCESS: https://")));

        let envelope = runtime.handle_payment_event(&json!({"body": "not json"})).await;
        assert_eq!(envelope.status_code, 400);
        assert_eq!(envelope.body_json(), Some(json!({"error": "Invalid JSON in request body"})));
    }

    #[tokio::test]
    async fn summary_event_handler_reports_missing_customer() {
        let runtime = runtime(
            Arc::new(ScriptedLlmClient::new(["unused"])),
            Arc::new(InMemoryPaymentProvider::new()),
            billing(),
        );

        let envelope =
            runtime.handle_summary_event(&json!({"body": {"url": "https://example.com"}})).await;

        assert_eq!(envelope.status_code, 400);
        assert_eq!(envelope.body_json(), Some(json!({"error": "Missing 'customer' in request body"})));
    }
}

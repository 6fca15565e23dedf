use std::io;

use agentpay_agent::AgentRuntime;
use agentpay_core::domain::outcome::SummaryOutcome;
use agentpay_core::domain::request::{CorrelationId, SummaryRequest};
use agentpay_core::errors::ServiceError;
use reqwest::Url;
use tracing::info;

use crate::commands::{block_on, init_logging, load_config, prompt_until, CommandResult};

pub fn run(url: Option<String>) -> CommandResult {
    let config = match load_config() {
        Ok(config) => config,
        Err(result) => return result,
    };
    init_logging(&config);

    let url = match url {
        Some(url) => match absolute_url(&url) {
            Some(url) => url,
            None => return CommandResult::error(format!("Invalid URL format: {url}")),
        },
        None => match ask_for_url() {
            Ok(Some(url)) => url,
            Ok(None) => return CommandResult::error("no URL was entered"),
            Err(error) => return CommandResult::error(format!("could not read input: {error}")),
        },
    };

    let runtime = match AgentRuntime::from_config(&config) {
        Ok(runtime) => runtime,
        Err(error) => return CommandResult::error(format!("{error:#}")),
    };

    match block_on(summarize_for_test_customer(&runtime, url)) {
        Ok(Ok(outcome)) => CommandResult::success(render(&outcome)),
        Ok(Err(error)) => CommandResult::error(error),
        Err(result) => result,
    }
}

async fn summarize_for_test_customer(
    runtime: &AgentRuntime,
    url: String,
) -> Result<SummaryOutcome, ServiceError> {
    let correlation_id = CorrelationId::generate();
    let customer = runtime.provision_test_customer(&correlation_id).await?;
    info!(
        event_name = "cli.summarize.test_customer",
        correlation_id = %correlation_id,
        customer_id = customer.id.as_deref().unwrap_or_default(),
        "test customer created"
    );

    runtime.handle_summary_request(&SummaryRequest { url, customer }, &correlation_id).await
}

fn render(outcome: &SummaryOutcome) -> String {
    format!("{}\n\nPayment intent: {}", outcome.summary, outcome.payment_intent)
}

/// Accepts only URLs carrying both a scheme and a host.
pub fn absolute_url(candidate: &str) -> Option<String> {
    let parsed = Url::parse(candidate.trim()).ok()?;
    parsed.host_str().filter(|host| !host.is_empty())?;
    Some(candidate.trim().to_string())
}

fn ask_for_url() -> io::Result<Option<String>> {
    prompt_until(
        &mut io::stdin().lock(),
        &mut io::stdout(),
        "Enter the URL to summarize:",
        "Invalid URL format. Please enter a valid URL (e.g., https://example.com)",
        absolute_url,
    )
}

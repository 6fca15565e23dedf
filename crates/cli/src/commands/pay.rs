use std::io;

use agentpay_agent::AgentRuntime;
use agentpay_core::domain::customer::CustomerInfo;
use agentpay_core::domain::request::{CorrelationId, PaymentRequest};
use agentpay_core::envelope::payment_result_line;

use crate::commands::{block_on, init_logging, load_config, prompt_until, CommandResult};

const EXAMPLES: &str = "Example queries:\n\
1. Process a payment of $25 to account acct_1QYv4YCd615Z2kol\n\
2. Create a payment link for 'Product Name' for $19.99";

pub fn run(query: Option<String>, customer: Option<&str>) -> CommandResult {
    let config = match load_config() {
        Ok(config) => config,
        Err(result) => return result,
    };
    init_logging(&config);

    let customer = match customer.map(parse_customer).transpose() {
        Ok(customer) => customer,
        Err(result) => return result,
    };

    let query = match query.filter(|query| !query.trim().is_empty()) {
        Some(query) => query,
        None => match ask_for_query() {
            Ok(Some(query)) => query,
            Ok(None) => return CommandResult::error("no payment instruction was entered"),
            Err(error) => return CommandResult::error(format!("could not read input: {error}")),
        },
    };

    let runtime = match AgentRuntime::from_config(&config) {
        Ok(runtime) => runtime,
        Err(error) => return CommandResult::error(format!("{error:#}")),
    };

    let request = PaymentRequest { query, customer };
    let correlation_id = CorrelationId::generate();
    match block_on(runtime.handle_payment_request(&request, &correlation_id)) {
        Ok(result) => CommandResult::from_result_line(payment_result_line(&result)),
        Err(result) => result,
    }
}

fn parse_customer(raw: &str) -> Result<CustomerInfo, CommandResult> {
    serde_json::from_str(raw)
        .map_err(|error| CommandResult::error(format!("Invalid customer JSON: {error}")))
}

fn ask_for_query() -> io::Result<Option<String>> {
    let mut stdout = io::stdout();
    println!("\nWelcome to agentpay payment processing!\n\n{EXAMPLES}");
    prompt_until(
        &mut io::stdin().lock(),
        &mut stdout,
        "What would you like to do?",
        "Please enter a valid query. Cannot be empty.",
        |answer| (!answer.is_empty()).then(|| answer.to_string()),
    )
}

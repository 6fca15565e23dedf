use std::sync::Arc;

use anyhow::{Context, Result};
use tera::Tera;

use crate::llm::LlmClient;

const PAYMENT_PROMPT: &str = r#"You are a Payment Manager. You turn payment instructions into structured data for a payment processor.

Analyze this payment request: "{{ query }}"

Rules:
- If the request mentions a "payment link", use type "payment_link".
- If the request says "pay to", "send" or "transfer" to an account, use type "connect_payment".
- Always use the amount specified in the request, as a number without currency symbols.
- For connect_payment, extract the account ID starting with 'acct_'.
- If no valid account ID is found in a payment request, return an error message instead of JSON.

Return ONLY a JSON object in exactly one of these formats:
{"type": "payment_link", "product": "product name", "amount": number}
{"type": "connect_payment", "account_id": "acct_*", "amount": number}
"#;

/// Asks the language model to turn a payment instruction into action JSON.
///
/// The returned text is untrusted and must go through extraction and
/// validation before use.
pub struct InstructionInterpreter {
    llm: Arc<dyn LlmClient>,
}

impl InstructionInterpreter {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub fn render_prompt(query: &str) -> Result<String> {
        let mut context = tera::Context::new();
        context.insert("query", query);
        Tera::one_off(PAYMENT_PROMPT, &context, false).context("failed to render payment prompt")
    }

    pub async fn interpret(&self, query: &str) -> Result<String> {
        let prompt = Self::render_prompt(query)?;
        self.llm.complete(&prompt).await.context("payment instruction interpretation failed")
    }
}

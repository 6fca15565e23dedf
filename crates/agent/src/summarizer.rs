use std::sync::Arc;

use agentpay_core::domain::request::CorrelationId;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use tera::Tera;
use tracing::info;

use crate::llm::LlmClient;
use crate::tools::Tool;

const SUMMARY_PROMPT: &str = r#"You are a Web Content Summarizer. Write a clear, structured summary of the web page below.

URL: {{ url }}
{% if title %}Title: {{ title }}
{% endif %}
Page content:
"""
{{ content }}
"""

Structure the summary in three sections:
1. Key Points (3-5 bullet points)
   - Main ideas and key takeaways
   - Important facts or statistics
2. Detailed Analysis (2-3 paragraphs)
   - Context and background
   - Main arguments or findings
3. Implications & Conclusions (2-3 bullet points)
   - Potential impact or consequences
   - Recommendations, limitations or areas for further consideration

Format the output in markdown: start with a level-one heading and use a level-two heading per section.
"#;

/// Fetches a page through the web page tool and asks the model for a summary.
pub struct Summarizer {
    llm: Arc<dyn LlmClient>,
    page_tool: Arc<dyn Tool>,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LlmClient>, page_tool: Arc<dyn Tool>) -> Self {
        Self { llm, page_tool }
    }

    pub async fn summarize(&self, url: &str, correlation_id: &CorrelationId) -> Result<String> {
        let page = self
            .page_tool
            .execute(json!({"url": url}))
            .await
            .with_context(|| format!("{} failed", self.page_tool.name()))?;

        let title = page.get("title").and_then(Value::as_str).unwrap_or_default();
        let content = page.get("text").and_then(Value::as_str).unwrap_or_default();

        let mut context = tera::Context::new();
        context.insert("url", url);
        context.insert("title", title);
        context.insert("content", content);
        let prompt = Tera::one_off(SUMMARY_PROMPT, &context, false)
            .context("failed to render summary prompt")?;

        let summary = self.llm.complete(&prompt).await.context("summary generation failed")?;
        info!(
            event_name = "agent.summarizer.completed",
            correlation_id = %correlation_id,
            url,
            summary_chars = summary.chars().count(),
            "summary generated"
        );

        Ok(ensure_markdown(&summary))
    }
}

/// Wraps plain-text model output in the standard summary layout.
pub fn ensure_markdown(summary: &str) -> String {
    let trimmed = summary.trim();
    if trimmed.starts_with('#') {
        return trimmed.to_string();
    }

    format!(
        "# Web Page Summary\n\n\
         ## Key Points\n{trimmed}\n\n\
         ## Detailed Analysis\nAnalysis not available for this content.\n\n\
         ## Implications & Conclusions\n\
         * Further analysis may be needed\n\
         * Consider reviewing source material for more details\n"
    )
}

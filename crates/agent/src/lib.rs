//! Agent runtime: language-model interpretation and orchestration.
//!
//! The model is only a translator. It turns a payment instruction into
//! candidate action JSON and page text into a summary. Every action it
//! proposes goes through extraction and validation in `agentpay-core`
//! before the payment provider sees it.
//!
//! - `interpreter` renders the payment prompt and calls the model
//! - `summarizer` fetches a page through a `Tool` and summarizes it
//! - `runtime` sequences interpretation, validation, dispatch and charging

pub mod interpreter;
pub mod llm;
pub mod runtime;
pub mod summarizer;
pub mod tools;

pub use llm::{HttpLlmClient, LlmClient, ScriptedLlmClient};
pub use runtime::{AgentRuntime, SummaryBilling};
pub use tools::{Tool, WebPageTool};

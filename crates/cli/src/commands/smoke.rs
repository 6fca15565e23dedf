use std::time::{Duration, Instant};

use agentpay_core::envelope::{ResponseEnvelope, SUCCESS_PREFIX};
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::commands::{block_on, CommandResult};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:9000/2015-03-31/functions/function/invocations";
pub const DEFAULT_QUERY: &str = "Create a payment link for 'Smoke test' for $1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct SmokeOptions {
    pub endpoint: String,
    pub query: String,
    pub attempts: u32,
    pub delay_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: String,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    endpoint: String,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

/// How a single invocation attempt ended.
enum AttemptOutcome {
    Succeeded(String),
    /// The server answered, but not with a successful result.
    Rejected(String),
    /// The server could not be reached or answered with a non-200 status.
    Retryable(String),
}

pub fn run(options: &SmokeOptions) -> CommandResult {
    let started = Instant::now();
    let checks = match block_on(invoke_with_retries(options)) {
        Ok(checks) => checks,
        Err(result) => return result,
    };
    finalize_report(&options.endpoint, checks, started.elapsed().as_millis() as u64)
}

async fn invoke_with_retries(options: &SmokeOptions) -> Vec<SmokeCheck> {
    let mut checks = Vec::new();
    let client = match Client::builder().timeout(REQUEST_TIMEOUT).build() {
        Ok(client) => client,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "http_client".to_string(),
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: error.to_string(),
            });
            return checks;
        }
    };

    let event = json!({"body": json!({"query": options.query}).to_string()});
    let attempts = options.attempts.max(1);

    for attempt in 1..=attempts {
        let started = Instant::now();
        let outcome = invoke_once(&client, &options.endpoint, &event).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let name = format!("invoke_attempt_{attempt}");

        match outcome {
            AttemptOutcome::Succeeded(message) => {
                checks.push(SmokeCheck { name, status: SmokeStatus::Pass, elapsed_ms, message });
                break;
            }
            AttemptOutcome::Rejected(message) => {
                checks.push(SmokeCheck { name, status: SmokeStatus::Fail, elapsed_ms, message });
                break;
            }
            AttemptOutcome::Retryable(message) => {
                warn!(
                    event_name = "cli.smoke.attempt_failed",
                    correlation_id = "smoke",
                    attempt,
                    attempts,
                    error = %message,
                    "invocation attempt failed"
                );
                checks.push(SmokeCheck { name, status: SmokeStatus::Fail, elapsed_ms, message });
                if attempt < attempts {
                    tokio::time::sleep(backoff(options.delay_ms, attempt)).await;
                }
            }
        }
    }

    checks
}

async fn invoke_once(client: &Client, endpoint: &str, event: &serde_json::Value) -> AttemptOutcome {
    let response = match client.post(endpoint).json(event).send().await {
        Ok(response) => response,
        Err(error) if error.is_timeout() => {
            return AttemptOutcome::Retryable(format!("request timed out: {error}"))
        }
        Err(error) => return AttemptOutcome::Retryable(format!("could not connect: {error}")),
    };

    let status = response.status();
    if !status.is_success() {
        return AttemptOutcome::Retryable(format!("server returned HTTP {}", status.as_u16()));
    }

    let envelope = match response.json::<ResponseEnvelope>().await {
        Ok(envelope) => envelope,
        Err(error) => return AttemptOutcome::Rejected(format!("invalid response envelope: {error}")),
    };
    evaluate(&envelope)
}

fn evaluate(envelope: &ResponseEnvelope) -> AttemptOutcome {
    let body = envelope.body_json().unwrap_or_default();
    let result = body
        .get("result")
        .or_else(|| body.get("error"))
        .and_then(|value| value.as_str())
        .unwrap_or(envelope.body.as_str())
        .to_string();

    if envelope.status_code == 200 && result.starts_with(SUCCESS_PREFIX) {
        AttemptOutcome::Succeeded(result)
    } else {
        AttemptOutcome::Rejected(format!("statusCode {}: {result}", envelope.status_code))
    }
}

fn backoff(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(1_u64 << (attempt - 1).min(16)))
}

fn finalize_report(endpoint: &str, checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.last().is_some_and(|check| check.status == SmokeStatus::Pass);
    let status = if passed { SmokeStatus::Pass } else { SmokeStatus::Fail };
    let summary = if passed {
        format!("invocation succeeded after {} attempt(s)", checks.len())
    } else {
        format!("invocation failed after {} attempt(s)", checks.len())
    };

    let report = SmokeReport {
        command: "smoke",
        status,
        endpoint: endpoint.to_string(),
        summary,
        total_elapsed_ms,
        checks,
    };

    let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
        format!("{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed: {error}\"}}")
    });
    CommandResult { exit_code: if passed { 0 } else { 1 }, output }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::outcome::{DispatchOutcome, SummaryOutcome};
use crate::errors::{InputError, ServiceError};

pub const SUCCESS_PREFIX: &str = "SUCCESS:";
pub const ERROR_PREFIX: &str = "Error:";

/// HTTP-shaped handler response, serialized the way API gateways expect it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Debug, Serialize)]
struct ResultBody<'a> {
    result: &'a str,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

#[derive(Debug, Serialize)]
struct SummaryBody<'a> {
    success: bool,
    summary: &'a str,
    payment_intent: &'a str,
}

#[derive(Debug, Serialize)]
struct SummaryErrorBody<'a> {
    success: bool,
    error: &'a str,
    details: &'a str,
}

pub fn default_headers() -> BTreeMap<String, String> {
    [
        ("Content-Type", "application/json"),
        ("Access-Control-Allow-Origin", "*"),
        ("Access-Control-Allow-Headers", "Content-Type"),
        ("Access-Control-Allow-Methods", "POST, OPTIONS"),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect()
}

impl ResponseEnvelope {
    pub fn json<T: Serialize>(status_code: u16, body: &T) -> Self {
        let body = serde_json::to_string(body).unwrap_or_else(|error| {
            format!(
                "{{\"error\":\"serialization failed: {}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        });
        Self { status_code, headers: default_headers(), body }
    }

    pub fn error(status_code: u16, message: &str) -> Self {
        Self::json(status_code, &ErrorBody { error: message })
    }

    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// The `SUCCESS: …` / `Error: …` line reported for a payment instruction.
pub fn payment_result_line(result: &Result<DispatchOutcome, ServiceError>) -> String {
    match result {
        Ok(outcome) => format!("{SUCCESS_PREFIX} {}", outcome.payload()),
        Err(error) => format!("{ERROR_PREFIX} {}", error.user_message()),
    }
}

pub fn payment_response(result: &Result<DispatchOutcome, ServiceError>) -> ResponseEnvelope {
    match result {
        Ok(_) => {
            ResponseEnvelope::json(200, &ResultBody { result: &payment_result_line(result) })
        }
        Err(ServiceError::Input(InputError::InvalidQuery)) => {
            ResponseEnvelope::json(400, &ResultBody { result: &payment_result_line(result) })
        }
        Err(ServiceError::Input(error)) => ResponseEnvelope::error(400, &error.to_string()),
        Err(error) if error.is_internal() => ResponseEnvelope::error(
            error.status_code(),
            &format!("Internal server error - {error}"),
        ),
        Err(error) => ResponseEnvelope::json(
            error.status_code(),
            &ResultBody { result: &payment_result_line(result) },
        ),
    }
}

pub fn summary_response(result: &Result<SummaryOutcome, ServiceError>) -> ResponseEnvelope {
    match result {
        Ok(outcome) => ResponseEnvelope::json(
            200,
            &SummaryBody {
                success: true,
                summary: &outcome.summary,
                payment_intent: &outcome.payment_intent,
            },
        ),
        Err(ServiceError::Input(error)) => ResponseEnvelope::error(400, &error.to_string()),
        Err(error) => {
            let label = if error.is_internal() {
                "Internal server error"
            } else if error.is_payment_failure() {
                "Payment processing error"
            } else {
                "Service error"
            };
            ResponseEnvelope::json(
                error.status_code(),
                &SummaryErrorBody { success: false, error: label, details: &error.to_string() },
            )
        }
    }
}

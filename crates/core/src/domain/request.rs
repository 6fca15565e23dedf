use std::fmt;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::customer::CustomerInfo;
use crate::errors::InputError;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A natural-language payment instruction plus an optional customer to charge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentRequest {
    pub query: String,
    pub customer: Option<CustomerInfo>,
}

/// A page to summarize and the customer paying for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SummaryRequest {
    pub url: String,
    pub customer: CustomerInfo,
}

/// Extracts the request body from an inbound event.
///
/// The body may be a JSON-encoded string or an already-decoded object. An
/// absent body is treated as an empty object so that the caller reports the
/// missing mandatory key instead.
pub fn normalize_body(event: &Value) -> Result<Map<String, Value>, InputError> {
    let body = match event.get("body") {
        None => return Ok(Map::new()),
        Some(Value::String(raw)) => {
            serde_json::from_str::<Value>(raw).map_err(|_| InputError::InvalidJson)?
        }
        Some(other) => other.clone(),
    };

    match body {
        Value::Object(map) => Ok(map),
        _ => Err(InputError::NotAnObject),
    }
}

impl PaymentRequest {
    pub fn from_event(event: &Value) -> Result<Self, InputError> {
        let body = normalize_body(event)?;
        let query = body.get("query").ok_or(InputError::MissingField("query"))?;
        let query = query
            .as_str()
            .map(str::trim)
            .filter(|query| !query.is_empty())
            .ok_or(InputError::InvalidQuery)?;

        let customer = match body.get("customer") {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_customer(value)?),
        };

        Ok(Self { query: query.to_string(), customer })
    }
}

impl SummaryRequest {
    pub fn from_event(event: &Value) -> Result<Self, InputError> {
        let body = normalize_body(event)?;
        let url = body.get("url").ok_or(InputError::MissingField("url"))?;
        let url = url
            .as_str()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(InputError::InvalidField("url"))?;

        let customer = body.get("customer").ok_or(InputError::MissingField("customer"))?;
        let customer = parse_customer(customer)?;
        if customer.id.as_deref().map_or(true, |id| id.trim().is_empty()) {
            return Err(InputError::MissingField("customer.id"));
        }
        if customer.payment_method_id.as_deref().map_or(true, |id| id.trim().is_empty()) {
            return Err(InputError::MissingField("customer.payment_method_id"));
        }

        Ok(Self { url: url.to_string(), customer })
    }
}

fn parse_customer(value: &Value) -> Result<CustomerInfo, InputError> {
    if !value.is_object() {
        return Err(InputError::InvalidField("customer"));
    }
    serde_json::from_value(value.clone()).map_err(|_| InputError::InvalidField("customer"))
}

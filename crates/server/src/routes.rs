//! Handler endpoints.
//!
//! Two surfaces share the same runtime:
//! - `POST /2015-03-31/functions/{function}/invocations` takes a raw event and
//!   answers with the serialized envelope, as the Lambda runtime emulator does
//! - `POST /api/payments` and `POST /api/summaries` take the request body
//!   directly and map the envelope onto the HTTP response

use std::sync::Arc;

use agentpay_agent::runtime::AgentRuntime;
use agentpay_core::envelope::ResponseEnvelope;
use agentpay_core::errors::InputError;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde_json::{json, Value};
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    runtime: Arc<AgentRuntime>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Function {
    Payments,
    Summarizer,
}

impl Function {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "payments" | "function" => Some(Self::Payments),
            "summarizer" => Some(Self::Summarizer),
            _ => None,
        }
    }
}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/2015-03-31/functions/{function}/invocations", post(invoke))
        .route("/api/payments", post(api_payments))
        .route("/api/summaries", post(api_summaries))
        .with_state(AppState { runtime })
}

async fn invoke(
    State(state): State<AppState>,
    Path(function): Path<String>,
    body: Bytes,
) -> Json<ResponseEnvelope> {
    let Some(target) = Function::parse(&function) else {
        warn!(event_name = "ingress.invoke.unknown_function", function = %function, "unknown function");
        return Json(ResponseEnvelope::error(404, &format!("Unknown function '{function}'")));
    };

    let event = if body.is_empty() {
        json!({})
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(event) => event,
            Err(_) => {
                return Json(ResponseEnvelope::error(400, &InputError::InvalidJson.to_string()))
            }
        }
    };

    let envelope = match target {
        Function::Payments => state.runtime.handle_payment_event(&event).await,
        Function::Summarizer => state.runtime.handle_summary_event(&event).await,
    };
    Json(envelope)
}

async fn api_payments(State(state): State<AppState>, body: Bytes) -> Response {
    let envelope = state.runtime.handle_payment_event(&body_event(&body)).await;
    into_http(envelope)
}

async fn api_summaries(State(state): State<AppState>, body: Bytes) -> Response {
    let envelope = state.runtime.handle_summary_event(&body_event(&body)).await;
    into_http(envelope)
}

/// Wraps a raw HTTP body the way an API gateway hands it to a function.
fn body_event(body: &Bytes) -> Value {
    if body.is_empty() {
        json!({})
    } else {
        json!({"body": String::from_utf8_lossy(body)})
    }
}

fn into_http(envelope: ResponseEnvelope) -> Response {
    let status =
        StatusCode::from_u16(envelope.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, envelope.body).into_response();

    for (name, value) in &envelope.headers {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().insert(name, value);
            }
            _ => warn!(event_name = "ingress.response.bad_header", header = %name, "dropping invalid header"),
        }
    }
    response
}

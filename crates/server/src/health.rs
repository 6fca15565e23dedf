use agentpay_core::config::{AppConfig, LlmProvider, StripeMode};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    stripe_mode: StripeMode,
    llm_provider: LlmProvider,
    summarizer_configured: bool,
}

impl From<&AppConfig> for HealthState {
    fn from(config: &AppConfig) -> Self {
        Self {
            stripe_mode: config.stripe.mode(),
            llm_provider: config.llm.provider,
            summarizer_configured: config.summarizer.connect_account_id.is_some(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub summarizer: HealthCheck,
    pub stripe_mode: StripeMode,
    pub llm_provider: LlmProvider,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let summarizer = if state.summarizer_configured {
        HealthCheck { status: "ready", detail: "fee account configured".to_string() }
    } else {
        HealthCheck {
            status: "degraded",
            detail: "summarizer.connect_account_id is not set".to_string(),
        }
    };

    let payload = HealthResponse {
        status: if state.summarizer_configured { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "agentpay-server runtime initialized".to_string(),
        },
        summarizer,
        stripe_mode: state.stripe_mode,
        llm_provider: state.llm_provider,
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}

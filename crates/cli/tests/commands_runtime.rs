use std::env;
use std::sync::{Mutex, OnceLock};

use agentpay_cli::commands::smoke::SmokeOptions;
use agentpay_cli::commands::{config, pay, smoke, summarize};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VALID_ENV: &[(&str, &str)] = &[
    ("STRIPE_API_KEY", "sk_test_cli_secret_value"),
    ("OPENAI_API_KEY", "sk-proj-cli-secret"),
    ("AGENTPAY_SUMMARIZER_CONNECT_ACCOUNT_ID", "acct_fees"),
];

#[test]
fn pay_without_stripe_key_reports_config_error() {
    with_env(&[], || {
        let result = pay::run(Some("pay $5 to acct_1".to_string()), None);

        assert_eq!(result.exit_code, 1);
        assert_eq!(result.output, "Error: STRIPE_API_KEY environment variable is required");
    });
}

#[test]
fn pay_with_publishable_key_reports_invalid_format() {
    with_env(&[("STRIPE_API_KEY", "pk_test_oops"), ("OPENAI_API_KEY", "sk-x")], || {
        let result = pay::run(Some("pay $5 to acct_1".to_string()), None);

        assert_eq!(result.exit_code, 1);
        assert!(
            result.output.starts_with("Error: Invalid Stripe API key format"),
            "{}",
            result.output
        );
    });
}

#[test]
fn pay_rejects_malformed_customer_json_before_any_call() {
    with_env(VALID_ENV, || {
        let result = pay::run(Some("pay $5 to acct_1".to_string()), Some("{\"id\": "));

        assert_eq!(result.exit_code, 1);
        assert!(result.output.starts_with("Error: Invalid customer JSON"), "{}", result.output);
    });
}

#[test]
fn pay_creates_payment_link_end_to_end() {
    let mocks = tokio::runtime::Runtime::new().expect("mock runtime");
    let server = mocks.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {
                    "role": "assistant",
                    "content": "```json\n{\"type\": \"payment_link\", \"product\": \"Lawn mowing\", \"amount\": 25}\n```"
                }}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/products"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "prod_cli", "name": "Lawn mowing", "active": true
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/prices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "price_cli", "product": "prod_cli", "unit_amount": 2500,
                "currency": "usd", "active": true
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_links"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "plink_cli", "url": "https://buy.stripe.com/test_cli"
            })))
            .mount(&server)
            .await;
        server
    });

    let uri = server.uri();
    with_env(
        &[
            ("STRIPE_API_KEY", "sk_test_cli"),
            ("AGENTPAY_STRIPE_API_BASE", uri.as_str()),
            ("AGENTPAY_LLM_PROVIDER", "ollama"),
            ("AGENTPAY_LLM_BASE_URL", uri.as_str()),
        ],
        || {
            let result =
                pay::run(Some("Create a payment link for 'Lawn mowing' for $25".to_string()), None);

            assert_eq!(result.output, "SUCCESS: https://buy.stripe.com/test_cli");
            assert_eq!(result.exit_code, 0);
        },
    );
}

#[test]
fn summarize_rejects_url_without_host() {
    with_env(VALID_ENV, || {
        let result = summarize::run(Some("example.com/article".to_string()));

        assert_eq!(result.exit_code, 1);
        assert_eq!(result.output, "Error: Invalid URL format: example.com/article");
    });
}

#[test]
fn config_redacts_secrets_and_attributes_sources() {
    with_env(VALID_ENV, || {
        let result = config::run();

        assert_eq!(result.exit_code, 0);
        assert!(result.output.starts_with("effective config (source precedence: env > file > default):"));
        assert!(result
            .output
            .contains("- stripe.api_key = sk_test_*** (source: env (STRIPE_API_KEY))"));
        assert!(result.output.contains("- llm.api_key = sk-*** (source: env (OPENAI_API_KEY))"));
        assert!(result.output.contains("- stripe.mode = test"));
        assert!(result.output.contains("- server.port = 9000 (source: default)"));
        assert!(!result.output.contains("secret_value"));
        assert!(!result.output.contains("cli-secret"));
    });
}

#[test]
fn config_reports_validation_failure() {
    with_env(&[("STRIPE_API_KEY", "sk_test_x"), ("AGENTPAY_LLM_PROVIDER", "anthropic")], || {
        let result = config::run();

        assert_eq!(result.exit_code, 1);
        assert!(result.output.starts_with("Error: "), "{}", result.output);
    });
}

#[test]
fn smoke_fails_after_retrying_unreachable_endpoint() {
    with_env(&[], || {
        let result = smoke::run(&SmokeOptions {
            endpoint: "http://127.0.0.1:9/2015-03-31/functions/function/invocations".to_string(),
            query: "pay $1 to acct_1".to_string(),
            attempts: 2,
            delay_ms: 0,
        });

        assert_eq!(result.exit_code, 1);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "fail");
        assert_eq!(payload["checks"].as_array().map(Vec::len), Some(2));
    });
}

#[test]
fn smoke_retries_until_server_answers_with_success() {
    let mocks = tokio::runtime::Runtime::new().expect("mock runtime");
    let server = mocks.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2015-03-31/functions/function/invocations"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2015-03-31/functions/function/invocations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "statusCode": 200,
                "headers": {"Content-Type": "application/json"},
                "body": "{\"result\":\"SUCCESS: https://buy.stripe.com/test_smoke\"}"
            })))
            .mount(&server)
            .await;
        server
    });

    let result = smoke::run(&SmokeOptions {
        endpoint: format!("{}/2015-03-31/functions/function/invocations", server.uri()),
        query: "Create a payment link for 'Smoke' for $1".to_string(),
        attempts: 3,
        delay_ms: 1,
    });

    assert_eq!(result.exit_code, 0, "{}", result.output);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["status"], "pass");
    assert_eq!(payload["checks"][0]["status"], "fail");
    assert_eq!(payload["checks"][1]["status"], "pass");
}

#[test]
fn smoke_does_not_retry_a_rejected_envelope() {
    let mocks = tokio::runtime::Runtime::new().expect("mock runtime");
    let server = mocks.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "statusCode": 400,
                "headers": {},
                "body": "{\"result\":\"Error: Invalid payment request format: Invalid account ID format\"}"
            })))
            .expect(1)
            .mount(&server)
            .await;
        server
    });

    let result = smoke::run(&SmokeOptions {
        endpoint: server.uri(),
        query: "pay $1 to 1234".to_string(),
        attempts: 4,
        delay_ms: 1,
    });

    assert_eq!(result.exit_code, 1);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["checks"].as_array().map(Vec::len), Some(1));
    assert!(payload["checks"][0]["message"]
        .as_str()
        .is_some_and(|message| message.starts_with("statusCode 400: Error:")));
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "STRIPE_API_KEY",
        "OPENAI_API_KEY",
        "ANTHROPIC_API_KEY",
        "AGENTPAY_STRIPE_API_BASE",
        "AGENTPAY_STRIPE_CURRENCY",
        "AGENTPAY_STRIPE_TIMEOUT_SECS",
        "AGENTPAY_LLM_PROVIDER",
        "AGENTPAY_LLM_API_KEY",
        "AGENTPAY_LLM_BASE_URL",
        "AGENTPAY_LLM_MODEL",
        "AGENTPAY_LLM_TIMEOUT_SECS",
        "AGENTPAY_SUMMARIZER_CONNECT_ACCOUNT_ID",
        "AGENTPAY_SUMMARIZER_PRICE_CENTS",
        "AGENTPAY_SUMMARIZER_MAX_CONTENT_CHARS",
        "AGENTPAY_SUMMARIZER_FETCH_TIMEOUT_SECS",
        "AGENTPAY_SERVER_BIND_ADDRESS",
        "AGENTPAY_SERVER_PORT",
        "AGENTPAY_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "AGENTPAY_LOGGING_LEVEL",
        "AGENTPAY_LOGGING_FORMAT",
        "AGENTPAY_LOG_LEVEL",
        "AGENTPAY_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }
}

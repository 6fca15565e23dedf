use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use agentpay_core::config::{AppConfig, LlmProvider, LoadOptions, STRIPE_API_KEY_VAR};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::CommandResult;

struct Entry {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn entry(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Entry {
    Entry { key, value, env_keys }
}

struct ConfigFile {
    path: Option<PathBuf>,
    doc: Option<Value>,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::error(error),
    };

    let path = detect_config_path();
    let file = ConfigFile { doc: load_config_file_doc(path.as_deref()), path };
    CommandResult::success(render(&config, &file))
}

fn render(config: &AppConfig, file: &ConfigFile) -> String {
    let llm_key_vars: &'static [&'static str] = match config.llm.provider {
        LlmProvider::OpenAi => &["AGENTPAY_LLM_API_KEY", "OPENAI_API_KEY"],
        LlmProvider::Anthropic => &["AGENTPAY_LLM_API_KEY", "ANTHROPIC_API_KEY"],
        LlmProvider::Ollama => &["AGENTPAY_LLM_API_KEY"],
    };
    let llm_api_key = match &config.llm.api_key {
        Some(key) => redact_token(key.expose_secret()),
        None => "<unset>".to_string(),
    };

    let entries = vec![
        entry(
            "stripe.api_key",
            redact_token(config.stripe.api_key.expose_secret()),
            &[STRIPE_API_KEY_VAR],
        ),
        entry("stripe.mode", format!("{:?}", config.stripe.mode()).to_lowercase(), &[STRIPE_API_KEY_VAR]),
        entry("stripe.api_base", config.stripe.api_base.clone(), &["AGENTPAY_STRIPE_API_BASE"]),
        entry("stripe.currency", config.stripe.currency.clone(), &["AGENTPAY_STRIPE_CURRENCY"]),
        entry(
            "stripe.timeout_secs",
            config.stripe.timeout_secs.to_string(),
            &["AGENTPAY_STRIPE_TIMEOUT_SECS"],
        ),
        entry("llm.provider", format!("{:?}", config.llm.provider), &["AGENTPAY_LLM_PROVIDER"]),
        entry("llm.model", config.llm.model.clone(), &["AGENTPAY_LLM_MODEL"]),
        entry(
            "llm.base_url",
            config.llm.effective_base_url().to_string(),
            &["AGENTPAY_LLM_BASE_URL"],
        ),
        entry("llm.api_key", llm_api_key, llm_key_vars),
        entry("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["AGENTPAY_LLM_TIMEOUT_SECS"]),
        entry(
            "summarizer.connect_account_id",
            config.summarizer.connect_account_id.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["AGENTPAY_SUMMARIZER_CONNECT_ACCOUNT_ID"],
        ),
        entry(
            "summarizer.price_cents",
            config.summarizer.price_cents.to_string(),
            &["AGENTPAY_SUMMARIZER_PRICE_CENTS"],
        ),
        entry(
            "summarizer.max_content_chars",
            config.summarizer.max_content_chars.to_string(),
            &["AGENTPAY_SUMMARIZER_MAX_CONTENT_CHARS"],
        ),
        entry(
            "summarizer.fetch_timeout_secs",
            config.summarizer.fetch_timeout_secs.to_string(),
            &["AGENTPAY_SUMMARIZER_FETCH_TIMEOUT_SECS"],
        ),
        entry(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["AGENTPAY_SERVER_BIND_ADDRESS"],
        ),
        entry("server.port", config.server.port.to_string(), &["AGENTPAY_SERVER_PORT"]),
        entry(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["AGENTPAY_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        entry(
            "logging.level",
            config.logging.level.clone(),
            &["AGENTPAY_LOGGING_LEVEL", "AGENTPAY_LOG_LEVEL"],
        ),
        entry(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["AGENTPAY_LOGGING_FORMAT", "AGENTPAY_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        entries
            .into_iter()
            .map(|entry| render_line(entry.key, &entry.value, field_source(entry.key, entry.env_keys, file))),
    );
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("agentpay.toml"), PathBuf::from("config/agentpay.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(key_path: &str, env_keys: &[&str], file: &ConfigFile) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if file.doc.as_ref().is_some_and(|doc| contains_path(doc, key_path)) {
        let file_path = file
            .path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the key's mode prefix (`sk_test_`, `sk_live_`, `sk-`) and hides the rest.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    for prefix in ["sk_test_", "sk_live_", "sk-ant-", "sk-"] {
        if trimmed.starts_with(prefix) {
            return format!("{prefix}***");
        }
    }
    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_token};

    #[test]
    fn redaction_keeps_only_known_prefixes() {
        assert_eq!(redact_token("sk_test_51abcdef"), "sk_test_***");
        assert_eq!(redact_token("sk_live_51abcdef"), "sk_live_***");
        assert_eq!(redact_token("sk-ant-api03-xyz"), "sk-ant-***");
        assert_eq!(redact_token("sk-proj-xyz"), "sk-***");
        assert_eq!(redact_token("opaque-token"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn dotted_paths_resolve_against_toml_tables() {
        let doc: toml::Value = "[stripe]\ncurrency = \"eur\"\n".parse().expect("toml");

        assert!(contains_path(&doc, "stripe.currency"));
        assert!(!contains_path(&doc, "stripe.api_base"));
        assert!(!contains_path(&doc, "llm.model"));
    }
}

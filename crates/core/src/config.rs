use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const STRIPE_API_KEY_VAR: &str = "STRIPE_API_KEY";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub stripe: StripeConfig,
    pub llm: LlmConfig,
    pub summarizer: SummarizerConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct StripeConfig {
    pub api_key: SecretString,
    pub api_base: String,
    pub currency: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SummarizerConfig {
    /// Connect account that receives summarization fees.
    pub connect_account_id: Option<String>,
    pub price_cents: i64,
    pub max_content_chars: usize,
    pub fetch_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StripeMode {
    Test,
    Live,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub stripe_api_key: Option<String>,
    pub stripe_api_base: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub connect_account_id: Option<String>,
    pub server_port: Option<u16>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("{0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            stripe: StripeConfig {
                api_key: String::new().into(),
                api_base: "https://api.stripe.com".to_string(),
                currency: "usd".to_string(),
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 60,
            },
            summarizer: SummarizerConfig {
                connect_account_id: None,
                price_cents: 500,
                max_content_chars: 12_000,
                fetch_timeout_secs: 20,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 9000,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl LlmProvider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }

    fn api_key_var(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Ollama => None,
        }
    }
}

impl StripeConfig {
    pub fn mode(&self) -> StripeMode {
        if self.api_key.expose_secret().starts_with("sk_live_") {
            StripeMode::Live
        } else {
            StripeMode::Test
        }
    }
}

impl LlmConfig {
    pub fn effective_base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or_else(|| self.provider.default_base_url())
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("agentpay.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(stripe) = patch.stripe {
            if let Some(stripe_api_key_value) = stripe.api_key {
                self.stripe.api_key = secret_value(stripe_api_key_value);
            }
            if let Some(api_base) = stripe.api_base {
                self.stripe.api_base = api_base;
            }
            if let Some(currency) = stripe.currency {
                self.stripe.currency = currency;
            }
            if let Some(timeout_secs) = stripe.timeout_secs {
                self.stripe.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(summarizer) = patch.summarizer {
            if let Some(connect_account_id) = summarizer.connect_account_id {
                self.summarizer.connect_account_id = Some(connect_account_id);
            }
            if let Some(price_cents) = summarizer.price_cents {
                self.summarizer.price_cents = price_cents;
            }
            if let Some(max_content_chars) = summarizer.max_content_chars {
                self.summarizer.max_content_chars = max_content_chars;
            }
            if let Some(fetch_timeout_secs) = summarizer.fetch_timeout_secs {
                self.summarizer.fetch_timeout_secs = fetch_timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env(STRIPE_API_KEY_VAR) {
            self.stripe.api_key = secret_value(value);
        }
        if let Some(value) = read_env("AGENTPAY_STRIPE_API_BASE") {
            self.stripe.api_base = value;
        }
        if let Some(value) = read_env("AGENTPAY_STRIPE_CURRENCY") {
            self.stripe.currency = value;
        }
        if let Some(value) = read_env("AGENTPAY_STRIPE_TIMEOUT_SECS") {
            self.stripe.timeout_secs = parse_u64("AGENTPAY_STRIPE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("AGENTPAY_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        let provider_key = self.llm.provider.api_key_var().and_then(read_env);
        if let Some(value) = read_env("AGENTPAY_LLM_API_KEY").or(provider_key) {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("AGENTPAY_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("AGENTPAY_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("AGENTPAY_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("AGENTPAY_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("AGENTPAY_SUMMARIZER_CONNECT_ACCOUNT_ID") {
            self.summarizer.connect_account_id = Some(value);
        }
        if let Some(value) = read_env("AGENTPAY_SUMMARIZER_PRICE_CENTS") {
            self.summarizer.price_cents = parse_i64("AGENTPAY_SUMMARIZER_PRICE_CENTS", &value)?;
        }
        if let Some(value) = read_env("AGENTPAY_SUMMARIZER_MAX_CONTENT_CHARS") {
            self.summarizer.max_content_chars =
                parse_usize("AGENTPAY_SUMMARIZER_MAX_CONTENT_CHARS", &value)?;
        }
        if let Some(value) = read_env("AGENTPAY_SUMMARIZER_FETCH_TIMEOUT_SECS") {
            self.summarizer.fetch_timeout_secs =
                parse_u64("AGENTPAY_SUMMARIZER_FETCH_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("AGENTPAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("AGENTPAY_SERVER_PORT") {
            self.server.port = parse_u16("AGENTPAY_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("AGENTPAY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("AGENTPAY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("AGENTPAY_LOGGING_LEVEL").or_else(|| read_env("AGENTPAY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("AGENTPAY_LOGGING_FORMAT").or_else(|| read_env("AGENTPAY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(stripe_api_key) = overrides.stripe_api_key {
            self.stripe.api_key = secret_value(stripe_api_key);
        }
        if let Some(api_base) = overrides.stripe_api_base {
            self.stripe.api_base = api_base;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(connect_account_id) = overrides.connect_account_id {
            self.summarizer.connect_account_id = Some(connect_account_id);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_stripe(&self.stripe)?;
        validate_llm(&self.llm)?;
        validate_summarizer(&self.summarizer)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("agentpay.toml"), PathBuf::from("config/agentpay.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_stripe(stripe: &StripeConfig) -> Result<(), ConfigError> {
    let api_key = stripe.api_key.expose_secret();
    if api_key.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "{STRIPE_API_KEY_VAR} environment variable is required"
        )));
    }
    if !api_key.starts_with("sk_test_") && !api_key.starts_with("sk_live_") {
        let hint = if api_key.starts_with("pk_") {
            " (hint: you may have used the publishable key instead of the secret key)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!("Invalid Stripe API key format{hint}")));
    }

    if !stripe.api_base.starts_with("http://") && !stripe.api_base.starts_with("https://") {
        return Err(ConfigError::Validation(
            "stripe.api_base must start with http:// or https://".to_string(),
        ));
    }

    if stripe.currency.len() != 3 || !stripe.currency.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Err(ConfigError::Validation(
            "stripe.currency must be a three-letter ISO currency code".to_string(),
        ));
    }

    if stripe.timeout_secs == 0 || stripe.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "stripe.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {}
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_summarizer(summarizer: &SummarizerConfig) -> Result<(), ConfigError> {
    if let Some(account_id) = &summarizer.connect_account_id {
        if !account_id.starts_with("acct_") {
            return Err(ConfigError::Validation(
                "summarizer.connect_account_id must start with `acct_`".to_string(),
            ));
        }
    }

    if summarizer.price_cents <= 0 {
        return Err(ConfigError::Validation(
            "summarizer.price_cents must be greater than zero".to_string(),
        ));
    }

    if summarizer.max_content_chars == 0 {
        return Err(ConfigError::Validation(
            "summarizer.max_content_chars must be greater than zero".to_string(),
        ));
    }

    if summarizer.fetch_timeout_secs == 0 || summarizer.fetch_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "summarizer.fetch_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    stripe: Option<StripePatch>,
    llm: Option<LlmPatch>,
    summarizer: Option<SummarizerPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct StripePatch {
    api_key: Option<String>,
    api_base: Option<String>,
    currency: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SummarizerPatch {
    connect_account_id: Option<String>,
    price_cents: Option<i64>,
    max_content_chars: Option<usize>,
    fetch_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

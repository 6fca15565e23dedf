use std::sync::Arc;

use agentpay_agent::runtime::AgentRuntime;
use agentpay_core::config::{AppConfig, ConfigError, LoadOptions};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("runtime initialization failed: {0:#}")]
    Runtime(#[source] anyhow::Error),
}

/// Loads configuration ahead of bootstrap so logging can start first.
pub fn load_config(options: LoadOptions) -> Result<AppConfig, BootstrapError> {
    Ok(AppConfig::load(options)?)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        stripe_mode = ?config.stripe.mode(),
        llm_provider = ?config.llm.provider,
        "starting application bootstrap"
    );

    let runtime = AgentRuntime::from_config(&config).map_err(BootstrapError::Runtime)?;

    if config.summarizer.connect_account_id.is_none() {
        info!(
            event_name = "system.bootstrap.summarizer_unconfigured",
            correlation_id = "bootstrap",
            "summarizer.connect_account_id is not set; summary requests will fail"
        );
    }

    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        "agent runtime initialized"
    );

    Ok(Application { config, runtime: Arc::new(runtime) })
}

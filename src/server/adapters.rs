//! Command generator adapter
//!
//! Bridges the DeepSeek provider to the scheduler's `CommandGenerator` trait.

use async_trait::async_trait;
use cadence_core::{CommandGenerator, SchedulerError, SchedulerResult, SystemMetrics};
use cadence_llm::{DeepSeekConfig, DeepSeekProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::config::AiConfig;

/// Adapter to use DeepSeekProvider as CommandGenerator
pub struct DeepSeekCommandGenerator {
    pub(crate) provider: DeepSeekProvider,
}

#[async_trait]
impl CommandGenerator for DeepSeekCommandGenerator {
    async fn generate(&self, goal: &str, metrics: &SystemMetrics) -> SchedulerResult<String> {
        let system_state = metrics.to_json()?;
        self.provider
            .generate_command(goal, &system_state)
            .await
            .map_err(|e| SchedulerError::Execution(format!("Command generation failed: {}", e)))
    }
}

/// Build the configured command generator, if any.
///
/// A missing API key only disables AI-dynamic tasks.
pub fn resolve_command_generator(config: &AiConfig) -> Option<Arc<dyn CommandGenerator>> {
    if config.provider != "deepseek" {
        warn!(
            "Unsupported AI provider '{}', AI tasks will fail",
            config.provider
        );
        return None;
    }

    let mut ds_config = match DeepSeekConfig::from_env_var(&config.api_key_env) {
        Ok(c) => c,
        Err(e) => {
            warn!("AI command generation disabled: {}", e);
            return None;
        }
    };
    ds_config = ds_config
        .with_model(&config.model)
        .with_timeout(Duration::from_secs(config.timeout_secs));
    if let Some(base_url) = &config.base_url {
        ds_config = ds_config.with_base_url(base_url);
    }

    match DeepSeekProvider::new(ds_config) {
        Ok(provider) => {
            info!("AI command generation via DeepSeek ({})", provider.model());
            Some(Arc::new(DeepSeekCommandGenerator { provider }))
        }
        Err(e) => {
            warn!("AI command generation disabled: {}", e);
            None
        }
    }
}

//! Generative model capability
//!
//! - GenerativeModel trait, injected into the answer composer
//! - OpenAiCompatibleModel for chat-completions HTTP endpoints
//! - RetryingModel adding a timeout and bounded retries to any model
//! - ExtractiveModel, an offline model answering straight from the prompt
mod extractive;
mod openai;
mod retry;

pub use extractive::ExtractiveModel;
pub use openai::OpenAiCompatibleModel;
pub use retry::RetryingModel;

use crate::config::LlmConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Sampling options for one generation call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.2,
        }
    }
}

impl From<&LlmConfig> for GenerationOptions {
    fn from(config: &LlmConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// Text generation capability
///
/// Failures are reported as `BugbusterError::Generation`.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Build the model selected by configuration, wrapped with timeout and retries
pub fn model_from_config(config: &LlmConfig) -> Result<Arc<dyn GenerativeModel>> {
    let inner: Arc<dyn GenerativeModel> = if config.enabled {
        Arc::new(OpenAiCompatibleModel::from_config(config)?)
    } else {
        tracing::info!("LLM disabled, answering with the extractive model");
        Arc::new(ExtractiveModel::new())
    };

    Ok(Arc::new(RetryingModel::new(
        inner,
        Duration::from_secs(config.timeout_secs),
        config.max_retries,
        Duration::from_millis(config.retry_backoff_ms),
    )))
}

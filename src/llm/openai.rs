/// Chat-completions client for OpenAI-compatible endpoints (OpenAI, Groq, Ollama)
use super::{GenerationOptions, GenerativeModel};
use crate::config::LlmConfig;
use crate::error::{BugbusterError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiCompatibleModel {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleModel {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BugbusterError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            api_key,
        })
    }

    /// Build from configuration, reading the API key from `llm.api_key_env`
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::warn!(
                "{} is not set, calling {} without credentials",
                config.api_key_env,
                config.base_url
            );
        }
        Self::new(
            &config.base_url,
            config.model.clone(),
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl GenerativeModel for OpenAiCompatibleModel {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| BugbusterError::Generation(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BugbusterError::Generation(format!(
                "Model endpoint returned {}: {}",
                status, body
            )));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| BugbusterError::Generation(format!("Invalid response body: {}", e)))?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| BugbusterError::Generation("Model returned no content".to_string()))?;

        tracing::debug!("Model {} returned {} chars", self.model, content.len());
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

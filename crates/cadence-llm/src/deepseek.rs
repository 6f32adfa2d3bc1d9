//! DeepSeek command generator
//!
//! Uses the OpenAI-compatible chat completions endpoint. The model is told to
//! answer with nothing but the command; the reply is still cleaned of
//! markdown fences before it is returned.

use crate::error::{Error, Result};
use crate::util::{extract_command, mask_api_key, truncate_safe};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

/// DeepSeek API base URL
pub const DEEPSEEK_API_BASE: &str = "https://api.deepseek.com/v1";

/// Default DeepSeek model
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "DEEPSEEK_API_KEY";

const SYSTEM_PROMPT: &str = "You are an AI task executor for a Linux task scheduler. \
Given the current system metrics and a task goal, reply with exactly one shell command \
that accomplishes the goal. Only output the exact command to run, with no explanation, \
no markdown and no surrounding quotes.";

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 1024;

/// DeepSeek provider configuration
#[derive(Clone)]
pub struct DeepSeekConfig {
    /// API key
    pub api_key: String,
    /// Base URL
    pub base_url: String,
    /// Default model
    pub default_model: String,
    /// Request timeout
    pub timeout: Duration,
}

// Keep the key out of logs
impl fmt::Debug for DeepSeekConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepSeekConfig")
            .field("api_key", &mask_api_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Sanitize API error messages
fn sanitize_api_error(error: &str) -> String {
    let lower = error.to_lowercase();

    if lower.contains("api key")
        || lower.contains("apikey")
        || lower.contains("invalid key")
        || lower.contains("unauthorized")
        || lower.contains("authentication")
    {
        return format!("API authentication error. Please check your {}.", API_KEY_ENV);
    }

    if lower.contains("rate limit") || lower.contains("quota") {
        return "DeepSeek rate limit exceeded. Please try again later.".to_string();
    }

    if error.len() > 300 {
        format!("{}...(truncated)", truncate_safe(error, 300))
    } else {
        error.to_string()
    }
}

impl DeepSeekConfig {
    /// Create a new configuration with an API key
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEEPSEEK_API_BASE.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Read the key from the environment variable `key_env`
    pub fn from_env_var(key_env: &str) -> Result<Self> {
        let api_key = std::env::var(key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::NotConfigured(format!("{} not set", key_env)))?;
        Ok(Self::new(api_key))
    }

    /// Create configuration from `DEEPSEEK_API_KEY` and `DEEPSEEK_MODEL`
    pub fn from_env() -> Result<Self> {
        let config = Self::from_env_var(API_KEY_ENV)?;
        match std::env::var("DEEPSEEK_MODEL") {
            Ok(model) => Ok(config.with_model(model)),
            Err(_) => Ok(config),
        }
    }

    /// Set the default model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

fn user_prompt(goal: &str, system_state: &str) -> String {
    format!(
        "Current system metrics:\n{}\n\nTask goal: {}\n\nGenerate a single shell command to accomplish this task:",
        system_state, goal
    )
}

fn command_from_response(response: ChatResponse) -> Result<String> {
    let content = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::InvalidResponse("No choices in response".to_string()))?
        .message
        .content
        .unwrap_or_default();

    let command = extract_command(&content);
    if command.is_empty() {
        return Err(Error::InvalidResponse("Empty command in response".to_string()));
    }
    Ok(command)
}

/// DeepSeek provider (OpenAI-compatible)
pub struct DeepSeekProvider {
    client: Client,
    config: DeepSeekConfig,
}

impl DeepSeekProvider {
    /// Create a new DeepSeek provider
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: DeepSeekConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Provider(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(DeepSeekConfig::from_env()?)
    }

    /// Model used for requests
    pub fn model(&self) -> &str {
        &self.config.default_model
    }

    /// Ask the model for one shell command that achieves `goal` given the
    /// JSON `system_state`
    #[instrument(skip(self, system_state), fields(model = %self.config.default_model))]
    pub async fn generate_command(&self, goal: &str, system_state: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.config.default_model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt(goal, system_state),
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        debug!("Sending request to DeepSeek");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(self.config.timeout.as_millis() as u64)
                } else {
                    Error::Network(sanitize_api_error(&e.to_string()))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!(
                "{}: {}",
                status,
                sanitize_api_error(&error_text)
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        let command = command_from_response(chat_response)?;
        debug!("DeepSeek suggested: {}", command);
        Ok(command)
    }
}

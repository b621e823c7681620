//! HTTP client for external LLM services (vLLM, OpenAI, etc.)

use crate::config::LlmServiceConfig;
use crate::error::{Result, StewardError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-call generation options
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Request JSON-mode output where the service supports it
    pub json_output: bool,
    /// Per-request timeout; overrides the client default
    pub timeout: Option<Duration>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 512,
            json_output: false,
            timeout: None,
        }
    }
}

/// Trait for chat-style completion services.
///
/// The core depends on nothing else from the LLM vendor: one system
/// instruction, one user prompt, options, text out.
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn generate(&self, system: &str, user: &str, options: &GenerationOptions)
        -> Result<String>;

    /// Model name for logs and response metadata
    fn model_name(&self) -> &str;
}

/// Chat message for completion requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// OpenAI-compatible chat client
pub struct HttpLlmClient {
    http_client: reqwest::Client,
    config: LlmServiceConfig,
}

impl HttpLlmClient {
    /// Create new client from configuration
    pub fn new(config: LlmServiceConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(StewardError::Http)?;

        Ok(Self {
            http_client,
            config,
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(LlmServiceConfig::default())
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[async_trait]
impl LLMClient for HttpLlmClient {
    async fn generate(
        &self,
        system: &str,
        user: &str,
        options: &GenerationOptions,
    ) -> Result<String> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            response_format: options.json_output.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };

        let url = format!("{}/v1/chat/completions", self.config.url);
        let mut req = self.http_client.post(&url).json(&request);

        if let Some(timeout) = options.timeout {
            req = req.timeout(timeout);
        }
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req.send().await.map_err(StewardError::Http)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StewardError::ExternalError(format!(
                "LLM service error (HTTP {}): {}",
                status, body
            )));
        }

        let chat_response: ChatResponse = response.json().await.map_err(StewardError::Http)?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| StewardError::Llm("No response from LLM".to_string()))?
            .message
            .content;

        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Scripted LLM client for exercising the pipeline without a network

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Returns queued responses in order; errors once the queue is empty
    pub struct ScriptedClient {
        responses: Mutex<VecDeque<Result<String>>>,
    }

    impl ScriptedClient {
        pub fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
            }
        }

        pub fn replying(response: &str) -> Self {
            Self::new(vec![Ok(response.to_string())])
        }

        pub fn failing(message: &str) -> Self {
            Self::new(vec![Err(StewardError::ExternalError(message.to_string()))])
        }
    }

    #[async_trait]
    impl LLMClient for ScriptedClient {
        async fn generate(
            &self,
            _system: &str,
            _user: &str,
            _options: &GenerationOptions,
        ) -> Result<String> {
            self.responses
                .lock()
                .expect("scripted client lock")
                .pop_front()
                .unwrap_or_else(|| Err(StewardError::Llm("script exhausted".to_string())))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }
}

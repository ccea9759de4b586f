use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::ExplanationError;
use super::prompt::ChatMessage;
use crate::config::LlmConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 500,
        }
    }
}

impl From<&LlmConfig> for SamplingParams {
    fn from(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
        }
    }
}

/// A chat-style text generator. Implementations return only the newly
/// generated assistant text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &SamplingParams,
    ) -> Result<String, ExplanationError>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any server exposing the OpenAI `chat/completions` API
/// (vLLM, llama.cpp server, TGI, ...).
pub struct OpenAiChatClient {
    http_client: Client,
    base_url: Url,
    model: String,
    api_key: Option<String>,
}

impl OpenAiChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self, ExplanationError> {
        // Url::join drops the last path segment unless it ends with '/'
        let mut base = config.base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)
            .map_err(|e| ExplanationError::Config(format!("invalid base_url '{}': {}", config.base_url, e)))?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            model: config.model.clone(),
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ExplanationError> {
        self.base_url
            .join(path)
            .map_err(|e| ExplanationError::Config(e.to_string()))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Checks that the server answers before it is used for real requests.
    pub async fn verify(&self) -> Result<(), ExplanationError> {
        let response = self
            .authorize(self.http_client.get(self.endpoint("models")?))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(ExplanationError::Upstream(format!(
                "Model listing failed ({}): {}",
                status, error_text
            )));
        }
        log::info!("Language model endpoint {} is reachable", self.base_url);
        Ok(())
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &SamplingParams,
    ) -> Result<String, ExplanationError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_tokens,
        };

        let response = self
            .authorize(self.http_client.post(self.endpoint("chat/completions")?))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(ExplanationError::Upstream(format!(
                "Chat completion failed ({}): {}",
                status, error_text
            )));
        }

        let completion: ChatCompletionResponse = response.json().await?;
        extract_reply(completion)
    }
}

fn extract_reply(completion: ChatCompletionResponse) -> Result<String, ExplanationError> {
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| ExplanationError::Upstream("Completion contained no message".to_string()))
}

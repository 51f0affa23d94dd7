//! Reasoning collaborator: conversation in, one JSON reply out.

use crate::config::ReasoningConfig;
use crate::error::ReasoningError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ReasoningCollaborator: Send + Sync {
    async fn complete(&self, conversation: &[ChatMessage]) -> Result<String, ReasoningError>;
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client in JSON-object mode.
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
    temperature: f32,
}

impl ChatCompletionsClient {
    pub fn from_config(config: &ReasoningConfig, timeout: Duration) -> Result<Self, ReasoningError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!(env = %config.api_key_env, "reasoning API key not set; diagnoses will end in UNKNOWN");
        }
        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            api_key_env: config.api_key_env.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ReasoningCollaborator for ChatCompletionsClient {
    async fn complete(&self, conversation: &[ChatMessage]) -> Result<String, ReasoningError> {
        let Some(key) = &self.api_key else {
            return Err(ReasoningError::NotConfigured(format!(
                "{} is not set",
                self.api_key_env
            )));
        };
        let body = ChatRequest {
            model: &self.model,
            messages: conversation,
            temperature: self.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };
        let res = self
            .client
            .post(&self.url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(ReasoningError::Status { status, body });
        }
        let parsed: ChatResponse = res.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(ReasoningError::EmptyResponse)
    }
}

//! Chat-completion collaborator behind the `/chat` page.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ChatSettings;

#[derive(thiserror::Error, Debug)]
pub enum ChatError {
    #[error("OpenAI API key is not configured (set chat.api_key or OPENAI_API_KEY)")]
    MissingApiKey,
    #[error("Chat request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Chat API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Chat API returned no choices")]
    EmptyResponse,
}

/// Produces a reply to a single user message.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, message: &str) -> Result<String, ChatError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiChat {
    client: reqwest::Client,
    settings: ChatSettings,
    api_key: Option<String>,
}

impl OpenAiChat {
    pub fn new(settings: ChatSettings) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        let api_key = settings
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            log::warn!("No OpenAI API key configured; /chat/respond will fail");
        }
        Ok(Self {
            client,
            settings,
            api_key,
        })
    }

    /// System prompt first, then the user's message.
    fn request<'a>(&'a self, message: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.settings.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.settings.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: message,
                },
            ],
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl ChatClient for OpenAiChat {
    async fn complete(&self, message: &str) -> Result<String, ChatError> {
        let api_key = self.api_key.as_deref().ok_or(ChatError::MissingApiKey)?;

        let request = self.request(message);

        log::debug!("Requesting chat completion from {}", self.endpoint());
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("Chat API error {status}: {body}");
            return Err(ChatError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response.json().await?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ChatError::EmptyResponse)
    }
}

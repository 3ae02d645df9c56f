use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use afscheid_config::AssistantConfig;

pub mod prompt;

pub use prompt::{system_prompt, ComplianceContext};

pub const MAX_CONVERSATION_MESSAGES: usize = 40;
pub const MAX_MESSAGE_CHARS: usize = 8_000;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("assistant API key is not configured")]
    ApiKeyMissing,
    #[error("invalid conversation: {0}")]
    InvalidConversation(String),
    #[error("assistant http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("assistant upstream returned {status}: {body}")]
    Upstream { status: StatusCode, body: String },
    #[error("invalid assistant response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
    #[error("assistant returned no choices")]
    EmptyResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssistantMode {
    Intake,
    Compliance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistantReply {
    pub model: String,
    pub content: String,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone)]
struct ResolvedEndpoint {
    api_key: String,
    base_url: String,
}

/// Thin client for `POST {base_url}/chat/completions`.
///
/// Construction never fails on a missing key; [`Assistant::is_configured`]
/// reports it and [`Assistant::chat`] returns [`AssistantError::ApiKeyMissing`].
#[derive(Clone)]
pub struct Assistant {
    http: Client,
    endpoint: Option<ResolvedEndpoint>,
    model: String,
    referer: Option<String>,
    title: Option<String>,
}

impl Assistant {
    pub fn new(config: &AssistantConfig) -> Result<Self, AssistantError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds.max(1)))
            .build()?;

        let api_key = resolve_api_key(
            config.api_key.as_deref(),
            std::env::var("OPENROUTER_API_KEY").ok(),
        );

        let endpoint = match api_key {
            Some((api_key, source)) => {
                debug!(source, base_url = %config.base_url, "assistant endpoint configured");
                Some(ResolvedEndpoint {
                    api_key,
                    base_url: config.base_url.trim_end_matches('/').to_string(),
                })
            }
            None => {
                warn!("assistant API key missing; assistant requests will be refused");
                None
            }
        };

        Ok(Self {
            http,
            endpoint,
            model: config.model.clone(),
            referer: config.referer.clone(),
            title: config.title.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Validate the conversation, prepend the mode prompt and forward it.
    pub async fn chat(
        &self,
        mode: AssistantMode,
        conversation: &[ChatMessage],
        compliance: Option<&ComplianceContext>,
    ) -> Result<AssistantReply, AssistantError> {
        validate_conversation(conversation)?;
        let endpoint = self.endpoint.as_ref().ok_or(AssistantError::ApiKeyMissing)?;

        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.push(ChatMessage::new(
            ChatRole::System,
            system_prompt(mode, compliance),
        ));
        messages.extend(conversation.iter().cloned());

        let body = CompletionRequest {
            model: &self.model,
            messages: &messages,
        };

        let url = format!("{}/chat/completions", endpoint.base_url);
        let mut request = self.http.post(url).bearer_auth(&endpoint.api_key).json(&body);
        if let Some(referer) = &self.referer {
            request = request.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.title {
            request = request.header("X-Title", title);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "assistant upstream returned an error");
            return Err(AssistantError::Upstream { status, body });
        }

        let bytes = response.bytes().await?;
        let parsed: CompletionResponse = serde_json::from_slice(&bytes)?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(AssistantError::EmptyResponse)?;

        let reply = AssistantReply {
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            content,
            usage: parsed.usage,
        };

        info!(
            mode = ?mode,
            model = %reply.model,
            turns = conversation.len(),
            "assistant reply received"
        );
        Ok(reply)
    }
}

/// 1..=40 messages, only user/assistant turns, no blank content.
pub fn validate_conversation(conversation: &[ChatMessage]) -> Result<(), AssistantError> {
    if conversation.is_empty() {
        return Err(AssistantError::InvalidConversation(
            "at least one message is required".into(),
        ));
    }
    if conversation.len() > MAX_CONVERSATION_MESSAGES {
        return Err(AssistantError::InvalidConversation(format!(
            "at most {MAX_CONVERSATION_MESSAGES} messages are allowed"
        )));
    }

    for (index, message) in conversation.iter().enumerate() {
        if message.role == ChatRole::System {
            return Err(AssistantError::InvalidConversation(format!(
                "message {index} has role system; only user and assistant are allowed"
            )));
        }
        if message.content.trim().is_empty() {
            return Err(AssistantError::InvalidConversation(format!(
                "message {index} is empty"
            )));
        }
        if message.content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(AssistantError::InvalidConversation(format!(
                "message {index} exceeds {MAX_MESSAGE_CHARS} characters"
            )));
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: String,
}

/// Configured key first, then the environment. Blank keys count as missing.
fn resolve_api_key(configured: Option<&str>, env: Option<String>) -> Option<(String, &'static str)> {
    let present = |key: &str| !key.trim().is_empty();
    configured
        .filter(|key| present(key))
        .map(|key| (key.trim().to_string(), "config"))
        .or_else(|| {
            env.filter(|key| present(key))
                .map(|key| (key.trim().to_string(), "env"))
        })
}

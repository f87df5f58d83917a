//! Language-model backend abstraction
//!
//! All completion calls go through the [`LlmBackend`] trait, so the
//! orchestrator, the phase agents, and the refinement session never know
//! which provider is behind it. The production implementation is an HTTP
//! backend for the OpenAI-compatible chat completions API; tests substitute
//! scripted in-memory backends.
//!
//! Every call is a single attempt with a bounded timeout — there is no
//! retry policy at this layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::WorkflowConfig;
use crate::error::CompletionError;

/// Default chat completions endpoint.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Placeholder substituted for any completion text that could not be
/// obtained. Degraded results use this exact string so callers and tests
/// can recognize them.
pub const NO_SUGGESTION: &str = "No suggestion available.";

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    const fn as_wire_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Input to a completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model identifier for this call.
    pub model: String,
    /// Ordered conversation messages.
    pub messages: Vec<Message>,
    /// Cap on generated tokens.
    pub max_tokens: u32,
    /// Bound on the whole call.
    pub timeout: Duration,
}

impl CompletionRequest {
    #[must_use]
    pub fn new(
        model: impl Into<String>,
        messages: Vec<Message>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens,
            timeout,
        }
    }

    /// Content of the last user message, if any. Used by test doubles to
    /// inspect what was asked.
    #[must_use]
    pub fn last_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Trait implemented by completion-service backends.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Perform one completion call and return the generated text.
    ///
    /// # Errors
    ///
    /// Returns `CompletionError` on transport failures, auth/quota
    /// rejections, timeouts, or an empty response.
    async fn complete(&self, req: CompletionRequest) -> Result<String, CompletionError>;
}

/// HTTP backend for the OpenAI-compatible chat completions API.
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiBackend {
    /// Create a backend with an explicit key and optional custom endpoint.
    ///
    /// # Errors
    ///
    /// Returns `CompletionError::Misconfiguration` if the HTTP client
    /// cannot be constructed.
    pub fn new(api_key: String, base_url: Option<String>) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| CompletionError::Misconfiguration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
        })
    }

    /// Create a backend from the resolved workflow configuration.
    ///
    /// # Errors
    ///
    /// Returns `CompletionError::Misconfiguration` if the HTTP client
    /// cannot be constructed.
    pub fn from_config(config: &WorkflowConfig) -> Result<Self, CompletionError> {
        Self::new(config.api_key.clone(), None)
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, req: CompletionRequest) -> Result<String, CompletionError> {
        debug!(
            model = %req.model,
            max_tokens = req.max_tokens,
            timeout_secs = req.timeout.as_secs(),
            messages = req.messages.len(),
            "invoking completion backend"
        );

        let body = ChatRequest {
            model: &req.model,
            messages: req
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_wire_str(),
                    content: &m.content,
                })
                .collect(),
            max_tokens: req.max_tokens,
        };

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(req.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout {
                        timeout_seconds: req.timeout.as_secs(),
                    }
                } else {
                    CompletionError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            let message = truncate_detail(&message);
            return Err(match status.as_u16() {
                401 | 403 => CompletionError::Auth(message),
                code => CompletionError::Provider {
                    status: code,
                    message,
                },
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Transport(format!("failed to parse response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .filter_map(|c| c.message.content)
            .find(|c| !c.trim().is_empty())
            .ok_or(CompletionError::EmptyResponse)?;

        Ok(content.trim().to_string())
    }
}

/// Construct the configured completion backend.
///
/// # Errors
///
/// Returns `CompletionError::Misconfiguration` if the backend cannot be
/// constructed.
pub fn backend_from_config(config: &WorkflowConfig) -> Result<Arc<dyn LlmBackend>, CompletionError> {
    Ok(Arc::new(OpenAiBackend::from_config(config)?))
}

fn truncate_detail(message: &str) -> String {
    const MAX: usize = 512;
    let trimmed = message.trim();
    if trimmed.len() <= MAX {
        trimmed.to_string()
    } else {
        let mut end = MAX;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &trimmed[..end])
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Test doubles shared across module tests
// ---------------------------------------------------------------------------

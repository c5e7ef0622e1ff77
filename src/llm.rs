//! Chat-completion models.
//!
//! Defines the [`ChatModel`] trait used by the summarizer and the agent, the
//! message types exchanged with it, and [`OpenAiChat`], a client for the
//! OpenAI chat-completions API that can talk either to the API directly or
//! to an Azure OpenAI deployment.
//!
//! # Provider Selection
//!
//! The backend is chosen once at startup as an [`LlmBackend`] variant:
//!
//! | `llm.provider` | Backend | Endpoint | Auth |
//! |----------------|---------|----------|------|
//! | `openai` | [`LlmBackend::OpenAi`] | `{base_url}/chat/completions` | `Authorization: Bearer $OPENAI_API_KEY` |
//! | `azure` | [`LlmBackend::Azure`] | `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version=…` | `api-key: $AZURE_OPENAI_API_KEY` |
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry with exponential backoff (1s, 2s, 4s, … capped at 32s)
//! - other HTTP 4xx → fail immediately
//! - network errors → retry

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::config::LlmConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A tool invocation requested by the model.
///
/// `arguments` is kept as the raw JSON text the model produced so callers
/// can report malformed arguments back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_call_id: Option<String>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Assistant turn that requested tool calls.
    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::new(Role::Assistant, content)
        }
    }

    /// Observation returned for a tool call.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }
}

/// Function-calling definition advertised to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatResponse {
    /// Final text with no tool calls.
    Text(String),
    /// The model wants tools run before it answers.
    ToolCalls {
        text: Option<String>,
        calls: Vec<ToolCall>,
    },
}

/// A chat-completion model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, for logs.
    fn name(&self) -> &str;

    /// Send a conversation, optionally advertising tools.
    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<ChatResponse>;

    /// Single-prompt completion without tools.
    async fn complete(&self, prompt: &str) -> Result<String> {
        match self.chat(&[Message::user(prompt)], &[]).await? {
            ChatResponse::Text(text) => Ok(text),
            ChatResponse::ToolCalls { .. } => {
                bail!("model requested a tool call for a plain completion")
            }
        }
    }
}

/// Where chat requests go and how they authenticate.
#[derive(Debug, Clone)]
pub enum LlmBackend {
    OpenAi {
        base_url: String,
        api_key: String,
    },
    Azure {
        endpoint: String,
        deployment: String,
        api_version: String,
        api_key: String,
    },
}

impl LlmBackend {
    /// Resolve the backend from configuration, reading the API key from the
    /// environment.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::resolve(config, |key| std::env::var(key).ok())
    }

    pub fn resolve(config: &LlmConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        match config.provider.as_str() {
            "openai" => {
                let api_key = lookup("OPENAI_API_KEY")
                    .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
                Ok(LlmBackend::OpenAi {
                    base_url: config.base_url.trim_end_matches('/').to_string(),
                    api_key,
                })
            }
            "azure" => {
                let api_key = lookup("AZURE_OPENAI_API_KEY").ok_or_else(|| {
                    anyhow::anyhow!("AZURE_OPENAI_API_KEY environment variable not set")
                })?;
                let endpoint = config
                    .azure_endpoint
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("llm.azure_endpoint required for azure"))?;
                let deployment = config
                    .azure_deployment
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("llm.azure_deployment required for azure"))?;
                Ok(LlmBackend::Azure {
                    endpoint: endpoint.trim_end_matches('/').to_string(),
                    deployment,
                    api_version: config.azure_api_version.clone(),
                    api_key,
                })
            }
            other => bail!("Unknown llm provider: {}", other),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            LlmBackend::OpenAi { .. } => "openai",
            LlmBackend::Azure { .. } => "azure",
        }
    }

    fn request(&self, client: &reqwest::Client) -> reqwest::RequestBuilder {
        match self {
            LlmBackend::OpenAi { base_url, api_key } => client
                .post(format!("{}/chat/completions", base_url))
                .header("Authorization", format!("Bearer {}", api_key)),
            LlmBackend::Azure {
                endpoint,
                deployment,
                api_version,
                api_key,
            } => client
                .post(format!(
                    "{}/openai/deployments/{}/chat/completions",
                    endpoint, deployment
                ))
                .query(&[("api-version", api_version.as_str())])
                .header("api-key", api_key.as_str()),
        }
    }
}

/// Chat-completions client for OpenAI and Azure OpenAI.
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: reqwest::Client,
    backend: LlmBackend,
    model: String,
    max_retries: u32,
}

impl OpenAiChat {
    pub fn new(backend: LlmBackend, model: impl Into<String>, config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            backend,
            model: model.into(),
            max_retries: config.max_retries,
        })
    }

    /// The model that answers questions (`llm.model`).
    pub fn answer_model(config: &LlmConfig) -> Result<Self> {
        Self::new(LlmBackend::from_config(config)?, &config.model, config)
    }

    /// The model that writes summaries (`llm.summary_model`).
    pub fn summary_model(config: &LlmConfig) -> Result<Self> {
        Self::new(LlmBackend::from_config(config)?, &config.summary_model, config)
    }

    async fn send(&self, body: &ChatRequest<'_>) -> Result<ChatCompletion> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .backend
                .request(&self.client)
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let text = response.text().await?;
                        return serde_json::from_str(&text)
                            .with_context(|| "Invalid chat completion response");
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(%status, attempt, "chat request failed, retrying");
                        last_err = Some(anyhow::anyhow!(
                            "{} API error {}: {}",
                            self.backend.provider_name(),
                            status,
                            body_text
                        ));
                        continue;
                    }

                    bail!(
                        "{} API error {}: {}",
                        self.backend.provider_name(),
                        status,
                        body_text
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "chat request failed, retrying");
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Chat request failed after retries")))
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<ChatResponse> {
        let api_messages: Vec<ApiMessage> = messages.iter().map(ApiMessage::from).collect();
        let api_tools: Vec<ApiTool> = tools
            .iter()
            .map(|t| ApiTool {
                r#type: "function",
                function: t,
            })
            .collect();

        let body = ChatRequest {
            model: &self.model,
            messages: &api_messages,
            tools: if api_tools.is_empty() {
                None
            } else {
                Some(&api_tools)
            },
        };

        let completion = self.send(&body).await?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty chat completion response"))?;

        let content = choice.message.content.unwrap_or_default();
        match choice.message.tool_calls {
            Some(calls) if !calls.is_empty() => Ok(ChatResponse::ToolCalls {
                text: if content.is_empty() {
                    None
                } else {
                    Some(content)
                },
                calls: calls
                    .into_iter()
                    .map(|c| ToolCall {
                        id: c.id,
                        name: c.function.name,
                        arguments: c.function.arguments,
                    })
                    .collect(),
            }),
            _ => Ok(ChatResponse::Text(content)),
        }
    }
}

// ============ Wire types ============

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage<'a>],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ApiTool<'a>]>,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCallOut<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

impl<'a> From<&'a Message> for ApiMessage<'a> {
    fn from(msg: &'a Message) -> Self {
        let tool_calls = if msg.tool_calls.is_empty() {
            None
        } else {
            Some(
                msg.tool_calls
                    .iter()
                    .map(|c| ApiToolCallOut {
                        id: &c.id,
                        r#type: "function",
                        function: ApiFunctionCall {
                            name: &c.name,
                            arguments: &c.arguments,
                        },
                    })
                    .collect(),
            )
        };
        let content = if tool_calls.is_some() && msg.content.is_empty() {
            None
        } else {
            Some(msg.content.as_str())
        };
        Self {
            role: msg.role.as_str(),
            content,
            tool_calls,
            tool_call_id: msg.tool_call_id.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct ApiTool<'a> {
    r#type: &'static str,
    function: &'a ToolDefinition,
}

#[derive(Serialize)]
struct ApiToolCallOut<'a> {
    id: &'a str,
    r#type: &'static str,
    function: ApiFunctionCall<'a>,
}

#[derive(Serialize)]
struct ApiFunctionCall<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<CompletionToolCall>>,
}

#[derive(Deserialize)]
struct CompletionToolCall {
    id: String,
    function: CompletionFunction,
}

#[derive(Deserialize)]
struct CompletionFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

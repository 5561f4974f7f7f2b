// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic (Claude) Messages API transport.

use async_trait::async_trait;
use llm_orchestrator_core::{
    Error, ModelRequest, ModelResponse, ModelTransport, Result, Role, TokenUsage, ToolCallRequest,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Anthropic Messages API transport.
pub struct AnthropicTransport {
    client: Client,
    api_key: String,
    base_url: String,
    api_version: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    ToolUse { name: String, input: serde_json::Value },
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorResponse {
    error: AnthropicError,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

impl AnthropicTransport {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, "https://api.anthropic.com/v1", "2023-06-01")
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("failed to build the Anthropic HTTP client");

        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
            api_version: api_version.into(),
        }
    }

    /// Reads `ANTHROPIC_API_KEY` from the process environment.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| Error::configuration("ANTHROPIC_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key))
    }

    fn to_wire_request(&self, native_model_id: &str, request: &ModelRequest) -> MessagesRequest {
        let messages = request
            .messages
            .iter()
            .filter(|message| message.role != Role::System)
            .map(|message| WireMessage {
                role: match message.role {
                    Role::User | Role::ToolResult => "user".to_string(),
                    Role::Assistant => "assistant".to_string(),
                    Role::System => unreachable!("system messages are filtered above"),
                },
                content: message.content.clone(),
            })
            .collect();

        let tools = request
            .tools
            .iter()
            .map(|schema| WireTool {
                name: schema.name.clone(),
                description: schema.description.clone(),
                input_schema: schema.parameters.clone(),
            })
            .collect();

        MessagesRequest {
            model: native_model_id.to_string(),
            messages,
            max_tokens: request.max_tokens,
            system: request.system_prompt.clone(),
            temperature: request.temperature,
            stop_sequences: request.stop_sequences.clone(),
            tools,
        }
    }

    fn convert_reqwest_error(err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::model_invocation_transient(format!("request timed out: {err}"))
        } else if let Some(status) = err.status() {
            Self::classify_status(status, &err.to_string())
        } else {
            Error::model_invocation_transient(format!("transport error: {err}"))
        }
    }

    fn classify_status(status: StatusCode, message: &str) -> Error {
        if status == StatusCode::TOO_MANY_REQUESTS {
            Error::model_invocation_throttle(message.to_string())
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Error::model_invocation_fatal(message.to_string())
        } else if status.is_server_error() {
            Error::model_invocation_transient(message.to_string())
        } else {
            Error::model_invocation_fatal(message.to_string())
        }
    }

    fn parse_error(&self, status: StatusCode, body: &str) -> Error {
        if let Ok(parsed) = serde_json::from_str::<AnthropicErrorResponse>(body) {
            let error = parsed.error;
            if status == StatusCode::TOO_MANY_REQUESTS || error.error_type == "rate_limit_error" {
                return Error::model_invocation_throttle(error.message);
            }
            if status == StatusCode::UNAUTHORIZED
                || status == StatusCode::FORBIDDEN
                || error.error_type == "authentication_error"
                || error.error_type == "permission_error"
            {
                return Error::model_invocation_fatal(error.message);
            }
            if status.is_server_error() {
                return Error::model_invocation_transient(error.message);
            }
            return Error::model_invocation_fatal(format!("{}: {}", error.error_type, error.message));
        }

        Self::classify_status(status, body)
    }
}

#[async_trait]
impl ModelTransport for AnthropicTransport {
    async fn send(&self, native_model_id: &str, request: &ModelRequest) -> Result<ModelResponse> {
        let wire_request = self.to_wire_request(native_model_id, request);

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .header("content-type", "application/json")
            .json(&wire_request)
            .send()
            .await
            .map_err(Self::convert_reqwest_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read response body".to_string());

        if !status.is_success() {
            return Err(self.parse_error(status, &body));
        }

        let parsed: MessagesResponse = serde_json::from_str(&body)
            .map_err(|err| Error::model_invocation_fatal(format!("unparseable response body: {err}")))?;

        let usage = TokenUsage {
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        };

        for block in parsed.content {
            match block {
                ContentBlock::ToolUse { name, input } => {
                    return Ok(ModelResponse::ToolCall {
                        call: ToolCallRequest { name, arguments: input },
                        usage,
                    });
                }
                ContentBlock::Text { text } if !text.is_empty() => {
                    return Ok(ModelResponse::Text { text, usage });
                }
                ContentBlock::Text { .. } => continue,
            }
        }

        Ok(ModelResponse::Text {
            text: String::new(),
            usage,
        })
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

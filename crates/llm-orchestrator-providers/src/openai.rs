// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI chat-completions API transport.

use async_trait::async_trait;
use llm_orchestrator_core::{
    Error, ModelRequest, ModelResponse, ModelTransport, Result, Role, TokenUsage, ToolCallRequest,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OpenAI chat-completions transport.
pub struct OpenAITransport {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatTool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ChatFunction,
}

#[derive(Debug, Serialize)]
struct ChatFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    function: ResponseFunctionCall,
}

#[derive(Debug, Deserialize)]
struct ResponseFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

impl OpenAITransport {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, "https://api.openai.com/v1")
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("failed to build the OpenAI HTTP client");

        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    /// Reads `OPENAI_API_KEY` from the process environment.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::configuration("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key))
    }

    fn to_wire_request(&self, native_model_id: &str, request: &ModelRequest) -> ChatCompletionRequest {
        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        for message in &request.messages {
            let role = match message.role {
                Role::System => continue,
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::ToolResult => "tool",
            };
            messages.push(ChatMessage {
                role: role.to_string(),
                content: message.content.clone(),
            });
        }

        let tools = request
            .tools
            .iter()
            .map(|schema| ChatTool {
                tool_type: "function",
                function: ChatFunction {
                    name: schema.name.clone(),
                    description: schema.description.clone(),
                    parameters: schema.parameters.clone(),
                },
            })
            .collect();

        ChatCompletionRequest {
            model: native_model_id.to_string(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stop: request.stop_sequences.clone(),
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
        if let Ok(parsed) = serde_json::from_str::<OpenAIErrorResponse>(body) {
            let error = parsed.error;
            if status == StatusCode::TOO_MANY_REQUESTS || error.error_type == "rate_limit_exceeded" {
                return Error::model_invocation_throttle(error.message);
            }
            if status == StatusCode::UNAUTHORIZED || error.error_type == "invalid_api_key" {
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
impl ModelTransport for OpenAITransport {
    async fn send(&self, native_model_id: &str, request: &ModelRequest) -> Result<ModelResponse> {
        let wire_request = self.to_wire_request(native_model_id, request);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
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

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|err| Error::model_invocation_fatal(format!("unparseable response body: {err}")))?;

        let usage = TokenUsage {
            input_tokens: parsed.usage.prompt_tokens,
            output_tokens: parsed.usage.completion_tokens,
        };

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::model_invocation_fatal("response contained no choices"))?;

        if let Some(tool_call) = choice.message.tool_calls.into_iter().next() {
            let arguments: serde_json::Value = serde_json::from_str(&tool_call.function.arguments)
                .map_err(|err| Error::model_invocation_fatal(format!("unparseable tool arguments: {err}")))?;
            return Ok(ModelResponse::ToolCall {
                call: ToolCallRequest { name: tool_call.function.name, arguments },
                usage,
            });
        }

        Ok(ModelResponse::Text {
            text: choice.message.content.unwrap_or_default(),
            usage,
        })
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire-agnostic types for the Model Invocation Core ("Model
//! Request / Response").
//!
//! The crate is agnostic to the specific vendor: [`ModelTransport`] is the
//! seam a concrete provider (see `llm-orchestrator-providers`) implements;
//! [`crate::client::ModelClient`] owns the selector-to-native-id mapping,
//! retry policy, and outcome classification on top of it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Closed set of model selectors. Additions require a code change since
/// the selector-to-model-id mapping is a closed table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSelector {
    /// Fast, cheap model (`Complexity::Simple`).
    FastCheap,
    /// Capable reasoning model (`Complexity::Complex`).
    Capable,
    /// Open-weights alternative.
    OpenWeights,
}

impl ModelSelector {
    /// Parses a configured selector name. Unknown names are a
    /// `configuration` error.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "fast_cheap" | "fast-cheap" => Ok(ModelSelector::FastCheap),
            "capable" => Ok(ModelSelector::Capable),
            "open_weights" | "open-weights" => Ok(ModelSelector::OpenWeights),
            other => Err(Error::configuration(format!(
                "unrecognized model selector '{other}'"
            ))),
        }
    }

    /// The provider-native model identifier for this selector, via the
    /// closed table.
    pub const fn native_model_id(self) -> &'static str {
        match self {
            ModelSelector::FastCheap => "claude-3-5-haiku-20241022",
            ModelSelector::Capable => "claude-3-5-sonnet-20241022",
            ModelSelector::OpenWeights => "llama-3.1-70b-instruct",
        }
    }

    /// Which transport family natively serves this selector. The
    /// providers crate uses this to route a request to the right
    /// transport when several are registered.
    pub const fn family(self) -> &'static str {
        match self {
            ModelSelector::FastCheap | ModelSelector::Capable => "anthropic",
            ModelSelector::OpenWeights => "open_weights",
        }
    }
}

/// Task complexity, the input to `pick_model`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Complex,
}

/// Picks the model selector for a complexity. The single decision point
/// for routing.
pub const fn pick_model(complexity: Complexity) -> ModelSelector {
    match complexity {
        Complexity::Simple => ModelSelector::FastCheap,
        Complexity::Complex => ModelSelector::Capable,
    }
}

/// Conversation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    ToolResult,
}

/// A single message in a model conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
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

    pub fn tool_result(content: impl Into<String>) -> Self {
        Self {
            role: Role::ToolResult,
            content: content.into(),
        }
    }
}

/// Schema for a tool a model may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Request bundle passed to the Model Client.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub selector: ModelSelector,
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub tools: Vec<ToolSchema>,
    pub stop_sequences: Vec<String>,
}

impl ModelRequest {
    pub fn new(selector: ModelSelector, messages: Vec<Message>) -> Self {
        Self {
            selector,
            system_prompt: None,
            messages,
            temperature: 0.7,
            max_tokens: 1024,
            tools: Vec::new(),
            stop_sequences: Vec::new(),
        }
    }
}

/// A tool-call instruction returned by the model, carried unchanged
/// through the Agent to the Tool Registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Token usage reported in the response envelope.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// The Model Client's successful outcome: either a text payload or a
/// tool-call instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelResponse {
    Text { text: String, usage: TokenUsage },
    ToolCall { call: ToolCallRequest, usage: TokenUsage },
}

impl ModelResponse {
    pub fn usage(&self) -> TokenUsage {
        match self {
            ModelResponse::Text { usage, .. } => *usage,
            ModelResponse::ToolCall { usage, .. } => *usage,
        }
    }
}

/// A transport-level outcome, as translated by a concrete provider
/// before the Model Client classifies it. Kept separate from
/// [`ModelResponse`] so error classification stays in one place
/// ([`crate::client::ModelClient::invoke`]) rather than duplicated in
/// every transport.
#[async_trait::async_trait]
pub trait ModelTransport: Send + Sync {
    /// Sends `request` against `native_model_id` and returns the raw
    /// outcome, or an error already classified into one of the fixed
    /// categories (throttle / transient / fatal).
    async fn send(&self, native_model_id: &str, request: &ModelRequest) -> Result<ModelResponse>;

    /// Transport family name (matches [`ModelSelector::family`]).
    fn name(&self) -> &str;
}

/// A registry of transports keyed by family name, used by
/// [`crate::client::ModelClient`] to route a selector to the transport
/// that serves it.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    transports: HashMap<String, std::sync::Arc<dyn ModelTransport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, transport: std::sync::Arc<dyn ModelTransport>) -> Self {
        self.transports
            .insert(transport.name().to_string(), transport);
        self
    }

    pub fn get(&self, family: &str) -> Option<std::sync::Arc<dyn ModelTransport>> {
        self.transports.get(family).cloned()
    }
}

// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Agent: formats a prompt, invokes the Model Client, optionally
//! dispatches tool calls, and returns a typed result.
//!
//! A `SimpleAgent -> ToolAgent -> ReasoningAgent` class hierarchy would be
//! the obvious object-oriented shape; it collapses here to one `Agent`
//! struct whose `execute` dispatches on whether `AgentConfig::tools` is
//! set, with a reasoning pattern (when configured) rewriting the prompt in
//! either branch.

use crate::client::ModelClient;
use crate::error::{Error, ErrorKind, Result};
use crate::history::{ExecutionEvent, History};
use crate::model::{Message, ModelRequest, ModelResponse, ModelSelector};
use crate::prompt::PromptTemplate;
use crate::reasoning::ReasoningPattern;
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::tools::ToolRegistry;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info_span, Instrument};

/// Where a running step's tool-call events are recorded, threaded down
/// from the scheduler so the Agent's tool loop can append `tool_call` /
/// `tool_result` entries without owning history itself: the scheduler
/// remains the sole owner of the workflow's history.
type HistorySink = (String, Arc<Mutex<History>>);

/// Per-agent configuration.
#[derive(Clone)]
pub struct AgentConfig {
    pub selector: ModelSelector,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: Option<String>,
    pub reasoning_pattern: Option<ReasoningPattern>,
    /// When set, the agent is tool-capable and dispatches calls against
    /// this registry; when `None`, the agent is Simple (or Reasoning, if
    /// `reasoning_pattern` is set).
    pub tools: Option<Arc<ToolRegistry>>,
    pub retry_policy: RetryPolicy,
    pub invocation_timeout: Option<Duration>,
    /// Bound on the tool-call loop (default 8).
    pub max_tool_iterations: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            selector: ModelSelector::FastCheap,
            temperature: 0.7,
            max_tokens: 1024,
            system_prompt: None,
            reasoning_pattern: None,
            tools: None,
            retry_policy: RetryPolicy::default(),
            invocation_timeout: None,
            max_tool_iterations: 8,
        }
    }
}

/// Distinguishes the three named variants for observability and
/// reporting purposes; dispatch itself is driven by `AgentConfig` fields,
/// not by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentVariant {
    Simple,
    ToolCapable,
    Reasoning,
}

impl AgentConfig {
    /// The variant this configuration implies.
    pub fn variant(&self) -> AgentVariant {
        if self.tools.is_some() {
            AgentVariant::ToolCapable
        } else if self.reasoning_pattern.is_some() {
            AgentVariant::Reasoning
        } else {
            AgentVariant::Simple
        }
    }
}

/// Running per-agent counters.
#[derive(Debug, Clone, Default)]
pub struct AgentMetrics {
    pub total_invocations: u64,
    pub successes: u64,
    pub failures: u64,
    pub last_error_kind: Option<ErrorKind>,
}

/// A stateful execution unit bound to a prompt template and a shared
/// Model Client.
pub struct Agent {
    pub id: String,
    pub name: String,
    config: AgentConfig,
    prompt_template: PromptTemplate,
    client: Arc<ModelClient>,
    metrics: Mutex<AgentMetrics>,
}

impl Agent {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        config: AgentConfig,
        variant_hint: AgentVariant,
        prompt_template: impl Into<String>,
        client: Arc<ModelClient>,
    ) -> Self {
        debug_assert_eq!(
            config.variant(),
            variant_hint,
            "variant hint must match what the config implies"
        );
        Self {
            id: id.into(),
            name: name.into(),
            config,
            prompt_template: PromptTemplate::new(prompt_template),
            client,
            metrics: Mutex::new(AgentMetrics::default()),
        }
    }

    pub fn variant(&self) -> AgentVariant {
        self.config.variant()
    }

    /// The per-invocation deadline configured for this agent, if any. Used
    /// by the scheduler to bound a step's execution when it has no
    /// workflow-level default.
    pub fn invocation_timeout(&self) -> Option<Duration> {
        self.config.invocation_timeout
    }

    /// A point-in-time snapshot of this agent's metrics.
    pub fn metrics(&self) -> AgentMetrics {
        self.metrics.lock().clone()
    }

    /// Formats a prompt, invokes the model (optionally looping over tool
    /// calls), and returns the final text. Wrapped in agent-level retry
    /// over transient kinds, independent of the Model Client's own retry
    /// and of any scheduler-level step retry (these
    /// layers compose rather than share a counter).
    pub async fn execute(&self, inputs: &HashMap<String, Value>) -> Result<String> {
        self.execute_traced(inputs, None).await
    }

    /// Identical to [`Agent::execute`], but records `tool_call`/`tool_result`
    /// history events against `history` under `step_id` as the tool-capable
    /// loop dispatches handlers. The scheduler is the only caller that
    /// passes `Some`; unit tests and direct callers use [`Agent::execute`].
    pub async fn execute_traced(
        &self,
        inputs: &HashMap<String, Value>,
        history: Option<HistorySink>,
    ) -> Result<String> {
        let span = info_span!("agent_execute", agent_id = %self.id, agent_name = %self.name);
        async {
            let executor = RetryExecutor::new(self.config.retry_policy.clone());
            let (result, attempt) = executor
                .execute(|| self.execute_once(inputs, history.clone()))
                .await;
            self.record(attempt, &result);
            result
        }
        .instrument(span)
        .await
    }

    async fn execute_once(
        &self,
        inputs: &HashMap<String, Value>,
        history: Option<HistorySink>,
    ) -> Result<String> {
        let rendered = self.prompt_template.render(inputs)?;
        let prompt = match self.config.reasoning_pattern {
            Some(pattern) => pattern.apply(&rendered, inputs),
            None => rendered,
        };

        match &self.config.tools {
            Some(tools) => self.run_tool_loop(prompt, tools, history).await,
            None => self.run_simple(prompt).await,
        }
    }

    async fn run_simple(&self, prompt: String) -> Result<String> {
        let request = self.build_request(vec![Message::user(prompt)]);
        match self.client.invoke(request).await? {
            ModelResponse::Text { text, .. } => Ok(text),
            ModelResponse::ToolCall { .. } => Err(Error::validation(
                "model returned a tool call from a non-tool-capable agent",
            )),
        }
    }

    async fn run_tool_loop(
        &self,
        prompt: String,
        tools: &Arc<ToolRegistry>,
        history: Option<HistorySink>,
    ) -> Result<String> {
        let mut messages = vec![Message::user(prompt)];
        // tool_failure: a handler-raised error is surfaced to the
        // model as input on one retry; a second consecutive failure is
        // fatal rather than looping indefinitely.
        let mut consecutive_tool_failures = 0u32;

        for _ in 0..self.config.max_tool_iterations {
            let request = self.build_request(messages.clone());
            match self.client.invoke(request).await? {
                ModelResponse::Text { text, .. } => return Ok(text),
                ModelResponse::ToolCall { call, .. } => {
                    messages.push(Message::assistant(format!(
                        "calling tool '{}' with {}",
                        call.name, call.arguments
                    )));
                    if let Some((step_id, sink)) = &history {
                        sink.lock()
                            .push(ExecutionEvent::tool_call(step_id.clone(), &call.name, &call.arguments));
                    }

                    let outcome = tools.invoke(&call.name, call.arguments)?;
                    let (content, result_value) = match &outcome {
                        Ok(value) => {
                            consecutive_tool_failures = 0;
                            (value.to_string(), value.clone())
                        }
                        Err(message) => {
                            consecutive_tool_failures += 1;
                            (format!("error: {message}"), Value::String(message.clone()))
                        }
                    };
                    if let Some((step_id, sink)) = &history {
                        sink.lock()
                            .push(ExecutionEvent::tool_result(step_id.clone(), &call.name, &result_value));
                    }

                    if consecutive_tool_failures > 1 {
                        return Err(Error::tool_failure(format!(
                            "tool '{}' failed twice in a row: {}",
                            call.name,
                            outcome.err().unwrap_or_default()
                        )));
                    }
                    messages.push(Message::tool_result(content));
                }
            }
        }

        Err(Error::validation("tool loop did not terminate"))
    }

    fn build_request(&self, messages: Vec<Message>) -> ModelRequest {
        let mut request = ModelRequest::new(self.config.selector, messages);
        request.system_prompt = self.config.system_prompt.clone();
        request.temperature = self.config.temperature;
        request.max_tokens = self.config.max_tokens;
        if let Some(tools) = &self.config.tools {
            request.tools = tools.schemas();
        }
        request
    }

    fn record(&self, attempt: u32, result: &Result<String>) {
        let mut metrics = self.metrics.lock();
        metrics.total_invocations += 1;
        match result {
            Ok(_) => metrics.successes += 1,
            Err(err) => {
                metrics.failures += 1;
                metrics.last_error_kind = Some(err.kind());
            }
        }
        let _ = attempt;
    }
}

// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execution history: an append-only ordered log of
//! what the scheduler did, returned to the caller as part of the result
//! bundle.

use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// The kind of thing an [`ExecutionEvent`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    WorkflowStart,
    WorkflowEnd,
    StepStart,
    StepAttempt,
    StepSuccess,
    StepFailure,
    StepRetry,
    ToolCall,
    ToolResult,
}

/// A single append-only history entry.
///
/// `elapsed` is carried as fractional seconds rather than `Duration`
/// directly, matching the result bundle's wire shape without a
/// lossy round trip through `Duration`'s own serde impl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub timestamp: DateTime<Utc>,
    pub category: EventCategory,
    pub step_id: Option<String>,
    pub attempt: Option<u32>,
    pub elapsed_seconds: Option<f64>,
    pub payload: Value,
}

impl ExecutionEvent {
    fn new(category: EventCategory) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            step_id: None,
            attempt: None,
            elapsed_seconds: None,
            payload: Value::Null,
        }
    }

    pub fn workflow_start(workflow_id: uuid::Uuid) -> Self {
        let mut event = Self::new(EventCategory::WorkflowStart);
        event.payload = serde_json::json!({ "workflow_id": workflow_id });
        event
    }

    pub fn workflow_end(status: &str) -> Self {
        let mut event = Self::new(EventCategory::WorkflowEnd);
        event.payload = serde_json::json!({ "status": status });
        event
    }

    pub fn step_start(step_id: impl Into<String>) -> Self {
        let mut event = Self::new(EventCategory::StepStart);
        event.step_id = Some(step_id.into());
        event
    }

    pub fn step_attempt(step_id: impl Into<String>, attempt: u32) -> Self {
        let mut event = Self::new(EventCategory::StepAttempt);
        event.step_id = Some(step_id.into());
        event.attempt = Some(attempt);
        event
    }

    pub fn step_success(step_id: impl Into<String>, attempt: u32, elapsed: Duration) -> Self {
        let mut event = Self::new(EventCategory::StepSuccess);
        event.step_id = Some(step_id.into());
        event.attempt = Some(attempt);
        event.elapsed_seconds = Some(elapsed.as_secs_f64());
        event
    }

    pub fn step_failure(step_id: impl Into<String>, attempt: u32, kind: ErrorKind, message: &str) -> Self {
        let mut event = Self::new(EventCategory::StepFailure);
        event.step_id = Some(step_id.into());
        event.attempt = Some(attempt);
        event.payload = serde_json::json!({ "kind": kind.as_str(), "message": message });
        event
    }

    pub fn step_retry(step_id: impl Into<String>, attempt: u32) -> Self {
        let mut event = Self::new(EventCategory::StepRetry);
        event.step_id = Some(step_id.into());
        event.attempt = Some(attempt);
        event
    }

    pub fn tool_call(step_id: impl Into<String>, tool_name: &str, arguments: &Value) -> Self {
        let mut event = Self::new(EventCategory::ToolCall);
        event.step_id = Some(step_id.into());
        event.payload = serde_json::json!({ "tool": tool_name, "arguments": arguments });
        event
    }

    pub fn tool_result(step_id: impl Into<String>, tool_name: &str, result: &Value) -> Self {
        let mut event = Self::new(EventCategory::ToolResult);
        event.step_id = Some(step_id.into());
        event.payload = serde_json::json!({ "tool": tool_name, "result": result });
        event
    }
}

/// Append-only ordered log, owned exclusively by the scheduler during
/// execution, matching the "only mutated by the scheduler" invariant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    events: Vec<ExecutionEvent>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ExecutionEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[ExecutionEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

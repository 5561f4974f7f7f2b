// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The closed error taxonomy shared by every component of the orchestrator.
//!
//! [`ErrorKind`] is the single source of truth for retry decisions: the
//! Model Client, the Agent, and the Workflow Scheduler all call
//! [`Error::is_retryable`] rather than re-deriving a retry policy from the
//! kind themselves.

use std::time::Duration;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Closed set of failure kinds.
///
/// Every failure path in the crate surfaces exactly one of these kinds,
/// never a raw low-level exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input or configuration.
    Validation,
    /// Missing required configuration (credentials, model id).
    Configuration,
    /// Workflow validation detected a cycle.
    CyclicGraph,
    /// Step references a dependency that doesn't exist.
    UnknownDependency,
    /// Rate-limit from provider.
    ModelInvocationThrottle,
    /// Network, timeout, 5xx-class.
    ModelInvocationTransient,
    /// Authentication, permission, unknown model.
    ModelInvocationFatal,
    /// Agent requested a tool name not registered.
    ToolNotFound,
    /// Tool handler raised; surfaced to the model as input on one retry, then fatal.
    ToolFailure,
    /// Step exceeded its per-step deadline.
    StepTimeout,
    /// Whole-workflow deadline expired.
    WorkflowTimeout,
    /// Caller requested cancellation.
    Cancelled,
}

impl ErrorKind {
    /// Whether this kind is transient (retryable) rather than terminal.
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::ModelInvocationThrottle | ErrorKind::ModelInvocationTransient
        )
    }

    /// Short, stable machine-readable name.
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Configuration => "configuration",
            ErrorKind::CyclicGraph => "cyclic_graph",
            ErrorKind::UnknownDependency => "unknown_dependency",
            ErrorKind::ModelInvocationThrottle => "model_invocation_throttle",
            ErrorKind::ModelInvocationTransient => "model_invocation_transient",
            ErrorKind::ModelInvocationFatal => "model_invocation_fatal",
            ErrorKind::ToolNotFound => "tool_not_found",
            ErrorKind::ToolFailure => "tool_failure",
            ErrorKind::StepTimeout => "step_timeout",
            ErrorKind::WorkflowTimeout => "workflow_timeout",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The crate's single error type: a kind plus an attached message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    /// Builds a new error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The classified kind.
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The attached human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the error's kind should be retried.
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_transient()
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn cyclic_graph(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CyclicGraph, message)
    }

    pub fn unknown_dependency(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownDependency, message)
    }

    pub fn model_invocation_throttle(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ModelInvocationThrottle, message)
    }

    pub fn model_invocation_transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ModelInvocationTransient, message)
    }

    pub fn model_invocation_fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ModelInvocationFatal, message)
    }

    pub fn tool_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ToolNotFound, message)
    }

    pub fn tool_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ToolFailure, message)
    }

    pub fn step_timeout(duration: Duration) -> Self {
        Self::new(
            ErrorKind::StepTimeout,
            format!("step exceeded its {:?} deadline", duration),
        )
    }

    pub fn workflow_timeout(duration: Duration) -> Self {
        Self::new(
            ErrorKind::WorkflowTimeout,
            format!("workflow exceeded its {:?} deadline", duration),
        )
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::validation(format!("serialization error: {err}"))
    }
}

impl From<handlebars::RenderError> for Error {
    fn from(err: handlebars::RenderError) -> Self {
        Error::validation(format!("template render error: {err}"))
    }
}

impl From<handlebars::TemplateError> for Error {
    fn from(err: handlebars::TemplateError) -> Self {
        Error::validation(format!("template parse error: {err}"))
    }
}

// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core workflow orchestration engine for LLM pipelines.
//!
//! Two subsystems live here: the Workflow Scheduler ([`workflow`],
//! [`dag`], [`history`], [`scheduler`]) builds a dependency graph over
//! steps, runs independent steps concurrently in wave batches, and
//! enforces timeouts and retries; the Agent / Model Invocation Core
//! ([`model`], [`client`], [`agent`], [`reasoning`], [`prompt`],
//! [`tools`]) manages typed conversations with a model provider.
//!
//! This crate is provider-agnostic: [`model::ModelTransport`] is the seam
//! a concrete vendor transport implements (see the sibling
//! `llm-orchestrator-providers` crate).

pub mod agent;
pub mod client;
pub mod config;
pub mod dag;
pub mod error;
pub mod history;
pub mod logging;
pub mod model;
pub mod prompt;
pub mod reasoning;
pub mod retry;
pub mod scheduler;
pub mod tools;
pub mod workflow;

pub use agent::{Agent, AgentConfig, AgentMetrics, AgentVariant};
pub use client::ModelClient;
pub use config::EnvironmentConfig;
pub use error::{Error, ErrorKind, Result};
pub use history::{EventCategory, ExecutionEvent, History};
pub use model::{
    Complexity, Message, ModelRequest, ModelResponse, ModelSelector, ModelTransport, Role,
    TokenUsage, ToolCallRequest, ToolSchema, TransportRegistry,
};
pub use prompt::PromptTemplate;
pub use reasoning::ReasoningPattern;
pub use retry::{RetryExecutor, RetryPolicy};
pub use scheduler::{MetricsBundle, ResultBundle, WorkflowScheduler};
pub use tools::{ToolHandler, ToolRegistry};
pub use workflow::{ExecutionPolicy, Step, StepStatus, Workflow, WorkflowStatus};

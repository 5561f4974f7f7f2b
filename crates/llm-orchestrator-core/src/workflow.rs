// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Workflow/Step/ExecutionPolicy data model.

use crate::agent::Agent;
use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Whole-workflow execution policy.
#[derive(Debug, Clone)]
pub struct ExecutionPolicy {
    /// Whole-workflow timeout. `None` means no deadline.
    pub workflow_timeout: Option<Duration>,
    /// Maximum whole-workflow retries (default 1, i.e. one retry).
    pub max_workflow_retries: u32,
    /// Maximum per-step retries at the scheduler layer.
    pub max_step_retries: u32,
    /// Whether steps within a wave run concurrently.
    pub parallelism_enabled: bool,
    /// Bound on concurrently running steps within a wave (0 = unbounded).
    pub max_parallel_steps: usize,
    /// Default per-step timeout used when a step's agent does not
    /// configure one.
    pub default_step_timeout: Option<Duration>,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            workflow_timeout: None,
            max_workflow_retries: 1,
            max_step_retries: 2,
            parallelism_enabled: true,
            max_parallel_steps: 0,
            default_step_timeout: None,
        }
    }
}

/// Per-step execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

/// A step bound to an agent, with literal inputs and dependencies.
#[derive(Clone)]
pub struct Step {
    pub id: String,
    pub agent: Arc<Agent>,
    pub inputs: HashMap<String, Value>,
    pub dependencies: HashSet<String>,
    pub status: StepStatus,
    pub attempt_count: u32,
    pub result: Option<Value>,
    pub error: Option<Error>,
}

impl Step {
    pub fn new(
        id: impl Into<String>,
        agent: Arc<Agent>,
        inputs: HashMap<String, Value>,
        dependencies: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            id: id.into(),
            agent,
            inputs,
            dependencies: dependencies.into_iter().collect(),
            status: StepStatus::Pending,
            attempt_count: 0,
            result: None,
            error: None,
        }
    }
}

/// Whole-workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// A workflow: identity, policy, and an insertion-ordered step table.
///
/// Step insertion order is preserved (a `Vec<Step>` plus an id index for
/// fast lookup) since insertion order governs tie-breaking within a wave
/// and the resulting history ordering.
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub policy: ExecutionPolicy,
    pub status: WorkflowStatus,
    steps: Vec<Step>,
    index: HashMap<String, usize>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, policy: ExecutionPolicy) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            policy,
            status: WorkflowStatus::Pending,
            steps: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Adds a step. Requires id uniqueness; does not yet validate the
    /// graph (validation is deferred to `execute`/`validate`).
    pub fn add_step(
        &mut self,
        id: impl Into<String>,
        agent: Arc<Agent>,
        inputs: HashMap<String, Value>,
        dependencies: impl IntoIterator<Item = String>,
    ) -> Result<()> {
        let id = id.into();
        if self.index.contains_key(&id) {
            return Err(Error::validation(format!(
                "step id '{id}' is already present in this workflow"
            )));
        }
        self.index.insert(id.clone(), self.steps.len());
        self.steps.push(Step::new(id, agent, inputs, dependencies));
        Ok(())
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn steps_mut(&mut self) -> &mut [Step] {
        &mut self.steps
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.index.get(id).map(|&i| &self.steps[i])
    }

    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.index.get(id).copied().map(move |i| &mut self.steps[i])
    }

    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains_step(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

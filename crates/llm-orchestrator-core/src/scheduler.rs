// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Workflow Scheduler: validates the step graph, dispatches
//! waves of independent steps, enforces per-step and whole-workflow
//! deadlines, retries transient failures, and assembles the result bundle.

use crate::agent::Agent;
use crate::dag;
use crate::error::{Error, ErrorKind, Result};
use crate::history::{ExecutionEvent, History};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::workflow::{StepStatus, Workflow, WorkflowStatus};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Returned from `WorkflowScheduler::execute`.
#[derive(Debug, Clone, Serialize)]
pub struct ResultBundle {
    pub workflow_id: Uuid,
    pub status: WorkflowStatus,
    pub results: HashMap<String, Value>,
    pub history: History,
    pub metrics: MetricsBundle,
}

/// `per_step_duration_seconds` is carried alongside the aggregate counts
/// so a caller can inspect per-step durations without re-deriving them
/// from the history log.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsBundle {
    pub total_steps: usize,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub retried_steps: usize,
    pub total_elapsed_seconds: f64,
    pub per_step_duration_seconds: HashMap<String, f64>,
}

struct StepOutcome {
    step_id: String,
    status: StepStatus,
    attempt_count: u32,
    result: Option<Value>,
    error: Option<Error>,
    duration: Duration,
}

/// Stateless entry point: the workflow it operates over carries all
/// mutable state.
pub struct WorkflowScheduler;

impl WorkflowScheduler {
    /// Validates `workflow`'s step graph without running it: every declared
    /// dependency must name an existing step and the graph must be acyclic.
    /// Exposed standalone (rather than only as `execute`'s first internal
    /// step) since calling it twice on the same workflow must yield the
    /// same verdict.
    pub fn validate(workflow: &Workflow) -> Result<()> {
        dag::validate(workflow)
    }

    /// Runs `workflow` to completion (or terminal failure), following the
    /// six-step algorithm.
    pub async fn execute(workflow: &mut Workflow) -> ResultBundle {
        let workflow_retry_policy = RetryPolicy::default();
        let max_attempts = workflow.policy.max_workflow_retries.max(1);

        let mut bundle = Self::run_once(workflow).await;
        let mut attempt = 1u32;

        while attempt < max_attempts
            && bundle.status == WorkflowStatus::Failed
            && workflow_terminating_kind(&bundle.history).is_some_and(ErrorKind::is_transient)
        {
            warn!(attempt, "retrying workflow after a transient aggregate failure");
            tokio::time::sleep(workflow_retry_policy.delay_for(attempt - 1)).await;
            bundle = Self::run_once(workflow).await;
            attempt += 1;
        }

        bundle
    }

    async fn run_once(workflow: &mut Workflow) -> ResultBundle {
        for step in workflow.steps_mut() {
            step.status = StepStatus::Pending;
            step.attempt_count = 0;
            step.result = None;
            step.error = None;
        }
        workflow.status = WorkflowStatus::Running;

        let history = Arc::new(Mutex::new(History::new()));
        history.lock().push(ExecutionEvent::workflow_start(workflow.id));
        let start = Instant::now();

        if let Err(err) = dag::validate(workflow) {
            history.lock().push(ExecutionEvent::workflow_end("failed"));
            workflow.status = WorkflowStatus::Failed;
            return Self::finish(workflow, HashMap::new(), history, start, Some(err));
        }

        let waves = dag::topological_waves(workflow);
        let results: Arc<DashMap<String, Value>> = Arc::new(DashMap::new());
        let mut terminating_error: Option<Error> = None;
        let mut retried_steps = 0usize;
        let mut per_step_duration = HashMap::new();
        let mut aborted = false;
        let mut timed_out = false;

        for wave in &waves {
            if aborted {
                break;
            }

            let wave_outcome = match workflow.policy.workflow_timeout {
                Some(limit) => match limit.checked_sub(start.elapsed()) {
                    Some(remaining) if !remaining.is_zero() => {
                        tokio::time::timeout(remaining, Self::run_wave(workflow, wave, &results, &history))
                            .await
                            .ok()
                    }
                    _ => None,
                },
                None => Some(Self::run_wave(workflow, wave, &results, &history).await),
            };

            let Some(outcomes) = wave_outcome else {
                terminating_error = Some(Error::workflow_timeout(
                    workflow.policy.workflow_timeout.unwrap_or_default(),
                ));
                aborted = true;
                timed_out = true;
                break;
            };

            for outcome in outcomes {
                per_step_duration.insert(outcome.step_id.clone(), outcome.duration.as_secs_f64());
                if outcome.status == StepStatus::Success && outcome.attempt_count > 1 {
                    retried_steps += 1;
                }

                if let Some(step) = workflow.step_mut(&outcome.step_id) {
                    step.status = outcome.status;
                    step.attempt_count = outcome.attempt_count;
                    step.result = outcome.result.clone();
                    step.error = outcome.error.clone();
                }

                match outcome.status {
                    StepStatus::Success => {
                        if let Some(value) = outcome.result {
                            results.insert(outcome.step_id.clone(), value);
                        }
                    }
                    StepStatus::Failed => {
                        terminating_error = outcome.error;
                        aborted = true;
                    }
                    _ => {}
                }
            }
        }

        if timed_out {
            Self::mark_remaining_skipped(workflow);
            workflow.status = WorkflowStatus::Failed;
            history.lock().push(ExecutionEvent::workflow_end("cancelled"));
        } else if aborted {
            Self::mark_remaining_skipped(workflow);
            workflow.status = WorkflowStatus::Failed;
            history.lock().push(ExecutionEvent::workflow_end("failed"));
        } else {
            workflow.status = WorkflowStatus::Completed;
            history.lock().push(ExecutionEvent::workflow_end("completed"));
        }

        // Waves that completed before the deadline keep their results; only
        // the in-flight wave that tripped the timeout is discarded, since
        // its task outcomes were never collected ("completed results
        // are preserved").
        let mut bundle = Self::finish(workflow, results_snapshot(&results), history, start, terminating_error);
        bundle.metrics.retried_steps = retried_steps;
        bundle.metrics.per_step_duration_seconds = per_step_duration;
        bundle
    }

    async fn run_wave(
        workflow: &Workflow,
        wave: &[String],
        results: &Arc<DashMap<String, Value>>,
        history: &Arc<Mutex<History>>,
    ) -> Vec<StepOutcome> {
        let mut tasks = Vec::with_capacity(wave.len());

        for step_id in wave {
            let step = workflow.step(step_id).expect("wave only names known steps");
            let agent = step.agent.clone();
            let mut inputs = step.inputs.clone();
            for dep in &step.dependencies {
                if let Some(value) = results.get(dep) {
                    inputs.insert(format!("{dep}_result"), value.clone());
                }
            }

            let effective_timeout = agent.invocation_timeout().or(workflow.policy.default_step_timeout);
            let step_retry_policy = RetryPolicy {
                max_attempts: workflow.policy.max_step_retries + 1,
                ..RetryPolicy::default()
            };
            let history = history.clone();
            let step_id = step_id.clone();

            history.lock().push(ExecutionEvent::step_start(step_id.clone()));

            let future = Self::execute_step(step_id, agent, inputs, effective_timeout, step_retry_policy, history);

            if workflow.policy.parallelism_enabled {
                tasks.push(tokio::spawn(future));
            } else {
                let outcome = future.await;
                tasks.push(tokio::spawn(async move { outcome }));
            }
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_err) => outcomes.push(StepOutcome {
                    step_id: "unknown".to_string(),
                    status: StepStatus::Failed,
                    attempt_count: 1,
                    result: None,
                    error: Some(Error::cancelled(format!("step task panicked: {join_err}"))),
                    duration: Duration::ZERO,
                }),
            }
        }

        outcomes
    }

    async fn execute_step(
        step_id: String,
        agent: Arc<Agent>,
        inputs: HashMap<String, Value>,
        timeout: Option<Duration>,
        retry_policy: RetryPolicy,
        history: Arc<Mutex<History>>,
    ) -> StepOutcome {
        let span = info_span!("step_execute", step_id = %step_id);
        async move {
            let started = Instant::now();

            if let Some(duration) = timeout {
                if duration.is_zero() {
                    let err = Error::step_timeout(duration);
                    history
                        .lock()
                        .push(ExecutionEvent::step_failure(step_id.clone(), 1, err.kind(), err.message()));
                    return StepOutcome {
                        step_id,
                        status: StepStatus::Failed,
                        attempt_count: 1,
                        result: None,
                        error: Some(err),
                        duration: started.elapsed(),
                    };
                }
            }

            let executor = RetryExecutor::new(retry_policy);
            let mut attempt_count = 0u32;
            let (result, attempt) = executor
                .execute(|| {
                    attempt_count += 1;
                    history.lock().push(ExecutionEvent::step_attempt(step_id.clone(), attempt_count));
                    let inputs = inputs.clone();
                    let agent = agent.clone();
                    let step_id_for_timeout = step_id.clone();
                    let traced = (step_id.clone(), history.clone());
                    async move {
                        match timeout {
                            Some(duration) => tokio::time::timeout(duration, agent.execute_traced(&inputs, Some(traced)))
                                .await
                                .unwrap_or_else(|_| Err(Error::step_timeout(duration))),
                            None => agent.execute_traced(&inputs, Some(traced)).await,
                        }
                        .map_err(|err| {
                            if err.kind() == ErrorKind::StepTimeout {
                                warn!(step_id = %step_id_for_timeout, "step exceeded its deadline");
                            }
                            err
                        })
                    }
                })
                .await;

            match &result {
                Ok(_) if attempt > 1 => {
                    history.lock().push(ExecutionEvent::step_retry(step_id.clone(), attempt));
                }
                Err(_) if attempt > 1 => {
                    history.lock().push(ExecutionEvent::step_retry(step_id.clone(), attempt));
                }
                _ => {}
            }

            match result {
                Ok(text) => {
                    let value = Value::String(text);
                    history
                        .lock()
                        .push(ExecutionEvent::step_success(step_id.clone(), attempt, started.elapsed()));
                    StepOutcome {
                        step_id,
                        status: StepStatus::Success,
                        attempt_count: attempt,
                        result: Some(value),
                        error: None,
                        duration: started.elapsed(),
                    }
                }
                Err(err) => {
                    history
                        .lock()
                        .push(ExecutionEvent::step_failure(step_id.clone(), attempt, err.kind(), err.message()));
                    StepOutcome {
                        step_id,
                        status: StepStatus::Failed,
                        attempt_count: attempt,
                        result: None,
                        error: Some(err),
                        duration: started.elapsed(),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    fn mark_remaining_skipped(workflow: &mut Workflow) {
        for step in workflow.steps_mut() {
            if step.status == StepStatus::Pending {
                step.status = StepStatus::Skipped;
            }
        }
    }

    fn finish(
        workflow: &Workflow,
        results: HashMap<String, Value>,
        history: Arc<Mutex<History>>,
        start: Instant,
        terminating_error: Option<Error>,
    ) -> ResultBundle {
        let total_steps = workflow.len();
        let completed_steps = workflow
            .steps()
            .iter()
            .filter(|s| s.status == StepStatus::Success)
            .count();
        let failed_steps = workflow
            .steps()
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .count();

        if let Some(err) = &terminating_error {
            error!(kind = %err.kind(), message = err.message(), "workflow terminated with an error");
        } else {
            info!(workflow_id = %workflow.id, "workflow completed");
        }

        ResultBundle {
            workflow_id: workflow.id,
            status: workflow.status,
            results,
            history: Arc::try_unwrap(history).map(Mutex::into_inner).unwrap_or_else(|arc| arc.lock().clone()),
            metrics: MetricsBundle {
                total_steps,
                completed_steps,
                failed_steps,
                retried_steps: 0,
                total_elapsed_seconds: start.elapsed().as_secs_f64(),
                per_step_duration_seconds: HashMap::new(),
            },
        }
    }
}

fn results_snapshot(results: &DashMap<String, Value>) -> HashMap<String, Value> {
    results.iter().map(|entry| (entry.key().clone(), entry.value().clone())).collect()
}

/// Extracts the error kind carried by the last `step_failure` event, used
/// to decide whether the whole workflow run is worth retrying.
fn workflow_terminating_kind(history: &History) -> Option<ErrorKind> {
    history.events().iter().rev().find_map(|event| {
        if event.category == crate::history::EventCategory::StepFailure {
            event.payload.get("kind").and_then(|k| k.as_str()).and_then(|name| {
                [
                    ErrorKind::Validation,
                    ErrorKind::Configuration,
                    ErrorKind::CyclicGraph,
                    ErrorKind::UnknownDependency,
                    ErrorKind::ModelInvocationThrottle,
                    ErrorKind::ModelInvocationTransient,
                    ErrorKind::ModelInvocationFatal,
                    ErrorKind::ToolNotFound,
                    ErrorKind::ToolFailure,
                    ErrorKind::StepTimeout,
                    ErrorKind::WorkflowTimeout,
                    ErrorKind::Cancelled,
                ]
                .into_iter()
                .find(|kind| kind.as_str() == name)
            })
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentConfig, AgentVariant};
    use crate::client::ModelClient;
    use crate::model::{ModelRequest, ModelResponse, ModelTransport, TokenUsage, TransportRegistry};
    use crate::workflow::ExecutionPolicy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedTransport {
        script: Mutex<HashMap<String, Vec<ModelResponse>>>,
    }

    #[async_trait]
    impl ModelTransport for ScriptedTransport {
        async fn send(&self, _native_model_id: &str, request: &ModelRequest) -> Result<ModelResponse> {
            let prompt = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            let mut script = self.script.lock();
            for (key, responses) in script.iter_mut() {
                if prompt.contains(key.as_str()) && !responses.is_empty() {
                    return Ok(responses.remove(0));
                }
            }
            Err(Error::validation(format!("no scripted response for prompt: {prompt}")))
        }

        fn name(&self) -> &str {
            "anthropic"
        }
    }

    fn text(s: &str) -> ModelResponse {
        ModelResponse::Text {
            text: s.to_string(),
            usage: TokenUsage {
                input_tokens: 1,
                output_tokens: 1,
            },
        }
    }

    fn client_with_script(script: HashMap<String, Vec<ModelResponse>>) -> Arc<ModelClient> {
        let transport = Arc::new(ScriptedTransport {
            script: Mutex::new(script),
        });
        Arc::new(ModelClient::new(TransportRegistry::new().register(transport)).with_retry_policy(RetryPolicy::none()))
    }

    fn agent_with(id: &str, prompt: &str, client: Arc<ModelClient>) -> Arc<Agent> {
        Arc::new(Agent::new(id, id, AgentConfig::default(), AgentVariant::Simple, prompt, client))
    }

    #[tokio::test]
    async fn sequential_success_propagates_dependency_result() {
        let mut script = HashMap::new();
        script.insert("Return the integer 1".to_string(), vec![text("1")]);
        script.insert("Return `".to_string(), vec![text("2")]);
        let client = client_with_script(script);

        let mut workflow = Workflow::new("wf", ExecutionPolicy::default());
        workflow
            .add_step("a", agent_with("agent-a", "Return the integer 1", client.clone()), HashMap::new(), [])
            .unwrap();
        workflow
            .add_step(
                "b",
                agent_with("agent-b", "Return `{a_result}` + 1 as integer", client),
                HashMap::new(),
                ["a".to_string()],
            )
            .unwrap();

        let bundle = WorkflowScheduler::execute(&mut workflow).await;
        assert_eq!(bundle.status, WorkflowStatus::Completed);
        assert_eq!(bundle.results.get("a"), Some(&Value::String("1".to_string())));
        assert_eq!(bundle.results.get("b"), Some(&Value::String("2".to_string())));
        assert_eq!(bundle.metrics.total_steps, 2);
        assert_eq!(bundle.metrics.retried_steps, 0);
    }

    #[tokio::test]
    async fn terminal_failure_aborts_downstream_and_marks_skipped() {
        let mut script = HashMap::new();
        script.insert("fatal".to_string(), vec![]);
        let client = client_with_script(script);

        let mut workflow = Workflow::new("wf", ExecutionPolicy::default());
        workflow
            .add_step("p", agent_with("agent-p", "fatal prompt", client.clone()), HashMap::new(), [])
            .unwrap();
        workflow
            .add_step("q", agent_with("agent-q", "unused", client), HashMap::new(), ["p".to_string()])
            .unwrap();

        let bundle = WorkflowScheduler::execute(&mut workflow).await;
        assert_eq!(bundle.status, WorkflowStatus::Failed);
        assert!(bundle.results.get("p").is_none());
        assert_eq!(workflow.step("q").unwrap().status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn cycle_rejection_emits_no_step_start_events() {
        let client = client_with_script(HashMap::new());
        let mut workflow = Workflow::new("wf", ExecutionPolicy::default());
        workflow
            .add_step("a", agent_with("agent-a", "x", client.clone()), HashMap::new(), ["b".to_string()])
            .unwrap();
        workflow
            .add_step("b", agent_with("agent-b", "y", client), HashMap::new(), ["a".to_string()])
            .unwrap();

        let bundle = WorkflowScheduler::execute(&mut workflow).await;
        assert_eq!(bundle.status, WorkflowStatus::Failed);
        assert!(bundle
            .history
            .events()
            .iter()
            .all(|e| e.category != crate::history::EventCategory::StepStart));
    }

    #[tokio::test]
    async fn standalone_validate_is_idempotent_and_matches_execute() {
        let mut workflow = Workflow::new("wf", ExecutionPolicy::default());
        workflow
            .add_step("a", agent_with("agent-a", "x", client_with_script(HashMap::new())), HashMap::new(), ["b".to_string()])
            .unwrap();
        workflow
            .add_step("b", agent_with("agent-b", "y", client_with_script(HashMap::new())), HashMap::new(), ["a".to_string()])
            .unwrap();

        assert_eq!(
            WorkflowScheduler::validate(&workflow).unwrap_err().kind(),
            ErrorKind::CyclicGraph
        );
        assert_eq!(
            WorkflowScheduler::validate(&workflow).unwrap_err().kind(),
            ErrorKind::CyclicGraph
        );
    }

    #[tokio::test]
    async fn exhausted_retries_on_a_persistent_transient_fault_are_not_counted_as_retried() {
        struct AlwaysTransient;
        #[async_trait]
        impl ModelTransport for AlwaysTransient {
            async fn send(&self, _: &str, _: &ModelRequest) -> Result<ModelResponse> {
                Err(Error::model_invocation_transient("permanently flaky"))
            }
            fn name(&self) -> &str {
                "anthropic"
            }
        }
        let client = Arc::new(
            ModelClient::new(TransportRegistry::new().register(Arc::new(AlwaysTransient)))
                .with_retry_policy(RetryPolicy::none()),
        );
        let config = AgentConfig {
            retry_policy: RetryPolicy::none(),
            ..AgentConfig::default()
        };
        let agent = Arc::new(Agent::new("a", "a", config, AgentVariant::Simple, "go", client));

        let mut workflow = Workflow::new(
            "wf",
            ExecutionPolicy {
                max_step_retries: 2,
                ..ExecutionPolicy::default()
            },
        );
        workflow.add_step("s", agent, HashMap::new(), []).unwrap();

        let bundle = WorkflowScheduler::execute(&mut workflow).await;

        assert_eq!(bundle.status, WorkflowStatus::Failed);
        assert_eq!(workflow.step("s").unwrap().attempt_count, 3);
        assert_eq!(bundle.metrics.retried_steps, 0);
    }

    #[tokio::test]
    async fn zero_step_workflow_completes_immediately() {
        let mut workflow = Workflow::new("wf", ExecutionPolicy::default());
        let bundle = WorkflowScheduler::execute(&mut workflow).await;
        assert_eq!(bundle.status, WorkflowStatus::Completed);
        assert!(bundle.results.is_empty());
    }

    #[tokio::test]
    async fn workflow_timeout_cancels_in_flight_step() {
        struct SlowTransport;
        #[async_trait]
        impl ModelTransport for SlowTransport {
            async fn send(&self, _: &str, _: &ModelRequest) -> Result<ModelResponse> {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(text("too late"))
            }
            fn name(&self) -> &str {
                "anthropic"
            }
        }
        let client = Arc::new(
            ModelClient::new(TransportRegistry::new().register(Arc::new(SlowTransport))).with_retry_policy(RetryPolicy::none()),
        );
        let agent = agent_with("slow-agent", "go slow", client);

        let mut workflow = Workflow::new(
            "wf",
            ExecutionPolicy {
                workflow_timeout: Some(Duration::from_millis(20)),
                ..ExecutionPolicy::default()
            },
        );
        workflow.add_step("s", agent, HashMap::new(), []).unwrap();

        let bundle = WorkflowScheduler::execute(&mut workflow).await;
        assert_eq!(bundle.status, WorkflowStatus::Failed);
        assert!(bundle.results.is_empty());
        assert!(bundle
            .history
            .events()
            .iter()
            .any(|e| e.category == crate::history::EventCategory::WorkflowEnd
                && e.payload.get("status").and_then(|v| v.as_str()) == Some("cancelled")));
    }

    #[tokio::test]
    async fn step_deadline_zero_fails_without_invoking_model() {
        let calls = Arc::new(AtomicU32::new(0));
        struct CountingTransport(Arc<AtomicU32>);
        #[async_trait]
        impl ModelTransport for CountingTransport {
            async fn send(&self, _: &str, _: &ModelRequest) -> Result<ModelResponse> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(ModelResponse::Text {
                    text: "x".to_string(),
                    usage: TokenUsage::default(),
                })
            }
            fn name(&self) -> &str {
                "anthropic"
            }
        }
        let transport = Arc::new(CountingTransport(calls.clone()));
        let client = Arc::new(ModelClient::new(TransportRegistry::new().register(transport)));

        let config = AgentConfig {
            invocation_timeout: Some(Duration::ZERO),
            retry_policy: RetryPolicy::none(),
            ..AgentConfig::default()
        };
        let agent = Arc::new(Agent::new("a", "a", config, AgentVariant::Simple, "go", client));

        let mut workflow = Workflow::new("wf", ExecutionPolicy::default());
        workflow.add_step("s", agent, HashMap::new(), []).unwrap();

        let bundle = WorkflowScheduler::execute(&mut workflow).await;
        assert_eq!(bundle.status, WorkflowStatus::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

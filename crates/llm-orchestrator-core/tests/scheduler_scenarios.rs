// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end scheduler scenarios exercised against the public API,
//! complementing the inline unit tests in `scheduler.rs` with the two
//! scenarios that need literal attempt counts and cross-step history
//! ordering: parallel fan-in and transient-retry recovery.

use async_trait::async_trait;
use llm_orchestrator_core::{
    Agent, AgentConfig, AgentVariant, Error, EventCategory, ExecutionPolicy, ModelClient,
    ModelRequest, ModelResponse, ModelTransport, Result, RetryPolicy, TokenUsage,
    TransportRegistry, Workflow, WorkflowScheduler, WorkflowStatus,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn text(s: &str) -> ModelResponse {
    ModelResponse::Text {
        text: s.to_string(),
        usage: TokenUsage {
            input_tokens: 1,
            output_tokens: 1,
        },
    }
}

fn agent(id: &str, prompt: &str, client: Arc<ModelClient>) -> Arc<Agent> {
    Arc::new(Agent::new(
        id,
        id,
        AgentConfig::default(),
        AgentVariant::Simple,
        prompt,
        client,
    ))
}

/// Like [`agent`], but with the agent's own retry layer disabled, so a
/// transient fault is only ever recovered by whichever layer the caller is
/// trying to isolate (the scheduler's step-level retry, here).
fn agent_without_agent_level_retry(id: &str, prompt: &str, client: Arc<ModelClient>) -> Arc<Agent> {
    let config = AgentConfig {
        retry_policy: RetryPolicy::none(),
        ..AgentConfig::default()
    };
    Arc::new(Agent::new(id, id, config, AgentVariant::Simple, prompt, client))
}

/// Fans out two independent steps `x` and `y` with no dependency between
/// them, each answering slowly enough to overlap, then joins them into a
/// dependent step `z`. Asserts both `x_start`/`y_start` land in the history
/// before either step's success event, which only holds if the scheduler
/// actually dispatches the wave concurrently rather than sequentially.
#[tokio::test]
async fn parallel_fan_in_runs_independent_steps_concurrently() {
    struct DelayedTransport {
        delay: Duration,
    }
    #[async_trait]
    impl ModelTransport for DelayedTransport {
        async fn send(&self, _native_model_id: &str, request: &ModelRequest) -> Result<ModelResponse> {
            tokio::time::sleep(self.delay).await;
            let prompt = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(text(if prompt.contains("x") { "x-done" } else if prompt.contains("y") { "y-done" } else { "z-done" }))
        }
        fn name(&self) -> &str {
            "anthropic"
        }
    }

    let client = Arc::new(
        ModelClient::new(TransportRegistry::new().register(Arc::new(DelayedTransport {
            delay: Duration::from_millis(30),
        })))
        .with_retry_policy(RetryPolicy::none()),
    );

    let mut workflow = Workflow::new("fan-in", ExecutionPolicy::default());
    workflow
        .add_step("x", agent("agent-x", "produce x", client.clone()), HashMap::new(), [])
        .unwrap();
    workflow
        .add_step("y", agent("agent-y", "produce y", client.clone()), HashMap::new(), [])
        .unwrap();
    workflow
        .add_step(
            "z",
            agent("agent-z", "join z", client),
            HashMap::new(),
            ["x".to_string(), "y".to_string()],
        )
        .unwrap();

    let bundle = WorkflowScheduler::execute(&mut workflow).await;

    assert_eq!(bundle.status, WorkflowStatus::Completed);
    assert_eq!(bundle.results.len(), 3);

    let events = bundle.history.events();
    let last_independent_start = events
        .iter()
        .enumerate()
        .filter(|(_, e)| {
            e.category == EventCategory::StepStart
                && e.step_id.as_deref().is_some_and(|id| id == "x" || id == "y")
        })
        .map(|(i, _)| i)
        .max()
        .expect("both x_start and y_start must be present");

    let first_independent_success = events
        .iter()
        .enumerate()
        .find(|(_, e)| {
            e.category == EventCategory::StepSuccess
                && e.step_id.as_deref().is_some_and(|id| id == "x" || id == "y")
        })
        .map(|(i, _)| i)
        .expect("at least one of x/y must succeed");

    assert!(
        last_independent_start < first_independent_success,
        "both independent steps must start before either completes"
    );
}

/// Exercises the literal retry accounting from the transient-failure
/// scenario: a step whose model transport fails twice with a transient
/// fault, then succeeds on the third call, against a policy allowing up to
/// two scheduler-level retries (three attempts total).
#[tokio::test]
async fn transient_failure_is_retried_and_recovers_within_budget() {
    struct FlakyTransport {
        calls: AtomicU32,
        fail_first_n: u32,
    }
    #[async_trait]
    impl ModelTransport for FlakyTransport {
        async fn send(&self, _native_model_id: &str, _request: &ModelRequest) -> Result<ModelResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first_n {
                Err(Error::model_invocation_transient("simulated outage"))
            } else {
                Ok(text("recovered"))
            }
        }
        fn name(&self) -> &str {
            "anthropic"
        }
    }

    let transport = Arc::new(FlakyTransport {
        calls: AtomicU32::new(0),
        fail_first_n: 2,
    });
    // Disable both the Model Client's own retry layer and the agent's retry
    // layer so the attempt count below reflects only the scheduler's
    // step-level retries; the three layers are independently composable and
    // this test isolates the scheduler's.
    let client = Arc::new(
        ModelClient::new(TransportRegistry::new().register(transport.clone()))
            .with_retry_policy(RetryPolicy::none()),
    );

    let mut workflow = Workflow::new(
        "retry-recovery",
        ExecutionPolicy {
            max_step_retries: 2,
            ..ExecutionPolicy::default()
        },
    );
    workflow
        .add_step(
            "flaky",
            agent_without_agent_level_retry("agent-flaky", "do the flaky thing", client),
            HashMap::new(),
            [],
        )
        .unwrap();

    let bundle = WorkflowScheduler::execute(&mut workflow).await;

    assert_eq!(bundle.status, WorkflowStatus::Completed);
    assert_eq!(
        bundle.results.get("flaky"),
        Some(&serde_json::Value::String("recovered".to_string()))
    );
    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    assert_eq!(bundle.metrics.retried_steps, 1);

    let retry_events = bundle
        .history
        .events()
        .iter()
        .filter(|e| e.category == EventCategory::StepRetry)
        .count();
    assert_eq!(retry_events, 1);
}

/// A third step downstream of two failing parallel steps must be skipped,
/// and the failure from whichever of the two is recorded as terminating —
/// this is the multi-failure variant of the single-failure unit test
/// already covering the simpler one-predecessor case.
#[tokio::test]
async fn multiple_independent_failures_still_skip_the_dependent_step() {
    struct AlwaysFatal;
    #[async_trait]
    impl ModelTransport for AlwaysFatal {
        async fn send(&self, _: &str, _: &ModelRequest) -> Result<ModelResponse> {
            Err(Error::model_invocation_fatal("permanently broken"))
        }
        fn name(&self) -> &str {
            "anthropic"
        }
    }
    let client = Arc::new(
        ModelClient::new(TransportRegistry::new().register(Arc::new(AlwaysFatal)))
            .with_retry_policy(RetryPolicy::none()),
    );

    let mut workflow = Workflow::new("double-failure", ExecutionPolicy::default());
    workflow
        .add_step("a", agent("agent-a", "fail a", client.clone()), HashMap::new(), [])
        .unwrap();
    workflow
        .add_step("b", agent("agent-b", "fail b", client.clone()), HashMap::new(), [])
        .unwrap();
    workflow
        .add_step(
            "c",
            agent("agent-c", "join c", client),
            HashMap::new(),
            ["a".to_string(), "b".to_string()],
        )
        .unwrap();

    let bundle = WorkflowScheduler::execute(&mut workflow).await;

    assert_eq!(bundle.status, WorkflowStatus::Failed);
    assert_eq!(workflow.step("c").unwrap().status, llm_orchestrator_core::StepStatus::Skipped);
}

// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reasoning Patterns: pure prompt rewriters, no I/O.
//!
//! Two parts of the original design named overlapping but not identical variant sets
//! (`plan-then-act` vs. `ReAct`); this implementation keeps the union of
//! both lists — see `DESIGN.md` for the resolution.

use serde_json::Value;
use std::collections::HashMap;

/// Closed set of reasoning pattern variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningPattern {
    /// Prepends an instruction to think step by step and expect explicit
    /// reasoning.
    ChainOfThought,
    /// Instructs the model to state a short plan and then act on it.
    PlanThenAct,
    /// Instructs enumeration of candidate lines of reasoning followed by
    /// a final choice.
    TreeOfThought,
    /// Requests an initial answer, a self-critique, and a revised answer.
    SelfReflection,
    /// Instructs the model to first emit a numbered plan and then
    /// execute it.
    PlanAndSolve,
    /// Interleaves thought/action/observation tokens; the format the
    /// tool-calling agent's parser recognizes.
    ReAct,
}

impl ReasoningPattern {
    /// Rewrites `prompt` according to this pattern. `inputs` is available
    /// for patterns that want to reference it (none of the closed
    /// variants currently do; it is threaded through for forward
    /// compatibility with future variants).
    pub fn apply(self, prompt: &str, _inputs: &HashMap<String, Value>) -> String {
        match self {
            ReasoningPattern::ChainOfThought => format!(
                "{prompt}\n\nThink step by step. Show your reasoning explicitly before giving \
                 the final answer."
            ),
            ReasoningPattern::PlanThenAct => format!(
                "{prompt}\n\nFirst state a short plan of the steps you will take, prefixed with \
                 \"Plan:\". Then carry out the plan and give the final answer, prefixed with \
                 \"Answer:\"."
            ),
            ReasoningPattern::TreeOfThought => format!(
                "{prompt}\n\nEnumerate at least three distinct candidate lines of reasoning, \
                 evaluate each briefly, then state which one you choose and give the final \
                 answer based on it."
            ),
            ReasoningPattern::SelfReflection => format!(
                "{prompt}\n\nFirst give an initial answer. Then critique that answer for \
                 mistakes or omissions. Then give a revised final answer that incorporates the \
                 critique."
            ),
            ReasoningPattern::PlanAndSolve => format!(
                "{prompt}\n\nFirst emit a numbered plan breaking the problem into subtasks. \
                 Then solve each subtask in order and combine the results into the final \
                 answer."
            ),
            ReasoningPattern::ReAct => format!(
                "{prompt}\n\nReason about the task using interleaved Thought:, Action:, and \
                 Observation: lines. Each Action: line either calls a tool or gives the final \
                 answer prefixed with \"Final Answer:\"."
            ),
        }
    }
}

// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Concrete [`llm_orchestrator_core::ModelTransport`] implementations:
//! Anthropic, OpenAI, and OpenAI-compatible open-weights backends.

pub mod anthropic;
pub mod open_weights;
pub mod openai;

pub use anthropic::AnthropicTransport;
pub use open_weights::OpenWeightsTransport;
pub use openai::OpenAITransport;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

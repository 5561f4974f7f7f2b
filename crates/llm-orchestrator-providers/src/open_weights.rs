// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport for self-hosted open-weights models served behind an
//! OpenAI-compatible chat-completions endpoint (vLLM, Ollama, TGI, ...).
//! Registered under the `open_weights` family, serving
//! `ModelSelector::OpenWeights`.

use crate::openai::OpenAITransport;
use async_trait::async_trait;
use llm_orchestrator_core::{ModelRequest, ModelResponse, ModelTransport, Result};

/// Thin wrapper around [`OpenAITransport`] pointed at a self-hosted
/// endpoint: the wire format is the same, only the family name and
/// authentication differ (a bearer token is optional, since many
/// self-hosted servers run unauthenticated on a private network).
pub struct OpenWeightsTransport {
    inner: OpenAITransport,
}

impl OpenWeightsTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            inner: OpenAITransport::with_base_url("unused", base_url),
        }
    }

    pub fn with_api_key(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            inner: OpenAITransport::with_base_url(api_key, base_url),
        }
    }

    /// Reads the endpoint from `OPEN_WEIGHTS_BASE_URL`, defaulting to the
    /// conventional local vLLM/Ollama port when unset.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("OPEN_WEIGHTS_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8000/v1".to_string());
        Ok(Self::new(base_url))
    }
}

#[async_trait]
impl ModelTransport for OpenWeightsTransport {
    async fn send(&self, native_model_id: &str, request: &ModelRequest) -> Result<ModelResponse> {
        self.inner.send(native_model_id, request).await
    }

    fn name(&self) -> &str {
        "open_weights"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_name_is_open_weights() {
        let transport = OpenWeightsTransport::new("http://localhost:8000/v1");
        assert_eq!(transport.name(), "open_weights");
    }
}

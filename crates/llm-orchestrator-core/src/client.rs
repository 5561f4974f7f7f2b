// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Model Client: a single logical `invoke` operation with
//! built-in retry over transient provider faults.

use crate::error::{Error, ErrorKind, Result};
use crate::model::{Complexity, ModelRequest, ModelResponse, ModelSelector, TransportRegistry};
use crate::retry::{RetryExecutor, RetryPolicy};
use tracing::{debug, warn};

/// Single public operation: `invoke(request) -> response`.
pub struct ModelClient {
    transports: TransportRegistry,
    retry_policy: RetryPolicy,
}

impl ModelClient {
    pub fn new(transports: TransportRegistry) -> Self {
        Self {
            transports,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// The single decision point for routing: a fast-cheap model for
    /// simple tasks, a capable one for complex tasks.
    pub const fn pick_model(&self, complexity: Complexity) -> ModelSelector {
        crate::model::pick_model(complexity)
    }

    /// Invokes the model, retrying transient/throttle outcomes with
    /// exponential backoff up to the configured retry policy. Fatal
    /// outcomes propagate immediately.
    pub async fn invoke(&self, request: ModelRequest) -> Result<ModelResponse> {
        let family = request.selector.family();
        let native_model_id = request.selector.native_model_id();

        let transport = self.transports.get(family).ok_or_else(|| {
            Error::new(
                ErrorKind::Configuration,
                format!("no transport registered for model family '{family}'"),
            )
        })?;

        let executor = RetryExecutor::new(self.retry_policy.clone());
        let (result, attempt) = executor
            .execute(|| async {
                debug!(model = native_model_id, family, "invoking model transport");
                transport.send(native_model_id, &request).await
            })
            .await;

        match &result {
            Ok(_) if attempt > 1 => {
                debug!(attempt, "model invocation succeeded after retry");
            }
            Err(err) if !err.is_retryable() => {
                warn!(kind = %err.kind(), message = err.message(), "model invocation failed terminally");
            }
            _ => {}
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Message, ModelTransport, TokenUsage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct ScriptedTransport {
        name: &'static str,
        calls: AtomicU32,
        fail_first_n: u32,
    }

    #[async_trait]
    impl ModelTransport for ScriptedTransport {
        async fn send(&self, _native_model_id: &str, _request: &ModelRequest) -> Result<ModelResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first_n {
                Err(Error::model_invocation_transient("simulated transient fault"))
            } else {
                Ok(ModelResponse::Text {
                    text: "ok".to_string(),
                    usage: TokenUsage {
                        input_tokens: 5,
                        output_tokens: 1,
                    },
                })
            }
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    fn request() -> ModelRequest {
        ModelRequest::new(ModelSelector::FastCheap, vec![Message::user("hi")])
    }

    #[tokio::test]
    async fn invoke_succeeds_directly_when_transport_succeeds() {
        let transport = Arc::new(ScriptedTransport {
            name: "anthropic",
            calls: AtomicU32::new(0),
            fail_first_n: 0,
        });
        let client = ModelClient::new(TransportRegistry::new().register(transport));

        let response = client.invoke(request()).await.unwrap();
        match response {
            ModelResponse::Text { text, .. } => assert_eq!(text, "ok"),
            _ => panic!("expected text response"),
        }
    }

    #[tokio::test]
    async fn invoke_retries_transient_failures() {
        let transport = Arc::new(ScriptedTransport {
            name: "anthropic",
            calls: AtomicU32::new(0),
            fail_first_n: 2,
        });
        let client = ModelClient::new(TransportRegistry::new().register(transport)).with_retry_policy(
            RetryPolicy {
                use_jitter: false,
                ..RetryPolicy::new(
                    3,
                    std::time::Duration::from_millis(1),
                    1.0,
                    std::time::Duration::from_millis(2),
                )
            },
        );

        let response = client.invoke(request()).await.unwrap();
        assert!(matches!(response, ModelResponse::Text { .. }));
    }

    #[tokio::test]
    async fn invoke_surfaces_unregistered_family_as_configuration_error() {
        let client = ModelClient::new(TransportRegistry::new());
        let err = client.invoke(request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn invoke_does_not_retry_fatal_errors() {
        struct FatalTransport(AtomicU32);
        #[async_trait]
        impl ModelTransport for FatalTransport {
            async fn send(&self, _: &str, _: &ModelRequest) -> Result<ModelResponse> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(Error::model_invocation_fatal("bad api key"))
            }
            fn name(&self) -> &str {
                "anthropic"
            }
        }
        let transport = Arc::new(FatalTransport(AtomicU32::new(0)));
        let calls_handle = transport.clone();
        let client = ModelClient::new(TransportRegistry::new().register(transport));

        let err = client.invoke(request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelInvocationFatal);
        assert_eq!(calls_handle.0.load(Ordering::SeqCst), 1);
    }
}

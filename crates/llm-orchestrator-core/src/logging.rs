// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide structured logging.
//!
//! Built on `tracing`, with the same subscriber builder chain a CLI
//! front-end would use, but exposed as a library-safe one-shot [`init`] guarded by
//! [`std::sync::Once`] so repeated calls (as happen across a test binary's
//! many test functions) are harmless.
//!
//! Context (workflow_id, step_id, agent_id, attempt) is carried by
//! `tracing::info_span!` entered around each unit of work; `tracing`
//! already merges enclosing span fields into every event emitted within
//! them, which is why components reach for `tracing::info_span!` rather
//! than threading a context map by hand.

use std::sync::{Once, OnceLock};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Verbosity levels recognized by the `log_verbosity` environment option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Debug,
    Info,
    Warn,
    Error,
}

impl Verbosity {
    fn as_level(self) -> Level {
        match self {
            Verbosity::Debug => Level::DEBUG,
            Verbosity::Info => Level::INFO,
            Verbosity::Warn => Level::WARN,
            Verbosity::Error => Level::ERROR,
        }
    }
}

impl std::str::FromStr for Verbosity {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Verbosity::Debug),
            "info" => Ok(Verbosity::Info),
            "warn" | "warning" => Ok(Verbosity::Warn),
            "error" => Ok(Verbosity::Error),
            other => Err(crate::error::Error::configuration(format!(
                "unrecognized log_verbosity '{other}'"
            ))),
        }
    }
}

/// A sink that receives formatted log lines when `remote_log_enabled` is
/// set. A real network sink (e.g. shipping to a remote log aggregator) is
/// an external collaborator; this trait is the seam a caller plugs one
/// into.
pub trait RemoteLogSink: Send + Sync {
    fn send(&self, group: &str, line: &str);
}

/// An in-memory sink, useful for tests and as a default no-op-adjacent
/// implementation.
#[derive(Default)]
pub struct InMemoryLogSink {
    lines: parking_lot::Mutex<Vec<String>>,
}

impl InMemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl RemoteLogSink for InMemoryLogSink {
    fn send(&self, group: &str, line: &str) {
        self.lines.lock().push(format!("[{group}] {line}"));
    }
}

struct RemoteLayer {
    group: String,
    sink: std::sync::Arc<dyn RemoteLogSink>,
}

impl<S> tracing_subscriber::Layer<S> for RemoteLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        struct Visitor(String);
        impl tracing::field::Visit for Visitor {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                self.0.push_str(&format!(" {}={:?}", field.name(), value));
            }
        }
        let mut visitor = Visitor(format!("{}", event.metadata().name()));
        event.record(&mut visitor);
        self.sink.send(&self.group, &visitor.0);
    }
}

/// Configuration for [`init`], corresponding to the environment options.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub verbosity: Verbosity,
    pub remote_log_enabled: bool,
    pub remote_log_group: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Info,
            remote_log_enabled: false,
            remote_log_group: None,
        }
    }
}

static INIT: Once = Once::new();
static REMOTE_SINK: OnceLock<std::sync::Arc<dyn RemoteLogSink>> = OnceLock::new();

/// Initializes the process-wide subscriber. Safe to call more than once;
/// only the first call takes effect.
///
/// When `config.remote_log_enabled` is set, `remote_sink` must be
/// provided (a missing sink with the flag set is itself a `configuration`
/// error, surfaced by [`try_init`]).
pub fn init(config: LogConfig, remote_sink: Option<std::sync::Arc<dyn RemoteLogSink>>) {
    let _ = try_init(config, remote_sink);
}

/// Fallible variant of [`init`] used internally and by callers that want
/// to observe configuration mistakes.
pub fn try_init(
    config: LogConfig,
    remote_sink: Option<std::sync::Arc<dyn RemoteLogSink>>,
) -> crate::error::Result<()> {
    if config.remote_log_enabled {
        let group = config.remote_log_group.clone().ok_or_else(|| {
            crate::error::Error::configuration(
                "remote_log_group is required when remote_log_enabled is set",
            )
        })?;
        let sink = remote_sink.ok_or_else(|| {
            crate::error::Error::configuration(
                "remote_log_enabled is set but no RemoteLogSink was provided",
            )
        })?;
        let _ = REMOTE_SINK.set(sink.clone());

        INIT.call_once(|| {
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("llm_orchestrator_core={}", config.verbosity.as_level()).into());
            let remote_layer = RemoteLayer { group, sink };
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(remote_layer)
                .try_init();
        });
    } else {
        INIT.call_once(|| {
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("llm_orchestrator_core={}", config.verbosity.as_level()).into());
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .try_init();
        });
    }

    Ok(())
}
